//! Harvest module - per-source harvesters and the discovery pipeline.
//!
//! Each harvester maps one platform subsystem onto the normalized entities
//! in [`crate::model`]:
//! - **accounts**: organizations + environments (mandatory, ordering root)
//! - **runtime**: deployed applications (CloudHub 1.0 / 2.0 / hybrid)
//! - **exchange**: Exchange assets with optional spec/doc secondaries
//! - **api_manager**: managed API instances + policies
//! - **visualizer**: inter-service dependency graphs
//!
//! The [`pipeline::DiscoveryPipeline`] sequences them in dependency order and
//! merges their outputs into one [`crate::model::Snapshot`].

pub mod accounts;
pub mod api_manager;
pub mod exchange;
pub mod pipeline;
pub mod runtime;
pub mod specs;
pub mod visualizer;

pub use pipeline::{DiscoveryPipeline, DiscoveryRun};

/// Output of a failure-isolated harvester: whatever was gathered plus the
/// errors absorbed along the way. Harvesters degrade instead of aborting;
/// the pipeline appends the errors to the run-level list.
#[derive(Debug)]
pub struct Harvested<T> {
    pub records: Vec<T>,
    pub errors: Vec<String>,
}

// Manual impl: a derive would demand `T: Default`, but an empty result is
// empty regardless of the record type.
impl<T> Default for Harvested<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            errors: Vec::new(),
        }
    }
}
