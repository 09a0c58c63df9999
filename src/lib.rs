//! Rate-governed discovery engine for Anypoint Platform estates.
//!
//! Authenticates once, walks the platform's control-plane APIs (accounts,
//! runtime, Exchange, API Manager, Visualizer) under a global request-rate
//! ceiling, and merges everything into one normalized [`model::Snapshot`].

pub mod auth;
pub mod config;
pub mod executor;
pub mod governor;
pub mod harvest;
pub mod model;
pub mod paging;
pub mod traits;
pub mod transport;
pub mod writer;

pub use config::{PlatformConfig, RateConfig, Region, SourceToggles};
pub use harvest::{DiscoveryPipeline, DiscoveryRun};
pub use model::{RunSummary, Snapshot};
pub use traits::{HarvestError, HttpTransport};
