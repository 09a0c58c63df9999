//! Discovery pipeline: sequences the harvesters and merges their outputs
//! into one [`Snapshot`] plus a [`RunSummary`].
//!
//! Only authentication failure aborts a run. Every other failure is recorded
//! in the run-level error list and the affected source contributes whatever
//! it managed to gather.

use crate::auth::Authenticator;
use crate::config::{PlatformConfig, RateConfig, SourceToggles};
use crate::executor::RequestExecutor;
use crate::harvest::accounts::AccountsHarvester;
use crate::harvest::api_manager::ApiManagerHarvester;
use crate::harvest::exchange::{self, ExchangeHarvester};
use crate::harvest::runtime::RuntimeHarvester;
use crate::harvest::visualizer::VisualizerHarvester;
use crate::model::{
    ApiInstance, Completeness, DependencyGraph, EnvironmentType, ExchangeAsset, RunSummary,
    Snapshot, SummaryCounts,
};
use crate::traits::{HarvestError, HttpTransport};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one complete discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryRun {
    pub snapshot: Snapshot,
    pub summary: RunSummary,
}

/// Sequences the per-source harvesters against one organization.
pub struct DiscoveryPipeline {
    executor: RequestExecutor,
    platform: PlatformConfig,
    toggles: SourceToggles,
}

impl DiscoveryPipeline {
    pub fn new(
        platform: PlatformConfig,
        rate: RateConfig,
        toggles: SourceToggles,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let auth = Authenticator::new(transport.clone(), &platform);
        Self {
            executor: RequestExecutor::new(transport, auth, rate),
            platform,
            toggles,
        }
    }

    /// Runs discovery to completion.
    ///
    /// Fails only when the initial authentication fails; once a token is
    /// held, every source degrades independently and the run always produces
    /// a snapshot.
    pub async fn run(&self) -> Result<DiscoveryRun, HarvestError> {
        let started = Utc::now();
        let mut snapshot = Snapshot::new(started);
        let mut errors: Vec<String> = Vec::new();

        self.executor.authenticate().await?;
        info!(org_id = %self.platform.org_id, "authenticated, starting discovery");

        let accounts = AccountsHarvester::new(&self.executor, &self.platform);

        match accounts.master_organization().await {
            Ok(org) => snapshot.master_org = Some(org),
            Err(e) => errors.push(format!("master organization: {e}")),
        }
        match accounts.organizations().await {
            Ok(orgs) => snapshot.organizations = orgs,
            Err(e) => errors.push(format!("organization hierarchy: {e}")),
        }

        // Environments drive everything downstream; walk every discovered
        // business group, falling back to the root org when the hierarchy
        // fetch produced nothing.
        let mut org_ids: Vec<String> = snapshot
            .organizations
            .iter()
            .map(|o| o.org_id.clone())
            .collect();
        if org_ids.is_empty() {
            org_ids.push(self.platform.org_id.clone());
        }
        let mut seen_orgs = HashSet::new();
        for org_id in org_ids {
            if !seen_orgs.insert(org_id.clone()) {
                continue;
            }
            match accounts.environments(&org_id).await {
                Ok(envs) => snapshot.environments.extend(envs),
                Err(e) => errors.push(format!("environments ({org_id}): {e}")),
            }
        }
        info!(
            organizations = snapshot.organizations.len(),
            environments = snapshot.environments.len(),
            "accounts harvested"
        );

        if self.toggles.runtime {
            let runtime = RuntimeHarvester::new(&self.executor, &self.platform);
            for env in &snapshot.environments {
                let mut out = runtime.applications(env).await;
                snapshot.applications.append(&mut out.records);
                errors.append(&mut out.errors);
            }
        }

        if self.toggles.visualizer {
            let visualizer = VisualizerHarvester::new(&self.executor, &self.platform);
            let mut sandbox_slices = Vec::new();
            let mut production_slices = Vec::new();
            for env in &snapshot.environments {
                let bucket = match env.env_type {
                    EnvironmentType::Sandbox => &mut sandbox_slices,
                    EnvironmentType::Production => &mut production_slices,
                    // Design environments carry no runtime topology.
                    EnvironmentType::Design => continue,
                };
                match visualizer.environment_graph(env).await {
                    Ok(slice) => bucket.push(slice),
                    Err(e) => {
                        warn!(env = %env.name, error = %e, "visualizer slice failed");
                        errors.push(format!("visualizer ({}): {e}", env.name));
                    }
                }
            }
            snapshot.sandbox_graph = merge_graphs(sandbox_slices);
            snapshot.production_graph = merge_graphs(production_slices);
        }

        if self.toggles.exchange {
            let harvester = ExchangeHarvester::new(&self.executor, &self.platform);
            let mut out = harvester.assets(&self.toggles).await;
            snapshot.exchange_assets.append(&mut out.records);
            errors.append(&mut out.errors);
        }

        let api_manager = ApiManagerHarvester::new(&self.executor, &self.platform);
        for env in &snapshot.environments {
            let mut out = api_manager.instances(env).await;
            snapshot.api_instances.append(&mut out.records);
            errors.append(&mut out.errors);
        }

        resolve_instance_assets(&mut snapshot.api_instances, &snapshot.exchange_assets);
        snapshot.assets_by_type = count_assets_by_type(&snapshot.exchange_assets);

        let summary = self.summarize(&snapshot, errors);
        info!(
            applications = snapshot.applications.len(),
            assets = snapshot.exchange_assets.len(),
            api_instances = snapshot.api_instances.len(),
            errors = summary.errors.len(),
            "discovery complete"
        );
        Ok(DiscoveryRun { snapshot, summary })
    }

    fn summarize(&self, snapshot: &Snapshot, errors: Vec<String>) -> RunSummary {
        RunSummary {
            discovery_timestamp: snapshot.discovery_timestamp,
            organization_id: self.platform.org_id.clone(),
            organization_name: snapshot
                .master_org
                .as_ref()
                .map(|o| o.name.clone())
                .unwrap_or_default(),
            counts: SummaryCounts {
                business_groups: snapshot.organizations.len(),
                environments: snapshot.environments.len(),
                applications: snapshot.applications.len(),
                exchange_assets: snapshot.exchange_assets.len(),
                api_instances: snapshot.api_instances.len(),
                sandbox_nodes: snapshot.sandbox_graph.nodes.len(),
                sandbox_edges: snapshot.sandbox_graph.edges.len(),
                production_nodes: snapshot.production_graph.nodes.len(),
                production_edges: snapshot.production_graph.edges.len(),
            },
            assets_by_type: snapshot.assets_by_type.clone(),
            errors,
            request_stats: self.executor.stats(),
            completeness: completeness(&snapshot.exchange_assets),
        }
    }
}

/// Merges per-environment graph slices, deduplicating nodes by id and
/// enforcing the graph invariants: no self-loops, no dangling edge
/// endpoints, no duplicate edges.
pub fn merge_graphs(slices: Vec<DependencyGraph>) -> DependencyGraph {
    let mut merged = DependencyGraph::default();
    let mut node_ids = HashSet::new();
    for slice in &slices {
        for node in &slice.nodes {
            if node_ids.insert(node.node_id.clone()) {
                merged.nodes.push(node.clone());
            }
        }
    }
    let mut edge_keys = HashSet::new();
    for slice in slices {
        for edge in slice.edges {
            if edge.source == edge.target {
                continue;
            }
            if !node_ids.contains(&edge.source) || !node_ids.contains(&edge.target) {
                continue;
            }
            if edge_keys.insert((edge.source.clone(), edge.target.clone())) {
                merged.edges.push(edge);
            }
        }
    }
    merged
}

/// Links API instances to harvested Exchange assets by name + version.
///
/// API Manager reports only a display name and version, so the link is a
/// heuristic: it is applied only when exactly one asset matches, otherwise
/// the instance keeps `asset_ref: None`.
pub fn resolve_instance_assets(instances: &mut [ApiInstance], assets: &[ExchangeAsset]) {
    for instance in instances.iter_mut() {
        if instance.asset_name.is_empty() {
            continue;
        }
        let mut matches = assets.iter().filter(|asset| {
            (asset.asset_id == instance.asset_name || asset.name == instance.asset_name)
                && asset.version == instance.asset_version
        });
        let first = matches.next();
        if first.is_some() && matches.next().is_none() {
            instance.asset_ref = first.map(|asset| asset.asset_ref());
        }
    }
}

pub fn count_assets_by_type(assets: &[ExchangeAsset]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for asset in assets {
        *counts.entry(asset.asset_type.clone()).or_insert(0) += 1;
    }
    counts
}

fn completeness(assets: &[ExchangeAsset]) -> Completeness {
    let api_assets: Vec<&ExchangeAsset> = assets
        .iter()
        .filter(|a| exchange::is_api_type(&a.asset_type))
        .collect();
    Completeness {
        api_assets: api_assets.len(),
        with_specs: api_assets.iter().filter(|a| a.spec_ref.is_some()).count(),
        with_docs: api_assets.iter().filter(|a| !a.doc_refs.is_empty()).count(),
        with_files: api_assets.iter().filter(|a| !a.files.is_empty()).count(),
        with_dependencies: api_assets
            .iter()
            .filter(|a| !a.dependencies.is_empty())
            .count(),
    }
}
