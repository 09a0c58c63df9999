//! Visualizer harvester: inter-service dependency graphs.
//!
//! Graphs are fetched one environment at a time so a slow or failing
//! environment costs only its own slice of the graph.

use crate::config::PlatformConfig;
use crate::executor::{optional, RequestExecutor};
use crate::harvest::accounts::str_field;
use crate::model::{DependencyGraph, Environment, GraphEdge, GraphNode};
use crate::traits::{ApiRequest, HarvestError};
use serde_json::Value;
use tracing::debug;

pub struct VisualizerHarvester<'a> {
    executor: &'a RequestExecutor,
    config: &'a PlatformConfig,
}

impl<'a> VisualizerHarvester<'a> {
    pub fn new(executor: &'a RequestExecutor, config: &'a PlatformConfig) -> Self {
        Self { executor, config }
    }

    /// Dependency graph slice for one environment. Organizations without
    /// Visualizer entitlement 404; that is an empty graph, not an error.
    pub async fn environment_graph(
        &self,
        env: &Environment,
    ) -> Result<DependencyGraph, HarvestError> {
        let request = ApiRequest::get(format!(
            "{}/organizations/{}/graph",
            self.config.visualizer_url(),
            env.org_id
        ))
        .with_query("environmentIds", env.env_id.clone());

        let body = match optional(self.executor.get_json(request).await)? {
            Some(body) => body,
            None => return Ok(DependencyGraph::default()),
        };
        let graph = parse_graph(&body);
        debug!(
            env = %env.name,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "visualizer graph slice"
        );
        Ok(graph)
    }
}

fn parse_graph(body: &Value) -> DependencyGraph {
    let nodes = body
        .get("nodes")
        .and_then(|n| n.as_array())
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|n| {
                    let node_id = str_field(n, "id");
                    if node_id.is_empty() {
                        return None;
                    }
                    Some(GraphNode {
                        node_id,
                        node_type: str_field(n, "type"),
                        label: str_field(n, "label"),
                        environment_id: str_field(n, "environmentId"),
                        deployment_target: str_field(n, "deploymentTarget"),
                        runtime_version: str_field(n, "muleVersion"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let edges = body
        .get("edges")
        .and_then(|e| e.as_array())
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| {
                    let source = str_field(e, "sourceId");
                    let target = str_field(e, "targetId");
                    if source.is_empty() || target.is_empty() {
                        return None;
                    }
                    Some(GraphEdge { source, target })
                })
                .collect()
        })
        .unwrap_or_default();

    DependencyGraph { nodes, edges }
}
