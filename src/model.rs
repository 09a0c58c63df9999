//! Normalized entities and the merged discovery snapshot.
//!
//! Field names here are the on-disk contract: the snapshot serializes with
//! exactly these keys and is consumed by offline analysis tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Organization / business group. Forms a tree rooted at the master org.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub org_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_master: bool,
}

/// Environment classification on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Sandbox,
    Production,
    Design,
}

impl EnvironmentType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sandbox" => Some(Self::Sandbox),
            "production" => Some(Self::Production),
            "design" => Some(Self::Design),
            _ => None,
        }
    }
}

/// Environment owned by exactly one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub env_id: String,
    pub org_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: EnvironmentType,
}

/// Deployed application, normalized across CloudHub 1.0 / 2.0 / hybrid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub app_id: String,
    pub env_id: String,
    pub name: String,
    pub status: String,
    pub vcores: f64,
    pub workers: u32,
    pub region: String,
    pub runtime_version: String,
    /// Deployment target discriminator: "CH1.0", "CH2.0", "hybrid", or a
    /// provider name reported by the platform.
    pub target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_update_time: String,
}

/// Identity of an Exchange asset: `(group_id, asset_id, version)`.
/// Versions of the same logical asset are distinct entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetRef {
    pub group_id: String,
    pub asset_id: String,
    pub version: String,
}

/// One endpoint extracted from an API specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecEndpoint {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

/// Parsed API specification content (RAML or OpenAPI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSpecification {
    /// "RAML0.8", "RAML1.0", "OAS2", or "OAS3".
    pub spec_type: String,
    pub version: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub base_uri: String,
    pub endpoints: Vec<SpecEndpoint>,
    /// Raw specification text, truncated to 10 000 characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_spec: Option<String>,
}

/// One documentation page attached to an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationPage {
    pub page_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Asset from Exchange, with optionally-fetched secondary content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeAsset {
    pub asset_id: String,
    pub group_id: String,
    pub name: String,
    pub version: String,
    pub asset_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    pub tags: BTreeSet<String>,
    /// Category display name → values.
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
    pub dependencies: Vec<AssetRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<AssetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_ref: Option<ApiSpecification>,
    pub doc_refs: Vec<DocumentationPage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<AssetFile>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
}

impl ExchangeAsset {
    pub fn asset_ref(&self) -> AssetRef {
        AssetRef {
            group_id: self.group_id.clone(),
            asset_id: self.asset_id.clone(),
            version: self.version.clone(),
        }
    }
}

/// File entry in an asset's Exchange file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFile {
    #[serde(default)]
    pub classifier: String,
    #[serde(default)]
    pub packaging: String,
    #[serde(default, alias = "externalLink", skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
}

/// Policy applied to an API instance. Shape varies per policy template, so
/// everything beyond the template id is kept in the flattened extra map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    #[serde(
        rename = "policyTemplateId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub policy_template_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Managed API instance from API Manager.
///
/// `asset_ref` is a weak reference: the aggregator resolves it by heuristic
/// matching against harvested Exchange assets and legitimately leaves it
/// `None` when no unambiguous match exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiInstance {
    pub instance_id: String,
    pub env_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_ref: Option<AssetRef>,
    pub endpoint_uri: String,
    pub status: String,
    pub policies: Vec<PolicyDescriptor>,
    /// Exchange asset name reported by API Manager; matching hint only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub technology: String,
}

/// Opaque node identifier inside a dependency graph, resolvable back to an
/// application or API instance.
pub type NodeRef = String;

/// Node in the service dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: NodeRef,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deployment_target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime_version: String,
}

/// Directed dependency: `source` calls `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: NodeRef,
    pub target: NodeRef,
}

/// Inter-service dependency graph for one environment type.
///
/// Invariant: every edge endpoint appears in `nodes`; no self-loops. Cycles
/// between distinct nodes are valid and preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// The complete merged discovery result for one run. Immutable once handed
/// to the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub discovery_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_org: Option<Organization>,
    pub organizations: Vec<Organization>,
    pub environments: Vec<Environment>,
    pub applications: Vec<Application>,
    pub exchange_assets: Vec<ExchangeAsset>,
    pub api_instances: Vec<ApiInstance>,
    pub sandbox_graph: DependencyGraph,
    pub production_graph: DependencyGraph,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets_by_type: BTreeMap<String, usize>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            discovery_timestamp: timestamp,
            master_org: None,
            organizations: Vec::new(),
            environments: Vec::new(),
            applications: Vec::new(),
            exchange_assets: Vec::new(),
            api_instances: Vec::new(),
            sandbox_graph: DependencyGraph::default(),
            production_graph: DependencyGraph::default(),
            assets_by_type: BTreeMap::new(),
        }
    }
}

/// Outbound request statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub rate_limited_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    /// Total time spent waiting out 429 responses, in milliseconds.
    pub rate_limit_wait_ms: u64,
}

/// Per-run summary persisted alongside the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub discovery_timestamp: DateTime<Utc>,
    pub organization_id: String,
    pub organization_name: String,
    pub counts: SummaryCounts,
    pub assets_by_type: BTreeMap<String, usize>,
    /// Harvester-level errors encountered; the run completed despite these.
    pub errors: Vec<String>,
    pub request_stats: RequestStats,
    pub completeness: Completeness,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub business_groups: usize,
    pub environments: usize,
    pub applications: usize,
    pub exchange_assets: usize,
    pub api_instances: usize,
    pub sandbox_nodes: usize,
    pub sandbox_edges: usize,
    pub production_nodes: usize,
    pub production_edges: usize,
}

/// Data completeness counters for harvested API assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub api_assets: usize,
    pub with_specs: usize,
    pub with_docs: usize,
    pub with_files: usize,
    pub with_dependencies: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_type_parses_known_values() {
        assert_eq!(EnvironmentType::parse("sandbox"), Some(EnvironmentType::Sandbox));
        assert_eq!(
            EnvironmentType::parse("production"),
            Some(EnvironmentType::Production)
        );
        assert_eq!(EnvironmentType::parse("design"), Some(EnvironmentType::Design));
        assert_eq!(EnvironmentType::parse("staging"), None);
    }

    #[test]
    fn snapshot_serializes_contract_keys() {
        let snapshot = Snapshot::new(Utc::now());
        let json = serde_json::to_value(&snapshot).unwrap();
        for key in [
            "discovery_timestamp",
            "organizations",
            "environments",
            "applications",
            "exchange_assets",
            "api_instances",
            "sandbox_graph",
            "production_graph",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert!(json["sandbox_graph"].get("nodes").is_some());
        assert!(json["sandbox_graph"].get("edges").is_some());
    }

    #[test]
    fn policy_template_id_reads_wire_key() {
        let policy: PolicyDescriptor = serde_json::from_str(
            r#"{"policyTemplateId": "rate-limiting", "order": 1}"#,
        )
        .unwrap();
        assert_eq!(policy.policy_template_id.as_deref(), Some("rate-limiting"));
        // The identifying field must not leak into the flattened extras.
        assert!(!policy.extra.contains_key("policyTemplateId"));
        assert_eq!(policy.extra.get("order"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn environment_type_field_renamed() {
        let env = Environment {
            env_id: "e1".into(),
            org_id: "o1".into(),
            name: "Sandbox".into(),
            env_type: EnvironmentType::Sandbox,
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "sandbox");
    }
}
