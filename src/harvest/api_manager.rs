//! API Manager harvester: managed API instances and their applied policies.

use crate::config::PlatformConfig;
use crate::executor::{optional, RequestExecutor};
use crate::harvest::accounts::str_field;
use crate::harvest::Harvested;
use crate::model::{ApiInstance, Environment, PolicyDescriptor};
use crate::traits::ApiRequest;
use serde_json::Value;
use tracing::debug;

pub struct ApiManagerHarvester<'a> {
    executor: &'a RequestExecutor,
    config: &'a PlatformConfig,
}

impl<'a> ApiManagerHarvester<'a> {
    pub fn new(executor: &'a RequestExecutor, config: &'a PlatformConfig) -> Self {
        Self { executor, config }
    }

    /// Managed API instances for one environment. Environments without API
    /// Manager enabled 404 and yield nothing. A failed policies fetch leaves
    /// the instance with an empty policy list and records the error.
    pub async fn instances(&self, env: &Environment) -> Harvested<ApiInstance> {
        let mut out = Harvested::default();
        let url = format!(
            "{}/organizations/{}/environments/{}/apis",
            self.config.api_manager_url(),
            env.org_id,
            env.env_id
        );

        let body = match optional(self.executor.get_json(ApiRequest::get(url)).await) {
            Ok(Some(body)) => body,
            Ok(None) => return out,
            Err(e) => {
                out.errors
                    .push(format!("api manager ({}): {e}", env.name));
                return out;
            }
        };

        let entries = flatten_instances(&body);
        debug!(env = %env.name, count = entries.len(), "api manager instances");

        for (asset_name, api) in &entries {
            let mut instance = Self::map_instance(api, env, asset_name);
            match self.policies(env, &instance.instance_id).await {
                Ok(policies) => instance.policies = policies,
                Err(e) => out.errors.push(format!(
                    "api manager policies ({} / {}): {e}",
                    env.name, instance.instance_id
                )),
            }
            out.records.push(instance);
        }
        out
    }

    fn map_instance(api: &Value, env: &Environment, asset_name: &str) -> ApiInstance {
        let asset_name = if asset_name.is_empty() {
            str_field(api, "exchangeAssetName")
        } else {
            asset_name.to_string()
        };
        let instance_id = match api.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        ApiInstance {
            instance_id,
            env_id: env.env_id.clone(),
            asset_ref: None,
            endpoint_uri: str_field(api, "endpointUri"),
            status: match api.pointer("/deprecated").and_then(|d| d.as_bool()) {
                Some(true) => "deprecated".to_string(),
                _ => str_field(api, "status"),
            },
            policies: Vec::new(),
            asset_name,
            asset_version: str_field(api, "assetVersion"),
            instance_label: str_field(api, "instanceLabel"),
            technology: str_field(api, "technology"),
        }
    }

    async fn policies(
        &self,
        env: &Environment,
        instance_id: &str,
    ) -> Result<Vec<PolicyDescriptor>, crate::traits::HarvestError> {
        let url = format!(
            "{}/organizations/{}/environments/{}/apis/{}/policies",
            self.config.api_manager_url(),
            env.org_id,
            env.env_id,
            instance_id
        );
        let body = match optional(self.executor.get_json(ApiRequest::get(url)).await)? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        // Both shapes occur: a bare array, or an object with a "policies" key.
        let raw = match &body {
            Value::Array(items) => items.clone(),
            Value::Object(map) => map
                .get("policies")
                .and_then(|p| p.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(raw
            .iter()
            .filter_map(|p| serde_json::from_value(p.clone()).ok())
            .collect())
    }
}

/// Normalizes the two listing shapes the platform serves into
/// `(asset_name, instance)` pairs: instances grouped under an `assets` array,
/// or a flat `apis` list carrying `exchangeAssetName` per instance.
fn flatten_instances(body: &Value) -> Vec<(String, Value)> {
    if let Some(groups) = body.get("assets").and_then(|a| a.as_array()) {
        let mut entries = Vec::new();
        for group in groups {
            let asset_name = str_field(group, "name");
            if let Some(apis) = group.get("apis").and_then(|a| a.as_array()) {
                for api in apis {
                    entries.push((asset_name.clone(), api.clone()));
                }
            }
        }
        return entries;
    }
    body.get("apis")
        .and_then(|a| a.as_array())
        .map(|apis| {
            apis.iter()
                .map(|api| (String::new(), api.clone()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{fast_executor, test_platform_config, RouteTransport};
    use crate::model::EnvironmentType;
    use std::sync::Arc;

    fn env() -> Environment {
        Environment {
            env_id: "env-1".into(),
            org_id: "org".into(),
            name: "Sandbox".into(),
            env_type: EnvironmentType::Sandbox,
        }
    }

    fn apis_body() -> String {
        serde_json::json!({
            "assets": [{
                "name": "Orders API",
                "apis": [
                    {
                        "id": 16001,
                        "assetVersion": "1.0.0",
                        "instanceLabel": "public",
                        "endpointUri": "https://orders.example.com/api",
                        "status": "active",
                        "technology": "mule4"
                    },
                    {
                        "id": 16002,
                        "assetVersion": "1.0.0",
                        "deprecated": true,
                        "technology": "flexGateway"
                    }
                ]
            }]
        })
        .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn instances_with_policies() {
        let policies = serde_json::json!({
            "policies": [
                {"policyTemplateId": "rate-limiting", "order": 1},
                {"policyTemplateId": "client-id-enforcement"}
            ]
        })
        .to_string();
        let transport = Arc::new(RouteTransport::new(vec![
            ("/apis/16001/policies", 200, policies),
            ("/apis/16002/policies", 200, "[]".to_string()),
            ("/environments/env-1/apis", 200, apis_body()),
        ]));
        let config = test_platform_config();
        let exec = fast_executor(transport, &config);
        let harvester = ApiManagerHarvester::new(&exec, &config);

        let out = harvester.instances(&env()).await;
        assert!(out.errors.is_empty(), "errors: {:?}", out.errors);
        assert_eq!(out.records.len(), 2);

        let first = &out.records[0];
        assert_eq!(first.instance_id, "16001");
        assert_eq!(first.asset_name, "Orders API");
        assert_eq!(first.asset_version, "1.0.0");
        assert_eq!(first.endpoint_uri, "https://orders.example.com/api");
        assert_eq!(first.policies.len(), 2);
        assert_eq!(
            first.policies[0].policy_template_id.as_deref(),
            Some("rate-limiting")
        );

        let second = &out.records[1];
        assert_eq!(second.status, "deprecated");
        assert!(second.policies.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flat_listing_shape_is_accepted() {
        let flat = serde_json::json!({
            "apis": [{
                "id": 17001,
                "exchangeAssetName": "billing-api",
                "assetVersion": "2.0.0",
                "endpointUri": "https://billing.example.com/api",
                "status": "active"
            }]
        })
        .to_string();
        let transport = Arc::new(RouteTransport::new(vec![
            ("/apis/17001/policies", 200, "[]".to_string()),
            ("/environments/env-1/apis", 200, flat),
        ]));
        let config = test_platform_config();
        let exec = fast_executor(transport, &config);
        let harvester = ApiManagerHarvester::new(&exec, &config);

        let out = harvester.instances(&env()).await;
        assert!(out.errors.is_empty(), "errors: {:?}", out.errors);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].instance_id, "17001");
        assert_eq!(out.records[0].asset_name, "billing-api");
        assert_eq!(out.records[0].asset_version, "2.0.0");
    }

    #[tokio::test(start_paused = true)]
    async fn environment_without_api_manager_yields_nothing() {
        let transport = Arc::new(RouteTransport::new(vec![]));
        let config = test_platform_config();
        let exec = fast_executor(transport, &config);
        let harvester = ApiManagerHarvester::new(&exec, &config);

        let out = harvester.instances(&env()).await;
        assert!(out.records.is_empty());
        assert!(out.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn policies_failure_keeps_instance() {
        let transport = Arc::new(RouteTransport::new(vec![
            ("/apis/16001/policies", 500, String::new()),
            ("/apis/16002/policies", 200, "[]".to_string()),
            ("/environments/env-1/apis", 200, apis_body()),
        ]));
        let config = test_platform_config();
        let exec = fast_executor(transport, &config);
        let harvester = ApiManagerHarvester::new(&exec, &config);

        let out = harvester.instances(&env()).await;
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("16001"));
    }
}
