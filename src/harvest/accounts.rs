//! Accounts harvester: organizations and environments.
//!
//! Mandatory for every run — everything downstream is keyed by the
//! environment list this produces.

use crate::config::PlatformConfig;
use crate::executor::RequestExecutor;
use crate::model::{Environment, EnvironmentType, Organization};
use crate::traits::{ApiRequest, HarvestError};
use serde_json::Value;
use tracing::{info, warn};

pub struct AccountsHarvester<'a> {
    executor: &'a RequestExecutor,
    config: &'a PlatformConfig,
}

impl<'a> AccountsHarvester<'a> {
    pub fn new(executor: &'a RequestExecutor, config: &'a PlatformConfig) -> Self {
        Self { executor, config }
    }

    /// The master organization supplied at startup.
    pub async fn master_organization(&self) -> Result<Organization, HarvestError> {
        let url = format!(
            "{}/organizations/{}",
            self.config.accounts_url(),
            self.config.org_id
        );
        let body = self.executor.get_json(ApiRequest::get(url)).await?;
        let org = Organization {
            org_id: str_field(&body, "id"),
            name: str_field(&body, "name"),
            parent_id: None,
            is_master: true,
        };
        info!(org = %org.name, "master organization");
        Ok(org)
    }

    /// The full business-group tree, flattened in hierarchy order.
    pub async fn organizations(&self) -> Result<Vec<Organization>, HarvestError> {
        let url = format!(
            "{}/organizations/{}/hierarchy",
            self.config.accounts_url(),
            self.config.org_id
        );
        let body = self.executor.get_json(ApiRequest::get(url)).await?;

        let mut organizations = Vec::new();
        let mut stack = vec![&body];
        while let Some(org) = stack.pop() {
            if !org.is_object() {
                continue;
            }
            let parent_id = match org.get("parentId").and_then(|p| p.as_str()) {
                Some("") | None => None,
                Some(parent) => Some(parent.to_string()),
            };
            organizations.push(Organization {
                org_id: str_field(org, "id"),
                name: str_field(org, "name"),
                parent_id,
                is_master: false,
            });
            if let Some(children) = org.get("subOrganizations").and_then(|s| s.as_array()) {
                // Reverse so the stack pops children in server order.
                for child in children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        info!(count = organizations.len(), "business groups");
        Ok(organizations)
    }

    /// Environments belonging to one organization.
    pub async fn environments(&self, org_id: &str) -> Result<Vec<Environment>, HarvestError> {
        let url = format!(
            "{}/organizations/{}/environments",
            self.config.accounts_url(),
            org_id
        );
        let body = self.executor.get_json(ApiRequest::get(url)).await?;
        let raw = body
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        let mut environments = Vec::new();
        for env in raw {
            let raw_type = str_field(&env, "type");
            let Some(env_type) = EnvironmentType::parse(&raw_type) else {
                warn!(org_id, env_type = %raw_type, "skipping environment with unknown type");
                continue;
            };
            environments.push(Environment {
                env_id: str_field(&env, "id"),
                org_id: org_id.to_string(),
                name: str_field(&env, "name"),
                env_type,
            });
        }
        Ok(environments)
    }
}

pub(crate) fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;
    use crate::config::{RateConfig, Region};
    use crate::executor::test_support::{Scripted, ScriptedTransport};
    use std::sync::Arc;
    use std::time::Duration;

    fn harness(
        transport: Arc<ScriptedTransport>,
    ) -> (RequestExecutor, PlatformConfig) {
        let config = PlatformConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            org_id: "root-org".into(),
            region: Region::Us,
        };
        let auth = Authenticator::new(transport.clone(), &config);
        let rate = RateConfig {
            requests_per_second: 1000.0,
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            batch_size: 0,
            batch_pause: Duration::ZERO,
        };
        (RequestExecutor::new(transport, auth, rate), config)
    }

    #[tokio::test(start_paused = true)]
    async fn hierarchy_flattens_in_server_order() {
        let body = r#"{
            "id": "root", "name": "Root", "parentId": "",
            "subOrganizations": [
                {"id": "a", "name": "A", "parentId": "root", "subOrganizations": [
                    {"id": "a1", "name": "A1", "parentId": "a"}
                ]},
                {"id": "b", "name": "B", "parentId": "root"}
            ]
        }"#;
        let transport = Arc::new(ScriptedTransport::new(vec![Scripted::Status(200, body)]));
        let (exec, config) = harness(transport);
        let harvester = AccountsHarvester::new(&exec, &config);

        let orgs = harvester.organizations().await.unwrap();
        let ids: Vec<&str> = orgs.iter().map(|o| o.org_id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "a1", "b"]);
        assert_eq!(orgs[0].parent_id, None);
        assert_eq!(orgs[1].parent_id.as_deref(), Some("root"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_environment_types_are_skipped() {
        let body = r#"{"data": [
            {"id": "e1", "name": "Sandbox", "type": "sandbox"},
            {"id": "e2", "name": "Weird", "type": "staging"},
            {"id": "e3", "name": "Prod", "type": "production"}
        ]}"#;
        let transport = Arc::new(ScriptedTransport::new(vec![Scripted::Status(200, body)]));
        let (exec, config) = harness(transport);
        let harvester = AccountsHarvester::new(&exec, &config);

        let envs = harvester.environments("root-org").await.unwrap();
        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0].env_type, EnvironmentType::Sandbox);
        assert_eq!(envs[1].env_type, EnvironmentType::Production);
        assert!(envs.iter().all(|e| e.org_id == "root-org"));
    }
}
