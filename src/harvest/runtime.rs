//! Runtime harvester: deployed applications across the three deployment
//! planes (CloudHub 1.0, CloudHub 2.0 / RTF, hybrid).

use crate::config::PlatformConfig;
use crate::executor::{optional, RequestExecutor};
use crate::harvest::accounts::str_field;
use crate::harvest::Harvested;
use crate::model::{Application, Environment};
use crate::traits::ApiRequest;
use serde_json::Value;
use tracing::debug;

const ORG_HEADER: &str = "X-ANYPNT-ORG-ID";
const ENV_HEADER: &str = "X-ANYPNT-ENV-ID";

pub struct RuntimeHarvester<'a> {
    executor: &'a RequestExecutor,
    config: &'a PlatformConfig,
}

impl<'a> RuntimeHarvester<'a> {
    pub fn new(executor: &'a RequestExecutor, config: &'a PlatformConfig) -> Self {
        Self { executor, config }
    }

    /// All applications deployed in one environment. Each deployment plane
    /// degrades independently: a failing plane contributes an error, not an
    /// abort.
    pub async fn applications(&self, env: &Environment) -> Harvested<Application> {
        let mut out = Harvested::default();
        debug!(env = %env.name, "fetching applications");

        match self.cloudhub1(env).await {
            Ok(apps) => out.records.extend(apps),
            Err(e) => out
                .errors
                .push(format!("runtime CH1.0 ({}): {e}", env.name)),
        }
        match self.cloudhub2(env).await {
            Ok(apps) => out.records.extend(apps),
            Err(e) => out
                .errors
                .push(format!("runtime CH2.0 ({}): {e}", env.name)),
        }
        match self.hybrid(env).await {
            Ok(apps) => out.records.extend(apps),
            Err(e) => out
                .errors
                .push(format!("runtime hybrid ({}): {e}", env.name)),
        }
        out
    }

    async fn cloudhub1(&self, env: &Environment) -> Result<Vec<Application>, crate::traits::HarvestError> {
        let request = ApiRequest::get(format!("{}/applications", self.config.cloudhub_url()))
            .with_header(ORG_HEADER, env.org_id.clone())
            .with_header(ENV_HEADER, env.env_id.clone());
        let body = match optional(self.executor.get_json(request).await)? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let raw = body.as_array().cloned().unwrap_or_default();
        Ok(raw.iter().map(|app| self.map_cloudhub1(app, env)).collect())
    }

    fn map_cloudhub1(&self, app: &Value, env: &Environment) -> Application {
        let workers = app.get("workers").cloned().unwrap_or(Value::Null);
        let vcores = workers
            .pointer("/type/weight")
            .and_then(|w| w.as_f64())
            .unwrap_or(0.0);
        let name = str_field(app, "domain");
        let app_id = match app.get("id").and_then(|i| i.as_str()) {
            Some(id) => id.to_string(),
            None => name.clone(),
        };
        Application {
            app_id,
            env_id: env.env_id.clone(),
            name,
            status: str_field(app, "status"),
            vcores,
            workers: workers.get("amount").and_then(|a| a.as_u64()).unwrap_or(0) as u32,
            region: str_field(app, "region"),
            runtime_version: str_field(app, "muleVersion"),
            target: "CH1.0".to_string(),
            last_update_time: str_field(app, "lastUpdateTime"),
        }
    }

    async fn cloudhub2(&self, env: &Environment) -> Result<Vec<Application>, crate::traits::HarvestError> {
        let url = format!(
            "{}/organizations/{}/environments/{}/deployments",
            self.config.amc_url(),
            env.org_id,
            env.env_id
        );
        let body = match optional(self.executor.get_json(ApiRequest::get(url)).await)? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let raw = body
            .get("items")
            .and_then(|i| i.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(raw.iter().map(|app| Self::map_cloudhub2(app, env)).collect())
    }

    fn map_cloudhub2(app: &Value, env: &Environment) -> Application {
        let replicas = app
            .get("replicas")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        let vcores: f64 = replicas
            .iter()
            .filter_map(|r| r.pointer("/state/weight").and_then(|w| w.as_f64()))
            .sum();
        let target = match app.pointer("/target/provider").and_then(|p| p.as_str()) {
            Some(provider) if !provider.is_empty() => provider.to_string(),
            _ => "CH2.0".to_string(),
        };
        Application {
            app_id: str_field(app, "id"),
            env_id: env.env_id.clone(),
            name: str_field(app, "name"),
            status: str_field(app, "status"),
            vcores,
            workers: replicas.len() as u32,
            region: String::new(),
            runtime_version: String::new(),
            target,
            last_update_time: str_field(app, "lastModifiedDate"),
        }
    }

    async fn hybrid(&self, env: &Environment) -> Result<Vec<Application>, crate::traits::HarvestError> {
        let request = ApiRequest::get(format!("{}/applications", self.config.arm_url()))
            .with_header(ORG_HEADER, env.org_id.clone())
            .with_header(ENV_HEADER, env.env_id.clone());
        let body = match optional(self.executor.get_json(request).await)? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let raw = body
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(raw
            .iter()
            .map(|app| Application {
                app_id: app
                    .get("id")
                    .map(|i| match i {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default(),
                env_id: env.env_id.clone(),
                name: str_field(app, "name"),
                status: str_field(app, "lastReportedStatus"),
                vcores: 0.0,
                workers: 0,
                region: String::new(),
                runtime_version: String::new(),
                target: "hybrid".to_string(),
                last_update_time: str_field(app, "lastModifiedDate"),
            })
            .collect())
    }
}
