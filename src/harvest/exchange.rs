//! Exchange harvester: assets plus their optional secondary content.
//!
//! The asset listing is the one large paginated walk in a run. Per-asset
//! secondary fetches (details, specification, documentation, dependencies,
//! files) degrade individually: an asset is always recorded, with whatever
//! secondaries could be fetched.

use crate::config::{PlatformConfig, SourceToggles};
use crate::executor::{optional, RequestExecutor};
use crate::harvest::accounts::str_field;
use crate::harvest::{specs, Harvested};
use crate::model::{AssetFile, AssetRef, DocumentationPage, ExchangeAsset};
use crate::paging::{collect_all, CursorStyle, PagedEndpoint};
use crate::traits::{ApiRequest, HarvestError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Asset types that can carry an API specification.
const API_ASSET_TYPES: [&str; 5] = ["rest-api", "http-api", "raml", "raml-fragment", "oas"];

const LISTING_PAGE_SIZE: u64 = 100;
const LISTING_CAP: usize = 500;

pub fn is_api_type(asset_type: &str) -> bool {
    API_ASSET_TYPES.contains(&asset_type)
}

pub struct ExchangeHarvester<'a> {
    executor: &'a RequestExecutor,
    config: &'a PlatformConfig,
}

impl<'a> ExchangeHarvester<'a> {
    pub fn new(executor: &'a RequestExecutor, config: &'a PlatformConfig) -> Self {
        Self { executor, config }
    }

    /// Harvests all assets for the organization, honoring the spec/doc
    /// toggles and the optional asset type filter.
    pub async fn assets(&self, toggles: &SourceToggles) -> Harvested<ExchangeAsset> {
        let mut out = Harvested::default();

        let listing = PagedEndpoint::new(
            ApiRequest::get(format!("{}/assets", self.config.exchange_url()))
                .with_query("organizationId", self.config.org_id.clone())
                .with_query("includeSnapshots", "false"),
            CursorStyle::offset(),
            LISTING_PAGE_SIZE,
        )
        .records_field("assets")
        .max_records(LISTING_CAP);

        let mut raw_assets = match collect_all(self.executor, &listing).await {
            Ok(records) => records,
            Err(partial) => {
                // Partial listing is still worth keeping; the aggregator
                // records the degradation.
                out.errors
                    .push(format!("exchange asset listing incomplete: {}", partial.source));
                partial.collected
            }
        };

        if let Some(filter) = &toggles.asset_types {
            raw_assets.retain(|raw| {
                raw.get("type")
                    .and_then(|t| t.as_str())
                    .map(|t| filter.iter().any(|f| f == t))
                    .unwrap_or(false)
            });
            info!(count = raw_assets.len(), "assets after type filter");
        }

        info!(count = raw_assets.len(), "processing Exchange assets");
        for raw in &raw_assets {
            let mut asset = self.build_asset(raw);
            self.enrich(&mut asset, toggles, &mut out.errors).await;
            out.records.push(asset);
        }
        out
    }

    fn build_asset(&self, raw: &Value) -> ExchangeAsset {
        let group_id = match raw.get("groupId").and_then(|g| g.as_str()) {
            Some(group) if !group.is_empty() => group.to_string(),
            _ => self.config.org_id.clone(),
        };
        let asset_type = match raw.get("type").and_then(|t| t.as_str()) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => "unknown".to_string(),
        };
        let tags: BTreeSet<String> = raw
            .get("labels")
            .and_then(|l| l.as_array())
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l.get("value").and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        ExchangeAsset {
            asset_id: str_field(raw, "assetId"),
            group_id,
            name: str_field(raw, "name"),
            version: str_field(raw, "version"),
            asset_type,
            description: str_field(raw, "description"),
            status: str_field(raw, "status"),
            tags,
            categories: BTreeMap::new(),
            custom_fields: BTreeMap::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            spec_ref: None,
            doc_refs: Vec::new(),
            files: Vec::new(),
            created_at: str_field(raw, "createdAt"),
            updated_at: str_field(raw, "updatedAt"),
            created_by: String::new(),
        }
    }

    async fn enrich(
        &self,
        asset: &mut ExchangeAsset,
        toggles: &SourceToggles,
        errors: &mut Vec<String>,
    ) {
        let identity = format!("{}/{}/{}", asset.group_id, asset.asset_id, asset.version);
        debug!(asset = %identity, "enriching asset");

        match optional(self.executor.get_json(self.asset_request(asset, "")).await) {
            Ok(Some(details)) => apply_details(asset, &details),
            Ok(None) => {}
            Err(e) => errors.push(format!("exchange details ({identity}): {e}")),
        }

        if toggles.specs && is_api_type(&asset.asset_type) {
            match self.specification(asset).await {
                Ok(spec) => asset.spec_ref = spec,
                Err(e) => errors.push(format!("exchange spec ({identity}): {e}")),
            }
        }

        if toggles.docs {
            match self.documentation(asset).await {
                Ok(pages) => asset.doc_refs = pages,
                Err(e) => errors.push(format!("exchange docs ({identity}): {e}")),
            }
        }

        match self.refs(asset, "dependencies").await {
            Ok(refs) => asset.dependencies = refs,
            Err(e) => errors.push(format!("exchange dependencies ({identity}): {e}")),
        }
        match self.refs(asset, "dependents").await {
            Ok(refs) => asset.dependents = refs,
            Err(e) => errors.push(format!("exchange dependents ({identity}): {e}")),
        }

        match optional(
            self.executor
                .get_json(self.asset_request(asset, "/files"))
                .await,
        ) {
            Ok(Some(body)) => {
                if let Some(files) = body.as_array() {
                    asset.files = files
                        .iter()
                        .filter_map(|f| serde_json::from_value(f.clone()).ok())
                        .collect();
                }
            }
            Ok(None) => {}
            Err(e) => errors.push(format!("exchange files ({identity}): {e}")),
        }
    }

    fn asset_request(&self, asset: &ExchangeAsset, suffix: &str) -> ApiRequest {
        ApiRequest::get(format!(
            "{}/assets/{}/{}/{}{}",
            self.config.exchange_url(),
            asset.group_id,
            asset.asset_id,
            asset.version,
            suffix
        ))
    }

    /// Probes the known spec locations in order; first hit wins. 404s are
    /// expected (proxies without embedded specs).
    async fn specification(
        &self,
        asset: &ExchangeAsset,
    ) -> Result<Option<crate::model::ApiSpecification>, HarvestError> {
        for suffix in [
            "/api/spec",
            "/files/api.raml",
            "/files/api.json",
            "/files/openapi.json",
            "/files/openapi.yaml",
        ] {
            if let Some(content) =
                optional(self.executor.get_text(self.asset_request(asset, suffix)).await)?
            {
                if content.trim().is_empty() {
                    continue;
                }
                match specs::parse(&content) {
                    Some(spec) => return Ok(Some(spec)),
                    None => {
                        warn!(asset = %asset.asset_id, suffix, "unparseable spec content");
                        continue;
                    }
                }
            }
        }
        Ok(None)
    }

    async fn documentation(
        &self,
        asset: &ExchangeAsset,
    ) -> Result<Vec<DocumentationPage>, HarvestError> {
        let body = match optional(
            self.executor
                .get_json(self.asset_request(asset, "/pages"))
                .await,
        )? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let raw_pages = body.as_array().cloned().unwrap_or_default();

        let mut pages = Vec::new();
        for raw in raw_pages {
            let page_path = str_field(&raw, "pagePath");
            if page_path.is_empty() {
                continue;
            }
            // Page paths may contain spaces and slashes.
            let encoded = urlencoding::encode(&page_path).into_owned();
            let content = optional(
                self.executor
                    .get_text(self.asset_request(asset, &format!("/pages/{encoded}")))
                    .await,
            )?;
            pages.push(DocumentationPage { page_path, content });
        }
        Ok(pages)
    }

    async fn refs(
        &self,
        asset: &ExchangeAsset,
        relation: &str,
    ) -> Result<Vec<AssetRef>, HarvestError> {
        let body = match optional(
            self.executor
                .get_json(self.asset_request(asset, &format!("/{relation}")))
                .await,
        )? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let raw = body.as_array().cloned().unwrap_or_default();
        Ok(raw
            .iter()
            .map(|dep| AssetRef {
                group_id: match dep.get("groupId").and_then(|g| g.as_str()) {
                    Some(g) if !g.is_empty() => g.to_string(),
                    _ => str_field(dep, "organizationId"),
                },
                asset_id: str_field(dep, "assetId"),
                version: str_field(dep, "version"),
            })
            .collect())
    }
}

fn apply_details(asset: &mut ExchangeAsset, details: &Value) {
    let description = str_field(details, "description");
    if !description.is_empty() {
        asset.description = description;
    }
    asset.created_by = details
        .pointer("/createdBy/userName")
        .and_then(|u| u.as_str())
        .unwrap_or_default()
        .to_string();

    if let Some(fields) = details.get("customFields").and_then(|c| c.as_array()) {
        for field in fields {
            let key = str_field(field, "key");
            if !key.is_empty() {
                asset.custom_fields.insert(key, str_field(field, "value"));
            }
        }
    }

    if let Some(categories) = details.get("categories").and_then(|c| c.as_array()) {
        for category in categories {
            let name = str_field(category, "displayName");
            if name.is_empty() {
                continue;
            }
            let values = category
                .get("value")
                .and_then(|v| v.as_array())
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            asset.categories.insert(name, values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{fast_executor, test_platform_config, RouteTransport};
    use std::sync::Arc;

    fn listing_body() -> String {
        serde_json::json!({
            "assets": [
                {
                    "assetId": "orders-api",
                    "groupId": "grp",
                    "name": "Orders API",
                    "version": "1.0.0",
                    "type": "rest-api",
                    "labels": [{"value": "payments"}, {"value": "core"}]
                },
                {
                    "assetId": "common-template",
                    "groupId": "grp",
                    "name": "Common Template",
                    "version": "2.0.0",
                    "type": "template"
                }
            ]
        })
        .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn assets_with_spec_and_details() {
        let details = serde_json::json!({
            "description": "Order management",
            "createdBy": {"userName": "jsmith"},
            "customFields": [{"key": "owner", "value": "payments-team"}],
            "categories": [{"displayName": "Domain", "value": ["Sales"]}]
        })
        .to_string();
        let raml = "#%RAML 1.0\ntitle: Orders API\nversion: v1\n/orders:\n  get:\n";
        let transport = Arc::new(RouteTransport::new(vec![
            ("/1.0.0/api/spec", 404, String::new()),
            ("/files/api.raml", 200, raml.to_string()),
            ("/1.0.0/pages", 200, "[]".to_string()),
            ("/2.0.0/pages", 200, "[]".to_string()),
            ("/1.0.0/dependencies", 200,
                r#"[{"organizationId": "grp", "assetId": "common-template", "version": "2.0.0"}]"#.to_string()),
            ("/1.0.0/dependents", 404, String::new()),
            ("/1.0.0/files", 404, String::new()),
            ("/assets/grp/orders-api/1.0.0", 200, details),
            ("/assets/grp/common-template/2.0.0", 404, String::new()),
            ("/assets", 200, listing_body()),
        ]));
        let config = test_platform_config();
        let exec = fast_executor(transport.clone(), &config);
        let harvester = ExchangeHarvester::new(&exec, &config);

        let out = harvester.assets(&SourceToggles::default()).await;
        assert!(out.errors.is_empty(), "errors: {:?}", out.errors);
        assert_eq!(out.records.len(), 2);

        let orders = &out.records[0];
        assert_eq!(orders.asset_id, "orders-api");
        assert_eq!(orders.description, "Order management");
        assert_eq!(orders.created_by, "jsmith");
        assert_eq!(orders.custom_fields.get("owner").unwrap(), "payments-team");
        assert_eq!(orders.categories.get("Domain").unwrap(), &vec!["Sales".to_string()]);
        assert!(orders.tags.contains("payments"));
        let spec = orders.spec_ref.as_ref().expect("spec parsed");
        assert_eq!(spec.spec_type, "RAML1.0");
        assert_eq!(orders.dependencies.len(), 1);
        assert_eq!(orders.dependencies[0].asset_id, "common-template");

        // Non-API asset: no spec probe result.
        let template = &out.records[1];
        assert!(template.spec_ref.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn asset_type_filter_applies() {
        let transport = Arc::new(RouteTransport::new(vec![(
            "/assets",
            200,
            listing_body(),
        )]));
        let config = test_platform_config();
        let exec = fast_executor(transport, &config);
        let harvester = ExchangeHarvester::new(&exec, &config);

        let toggles = SourceToggles {
            specs: false,
            docs: false,
            asset_types: Some(vec!["template".to_string()]),
            ..SourceToggles::default()
        };
        let out = harvester.assets(&toggles).await;
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].asset_type, "template");
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_failure_degrades_without_dropping_asset() {
        // Details endpoint serves a 403 (scope problem); everything else 404s.
        let transport = Arc::new(RouteTransport::new(vec![
            ("/assets/grp/orders-api/1.0.0", 403, String::new()),
            ("/assets", 200, listing_body()),
        ]));
        let config = test_platform_config();
        let exec = fast_executor(transport, &config);
        let harvester = ExchangeHarvester::new(&exec, &config);

        let toggles = SourceToggles {
            specs: false,
            docs: false,
            ..SourceToggles::default()
        };
        let out = harvester.assets(&toggles).await;
        assert_eq!(out.records.len(), 2);
        assert!(out
            .errors
            .iter()
            .any(|e| e.contains("exchange details") && e.contains("orders-api")));
    }

    #[test]
    fn api_type_detection() {
        assert!(is_api_type("rest-api"));
        assert!(is_api_type("oas"));
        assert!(!is_api_type("template"));
        assert!(!is_api_type("unknown"));
    }
}
