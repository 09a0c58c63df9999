//! RAML / OpenAPI specification parsing.
//!
//! Best-effort extraction of title, version, base URI, and the endpoint list
//! from raw spec text fetched out of Exchange. Parse failures return `None`;
//! a spec that cannot be parsed still leaves the owning asset intact.

use crate::model::{ApiSpecification, SpecEndpoint};
use serde_json::Value;

/// Raw spec text kept on the asset is capped at this many characters.
const RAW_SPEC_CAP: usize = 10_000;

const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "options", "head"];

/// Detects the spec dialect and parses accordingly.
pub fn parse(content: &str) -> Option<ApiSpecification> {
    if content.trim().is_empty() {
        return None;
    }
    let head: String = content.chars().take(500).collect();
    if head.chars().take(100).collect::<String>().contains("#%RAML") {
        return parse_raml(content);
    }
    if ["\"openapi\"", "openapi:", "\"swagger\"", "swagger:"]
        .iter()
        .any(|marker| head.contains(marker))
    {
        return parse_openapi(content);
    }
    // Unknown dialect: try RAML first, fall back to OpenAPI.
    match parse_raml(content) {
        Some(spec) if !spec.endpoints.is_empty() => Some(spec),
        _ => parse_openapi(content),
    }
}

fn truncate(content: &str) -> String {
    content.chars().take(RAW_SPEC_CAP).collect()
}

pub fn parse_openapi(content: &str) -> Option<ApiSpecification> {
    let trimmed = content.trim();
    let document: Value = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).ok()?
    } else {
        serde_yaml::from_str(trimmed).ok()?
    };
    if !document.is_object() {
        return None;
    }

    let oas3 = document
        .get("openapi")
        .and_then(|v| v.as_str())
        .map(|v| v.starts_with('3'))
        .unwrap_or(false);
    let spec_type = if oas3 { "OAS3" } else { "OAS2" };

    let mut endpoints = Vec::new();
    if let Some(paths) = document.get("paths").and_then(|p| p.as_object()) {
        for (path, methods) in paths {
            let Some(methods) = methods.as_object() else {
                continue;
            };
            for (method, details) in methods {
                if !HTTP_METHODS.contains(&method.to_lowercase().as_str()) {
                    continue;
                }
                endpoints.push(SpecEndpoint {
                    method: method.to_uppercase(),
                    path: path.clone(),
                    summary: details
                        .get("summary")
                        .and_then(|s| s.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }
    }

    let base_uri = if oas3 {
        document
            .pointer("/servers/0/url")
            .and_then(|u| u.as_str())
            .unwrap_or_default()
            .to_string()
    } else {
        document
            .get("basePath")
            .and_then(|b| b.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let info = |field: &str| {
        document
            .pointer(&format!("/info/{field}"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Some(ApiSpecification {
        spec_type: spec_type.to_string(),
        version: info("version"),
        title: info("title"),
        description: info("description"),
        base_uri,
        endpoints,
        raw_spec: Some(truncate(content)),
    })
}

pub fn parse_raml(content: &str) -> Option<ApiSpecification> {
    let lines: Vec<&str> = content.lines().collect();

    let header = |prefix: &str| {
        lines
            .iter()
            .take(50)
            .map(|l| l.trim())
            .find_map(|l| l.strip_prefix(prefix))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut endpoints = Vec::new();
    let mut current_path = String::new();
    for line in &lines {
        let stripped = line.trim_start();
        if stripped.starts_with('/') && stripped.contains(':') {
            current_path = stripped
                .split(':')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        } else if let Some(method) = HTTP_METHODS
            .iter()
            .find(|m| stripped.starts_with(&format!("{m}:")))
        {
            if !current_path.is_empty() {
                endpoints.push(SpecEndpoint {
                    method: method.to_uppercase(),
                    path: current_path.clone(),
                    summary: String::new(),
                });
            }
        }
    }

    let spec_type = if content.contains("#%RAML 1.0") {
        "RAML1.0"
    } else {
        "RAML0.8"
    };

    Some(ApiSpecification {
        spec_type: spec_type.to_string(),
        version: header("version:"),
        title: header("title:"),
        description: header("description:"),
        base_uri: header("baseUri:"),
        endpoints,
        raw_spec: Some(truncate(content)),
    })
}
