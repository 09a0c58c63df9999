//! Snapshot persistence: writes the discovery artifacts to disk.
//!
//! Each run produces a timestamped snapshot file, a summary file, and one
//! side file per harvested API specification under `api_specs/`.

use crate::model::{RunSummary, Snapshot};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Written artifact paths for one run.
#[derive(Debug, Clone)]
pub struct WrittenArtifacts {
    pub snapshot_path: PathBuf,
    pub summary_path: PathBuf,
    pub spec_paths: Vec<PathBuf>,
}

pub struct SnapshotWriter {
    output_dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Writes all artifacts for one run and returns their paths.
    pub fn write(
        &self,
        snapshot: &Snapshot,
        summary: &RunSummary,
    ) -> Result<WrittenArtifacts, WriteError> {
        fs::create_dir_all(&self.output_dir)?;
        let stamp = snapshot
            .discovery_timestamp
            .format("%Y%m%d_%H%M%S")
            .to_string();

        let snapshot_path = self.output_dir.join(format!("full_discovery_{stamp}.json"));
        fs::write(&snapshot_path, serde_json::to_string_pretty(snapshot)?)?;

        let summary_path = self.output_dir.join(format!("summary_{stamp}.json"));
        fs::write(&summary_path, serde_json::to_string_pretty(summary)?)?;

        let spec_paths = self.write_specs(snapshot)?;
        info!(
            snapshot = %snapshot_path.display(),
            specs = spec_paths.len(),
            "artifacts written"
        );
        Ok(WrittenArtifacts {
            snapshot_path,
            summary_path,
            spec_paths,
        })
    }

    /// Raw spec texts as individual side files, for direct inspection
    /// without digging through the snapshot JSON.
    fn write_specs(&self, snapshot: &Snapshot) -> Result<Vec<PathBuf>, WriteError> {
        let mut paths = Vec::new();
        let spec_dir = self.output_dir.join("api_specs");
        for asset in &snapshot.exchange_assets {
            let Some(spec) = &asset.spec_ref else {
                continue;
            };
            let Some(raw) = &spec.raw_spec else {
                continue;
            };
            if paths.is_empty() {
                fs::create_dir_all(&spec_dir)?;
            }
            let file_name = format!(
                "{}_{}.txt",
                safe_component(&asset.asset_id),
                safe_component(&asset.version)
            );
            let path = spec_dir.join(file_name);
            fs::write(&path, raw)?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Sanitizes an identifier for use as a file name component.
fn safe_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ApiSpecification, Completeness, ExchangeAsset, RequestStats, RunSummary, Snapshot,
        SummaryCounts,
    };
    use chrono::{TimeZone, Utc};

    fn snapshot_with_spec() -> Snapshot {
        let mut snapshot = Snapshot::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap());
        snapshot.exchange_assets.push(ExchangeAsset {
            asset_id: "orders/api".into(),
            group_id: "grp".into(),
            name: "Orders".into(),
            version: "1.0.0".into(),
            asset_type: "rest-api".into(),
            description: String::new(),
            status: String::new(),
            tags: Default::default(),
            categories: Default::default(),
            custom_fields: Default::default(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            spec_ref: Some(ApiSpecification {
                spec_type: "RAML1.0".into(),
                version: "v1".into(),
                title: "Orders".into(),
                description: String::new(),
                base_uri: String::new(),
                endpoints: Vec::new(),
                raw_spec: Some("#%RAML 1.0\ntitle: Orders\n".into()),
            }),
            doc_refs: Vec::new(),
            files: Vec::new(),
            created_at: String::new(),
            updated_at: String::new(),
            created_by: String::new(),
        });
        snapshot
    }

    fn summary_for(snapshot: &Snapshot) -> RunSummary {
        RunSummary {
            discovery_timestamp: snapshot.discovery_timestamp,
            organization_id: "org".into(),
            organization_name: "Acme".into(),
            counts: SummaryCounts::default(),
            assets_by_type: Default::default(),
            errors: Vec::new(),
            request_stats: RequestStats::default(),
            completeness: Completeness::default(),
        }
    }

    #[test]
    fn writes_timestamped_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path());
        let snapshot = snapshot_with_spec();
        let summary = summary_for(&snapshot);

        let artifacts = writer.write(&snapshot, &summary).unwrap();
        assert_eq!(
            artifacts.snapshot_path.file_name().unwrap(),
            "full_discovery_20240301_123045.json"
        );
        assert_eq!(
            artifacts.summary_path.file_name().unwrap(),
            "summary_20240301_123045.json"
        );
        assert!(artifacts.snapshot_path.exists());
        assert!(artifacts.summary_path.exists());

        // Round-trips through serde.
        let raw = std::fs::read_to_string(&artifacts.snapshot_path).unwrap();
        let reread: Snapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(reread, snapshot);
    }

    #[test]
    fn spec_side_files_use_sanitized_names() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path());
        let snapshot = snapshot_with_spec();
        let summary = summary_for(&snapshot);

        let artifacts = writer.write(&snapshot, &summary).unwrap();
        assert_eq!(artifacts.spec_paths.len(), 1);
        let spec_path = &artifacts.spec_paths[0];
        assert_eq!(spec_path.file_name().unwrap(), "orders_api_1.0.0.txt");
        let content = std::fs::read_to_string(spec_path).unwrap();
        assert!(content.starts_with("#%RAML"));
    }

    #[test]
    fn no_spec_dir_without_specs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path());
        let snapshot = Snapshot::new(Utc::now());
        let summary = summary_for(&snapshot);

        let artifacts = writer.write(&snapshot, &summary).unwrap();
        assert!(artifacts.spec_paths.is_empty());
        assert!(!dir.path().join("api_specs").exists());
    }
}
