//! CLI entry point for the discovery engine.

use anypoint_harvester::transport::ReqwestTransport;
use anypoint_harvester::writer::SnapshotWriter;
use anypoint_harvester::{
    DiscoveryPipeline, PlatformConfig, RateConfig, Region, SourceToggles,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anypoint-harvester", version, about = "Discovers an Anypoint Platform estate into a local snapshot")]
struct Cli {
    /// Connected app client id
    #[arg(long, env = "ANYPOINT_CLIENT_ID")]
    client_id: String,

    /// Connected app client secret
    #[arg(long, env = "ANYPOINT_CLIENT_SECRET")]
    client_secret: String,

    /// Root organization id
    #[arg(long, env = "ANYPOINT_ORG_ID")]
    org_id: String,

    /// Control-plane region
    #[arg(long, value_enum, default_value = "us")]
    region: Region,

    /// Skip Exchange assets entirely
    #[arg(long)]
    no_exchange: bool,

    /// Skip API specification fetching
    #[arg(long)]
    no_specs: bool,

    /// Skip documentation page fetching
    #[arg(long)]
    no_docs: bool,

    /// Skip Visualizer dependency graphs
    #[arg(long)]
    no_visualizer: bool,

    /// Skip deployed application discovery
    #[arg(long)]
    no_runtime: bool,

    /// Restrict Exchange harvesting to these asset types
    #[arg(long, value_delimiter = ',')]
    asset_types: Option<Vec<String>>,

    /// Outbound requests per second
    #[arg(long, default_value_t = 5.0, value_parser = parse_rps)]
    rps: f64,

    /// Max retries per request on 429 / transient errors
    #[arg(long, default_value_t = 5)]
    max_retries: u32,

    /// Requests dispatched between forced pauses
    #[arg(long, default_value_t = 50)]
    batch_size: u32,

    /// Forced pause length in seconds
    #[arg(long, default_value_t = 5)]
    batch_pause: u64,

    /// Directory for the output artifacts
    #[arg(long, default_value = "discovery_output")]
    output_dir: PathBuf,

    /// Verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_rps(raw: &str) -> Result<f64, String> {
    let rps: f64 = raw.parse().map_err(|_| format!("invalid rate: {raw}"))?;
    if rps > 0.0 {
        Ok(rps)
    } else {
        Err(format!("rate must be positive, got {rps}"))
    }
}

impl Cli {
    fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            org_id: self.org_id.clone(),
            region: self.region,
        }
    }

    fn rate(&self) -> RateConfig {
        RateConfig {
            requests_per_second: self.rps,
            max_retries: self.max_retries,
            batch_size: self.batch_size,
            batch_pause: Duration::from_secs(self.batch_pause),
            ..RateConfig::default()
        }
    }

    fn toggles(&self) -> SourceToggles {
        SourceToggles {
            exchange: !self.no_exchange,
            specs: !self.no_specs,
            docs: !self.no_docs,
            visualizer: !self.no_visualizer,
            runtime: !self.no_runtime,
            asset_types: self.asset_types.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let transport = match ReqwestTransport::new(ReqwestTransport::DEFAULT_TIMEOUT) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let pipeline = DiscoveryPipeline::new(cli.platform(), cli.rate(), cli.toggles(), transport);

    let run = match pipeline.run().await {
        Ok(run) => run,
        Err(e) => {
            error!(error = %e, "discovery aborted");
            return ExitCode::FAILURE;
        }
    };

    for err in &run.summary.errors {
        warn!("{err}");
    }

    let writer = SnapshotWriter::new(&cli.output_dir);
    let artifacts = match writer.write(&run.snapshot, &run.summary) {
        Ok(artifacts) => artifacts,
        Err(e) => {
            error!(error = %e, "failed to write artifacts");
            return ExitCode::FAILURE;
        }
    };

    let counts = &run.summary.counts;
    info!(
        business_groups = counts.business_groups,
        environments = counts.environments,
        applications = counts.applications,
        exchange_assets = counts.exchange_assets,
        api_instances = counts.api_instances,
        "discovery finished"
    );
    let completeness = &run.summary.completeness;
    info!(
        api_assets = completeness.api_assets,
        with_specs = completeness.with_specs,
        with_docs = completeness.with_docs,
        "spec coverage"
    );
    let stats = &run.summary.request_stats;
    info!(
        total = stats.total_requests,
        rate_limited = stats.rate_limited_requests,
        rate_limit_wait_ms = stats.rate_limit_wait_ms,
        retries = stats.retries,
        failed = stats.failed_requests,
        "request statistics"
    );
    info!(snapshot = %artifacts.snapshot_path.display(), "snapshot written");

    ExitCode::SUCCESS
}
