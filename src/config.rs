//! Run configuration: platform endpoints, rate limiting, and source toggles.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anypoint Platform control-plane region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Us,
    Eu,
    Gov,
}

impl Region {
    pub fn base_url(&self) -> &'static str {
        match self {
            Region::Us => "https://anypoint.mulesoft.com",
            Region::Eu => "https://eu1.anypoint.mulesoft.com",
            Region::Gov => "https://gov.anypoint.mulesoft.com",
        }
    }
}

/// Credentials and endpoint roots for one discovery run.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub client_id: String,
    pub client_secret: String,
    pub org_id: String,
    pub region: Region,
}

impl PlatformConfig {
    pub fn base_url(&self) -> &'static str {
        self.region.base_url()
    }

    pub fn exchange_url(&self) -> String {
        format!("{}/exchange/api/v2", self.base_url())
    }

    pub fn api_manager_url(&self) -> String {
        format!("{}/apimanager/api/v1", self.base_url())
    }

    pub fn accounts_url(&self) -> String {
        format!("{}/accounts/api", self.base_url())
    }

    pub fn cloudhub_url(&self) -> String {
        format!("{}/cloudhub/api/v2", self.base_url())
    }

    pub fn amc_url(&self) -> String {
        format!("{}/amc/application-manager/api/v2", self.base_url())
    }

    pub fn arm_url(&self) -> String {
        format!("{}/hybrid/api/v1", self.base_url())
    }

    pub fn visualizer_url(&self) -> String {
        format!("{}/visualizer/api/v1", self.base_url())
    }

    pub fn auth_url(&self) -> String {
        format!("{}/accounts/api/v2/oauth2/token", self.base_url())
    }
}

/// Rate limiting and retry pacing.
///
/// Platform APIs enforce a global rate limit; these knobs control how the
/// harvester paces outbound requests to stay under it.
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Outbound requests per second ceiling (lower = safer for large orgs).
    pub requests_per_second: f64,

    /// Max retries on 429 / transient server errors.
    pub max_retries: u32,

    /// Initial backoff delay; doubles with each retry.
    pub initial_backoff: Duration,

    /// Cap on the exponential backoff.
    pub max_backoff: Duration,

    /// Forced pause is inserted after this many dispatched requests.
    pub batch_size: u32,

    /// Length of the forced batch pause.
    pub batch_pause: Duration,
}

impl RateConfig {
    /// Minimum spacing between consecutive request starts. A non-positive
    /// ceiling disables pacing rather than panicking on the division.
    pub fn request_delay(&self) -> Duration {
        if self.requests_per_second <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(1.0 / self.requests_per_second)
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            batch_size: 50,
            batch_pause: Duration::from_secs(5),
        }
    }
}

/// Per-run source enablement.
///
/// Organizations and Environments are always harvested; these flags gate the
/// optional sources. Named fields keep the enabled-source contract statically
/// checkable rather than an ad hoc map.
#[derive(Debug, Clone)]
pub struct SourceToggles {
    pub exchange: bool,
    pub specs: bool,
    pub docs: bool,
    pub visualizer: bool,
    pub runtime: bool,

    /// Optional filter on Exchange asset types (e.g. "rest-api").
    pub asset_types: Option<Vec<String>>,
}

impl SourceToggles {
    /// All optional sources disabled; only the mandatory accounts harvest runs.
    pub fn none() -> Self {
        Self {
            exchange: false,
            specs: false,
            docs: false,
            visualizer: false,
            runtime: false,
            asset_types: None,
        }
    }
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self {
            exchange: true,
            specs: true,
            docs: true,
            visualizer: true,
            runtime: true,
            asset_types: None,
        }
    }
}
