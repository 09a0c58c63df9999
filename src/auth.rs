//! OAuth2 client-credentials token acquisition.

use crate::config::PlatformConfig;
use crate::traits::{ApiRequest, HarvestError, HttpTransport};
use std::sync::Arc;
use tracing::info;

/// Fetches bearer tokens for the configured connected app.
///
/// Token requests go straight to the transport: they happen once up front
/// (plus at most one mid-run refresh) and must not consume the rate budget.
pub struct Authenticator {
    transport: Arc<dyn HttpTransport>,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl Authenticator {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &PlatformConfig) -> Self {
        Self {
            transport,
            auth_url: config.auth_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Exchanges client credentials for a bearer token.
    pub async fn fetch_token(&self) -> Result<String, HarvestError> {
        let request = ApiRequest::post_form(
            &self.auth_url,
            vec![
                ("grant_type".into(), "client_credentials".into()),
                ("client_id".into(), self.client_id.clone()),
                ("client_secret".into(), self.client_secret.clone()),
            ],
        );

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| HarvestError::AuthenticationFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(HarvestError::AuthenticationFailed(format!(
                "token endpoint returned {}",
                response.status
            )));
        }

        let body = response
            .json()
            .map_err(|e| HarvestError::AuthenticationFailed(e.to_string()))?;
        let token = body
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                HarvestError::AuthenticationFailed("token response missing access_token".into())
            })?;

        info!("authentication successful");
        Ok(token.to_string())
    }
}
