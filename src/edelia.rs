use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::errors::ConnectorError;

/// OAuth client id registered for the EDF SSO grant.
const EDELIA_CLIENT_ID: &str = "sha1pae0Pahngee6uwiphooDie7thaiquahf2xohd6IeFeiphi9ziu0uw3am";

/// JSON response from Edelia together with its HTTP status.
///
/// Stages interpret 403 (capability not available for this account) and
/// 404/500 (no data for this energy type) themselves, so non-2xx statuses
/// are not transport errors here.
#[derive(Debug, Clone)]
pub struct EdeliaPayload {
    pub status: u16,
    pub body: Value,
}

/// The secondary provider: consumption insights queried once per contract.
#[async_trait]
pub trait EdeliaApi: Send + Sync {
    /// Exchanges the EDF session token for a per-contract Edelia token.
    async fn token(&self, sso_token: &str, bp: &str, pdl: &str) -> Result<String, ConnectorError>;

    /// Bearer-authenticated GET under the API prefix.
    async fn get(&self, token: &str, path_and_query: &str) -> Result<EdeliaPayload, ConnectorError>;
}

pub struct HttpEdeliaApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEdeliaApi {
    pub fn new(base_url: String) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ConnectorError::Transport(format!("Failed to create Edelia client: {}", e))
            })?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl EdeliaApi for HttpEdeliaApi {
    async fn token(&self, sso_token: &str, bp: &str, pdl: &str) -> Result<String, ConnectorError> {
        let url = format!("{}/authorization-server/oauth/token", self.base_url);
        tracing::debug!("Edelia token exchange for pdl {}", pdl);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", EDELIA_CLIENT_ID),
                ("grant_type", "edf_sso"),
                ("jeton_sso", sso_token),
                ("bp", bp),
                ("pdl", pdl),
            ])
            .send()
            .await
            .map_err(|e| {
                ConnectorError::Transport(format!("Edelia token request failed: {}", e))
            })?;

        let body: Value = response.json().await.map_err(|e| {
            ConnectorError::Parse(format!("Failed to parse Edelia token response: {}", e))
        })?;

        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| {
                ConnectorError::business(
                    "EDELIA_TOKEN",
                    "Edelia token response missing access_token",
                )
            })
    }

    async fn get(&self, token: &str, path_and_query: &str) -> Result<EdeliaPayload, ConnectorError> {
        let url = format!(
            "{}/authorization-proxy/api/v1{}",
            self.base_url, path_and_query
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(format!("Edelia request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        Ok(EdeliaPayload { status, body })
    }
}
