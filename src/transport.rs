use async_trait::async_trait;
use std::time::Duration;

use crate::doc::Node;
use crate::errors::ConnectorError;
use crate::xml::{self, Element};

/// Authorization expected by the mobile gateway (fixed application key).
const GATEWAY_AUTHORIZATION: &str = "Basic QUVMTU9CSUxFX2lQaG9uZV9WMTpBRUxNT0JJTEVfaVBob25lX1Yx";

const RETRY_ATTEMPTS: u32 = 5;
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// One authenticated XML exchange with the EDF gateway.
///
/// Implementations own encoding, transport retry and decoding; stages only
/// see the decoded response tree.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, path: &str, body: &Element) -> Result<Node, ConnectorError>;

    /// Same exchange but the raw body is returned undecoded. Used for the
    /// bill document endpoint whose payload is parsed by the caller.
    async fn post_raw(&self, path: &str, body: &Element) -> Result<String, ConnectorError>;
}

/// reqwest-backed gateway transport with fixed-count, fixed-interval retry
/// on transport-level failure.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    retry_interval: Duration,
}

impl HttpTransport {
    pub fn new(base_url: String) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ConnectorError::Transport(format!("Failed to create gateway client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            retry_interval: RETRY_INTERVAL,
        })
    }

    /// Test constructor: no backoff between attempts.
    pub fn without_backoff(base_url: String) -> Result<Self, ConnectorError> {
        let mut transport = Self::new(base_url)?;
        transport.retry_interval = Duration::ZERO;
        Ok(transport)
    }

    async fn exchange(&self, path: &str, xml_body: &str) -> Result<String, ConnectorError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = None;

        for attempt in 1..=RETRY_ATTEMPTS {
            let result = self
                .client
                .post(&url)
                .header("Content-Type", "text/xml")
                .header("Authorization", GATEWAY_AUTHORIZATION)
                .body(xml_body.to_string())
                .send()
                .await;

            match result {
                Ok(response) => return Ok(response.text().await?),
                Err(e) => {
                    tracing::warn!(
                        "Gateway request to {} failed (attempt {}/{}): {}",
                        path,
                        attempt,
                        RETRY_ATTEMPTS,
                        e
                    );
                    last_error = Some(e);
                    if attempt < RETRY_ATTEMPTS && !self.retry_interval.is_zero() {
                        tokio::time::sleep(self.retry_interval).await;
                    }
                }
            }
        }

        Err(ConnectorError::Transport(format!(
            "Gateway request to {} failed after {} attempts: {}",
            path,
            RETRY_ATTEMPTS,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, path: &str, body: &Element) -> Result<Node, ConnectorError> {
        tracing::debug!("Gateway POST {}", path);
        let xml_body = xml::encode(body)?;
        let response = self.exchange(path, &xml_body).await?;
        xml::decode(&response)
    }

    async fn post_raw(&self, path: &str, body: &Element) -> Result<String, ConnectorError> {
        tracing::debug!("Gateway POST (raw) {}", path);
        let xml_body = xml::encode(body)?;
        self.exchange(path, &xml_body).await
    }
}
