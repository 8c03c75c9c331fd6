//! reqwest-backed [`Transport`] for the deployed spreadsheet web app.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::io::transport::Transport;

/// The web app parses POST bodies itself and only accepts plain text
const POST_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

/// Cache-busting query parameter appended to every read
const CACHE_BUSTER: &str = "_t";

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        if !config.is_api_configured() {
            return Err(ClientError::NotConfigured);
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_body(action: &str, response: Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            warn!("Failed to read response body for {}: {}", action, e);
            ClientError::Transport(e.to_string())
        })?;

        if !status.is_success() {
            warn!("{} answered with HTTP {}", action, status);
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!("{} returned a body that is not JSON: {}", action, e);
            ClientError::Decode(e.to_string())
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, action: &str, params: &[(&str, String)]) -> Result<Value> {
        debug!("GET {} {:?}", action, params);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("action", action)])
            .query(params)
            .query(&[(CACHE_BUSTER, Utc::now().timestamp_millis().to_string())])
            .send()
            .await
            .map_err(|e| {
                warn!("GET {} failed: {}", action, e);
                ClientError::Transport(e.to_string())
            })?;

        Self::read_body(action, response).await
    }

    async fn post(&self, body: Value) -> Result<Value> {
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("<none>")
            .to_string();
        debug!("POST {}", action);

        let response = self
            .client
            .post(&self.base_url)
            .header(CONTENT_TYPE, POST_CONTENT_TYPE)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                warn!("POST {} failed: {}", action, e);
                ClientError::Transport(e.to_string())
            })?;

        Self::read_body(&action, response).await
    }
}
