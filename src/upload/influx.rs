use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{header, Client};

use crate::config::RemoteConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// Request could not be sent or no response arrived.
    Transport(String),
    /// Endpoint answered with a non-2xx status.
    Status(u16),
    /// Client could not be built from the configuration.
    Config(String),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Transport(msg) => write!(f, "Write request failed: {}", msg),
            WriteError::Status(code) => write!(f, "Write rejected with status {}", code),
            WriteError::Config(msg) => write!(f, "Invalid remote configuration: {}", msg),
        }
    }
}

impl std::error::Error for WriteError {}

/// Remote time-series write API; one line per call.
#[async_trait]
pub trait RemoteWriter: Send + Sync {
    async fn write_line(&self, line: &str) -> Result<(), WriteError>;
}

/// InfluxDB v2 `/api/v2/write` client.
pub struct InfluxWriter {
    config: RemoteConfig,
    client: Client,
}

impl InfluxWriter {
    pub fn new(config: RemoteConfig) -> Result<Self, WriteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| WriteError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn write_url(&self) -> String {
        format!("{}/api/v2/write", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl RemoteWriter for InfluxWriter {
    async fn write_line(&self, line: &str) -> Result<(), WriteError> {
        let response = self
            .client
            .post(self.write_url())
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", self.config.precision.as_str()),
            ])
            .header(header::AUTHORIZATION, format!("Token {}", self.config.token))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(line.to_string())
            .send()
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WriteError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
