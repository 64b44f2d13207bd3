//! Kea control-agent client
//!
//! Commands go out as `{command, service, arguments}` over HTTP POST and
//! come back as one `{result, text, arguments}` object per addressed
//! service. Calls are bounded by the configured timeout and are never
//! retried.

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::KeaConfig;
use crate::errors::{ConsoleError, Result};

/// Result codes of the Kea command protocol
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum KeaResultCode {
    #[display(fmt = "success")]
    Success,
    #[display(fmt = "error")]
    Error,
    #[display(fmt = "unsupported")]
    Unsupported,
    #[display(fmt = "empty")]
    Empty,
    #[display(fmt = "conflict")]
    Conflict,
    #[display(fmt = "unknown ({})", _0)]
    Unknown(i64),
}

impl From<i64> for KeaResultCode {
    fn from(code: i64) -> Self {
        match code {
            0 => KeaResultCode::Success,
            1 => KeaResultCode::Error,
            2 => KeaResultCode::Unsupported,
            3 => KeaResultCode::Empty,
            4 => KeaResultCode::Conflict,
            other => KeaResultCode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeaCommand {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl KeaCommand {
    pub fn new(command: &str) -> Self {
        KeaCommand {
            command: command.to_string(),
            service: Vec::new(),
            arguments: None,
        }
    }

    pub fn for_service(mut self, service: &str) -> Self {
        self.service.push(service.to_string());
        self
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeaResponse {
    pub result: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub arguments: Option<Value>,
}

impl KeaResponse {
    pub fn code(&self) -> KeaResultCode {
        KeaResultCode::from(self.result)
    }
}

#[derive(Debug, Clone)]
pub struct KeaClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    credentials: Option<(String, Option<String>)>,
}

impl KeaClient {
    /// Client for the configured control agent; unavailable without a URL
    pub fn from_config(config: &KeaConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ConsoleError::UpstreamUnavailable("Kea control agent is not configured".to_string()))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConsoleError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(KeaClient {
            client,
            url,
            timeout,
            credentials: config.username.clone().map(|user| (user, config.password.clone())),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a command; any non-success, non-empty result is an error
    pub async fn execute(&self, command: &KeaCommand) -> Result<Vec<KeaResponse>> {
        let operation = format!("Kea command {}", command.command);
        debug!(command = %command.command, services = ?command.service, "Sending Kea command");

        let mut request = self.client.post(&self.url).json(command);
        if let Some((ref user, ref password)) = self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ConsoleError::Timeout {
                    operation: operation.clone(),
                    duration: self.timeout,
                }
            } else if e.is_connect() {
                ConsoleError::UpstreamUnavailable(format!("Kea control agent unreachable: {}", e))
            } else {
                ConsoleError::Upstream(format!("{} failed: {}", operation, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(command = %command.command, status = %status, "Kea control agent returned an error status");
            return Err(ConsoleError::Upstream(format!("{} failed with HTTP {}: {}", operation, status, body.trim())));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ConsoleError::Timeout {
                    operation: operation.clone(),
                    duration: self.timeout,
                }
            } else {
                ConsoleError::Upstream(format!("{} returned an unreadable body: {}", operation, e))
            }
        })?;

        // the agent answers with an array, a bare object for agent-level errors
        let responses: Vec<KeaResponse> = match body {
            Value::Array(_) => serde_json::from_value(body)?,
            other => vec![serde_json::from_value(other)?],
        };

        for response in &responses {
            match response.code() {
                KeaResultCode::Success | KeaResultCode::Empty => {}
                code => {
                    let text = response.text.clone().unwrap_or_else(|| code.to_string());
                    return Err(ConsoleError::Upstream(format!("{} failed: {}", operation, text)));
                }
            }
        }
        Ok(responses)
    }

    pub async fn version(&self) -> Result<Vec<KeaResponse>> {
        self.execute(&KeaCommand::new("version-get")).await
    }

    pub async fn status(&self, service: &str) -> Result<Vec<KeaResponse>> {
        self.execute(&KeaCommand::new("status-get").for_service(service)).await
    }

    pub async fn config_get(&self, service: &str) -> Result<Vec<KeaResponse>> {
        self.execute(&KeaCommand::new("config-get").for_service(service)).await
    }

    /// IPv4 leases of one subnet, or all of them
    pub async fn leases4(&self, subnet_id: Option<u32>) -> Result<Vec<KeaResponse>> {
        let mut command = KeaCommand::new("lease4-get-all").for_service("dhcp4");
        if let Some(id) = subnet_id {
            command = command.with_arguments(serde_json::json!({ "subnets": [id] }));
        }
        self.execute(&command).await
    }
}
