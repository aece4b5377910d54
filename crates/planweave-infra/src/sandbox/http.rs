//! HTTP client for the external sandboxed code-execution service.
//!
//! Wire contract:
//! - `POST   {base}/sandboxes`            -- provision, returns `{sandbox_id}`
//! - `POST   {base}/sandboxes/{id}/code`  -- run code, returns the execution
//!   record (`stdout`, `stderr`, optional `error`, `results`)
//! - `DELETE {base}/sandboxes/{id}`       -- tear down
//!
//! A runtime error inside the sandbox arrives in the execution record's
//! `error` field with a 2xx status; only provisioning/transport problems map
//! to [`SandboxError`]. Teardown of an already-gone sandbox (404) is treated
//! as success so release stays idempotent-safe end to end.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use planweave_core::sandbox::SandboxService;
use planweave_types::sandbox::{CodeExecution, SandboxError, SandboxHandle};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the sandbox service client.
#[derive(Clone)]
pub struct HttpSandboxConfig {
    pub base_url: String,
    pub api_key: String,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateSandboxRequest {
    idle_timeout_secs: u64,
}

#[derive(Deserialize)]
struct CreateSandboxResponse {
    sandbox_id: String,
}

#[derive(Serialize)]
struct RunCodeRequest<'a> {
    code: &'a str,
    timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// HttpSandboxService
// ---------------------------------------------------------------------------

/// HTTP implementation of the sandbox execution port.
pub struct HttpSandboxService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSandboxService {
    pub fn new(config: HttpSandboxConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SandboxError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SandboxError::Service {
            message: format!("{status}: {body}"),
        })
    }
}

impl SandboxService for HttpSandboxService {
    async fn create(&self, idle_timeout: Duration) -> Result<SandboxHandle, SandboxError> {
        let response = self
            .client
            .post(self.url("/sandboxes"))
            .bearer_auth(&self.api_key)
            .json(&CreateSandboxRequest {
                idle_timeout_secs: idle_timeout.as_secs(),
            })
            .send()
            .await
            .map_err(|e| SandboxError::Transport(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let created: CreateSandboxResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        tracing::debug!(sandbox = created.sandbox_id.as_str(), "sandbox provisioned");
        Ok(SandboxHandle(created.sandbox_id))
    }

    async fn run_code(
        &self,
        handle: &SandboxHandle,
        code: &str,
        timeout: Duration,
    ) -> Result<CodeExecution, SandboxError> {
        let response = self
            .client
            .post(self.url(&format!("/sandboxes/{}/code", handle.as_str())))
            .bearer_auth(&self.api_key)
            .json(&RunCodeRequest {
                code,
                timeout_secs: timeout.as_secs(),
            })
            .send()
            .await
            .map_err(|e| SandboxError::Transport(e.to_string()))?;

        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| SandboxError::Protocol(e.to_string()))
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        let response = self
            .client
            .delete(self.url(&format!("/sandboxes/{}", handle.as_str())))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SandboxError::Transport(e.to_string()))?;

        // An already-gone sandbox keeps teardown idempotent-safe.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_status(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
