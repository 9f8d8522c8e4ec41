//! Agent gateway client.
//!
//! The direct dispatch strategy hands a consolidation turn to the agent
//! gateway over its JSON RPC endpoint:
//!
//! ```json
//! { "method": "agent",
//!   "params": { "message": "...", "sessionKey": "...", "deliver": false, "idempotencyKey": "..." },
//!   "timeoutMs": 600000 }
//! ```
//!
//! Any 2xx answer that is not an explicit `{"ok": false}` counts as accepted.
//! The caller bounds the whole call; see [`crate::dispatch::DirectDispatch`].

use crate::error::{ConsolidationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// RPC method used for agent turns.
pub const AGENT_METHOD: &str = "agent";

/// Parameters of an `agent` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCall {
    pub message: String,
    pub session_key: String,
    pub deliver: bool,
    pub idempotency_key: String,
}

/// Gateway acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayAck {
    /// Run id reported by the gateway, when it sends one.
    pub run_id: Option<String>,
}

/// An agent execution gateway.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Submit an agent turn. `timeout_ms` is forwarded so the gateway can
    /// apply the same bound on its side.
    async fn call_agent(&self, call: &AgentCall, timeout_ms: u64) -> Result<GatewayAck>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcRequest<'a> {
    method: &'static str,
    params: &'a AgentCall,
    timeout_ms: u64,
}

/// HTTP implementation of [`AgentGateway`].
pub struct HttpGateway {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl HttpGateway {
    /// Create a gateway client for `base_url` (no trailing `/rpc`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `[gateway]` config section.
    #[must_use]
    pub fn from_config(config: &crate::config::GatewayConfig) -> Self {
        Self::new(config.url.clone(), config.token.clone())
    }

    fn rpc_url(&self) -> String {
        format!("{}/rpc", self.base_url)
    }
}

/// Pull a human-readable message out of an error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl AgentGateway for HttpGateway {
    async fn call_agent(&self, call: &AgentCall, timeout_ms: u64) -> Result<GatewayAck> {
        let body = RpcRequest {
            method: AGENT_METHOD,
            params: call,
            timeout_ms,
        };

        let mut request = self.client.post(self.rpc_url()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            ConsolidationError::DispatchTransport(format!("gateway request failed: {e}"))
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ConsolidationError::DispatchTransport(format!(
                "gateway HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&text)
            )));
        }

        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            // An empty or non-JSON 2xx still means the call was accepted.
            Err(_) => return Ok(GatewayAck::default()),
        };

        if value.get("ok").and_then(|ok| ok.as_bool()) == Some(false) {
            return Err(ConsolidationError::DispatchTransport(format!(
                "gateway rejected agent call: {}",
                extract_error_message(&text)
            )));
        }

        let run_id = value
            .get("runId")
            .or_else(|| value.get("result").and_then(|r| r.get("runId")))
            .and_then(|id| id.as_str())
            .map(String::from);

        Ok(GatewayAck { run_id })
    }
}
