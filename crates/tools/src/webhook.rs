//! Webhook tools: forward tool calls to an HTTP endpoint.
//!
//! Each call is POSTed as `{"toolCall": {"id", "name", "arguments"}}`. When
//! a signing secret is configured the request carries:
//!
//! - `X-Body-Hash`: hex-encoded SHA-256 of the body
//! - `X-Signature`: hex-encoded HMAC-SHA256 of that hash under the secret
//!
//! The response body is returned to the model verbatim.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use switchboard_core::error::ToolError;
use switchboard_core::tool::ToolDispatcher;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const BODY_HASH_HEADER: &str = "X-Body-Hash";
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Compute `(body_hash, signature)` for a request body.
pub fn sign(secret: &str, body: &[u8]) -> Result<(String, String), ToolError> {
    let body_hash = hex::encode(Sha256::digest(body));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ToolError::InvalidArguments(format!("signing key: {e}")))?;
    mac.update(body_hash.as_bytes());
    Ok((body_hash, hex::encode(mac.finalize().into_bytes())))
}

/// Check a received body against its signature in constant time.
///
/// An absent or empty secret accepts everything.
pub fn verify_signature(secret: Option<&str>, body: &[u8], signature: &str) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return true;
    };
    let Ok(provided) = hex::decode(signature.strip_prefix("sha256=").unwrap_or(signature)) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(hex::encode(Sha256::digest(body)).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

pub struct WebhookToolDispatcher {
    url: String,
    signing_secret: Option<String>,
    timeout_secs: u64,
    tools: HashSet<String>,
    client: reqwest::Client,
}

impl WebhookToolDispatcher {
    pub fn new(
        url: impl Into<String>,
        signing_secret: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "webhook".into(),
                reason: format!("HTTP client: {e}"),
            })?;

        Ok(Self {
            url: url.into(),
            signing_secret: signing_secret.filter(|s| !s.is_empty()),
            timeout_secs,
            tools: HashSet::new(),
            client,
        })
    }

    /// Serve these tool names.
    pub fn with_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(names.into_iter().map(Into::into));
        self
    }

    fn body(name: &str, arguments: &str) -> Vec<u8> {
        let arguments = serde_json::from_str::<serde_json::Value>(arguments)
            .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()));
        serde_json::json!({
            "toolCall": {
                "id": uuid::Uuid::new_v4().to_string(),
                "name": name,
                "arguments": arguments,
            }
        })
        .to_string()
        .into_bytes()
    }
}

#[async_trait]
impl ToolDispatcher for WebhookToolDispatcher {
    fn handles(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    async fn dispatch(&self, name: &str, arguments: &str) -> std::result::Result<String, ToolError> {
        if !self.handles(name) {
            return Err(ToolError::NotFound(name.to_string()));
        }

        let body = Self::body(name, arguments);
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.signing_secret {
            let (body_hash, signature) = sign(secret, &body)?;
            request = request
                .header(BODY_HASH_HEADER, body_hash)
                .header(SIGNATURE_HEADER, signature);
        }

        debug!(tool = %name, url = %self.url, signed = self.signing_secret.is_some(), "Calling tool webhook");

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: name.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            warn!(tool = %name, status = status.as_u16(), "Tool webhook returned error");
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("webhook returned {status}: {text}"),
            });
        }

        Ok(text)
    }
}
