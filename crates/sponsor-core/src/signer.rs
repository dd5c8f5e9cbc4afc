//! External signer boundary.
//!
//! Signers receive only the hex-encoded, unsigned message bytes and a
//! human-readable memo, and answer with a status and a hex signature. They
//! never see another party's signature.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SignerError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Hex-encoded serialized message.
    #[serde(rename = "message")]
    pub message_hex: String,
    pub memo: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerStatus {
    Success,
    /// The user dismissed the signing prompt.
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    pub status: SignerStatus,
    /// Hex-encoded 64-byte signature, present on success.
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SignResponse {
    pub fn success(signature_hex: String) -> Self {
        Self {
            status: SignerStatus::Success,
            signature: Some(signature_hex),
            error: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: SignerStatus::Cancelled,
            signature: None,
            error: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: SignerStatus::Error,
            signature: None,
            error: Some(reason.into()),
        }
    }
}

/// A party able to sign a message on behalf of one address.
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    async fn sign(&self, request: SignRequest) -> Result<SignResponse, SignerError>;
}

/// Signer reached over HTTP: `POST {url}` with a [`SignRequest`] body.
///
/// A non-2xx answer is reported as an error status rather than a transport
/// failure, since the signer was reached and refused.
pub struct HttpSigner {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSigner {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SignerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SignerError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ExternalSigner for HttpSigner {
    async fn sign(&self, request: SignRequest) -> Result<SignResponse, SignerError> {
        debug!(url = %self.url, "requesting signature");

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SignerError::Transport(format!("request timed out: {e}"))
            } else {
                SignerError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Ok(SignResponse::error(format!(
                "signer returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SignerError::InvalidResponse(format!("failed to parse sign response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_wire_field_names() {
        let request = SignRequest {
            message_hex: "abcd".into(),
            memo: "pay".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "abcd", "memo": "pay" }));
    }

    #[test]
    fn response_without_signature_decodes() {
        let response: SignResponse =
            serde_json::from_str(r#"{ "status": "cancelled" }"#).unwrap();
        assert_eq!(response, SignResponse::cancelled());
    }
}
