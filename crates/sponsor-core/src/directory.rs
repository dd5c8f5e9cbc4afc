//! Participant discovery: the sender's wallet and the sponsor's address.

use std::time::Duration;

use async_trait::async_trait;
use chain_sol::Address;
use serde::Deserialize;

use crate::error::TransferError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of asking the identity service for the sender's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Connected(Address),
    /// The user closed the wallet prompt. Not an error.
    Cancelled,
}

#[async_trait]
pub trait WalletResolver: Send + Sync {
    async fn get_wallet(&self) -> Result<WalletStatus, TransferError>;
}

#[async_trait]
pub trait SponsorLookup: Send + Sync {
    async fn sponsor_address(&self) -> Result<Address, TransferError>;
}

/// A wallet already known to the caller, e.g. passed on the command line.
pub struct StaticWallet(pub Address);

#[async_trait]
impl WalletResolver for StaticWallet {
    async fn get_wallet(&self) -> Result<WalletStatus, TransferError> {
        Ok(WalletStatus::Connected(self.0))
    }
}

#[async_trait]
impl SponsorLookup for StaticWallet {
    async fn sponsor_address(&self) -> Result<Address, TransferError> {
        Ok(self.0)
    }
}

/// Looks the sponsor up with `GET {url}`, authenticated with a server-held
/// credential. Expects `{"address": "<base58>"}`.
pub struct HttpSponsorLookup {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SponsorResponse {
    address: String,
}

impl HttpSponsorLookup {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransferError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl SponsorLookup for HttpSponsorLookup {
    async fn sponsor_address(&self) -> Result<Address, TransferError> {
        let mut builder = self.http.get(&self.url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransferError::ParticipantUnavailable(format!("sponsor lookup: {e}")))?;

        if !response.status().is_success() {
            return Err(TransferError::ParticipantUnavailable(format!(
                "sponsor lookup returned HTTP {}",
                response.status()
            )));
        }

        let body: SponsorResponse = response.json().await.map_err(|e| {
            TransferError::ParticipantUnavailable(format!("invalid sponsor lookup response: {e}"))
        })?;

        body.address.parse().map_err(TransferError::from)
    }
}
