//! Transfer configuration with TOML file and environment support.
//!
//! The configuration is captured once by the binary and handed to
//! [`crate::SponsoredTransfer`] as an immutable value. Library code never
//! reads the process environment on its own.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chain_sol::Address;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::logging::LogFormat;

/// Prefix for every environment variable read by [`TransferConfig::from_env`].
pub const ENV_PREFIX: &str = "SPONSOR_";

/// Configuration for sponsored transfers.
///
/// Can be loaded from a TOML file via [`TransferConfig::from_toml_file`],
/// from `SPONSOR_*` variables via [`TransferConfig::from_env`], or built
/// programmatically with [`TransferConfig::new`] (e.g. for tests).
#[derive(Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Solana JSON-RPC endpoint.
    pub rpc_url: String,

    /// Commitment level used for queries and confirmation.
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Mint of the token being transferred (Base58).
    pub token_mint: String,

    /// Decimal scale of the mint (10^decimals base units per token).
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,

    /// HTTP endpoint of the sender's external signer.
    #[serde(default)]
    pub sender_signer_url: Option<String>,

    /// HTTP endpoint of the sponsor's external signer.
    #[serde(default)]
    pub sponsor_signer_url: Option<String>,

    /// HTTP endpoint returning the sponsor's address.
    #[serde(default)]
    pub sponsor_lookup_url: Option<String>,

    /// Credential for the sponsor endpoints. Never logged.
    #[serde(default)]
    pub sponsor_api_key: Option<String>,

    /// Upper bound on one external signer round trip.
    #[serde(default = "default_signer_timeout_ms")]
    pub signer_timeout_ms: u64,

    /// Upper bound on confirmation polling after submission.
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,

    /// Delay between confirmation polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// HTTP timeout for individual RPC requests.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Memo shown to the sender when asking for a signature.
    #[serde(default = "default_transfer_memo")]
    pub transfer_memo: String,

    /// Reason sent to the sponsor's signer.
    #[serde(default = "default_sponsorship_reason")]
    pub sponsorship_reason: String,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_token_decimals() -> u8 {
    6
}

fn default_signer_timeout_ms() -> u64 {
    120_000
}

fn default_confirmation_timeout_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_rpc_timeout_ms() -> u64 {
    30_000
}

fn default_transfer_memo() -> String {
    "Approve token transfer".to_string()
}

fn default_sponsorship_reason() -> String {
    "Sponsor network fee for token transfer".to_string()
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TransferConfig {
    /// A configuration with every optional field at its default.
    pub fn new(rpc_url: impl Into<String>, token_mint: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            commitment: default_commitment(),
            token_mint: token_mint.into(),
            token_decimals: default_token_decimals(),
            sender_signer_url: None,
            sponsor_signer_url: None,
            sponsor_lookup_url: None,
            sponsor_api_key: None,
            signer_timeout_ms: default_signer_timeout_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            transfer_memo: default_transfer_memo(),
            sponsorship_reason: default_sponsorship_reason(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, TransferError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| TransferError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn from_toml_file(path: &Path) -> Result<Self, TransferError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TransferError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Build from `SPONSOR_*` environment variables.
    pub fn from_env() -> Result<Self, TransferError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup using the `SPONSOR_*` names.
    ///
    /// `SPONSOR_RPC_URL` and `SPONSOR_TOKEN_MINT` are required; everything
    /// else falls back to its default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransferError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let required = |name: &str| {
            get(name).ok_or_else(|| {
                TransferError::Config(format!("{ENV_PREFIX}{name} is not set"))
            })
        };
        let number = |name: &str, default: u64| -> Result<u64, TransferError> {
            match get(name) {
                Some(v) => v.parse().map_err(|e| {
                    TransferError::Config(format!("{ENV_PREFIX}{name}={v:?}: {e}"))
                }),
                None => Ok(default),
            }
        };

        let mut config = Self::new(required("RPC_URL")?, required("TOKEN_MINT")?);

        if let Some(v) = get("COMMITMENT") {
            config.commitment = v;
        }
        if let Some(v) = get("TOKEN_DECIMALS") {
            config.token_decimals = v.parse().map_err(|e| {
                TransferError::Config(format!("{ENV_PREFIX}TOKEN_DECIMALS={v:?}: {e}"))
            })?;
        }
        config.sender_signer_url = get("SENDER_SIGNER_URL");
        config.sponsor_signer_url = get("SPONSOR_SIGNER_URL");
        config.sponsor_lookup_url = get("LOOKUP_URL");
        config.sponsor_api_key = get("API_KEY");
        config.signer_timeout_ms = number("SIGNER_TIMEOUT_MS", config.signer_timeout_ms)?;
        config.confirmation_timeout_ms =
            number("CONFIRMATION_TIMEOUT_MS", config.confirmation_timeout_ms)?;
        config.poll_interval_ms = number("POLL_INTERVAL_MS", config.poll_interval_ms)?;
        config.rpc_timeout_ms = number("RPC_TIMEOUT_MS", config.rpc_timeout_ms)?;
        if let Some(v) = get("TRANSFER_MEMO") {
            config.transfer_memo = v;
        }
        if let Some(v) = get("SPONSORSHIP_REASON") {
            config.sponsorship_reason = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            config.log_format = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could never complete a transfer.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.rpc_url.trim().is_empty() {
            return Err(TransferError::Config("rpc_url is empty".into()));
        }
        self.mint()?;
        if self.token_decimals > 19 {
            return Err(TransferError::Config(format!(
                "token_decimals {} exceeds the u64 base-unit range",
                self.token_decimals
            )));
        }
        for (name, value) in [
            ("signer_timeout_ms", self.signer_timeout_ms),
            ("confirmation_timeout_ms", self.confirmation_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
        ] {
            if value == 0 {
                return Err(TransferError::Config(format!("{name} must be > 0")));
            }
        }
        if self.poll_interval_ms > self.confirmation_timeout_ms {
            return Err(TransferError::Config(
                "poll_interval_ms is longer than confirmation_timeout_ms".into(),
            ));
        }
        self.log_format()?;
        Ok(())
    }

    /// The configured mint as an address.
    pub fn mint(&self) -> Result<Address, TransferError> {
        self.token_mint
            .parse()
            .map_err(|e| TransferError::Config(format!("token_mint: {e}")))
    }

    pub fn log_format(&self) -> Result<LogFormat, TransferError> {
        match self.log_format.as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(TransferError::Config(format!(
                "log_format must be \"human\" or \"json\", got {other:?}"
            ))),
        }
    }

    pub fn signer_timeout(&self) -> Duration {
        Duration::from_millis(self.signer_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("rpc_url", &self.rpc_url)
            .field("commitment", &self.commitment)
            .field("token_mint", &self.token_mint)
            .field("token_decimals", &self.token_decimals)
            .field("sender_signer_url", &self.sender_signer_url)
            .field("sponsor_signer_url", &self.sponsor_signer_url)
            .field("sponsor_lookup_url", &self.sponsor_lookup_url)
            .field(
                "sponsor_api_key",
                &self.sponsor_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("signer_timeout_ms", &self.signer_timeout_ms)
            .field("confirmation_timeout_ms", &self.confirmation_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("rpc_timeout_ms", &self.rpc_timeout_ms)
            .finish_non_exhaustive()
    }
}
