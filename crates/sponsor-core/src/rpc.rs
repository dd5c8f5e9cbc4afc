//! Solana JSON-RPC implementation of [`Ledger`].

use std::time::Duration;

use async_trait::async_trait;
use chain_sol::{Address, Blockhash, Signature};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::TransferConfig;
use crate::error::{LedgerError, TransferError};
use crate::ledger::{AccountState, ConfirmationStatus, Ledger, TokenAccountBalance};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Solana JSON-RPC server error codes.
const SEND_TRANSACTION_PREFLIGHT_FAILURE: i64 = -32002;
const TRANSACTION_SIGNATURE_VERIFICATION_FAILURE: i64 = -32003;
const NODE_UNHEALTHY: i64 = -32005;

/// HTTP client for a Solana JSON-RPC node.
#[derive(Clone)]
pub struct RpcLedger {
    http: reqwest::Client,
    url: String,
    commitment: String,
}

/// Why a JSON-RPC call failed, before it is mapped per method.
#[derive(Debug)]
enum RpcFailure {
    /// No connection was made, so the node never saw the request.
    Connect(String),
    /// The request went out but no usable answer came back.
    Transport(String),
    Status { status: u16, message: String },
    Server { code: i64, message: String },
    Decode(String),
}

impl RpcFailure {
    /// Mapping for read-only queries: any failure means the ledger state is
    /// unknown.
    fn into_query_error(self) -> LedgerError {
        match self {
            RpcFailure::Connect(e) | RpcFailure::Transport(e) => LedgerError::Unavailable(e),
            RpcFailure::Status { message, .. } => LedgerError::Unavailable(message),
            RpcFailure::Server { code, message } => {
                LedgerError::Unavailable(format!("rpc error {code}: {message}"))
            }
            RpcFailure::Decode(e) => LedgerError::InvalidResponse(e),
        }
    }

    /// Mapping for `sendTransaction`. Only failures that prove the node did
    /// not take the transaction are `Rejected` or `Unavailable`; anything
    /// after the request left is `Indeterminate`.
    fn into_send_error(self) -> LedgerError {
        match self {
            RpcFailure::Connect(e) => LedgerError::Unavailable(e),
            RpcFailure::Status { status: 429, message } => LedgerError::Unavailable(message),
            RpcFailure::Server { code, message } => match code {
                SEND_TRANSACTION_PREFLIGHT_FAILURE | TRANSACTION_SIGNATURE_VERIFICATION_FAILURE => {
                    LedgerError::Rejected(message)
                }
                NODE_UNHEALTHY => LedgerError::Unavailable(format!("rpc error {code}: {message}")),
                _ => LedgerError::Indeterminate(format!("rpc error {code}: {message}")),
            },
            RpcFailure::Transport(e) | RpcFailure::Decode(e) => LedgerError::Indeterminate(e),
            RpcFailure::Status { message, .. } => LedgerError::Indeterminate(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct BlockhashValue {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyedTokenAccount {
    pubkey: String,
    account: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedToken,
}

#[derive(Debug, Deserialize)]
struct ParsedToken {
    info: TokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo {
    token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    amount: String,
}

fn commitment_rank(level: &str) -> u8 {
    match level {
        "processed" => 0,
        "confirmed" => 1,
        "finalized" => 2,
        _ => 1,
    }
}

impl RpcLedger {
    pub fn new(
        url: impl Into<String>,
        commitment: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            commitment: commitment.into(),
        })
    }

    pub fn from_config(config: &TransferConfig) -> Result<Self, TransferError> {
        Self::new(&config.rpc_url, &config.commitment, config.rpc_timeout())
            .map_err(|e| TransferError::Config(e.to_string()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a JSON-RPC 2.0 request and decode the `result` field.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcFailure> {
        debug!(method, url = %self.url, "rpc call");

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RpcFailure::Connect(format!("{method}: {e}"))
                } else {
                    RpcFailure::Transport(format!("{method}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcFailure::Status {
                status: status.as_u16(),
                message: format!("{method}: HTTP {status}"),
            });
        }

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| RpcFailure::Decode(format!("{method}: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(RpcFailure::Server {
                code: err.code,
                message: err.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| RpcFailure::Decode(format!("{method}: response has no result")))
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_account_state(&self, address: &Address) -> Result<AccountState, LedgerError> {
        let info: WithContext<Option<Value>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": "base64", "commitment": self.commitment }]),
            )
            .await
            .map_err(RpcFailure::into_query_error)?;

        Ok(match info.value {
            Some(_) => AccountState::Exists,
            None => AccountState::Absent,
        })
    }

    async fn get_latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        let latest: WithContext<BlockhashValue> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await
            .map_err(RpcFailure::into_query_error)?;

        latest
            .value
            .blockhash
            .parse()
            .map_err(|e| LedgerError::InvalidResponse(format!("blockhash: {e}")))
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<Signature, LedgerError> {
        let encoded = bs58::encode(wire).into_string();
        let id: String = self
            .call(
                "sendTransaction",
                json!([encoded, { "encoding": "base58", "preflightCommitment": self.commitment }]),
            )
            .await
            .map_err(RpcFailure::into_send_error)?;

        id.parse()
            .map_err(|e| LedgerError::Indeterminate(format!("transaction id: {e}")))
    }

    async fn confirm_transaction(
        &self,
        id: &Signature,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[id.to_string()], { "searchTransactionHistory": false }]),
            )
            .await
            .map_err(RpcFailure::into_query_error)?;

        let Some(Some(status)) = statuses.value.into_iter().next() else {
            return Ok(ConfirmationStatus::Pending);
        };

        if let Some(err) = status.err {
            return Ok(ConfirmationStatus::Failed(err.to_string()));
        }

        let reached = status
            .confirmation_status
            .as_deref()
            .map(commitment_rank)
            .unwrap_or(0);
        if reached >= commitment_rank(&self.commitment) {
            Ok(ConfirmationStatus::Confirmed)
        } else {
            Ok(ConfirmationStatus::Pending)
        }
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Address,
        mint: &Address,
    ) -> Result<Vec<TokenAccountBalance>, LedgerError> {
        let accounts: WithContext<Vec<KeyedTokenAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "mint": mint.to_string() },
                    { "encoding": "jsonParsed", "commitment": self.commitment }
                ]),
            )
            .await
            .map_err(RpcFailure::into_query_error)?;

        accounts
            .value
            .into_iter()
            .map(|keyed| {
                let address = keyed
                    .pubkey
                    .parse()
                    .map_err(|e| LedgerError::InvalidResponse(format!("token account: {e}")))?;
                let amount = keyed
                    .account
                    .data
                    .parsed
                    .info
                    .token_amount
                    .amount
                    .parse()
                    .map_err(|e| LedgerError::InvalidResponse(format!("token amount: {e}")))?;
                Ok(TokenAccountBalance { address, amount })
            })
            .collect()
    }
}
