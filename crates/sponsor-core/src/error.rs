use std::fmt;
use std::time::Duration;

use chain_sol::{Address, Signature, SolError, TokenAmount};
use thiserror::Error;

use crate::coordinator::AttemptState;

/// Which of the two signing parties an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Sender,
    Sponsor,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Sender => f.write_str("sender"),
            Party::Sponsor => f.write_str("sponsor"),
        }
    }
}

/// Terminal outcome of a failed transfer attempt.
///
/// Every failure aborts the whole attempt. Use [`TransferError::is_retryable`]
/// to decide whether starting a fresh attempt (new blockhash, new
/// signatures) can help.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("participant lookup failed: {0}")]
    ParticipantUnavailable(String),

    #[error("balance unavailable for {owner}: {reason}")]
    BalanceUnavailable { owner: Address, reason: String },

    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("user declined to sign")]
    UserDeclined,

    #[error("sender signing failed: {0}")]
    SignerFailed(String),

    #[error("sponsor signing failed: {0}")]
    SponsorSigningFailed(String),

    #[error("{party} signer did not answer within {after:?}")]
    SignerTimeout { party: Party, after: Duration },

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("transaction {0} not confirmed before the deadline; re-query before resubmitting")]
    ConfirmationTimedOut(Signature),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[source] SolError),

    #[error("attempt cannot move from {from} to {to}")]
    OutOfOrder { from: AttemptState, to: AttemptState },

    #[error("configuration error: {0}")]
    Config(String),
}

impl TransferError {
    /// Whether a brand-new attempt could succeed where this one failed.
    ///
    /// A timed-out confirmation is not retryable: the transaction may still
    /// land, so the caller has to re-query it first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::LedgerUnavailable(_)
                | TransferError::ParticipantUnavailable(_)
                | TransferError::BalanceUnavailable { .. }
                | TransferError::SignerFailed(_)
                | TransferError::SponsorSigningFailed(_)
                | TransferError::SignerTimeout { .. }
                | TransferError::TransactionRejected(_)
        )
    }
}

impl From<SolError> for TransferError {
    fn from(err: SolError) -> Self {
        match err {
            SolError::InvalidAddress(msg) => TransferError::InvalidAddressFormat(msg),
            SolError::MalformedEncoding(msg) => TransferError::MalformedEncoding(msg),
            SolError::InvalidAmount(msg) => TransferError::InvalidAmount(msg),
            other => TransferError::InvalidTransaction(other),
        }
    }
}

/// Failure reported by a [`crate::ledger::Ledger`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The ledger could not be reached or did not answer.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger refused the request (e.g. preflight failure on send).
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),

    /// A submission left this process but its outcome was never reported,
    /// so the transaction may or may not have reached the network.
    #[error("submission outcome unknown: {0}")]
    Indeterminate(String),
}

/// Failure talking to an external signer, as opposed to the signer
/// answering with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signer transport error: {0}")]
    Transport(String),

    #[error("invalid signer response: {0}")]
    InvalidResponse(String),
}
