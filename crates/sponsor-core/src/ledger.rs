//! Ledger capability used by every pipeline step.

use async_trait::async_trait;
use chain_sol::{Address, Blockhash, Signature};

use crate::error::LedgerError;

/// Whether an account exists on the ledger.
///
/// Absence is a confirmed answer from the ledger, never a stand-in for a
/// failed query; failures are reported as [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Exists,
    Absent,
}

/// One token account held by an owner, with its balance in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountBalance {
    pub address: Address,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not yet seen at the configured commitment.
    Pending,
    Confirmed,
    /// Landed but failed on chain.
    Failed(String),
}

/// Request/response access to the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_account_state(&self, address: &Address) -> Result<AccountState, LedgerError>;

    async fn get_latest_blockhash(&self) -> Result<Blockhash, LedgerError>;

    /// Submit a fully signed wire transaction, returning its identifier.
    ///
    /// Fails with [`LedgerError::Indeterminate`] when the request may have
    /// reached the ledger but no answer came back.
    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<Signature, LedgerError>;

    async fn confirm_transaction(&self, id: &Signature)
        -> Result<ConfirmationStatus, LedgerError>;

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Address,
        mint: &Address,
    ) -> Result<Vec<TokenAccountBalance>, LedgerError>;
}
