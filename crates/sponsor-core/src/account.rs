use std::sync::Arc;

use chain_sol::{
    build_create_associated_token_account, derive_associated_token_address, Address, Transaction,
};
use tracing::{debug, info};

use crate::error::TransferError;
use crate::ledger::{AccountState, Ledger};

/// An unsigned transaction that creates a missing token account.
#[derive(Debug, Clone)]
pub struct SetupTransaction {
    /// The account the transaction creates.
    pub token_account: Address,
    /// Paid for and signed by the sponsor alone.
    pub transaction: Transaction,
}

/// Makes sure a recipient can receive a token before a transfer is built.
#[derive(Clone)]
pub struct AccountResolver {
    ledger: Arc<dyn Ledger>,
}

impl AccountResolver {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Check whether `owner` has a token account for `mint`.
    ///
    /// Returns `None` when it exists. Otherwise returns a setup transaction
    /// with `sponsor` as funder and fee payer. A query failure is
    /// [`TransferError::LedgerUnavailable`] and never treated as absence.
    pub async fn ensure_token_account(
        &self,
        owner: &Address,
        mint: &Address,
        sponsor: &Address,
    ) -> Result<Option<SetupTransaction>, TransferError> {
        let token_account = derive_associated_token_address(owner, mint)?;

        let state = self
            .ledger
            .get_account_state(&token_account)
            .await
            .map_err(|e| TransferError::LedgerUnavailable(e.to_string()))?;

        if state == AccountState::Exists {
            debug!(%owner, %token_account, "token account exists");
            return Ok(None);
        }

        let blockhash = self
            .ledger
            .get_latest_blockhash()
            .await
            .map_err(|e| TransferError::LedgerUnavailable(e.to_string()))?;

        let instruction = build_create_associated_token_account(sponsor, owner, mint)?;
        let transaction = Transaction::build(sponsor, &blockhash, &[instruction])?;

        info!(%owner, %token_account, "token account missing, setup transaction built");
        Ok(Some(SetupTransaction {
            token_account,
            transaction,
        }))
    }
}
