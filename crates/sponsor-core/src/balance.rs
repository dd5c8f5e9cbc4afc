use std::sync::Arc;

use chain_sol::{Address, TokenAmount};
use tracing::debug;

use crate::error::TransferError;
use crate::ledger::Ledger;

/// Sums an owner's holdings of one mint across all of their token accounts.
#[derive(Clone)]
pub struct BalanceAggregator {
    ledger: Arc<dyn Ledger>,
    decimals: u8,
}

impl BalanceAggregator {
    pub fn new(ledger: Arc<dyn Ledger>, decimals: u8) -> Self {
        Self { ledger, decimals }
    }

    /// Total balance of `mint` held by `owner`.
    ///
    /// An owner with no token accounts holds zero. A failed query is
    /// [`TransferError::BalanceUnavailable`], never zero.
    pub async fn aggregate_balance(
        &self,
        owner: &Address,
        mint: &Address,
    ) -> Result<TokenAmount, TransferError> {
        let accounts = self
            .ledger
            .get_token_accounts_by_owner(owner, mint)
            .await
            .map_err(|e| TransferError::BalanceUnavailable {
                owner: *owner,
                reason: e.to_string(),
            })?;

        let total: u128 = accounts.iter().map(|a| u128::from(a.amount)).sum();
        debug!(%owner, accounts = accounts.len(), total, "aggregated balance");

        Ok(TokenAmount::from_base_units(total, self.decimals))
    }
}
