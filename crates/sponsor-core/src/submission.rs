use std::sync::Arc;
use std::time::Duration;

use chain_sol::{Signature, SolError, Transaction};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::coordinator::{AttemptState, TransferAttempt};
use crate::error::{LedgerError, TransferError};
use crate::ledger::{ConfirmationStatus, Ledger};

/// Sends fully signed transactions and waits for them to confirm.
#[derive(Clone)]
pub struct Submitter {
    ledger: Arc<dyn Ledger>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl Submitter {
    pub fn new(config: &TransferConfig, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            confirmation_timeout: config.confirmation_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Submit a merged attempt and wait for confirmation, moving it through
    /// `Submitted` to `Confirmed`, or to `Failed` on any error.
    pub async fn submit(&self, attempt: &mut TransferAttempt) -> Result<Signature, TransferError> {
        let result = self.run(attempt).await;
        if result.is_err() {
            attempt.fail();
        }
        result
    }

    /// Submit a transaction outside of any attempt and wait for it.
    pub async fn submit_and_confirm(&self, transaction: &Transaction) -> Result<Signature, TransferError> {
        let id = self.send(transaction).await?;
        self.await_confirmation(&id).await?;
        Ok(id)
    }

    /// Check every signature slot locally, then hand the wire bytes to the
    /// ledger. Nothing reaches the network if any slot is empty or any
    /// signature does not verify.
    ///
    /// When the send may have reached the ledger without an answer coming
    /// back, the transaction counts as submitted under its fee payer
    /// signature. Resending it could pay twice, so the caller polls instead.
    pub async fn send(&self, transaction: &Transaction) -> Result<Signature, TransferError> {
        let wire = transaction.to_wire()?;
        transaction.verify_signatures()?;
        let local_id = transaction.id().ok_or_else(|| {
            SolError::MissingSignatures(vec![transaction.fee_payer().to_string()])
        })?;

        let id = match self.ledger.send_raw_transaction(&wire).await {
            Ok(id) => id,
            Err(LedgerError::Rejected(reason)) => {
                return Err(TransferError::TransactionRejected(reason))
            }
            Err(LedgerError::Indeterminate(reason)) => {
                warn!(
                    transaction_id = %local_id,
                    %reason,
                    "send outcome unknown, polling instead of resending"
                );
                local_id
            }
            Err(other) => return Err(TransferError::LedgerUnavailable(other.to_string())),
        };

        info!(transaction_id = %id, bytes = wire.len(), "transaction submitted");
        Ok(id)
    }

    /// Poll until `id` reaches the configured commitment.
    ///
    /// Failed polls are logged and retried until the deadline, after which
    /// the outcome is [`TransferError::ConfirmationTimedOut`]: the
    /// transaction may still land.
    pub async fn await_confirmation(&self, id: &Signature) -> Result<(), TransferError> {
        let poll = async {
            loop {
                match self.ledger.confirm_transaction(id).await {
                    Ok(ConfirmationStatus::Confirmed) => return Ok(()),
                    Ok(ConfirmationStatus::Failed(reason)) => {
                        return Err(TransferError::TransactionRejected(reason))
                    }
                    Ok(ConfirmationStatus::Pending) => {
                        debug!(transaction_id = %id, "not yet confirmed");
                    }
                    Err(e) => {
                        warn!(transaction_id = %id, error = %e, "confirmation poll failed");
                    }
                }
                sleep(self.poll_interval).await;
            }
        };

        match timeout(self.confirmation_timeout, poll).await {
            Ok(result) => {
                if result.is_ok() {
                    info!(transaction_id = %id, "transaction confirmed");
                }
                result
            }
            Err(_) => {
                warn!(transaction_id = %id, after = ?self.confirmation_timeout, "confirmation timed out");
                Err(TransferError::ConfirmationTimedOut(*id))
            }
        }
    }

    async fn run(&self, attempt: &mut TransferAttempt) -> Result<Signature, TransferError> {
        if attempt.state() != AttemptState::Merged {
            return Err(TransferError::OutOfOrder {
                from: attempt.state(),
                to: AttemptState::Submitted,
            });
        }

        let id = self.send(attempt.transaction()).await?;
        attempt.mark_submitted(id)?;
        self.await_confirmation(&id).await?;
        attempt.mark_confirmed()?;
        Ok(id)
    }
}
