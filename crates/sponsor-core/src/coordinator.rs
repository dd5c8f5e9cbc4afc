//! Dual-signer coordination.
//!
//! A [`TransferAttempt`] owns one transaction and walks it through
//! `BUILT -> SENDER_SIGNED -> SPONSOR_SIGNED -> MERGED -> SUBMITTED ->
//! CONFIRMED`, with `FAILED` reachable from every non-terminal state.
//! Transitions are strictly forward and each one checks where it starts
//! from, so a signature can never be collected out of order or twice.
//!
//! Both signers are shown the same unsigned message bytes. The sponsor's
//! signature is held aside until the merge step attaches it, which is why
//! `SPONSOR_SIGNED` and `MERGED` are separate states.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chain_sol::{codec, Address, Signature, SolError, Transaction};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::{Party, TransferError};
use crate::signer::{ExternalSigner, SignRequest, SignResponse, SignerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Built,
    SenderSigned,
    SponsorSigned,
    Merged,
    Submitted,
    Confirmed,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Confirmed | AttemptState::Failed)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Built => "BUILT",
            AttemptState::SenderSigned => "SENDER_SIGNED",
            AttemptState::SponsorSigned => "SPONSOR_SIGNED",
            AttemptState::Merged => "MERGED",
            AttemptState::Submitted => "SUBMITTED",
            AttemptState::Confirmed => "CONFIRMED",
            AttemptState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One in-flight transaction and the state of its signature collection.
///
/// Nothing here outlives the attempt: dropping it before submission
/// discards all collected signatures.
#[derive(Debug)]
pub struct TransferAttempt {
    transaction: Transaction,
    state: AttemptState,
    history: Vec<AttemptState>,
    sponsor_signature: Option<(Address, Signature)>,
    transaction_id: Option<Signature>,
}

impl TransferAttempt {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            state: AttemptState::Built,
            history: vec![AttemptState::Built],
            sponsor_signature: None,
            transaction_id: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Every state visited so far, starting with `Built`.
    pub fn history(&self) -> &[AttemptState] {
        &self.history
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }

    /// Identifier assigned by the ledger on submission.
    pub fn transaction_id(&self) -> Option<Signature> {
        self.transaction_id
    }

    /// Attach the sender's signature. Only valid from `Built`.
    pub fn record_sender_signature(
        &mut self,
        sender: &Address,
        signature: Signature,
    ) -> Result<(), TransferError> {
        self.expect_state(&[AttemptState::Built], AttemptState::SenderSigned)?;
        if sender == self.transaction.fee_payer() {
            // The fee payer slot belongs to the sponsor.
            return self.abort(SolError::UnexpectedSigner(sender.to_string()).into());
        }
        if let Err(e) = self.transaction.attach_signature(sender, signature) {
            return self.abort(e.into());
        }
        self.advance(AttemptState::SenderSigned);
        Ok(())
    }

    /// Hold the sponsor's signature for merging.
    ///
    /// Valid from `SenderSigned`, or from `Built` when the sponsor is the
    /// only required signer (a setup transaction). The signature must be
    /// bound to the sponsor over this message and the sponsor must be the
    /// fee payer.
    pub fn record_sponsor_signature(
        &mut self,
        sponsor: &Address,
        signature: Signature,
    ) -> Result<(), TransferError> {
        let sponsor_only = self.transaction.required_signers() == [*sponsor];
        let allowed: &[AttemptState] = if sponsor_only {
            &[AttemptState::Built]
        } else {
            &[AttemptState::SenderSigned]
        };
        self.expect_state(allowed, AttemptState::SponsorSigned)?;

        if sponsor != self.transaction.fee_payer() {
            return self.abort(SolError::UnexpectedSigner(sponsor.to_string()).into());
        }
        if !signature.verify(sponsor, &self.transaction.message_bytes()) {
            return self.abort(SolError::SignatureMismatch(sponsor.to_string()).into());
        }

        self.sponsor_signature = Some((*sponsor, signature));
        self.advance(AttemptState::SponsorSigned);
        Ok(())
    }

    /// Attach the held sponsor signature at the fee payer slot.
    ///
    /// Fails unless the result has every required slot filled.
    pub fn merge(&mut self) -> Result<(), TransferError> {
        self.expect_state(&[AttemptState::SponsorSigned], AttemptState::Merged)?;

        let Some((sponsor, signature)) = self.sponsor_signature.take() else {
            let fee_payer = self.transaction.fee_payer().to_string();
            return self.abort(SolError::MissingSignatures(vec![fee_payer]).into());
        };
        if let Err(e) = self.transaction.attach_signature(&sponsor, signature) {
            return self.abort(e.into());
        }
        if let Err(e) = self.transaction.verify_signatures() {
            return self.abort(e.into());
        }

        self.advance(AttemptState::Merged);
        Ok(())
    }

    pub fn mark_submitted(&mut self, id: Signature) -> Result<(), TransferError> {
        self.expect_state(&[AttemptState::Merged], AttemptState::Submitted)?;
        self.transaction_id = Some(id);
        self.advance(AttemptState::Submitted);
        Ok(())
    }

    pub fn mark_confirmed(&mut self) -> Result<(), TransferError> {
        self.expect_state(&[AttemptState::Submitted], AttemptState::Confirmed)?;
        self.advance(AttemptState::Confirmed);
        Ok(())
    }

    /// Move to `Failed`. No effect once terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(AttemptState::Failed);
        }
    }

    fn expect_state(
        &self,
        allowed: &[AttemptState],
        to: AttemptState,
    ) -> Result<(), TransferError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TransferError::OutOfOrder {
                from: self.state,
                to,
            })
        }
    }

    fn abort(&mut self, err: TransferError) -> Result<(), TransferError> {
        self.fail();
        Err(err)
    }

    fn advance(&mut self, to: AttemptState) {
        debug!(from = %self.state, %to, "attempt state change");
        self.state = to;
        self.history.push(to);
    }
}

/// Requests signatures from the sender and the sponsor, in that order.
pub struct Coordinator {
    sender_signer: Arc<dyn ExternalSigner>,
    sponsor_signer: Arc<dyn ExternalSigner>,
    signer_timeout: Duration,
    transfer_memo: String,
    sponsorship_reason: String,
}

impl Coordinator {
    pub fn new(
        config: &TransferConfig,
        sender_signer: Arc<dyn ExternalSigner>,
        sponsor_signer: Arc<dyn ExternalSigner>,
    ) -> Self {
        Self {
            sender_signer,
            sponsor_signer,
            signer_timeout: config.signer_timeout(),
            transfer_memo: config.transfer_memo.clone(),
            sponsorship_reason: config.sponsorship_reason.clone(),
        }
    }

    /// Drive `attempt` from `Built` to `Merged`.
    ///
    /// The sponsor is not contacted unless the sender signed. Any failure
    /// leaves the attempt in `Failed`.
    pub async fn collect_signatures(
        &self,
        attempt: &mut TransferAttempt,
        sender: &Address,
        sponsor: &Address,
    ) -> Result<(), TransferError> {
        let result = self.collect(attempt, sender, sponsor).await;
        if result.is_err() {
            attempt.fail();
        }
        result
    }

    /// Drive a sponsor-only transaction from `Built` to `Merged`.
    ///
    /// The sponsor is not contacted for an attempt in any other state or
    /// for a transaction that needs other signers.
    pub async fn sign_sponsor_only(
        &self,
        attempt: &mut TransferAttempt,
        sponsor: &Address,
    ) -> Result<(), TransferError> {
        let result = async {
            if attempt.transaction().required_signers() != [*sponsor] {
                return Err(TransferError::OutOfOrder {
                    from: attempt.state(),
                    to: AttemptState::SponsorSigned,
                });
            }
            attempt.expect_state(&[AttemptState::Built], AttemptState::SponsorSigned)?;

            let message_hex = codec::encode(&attempt.transaction().message_bytes());
            let signature = self.request_sponsor_signature(&message_hex).await?;
            attempt.record_sponsor_signature(sponsor, signature)?;
            attempt.merge()
        }
        .await;
        if result.is_err() {
            attempt.fail();
        }
        result
    }

    async fn collect(
        &self,
        attempt: &mut TransferAttempt,
        sender: &Address,
        sponsor: &Address,
    ) -> Result<(), TransferError> {
        if attempt.state() != AttemptState::Built {
            return Err(TransferError::OutOfOrder {
                from: attempt.state(),
                to: AttemptState::SenderSigned,
            });
        }

        // Both parties sign these exact bytes.
        let message_hex = codec::encode(&attempt.transaction().message_bytes());

        let signature = self.request_sender_signature(&message_hex).await?;
        attempt.record_sender_signature(sender, signature)?;
        info!(%sender, "sender signed");

        let signature = self.request_sponsor_signature(&message_hex).await?;
        attempt.record_sponsor_signature(sponsor, signature)?;
        info!(%sponsor, "sponsor signed");

        attempt.merge()
    }

    async fn request_sender_signature(&self, message_hex: &str) -> Result<Signature, TransferError> {
        let request = SignRequest {
            message_hex: message_hex.to_string(),
            memo: self.transfer_memo.clone(),
        };
        let response = self
            .ask(Party::Sender, self.sender_signer.as_ref(), request)
            .await?
            .map_err(TransferError::SignerFailed)?;

        match response.status {
            SignerStatus::Success => signature_from(response, TransferError::SignerFailed),
            SignerStatus::Cancelled => {
                info!("sender declined to sign");
                Err(TransferError::UserDeclined)
            }
            SignerStatus::Error => Err(TransferError::SignerFailed(failure_reason(response))),
        }
    }

    async fn request_sponsor_signature(
        &self,
        message_hex: &str,
    ) -> Result<Signature, TransferError> {
        let request = SignRequest {
            message_hex: message_hex.to_string(),
            memo: self.sponsorship_reason.clone(),
        };
        let response = self
            .ask(Party::Sponsor, self.sponsor_signer.as_ref(), request)
            .await?
            .map_err(TransferError::SponsorSigningFailed)?;

        match response.status {
            SignerStatus::Success => {
                signature_from(response, TransferError::SponsorSigningFailed)
            }
            SignerStatus::Cancelled => Err(TransferError::SponsorSigningFailed(
                "sponsor signer cancelled".into(),
            )),
            SignerStatus::Error => {
                Err(TransferError::SponsorSigningFailed(failure_reason(response)))
            }
        }
    }

    /// One bounded round trip. The outer error is the timeout; the inner
    /// one is a transport failure, rendered for the party's error variant.
    async fn ask(
        &self,
        party: Party,
        signer: &dyn ExternalSigner,
        request: SignRequest,
    ) -> Result<Result<SignResponse, String>, TransferError> {
        debug!(%party, "requesting signature");
        match timeout(self.signer_timeout, signer.sign(request)).await {
            Ok(Ok(response)) => Ok(Ok(response)),
            Ok(Err(e)) => {
                warn!(%party, error = %e, "signer request failed");
                Ok(Err(e.to_string()))
            }
            Err(_) => {
                warn!(%party, after = ?self.signer_timeout, "signer timed out");
                Err(TransferError::SignerTimeout {
                    party,
                    after: self.signer_timeout,
                })
            }
        }
    }
}

fn signature_from(
    response: SignResponse,
    missing: fn(String) -> TransferError,
) -> Result<Signature, TransferError> {
    let hex = response
        .signature
        .ok_or_else(|| missing("signer reported success without a signature".into()))?;
    Signature::from_hex(&hex).map_err(|e| missing(format!("unusable signature: {e}")))
}

fn failure_reason(response: SignResponse) -> String {
    response
        .error
        .unwrap_or_else(|| "signer reported an error".to_string())
}
