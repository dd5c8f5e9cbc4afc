//! The sponsored transfer pipeline.
//!
//! ```text
//! resolve participants
//!   -> check balances (sender, recipient, sponsor in parallel)
//!   -> ensure recipient token account (sponsor-paid setup, confirmed first)
//!   -> build transfer (sponsor pays the fee, sender owns the tokens)
//!   -> sender signs -> sponsor signs -> merge
//!   -> submit -> confirm
//! ```
//!
//! Each step starts only after the previous one succeeded, and any failure
//! ends the attempt.

use std::cmp::Ordering;
use std::sync::Arc;

use chain_sol::{
    build_spl_transfer, derive_associated_token_address, Address, Signature, SolError,
    TokenAmount, Transaction,
};
use tracing::{info, info_span, Instrument};

use crate::account::AccountResolver;
use crate::balance::BalanceAggregator;
use crate::config::TransferConfig;
use crate::coordinator::{AttemptState, Coordinator, TransferAttempt};
use crate::directory::{SponsorLookup, WalletResolver, WalletStatus};
use crate::error::TransferError;
use crate::ledger::Ledger;
use crate::signer::ExternalSigner;
use crate::submission::Submitter;

/// What the caller asked to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender: Address,
    pub recipient: Address,
    pub sponsor: Address,
    pub mint: Address,
    pub amount: TokenAmount,
}

impl TransferRequest {
    /// Parse and check the user-supplied parts of a request.
    pub fn parse(
        sender: &str,
        recipient: &str,
        sponsor: &str,
        mint: Address,
        amount: &str,
        decimals: u8,
    ) -> Result<Self, TransferError> {
        let amount = TokenAmount::parse(amount, decimals)?;
        Self::new(
            sender.parse()?,
            recipient.parse()?,
            sponsor.parse()?,
            mint,
            amount,
        )
    }

    pub fn new(
        sender: Address,
        recipient: Address,
        sponsor: Address,
        mint: Address,
        amount: TokenAmount,
    ) -> Result<Self, TransferError> {
        if amount.is_zero() {
            return Err(TransferError::InvalidAmount("amount must be > 0".into()));
        }
        amount.to_u64()?;
        if sender == sponsor {
            return Err(TransferError::InvalidTransaction(SolError::TransactionBuildError(
                "sender and sponsor must be different accounts".into(),
            )));
        }
        Ok(Self {
            sender,
            recipient,
            sponsor,
            mint,
            amount,
        })
    }
}

/// Balances of the three participants, read before anything is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub sender: TokenAmount,
    pub recipient: TokenAmount,
    pub sponsor: TokenAmount,
}

/// Proof of a confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transaction_id: Signature,
    /// Present when the recipient's token account had to be created first.
    pub setup_transaction_id: Option<Signature>,
    pub sender_signature: (Address, Signature),
    pub sponsor_signature: (Address, Signature),
    pub amount: TokenAmount,
    /// States the transfer attempt passed through.
    pub states: Vec<AttemptState>,
}

/// Who is taking part, or that the user backed out before anything started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participants {
    Ready { sender: Address, sponsor: Address },
    Cancelled,
}

/// Orchestrates sponsored token transfers against one ledger and mint.
pub struct SponsoredTransfer {
    config: Arc<TransferConfig>,
    ledger: Arc<dyn Ledger>,
    mint: Address,
    balances: BalanceAggregator,
    accounts: AccountResolver,
    coordinator: Coordinator,
    submitter: Submitter,
}

impl SponsoredTransfer {
    pub fn new(
        config: Arc<TransferConfig>,
        ledger: Arc<dyn Ledger>,
        sender_signer: Arc<dyn ExternalSigner>,
        sponsor_signer: Arc<dyn ExternalSigner>,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        let mint = config.mint()?;
        Ok(Self {
            balances: BalanceAggregator::new(ledger.clone(), config.token_decimals),
            accounts: AccountResolver::new(ledger.clone()),
            coordinator: Coordinator::new(&config, sender_signer, sponsor_signer),
            submitter: Submitter::new(&config, ledger.clone()),
            mint,
            ledger,
            config,
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn mint(&self) -> &Address {
        &self.mint
    }

    /// Build a request for the configured mint from user input.
    pub fn request(
        &self,
        sender: &str,
        recipient: &str,
        sponsor: &str,
        amount: &str,
    ) -> Result<TransferRequest, TransferError> {
        TransferRequest::parse(
            sender,
            recipient,
            sponsor,
            self.mint,
            amount,
            self.config.token_decimals,
        )
    }

    /// Ask the identity service for the sender and look up the sponsor.
    ///
    /// A dismissed wallet prompt is [`Participants::Cancelled`]; the sponsor
    /// is not looked up in that case.
    pub async fn resolve_participants(
        &self,
        wallet: &dyn WalletResolver,
        sponsors: &dyn SponsorLookup,
    ) -> Result<Participants, TransferError> {
        let sender = match wallet.get_wallet().await? {
            WalletStatus::Connected(address) => address,
            WalletStatus::Cancelled => {
                info!("wallet connection cancelled");
                return Ok(Participants::Cancelled);
            }
        };
        let sponsor = sponsors.sponsor_address().await?;
        Ok(Participants::Ready { sender, sponsor })
    }

    /// Total holdings of the configured mint for `owner`.
    pub async fn balance_of(&self, owner: &Address) -> Result<TokenAmount, TransferError> {
        self.balances.aggregate_balance(owner, &self.mint).await
    }

    /// Read all three balances concurrently and check the sender can cover
    /// the amount. Only the sender's balance gates the transfer.
    pub async fn check_balances(
        &self,
        request: &TransferRequest,
    ) -> Result<BalanceSnapshot, TransferError> {
        let (sender, recipient, sponsor) = tokio::join!(
            self.balances.aggregate_balance(&request.sender, &request.mint),
            self.balances.aggregate_balance(&request.recipient, &request.mint),
            self.balances.aggregate_balance(&request.sponsor, &request.mint),
        );
        let snapshot = BalanceSnapshot {
            sender: sender?,
            recipient: recipient?,
            sponsor: sponsor?,
        };
        info!(
            sender = %snapshot.sender,
            recipient = %snapshot.recipient,
            sponsor = %snapshot.sponsor,
            "balances"
        );

        match snapshot.sender.partial_cmp(&request.amount) {
            Some(Ordering::Less) => Err(TransferError::InsufficientBalance {
                required: request.amount,
                available: snapshot.sender,
            }),
            Some(_) => Ok(snapshot),
            None => Err(TransferError::InvalidAmount(format!(
                "amount has {} decimals, mint has {}",
                request.amount.decimals(),
                snapshot.sender.decimals()
            ))),
        }
    }

    /// Create the recipient's token account if it is missing and wait for
    /// the creation to confirm. Returns the setup transaction id, if any.
    pub async fn ensure_recipient_account(
        &self,
        request: &TransferRequest,
    ) -> Result<Option<Signature>, TransferError> {
        self.ensure_account(&request.recipient, &request.sponsor).await
    }

    /// Create `owner`'s token account for the configured mint at the
    /// sponsor's expense, unless it already exists.
    pub async fn ensure_account(
        &self,
        owner: &Address,
        sponsor: &Address,
    ) -> Result<Option<Signature>, TransferError> {
        let Some(setup) = self
            .accounts
            .ensure_token_account(owner, &self.mint, sponsor)
            .await?
        else {
            return Ok(None);
        };

        let mut attempt = TransferAttempt::new(setup.transaction);
        self.coordinator.sign_sponsor_only(&mut attempt, sponsor).await?;
        let id = self.submitter.submit(&mut attempt).await?;
        info!(transaction_id = %id, token_account = %setup.token_account, "recipient token account created");
        Ok(Some(id))
    }

    /// Build the unsigned transfer against a fresh blockhash.
    pub async fn build_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<Transaction, TransferError> {
        let source = derive_associated_token_address(&request.sender, &request.mint)?;
        let destination = derive_associated_token_address(&request.recipient, &request.mint)?;
        let instruction = build_spl_transfer(
            &source,
            &destination,
            &request.sender,
            request.amount.to_u64()?,
        )?;

        let blockhash = self
            .ledger
            .get_latest_blockhash()
            .await
            .map_err(|e| TransferError::LedgerUnavailable(e.to_string()))?;

        Ok(Transaction::build(&request.sponsor, &blockhash, &[instruction])?)
    }

    /// Run the whole pipeline for `request`.
    ///
    /// Dropping the returned future before submission abandons the attempt
    /// without side effects. Once a transaction has been sent it cannot be
    /// recalled.
    pub async fn execute(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        let span = info_span!(
            "transfer",
            sender = %request.sender,
            recipient = %request.recipient,
            amount = %request.amount,
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        if request.mint != self.mint {
            return Err(TransferError::Config(format!(
                "request mint {} does not match configured mint {}",
                request.mint, self.mint
            )));
        }

        self.check_balances(request).await?;

        let setup_transaction_id = self.ensure_recipient_account(request).await?;

        let transaction = self.build_transfer(request).await?;
        let mut attempt = TransferAttempt::new(transaction);
        self.coordinator
            .collect_signatures(&mut attempt, &request.sender, &request.sponsor)
            .await?;

        let transaction_id = self.submitter.submit(&mut attempt).await?;

        let signature_of = |party: &Address| {
            attempt
                .transaction()
                .signature_for(party)
                .copied()
                .map(|sig| (*party, sig))
                .ok_or_else(|| {
                    TransferError::InvalidTransaction(SolError::MissingSignatures(vec![
                        party.to_string(),
                    ]))
                })
        };
        let receipt = TransferReceipt {
            transaction_id,
            setup_transaction_id,
            sender_signature: signature_of(&request.sender)?,
            sponsor_signature: signature_of(&request.sponsor)?,
            amount: request.amount,
            states: attempt.history().to_vec(),
        };

        info!(transaction_id = %receipt.transaction_id, "transfer confirmed");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn mint() -> Address {
        USDC.parse().unwrap()
    }

    #[test]
    fn zero_amount_is_rejected() {
        let err = TransferRequest::new(
            Address::new([1; 32]),
            Address::new([2; 32]),
            Address::new([3; 32]),
            mint(),
            TokenAmount::zero(6),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::InvalidAmount(_)));
    }

    #[test]
    fn short_address_is_a_format_error() {
        let err = TransferRequest::parse(
            "abc",
            "11111111111111111111111111111111",
            "11111111111111111111111111111112",
            mint(),
            "1",
            6,
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::InvalidAddressFormat(_)));
    }

    #[test]
    fn too_many_decimals_is_an_amount_error() {
        let err = TransferRequest::parse(
            "11111111111111111111111111111111",
            USDC,
            "SysvarRent111111111111111111111111111111111",
            mint(),
            "0.0000001",
            6,
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::InvalidAmount(_)));
    }

    #[test]
    fn sender_cannot_sponsor_itself() {
        let err = TransferRequest::new(
            Address::new([1; 32]),
            Address::new([2; 32]),
            Address::new([1; 32]),
            mint(),
            TokenAmount::from_base_units(1, 6),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransaction(_)));
    }
}
