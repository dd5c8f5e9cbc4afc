//! Sponsored SPL token transfers.
//!
//! A sender moves tokens to a recipient while a separate sponsor account
//! pays the network fee. The sender never needs native currency: the
//! sponsor is the fee payer, signs after the sender, and funds the creation
//! of the recipient's token account when it does not exist yet.
//!
//! Everything outside the process sits behind a trait:
//! - [`Ledger`] for chain state and submission ([`RpcLedger`] in production)
//! - [`ExternalSigner`] for the two signing parties ([`HttpSigner`])
//! - [`WalletResolver`] and [`SponsorLookup`] for participant discovery
//!
//! With the `test-utils` feature, `nullables` has in-memory versions of
//! each for tests.

pub mod account;
pub mod balance;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod nullables;
pub mod rpc;
pub mod signer;
pub mod submission;
pub mod transfer;

pub use account::{AccountResolver, SetupTransaction};
pub use balance::BalanceAggregator;
pub use config::TransferConfig;
pub use coordinator::{AttemptState, Coordinator, TransferAttempt};
pub use directory::{HttpSponsorLookup, SponsorLookup, StaticWallet, WalletResolver, WalletStatus};
pub use error::{LedgerError, Party, SignerError, TransferError};
pub use ledger::{AccountState, ConfirmationStatus, Ledger, TokenAccountBalance};
pub use logging::{init_logging, LogFormat};
pub use rpc::RpcLedger;
pub use signer::{ExternalSigner, HttpSigner, SignRequest, SignResponse, SignerStatus};
pub use submission::Submitter;
pub use transfer::{BalanceSnapshot, Participants, SponsoredTransfer, TransferReceipt, TransferRequest};
