//! Nullable infrastructure for deterministic testing.
//!
//! The ledger, the signers and the identity service are all reached through
//! traits. The implementations here:
//! - never touch the network
//! - answer from state the test scripts up front
//! - record every call for assertions
//!
//! Swap them in for [`crate::RpcLedger`] and [`crate::HttpSigner`] in tests.

pub mod ledger;
pub mod signer;

pub use ledger::{LedgerEvent, NullLedger};
pub use signer::{NullSigner, NullWallet, SignerBehavior};

use std::sync::{Mutex, MutexGuard};

/// Lock that keeps working after a panicking test thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
