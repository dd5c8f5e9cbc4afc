//! Nullable ledger: scripted answers, recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chain_sol::{Address, Blockhash, Signature, Transaction, ASSOCIATED_TOKEN_PROGRAM_ID};

use super::lock;
use crate::error::LedgerError;
use crate::ledger::{AccountState, ConfirmationStatus, Ledger, TokenAccountBalance};

/// A call the ledger saw, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    AccountQuery(Address),
    BlockhashRequest,
    BalanceQuery(Address),
    Sent(Signature),
    /// A submission that failed before the ledger took it.
    SendRefused(String),
    Confirmed(Signature),
}

#[derive(Debug, Clone)]
enum Outcome {
    Confirm,
    Fail(String),
    Never,
}

struct State {
    accounts: HashSet<Address>,
    /// (owner, mint, balance)
    token_accounts: Vec<(Address, Address, TokenAccountBalance)>,
    blockhash_seed: u8,
    unavailable: bool,
    balances_unavailable: bool,
    send_rejection: Option<String>,
    send_response_lost: bool,
    outcome: Outcome,
    pending_polls: usize,
    poll_errors: usize,
    /// Accounts a submitted transaction creates once it confirms.
    creates: HashMap<Signature, Vec<Address>>,
    submitted: Vec<Transaction>,
    events: Vec<LedgerEvent>,
    confirmation_polls: usize,
}

/// A test ledger that answers from in-memory state instead of an RPC node.
///
/// Submitted transactions are parsed and their signatures verified, so a
/// transaction the real network would reject for bad signatures is rejected
/// here too. Confirming a transaction that creates an associated token
/// account makes that account exist.
pub struct NullLedger {
    state: Mutex<State>,
}

impl NullLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                accounts: HashSet::new(),
                token_accounts: Vec::new(),
                blockhash_seed: 0,
                unavailable: false,
                balances_unavailable: false,
                send_rejection: None,
                send_response_lost: false,
                outcome: Outcome::Confirm,
                pending_polls: 0,
                poll_errors: 0,
                creates: HashMap::new(),
                submitted: Vec::new(),
                events: Vec::new(),
                confirmation_polls: 0,
            }),
        }
    }

    /// Mark an account as existing.
    pub fn with_account(self, address: Address) -> Self {
        lock(&self.state).accounts.insert(address);
        self
    }

    /// Give `owner` a token account for `mint`. The account also exists.
    pub fn with_token_account(
        self,
        owner: Address,
        mint: Address,
        address: Address,
        amount: u64,
    ) -> Self {
        {
            let mut state = lock(&self.state);
            state.accounts.insert(address);
            state
                .token_accounts
                .push((owner, mint, TokenAccountBalance { address, amount }));
        }
        self
    }

    /// Every call fails as if the node were unreachable.
    pub fn with_unavailable(self) -> Self {
        lock(&self.state).unavailable = true;
        self
    }

    /// Only balance queries fail.
    pub fn with_balances_unavailable(self) -> Self {
        lock(&self.state).balances_unavailable = true;
        self
    }

    /// Refuse every submission with `reason`, as a failed preflight would.
    pub fn with_send_rejected(self, reason: impl Into<String>) -> Self {
        lock(&self.state).send_rejection = Some(reason.into());
        self
    }

    /// Take submissions but lose the answer, as a timed-out send would.
    pub fn with_send_response_lost(self) -> Self {
        lock(&self.state).send_response_lost = true;
        self
    }

    /// Submitted transactions land but fail on chain.
    pub fn with_on_chain_failure(self, reason: impl Into<String>) -> Self {
        lock(&self.state).outcome = Outcome::Fail(reason.into());
        self
    }

    /// Submitted transactions stay pending forever.
    pub fn with_never_confirm(self) -> Self {
        lock(&self.state).outcome = Outcome::Never;
        self
    }

    /// Answer `Pending` to the next `polls` confirmation queries.
    pub fn with_pending_polls(self, polls: usize) -> Self {
        lock(&self.state).pending_polls = polls;
        self
    }

    /// Fail the next `polls` confirmation queries.
    pub fn with_poll_errors(self, polls: usize) -> Self {
        lock(&self.state).poll_errors = polls;
        self
    }

    /// Change a token account balance after construction.
    pub fn set_balance(&self, token_account: &Address, amount: u64) {
        let mut state = lock(&self.state);
        for (_, _, balance) in state.token_accounts.iter_mut() {
            if &balance.address == token_account {
                balance.amount = amount;
            }
        }
    }

    pub fn account_exists(&self, address: &Address) -> bool {
        lock(&self.state).accounts.contains(address)
    }

    /// Transactions accepted for submission, in order.
    pub fn submitted(&self) -> Vec<Transaction> {
        lock(&self.state).submitted.clone()
    }

    /// Every submission call, taken or refused.
    pub fn send_count(&self) -> usize {
        self.count(|e| matches!(e, LedgerEvent::Sent(_) | LedgerEvent::SendRefused(_)))
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        lock(&self.state).events.clone()
    }

    pub fn blockhash_requests(&self) -> usize {
        self.count(|e| matches!(e, LedgerEvent::BlockhashRequest))
    }

    pub fn balance_queries(&self) -> usize {
        self.count(|e| matches!(e, LedgerEvent::BalanceQuery(_)))
    }

    pub fn confirmation_polls(&self) -> usize {
        lock(&self.state).confirmation_polls
    }

    fn count(&self, predicate: impl Fn(&LedgerEvent) -> bool) -> usize {
        lock(&self.state).events.iter().filter(|e| predicate(e)).count()
    }
}

impl Default for NullLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn unreachable() -> LedgerError {
    LedgerError::Unavailable("null ledger: connection refused".into())
}

/// Whether the ledger takes `wire`, checked the way a node's preflight would.
fn accept(state: &State, wire: &[u8]) -> Result<(Signature, Transaction), LedgerError> {
    if state.unavailable {
        return Err(unreachable());
    }
    if let Some(reason) = &state.send_rejection {
        return Err(LedgerError::Rejected(reason.clone()));
    }

    let tx = Transaction::from_wire(wire)
        .map_err(|e| LedgerError::Rejected(format!("failed to deserialize: {e}")))?;
    tx.verify_signatures()
        .map_err(|e| LedgerError::Rejected(format!("signature verification failed: {e}")))?;
    let id = tx
        .id()
        .ok_or_else(|| LedgerError::Rejected("missing fee payer signature".into()))?;
    Ok((id, tx))
}

/// Accounts created by associated token account instructions in `tx`.
fn created_accounts(tx: &Transaction) -> Vec<Address> {
    let message = tx.message();
    message
        .instructions
        .iter()
        .filter(|ix| {
            message.account_keys.get(ix.program_id_index as usize)
                == Some(&ASSOCIATED_TOKEN_PROGRAM_ID)
        })
        .filter_map(|ix| {
            let index = *ix.account_indices.get(1)?;
            message.account_keys.get(index as usize).copied()
        })
        .collect()
}

#[async_trait]
impl Ledger for NullLedger {
    async fn get_account_state(&self, address: &Address) -> Result<AccountState, LedgerError> {
        let mut state = lock(&self.state);
        state.events.push(LedgerEvent::AccountQuery(*address));
        if state.unavailable {
            return Err(unreachable());
        }
        Ok(if state.accounts.contains(address) {
            AccountState::Exists
        } else {
            AccountState::Absent
        })
    }

    async fn get_latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        let mut state = lock(&self.state);
        state.events.push(LedgerEvent::BlockhashRequest);
        if state.unavailable {
            return Err(unreachable());
        }
        state.blockhash_seed = state.blockhash_seed.wrapping_add(1);
        Ok(Blockhash::new([state.blockhash_seed; 32]))
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<Signature, LedgerError> {
        let mut state = lock(&self.state);
        let accepted = accept(&state, wire);
        let (id, tx) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                state.events.push(LedgerEvent::SendRefused(e.to_string()));
                return Err(e);
            }
        };

        state.events.push(LedgerEvent::Sent(id));
        state.creates.insert(id, created_accounts(&tx));
        state.submitted.push(tx);
        if state.send_response_lost {
            return Err(LedgerError::Indeterminate("null ledger: response lost".into()));
        }
        Ok(id)
    }

    async fn confirm_transaction(
        &self,
        id: &Signature,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let mut state = lock(&self.state);
        state.confirmation_polls += 1;

        if state.unavailable {
            return Err(unreachable());
        }
        if state.poll_errors > 0 {
            state.poll_errors -= 1;
            return Err(LedgerError::Unavailable("null ledger: poll failed".into()));
        }
        if !state.creates.contains_key(id) {
            return Ok(ConfirmationStatus::Pending);
        }
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(ConfirmationStatus::Pending);
        }

        match state.outcome.clone() {
            Outcome::Confirm => {
                if let Some(created) = state.creates.get(id).cloned() {
                    state.accounts.extend(created);
                }
                if !state.events.contains(&LedgerEvent::Confirmed(*id)) {
                    state.events.push(LedgerEvent::Confirmed(*id));
                }
                Ok(ConfirmationStatus::Confirmed)
            }
            Outcome::Fail(reason) => Ok(ConfirmationStatus::Failed(reason)),
            Outcome::Never => Ok(ConfirmationStatus::Pending),
        }
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Address,
        mint: &Address,
    ) -> Result<Vec<TokenAccountBalance>, LedgerError> {
        let mut state = lock(&self.state);
        state.events.push(LedgerEvent::BalanceQuery(*owner));
        if state.unavailable || state.balances_unavailable {
            return Err(unreachable());
        }
        Ok(state
            .token_accounts
            .iter()
            .filter(|(o, m, _)| o == owner && m == mint)
            .map(|(_, _, balance)| balance.clone())
            .collect())
    }
}
