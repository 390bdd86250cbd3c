//! In-memory adapters for the oracle, value rail and consumer hooks.
//!
//! Handles are cheap clones sharing one book, so a host (or a test) can keep a
//! handle after moving another into the [`crate::Coordinator`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use solana_sdk::pubkey::Pubkey;

use crate::funding::{TransferError, ValueTransfer};
use crate::oracle::{OracleError, OracleRequest, RandomnessOracle};
use crate::router::{ConsumerHook, FulfillmentNotice, HookError};
use crate::state::RequestId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct OracleLog {
    next_id: RequestId,
    queued_ids: VecDeque<RequestId>,
    unavailable: bool,
    submissions: Vec<(RequestId, OracleRequest)>,
}

/// Oracle that hands out increasing IDs and records every submission.
#[derive(Debug, Clone, Default)]
pub struct SequentialOracle {
    log: Arc<Mutex<OracleLog>>,
}

impl SequentialOracle {
    pub fn starting_at(first_id: RequestId) -> Self {
        let oracle = Self::default();
        lock(&oracle.log).next_id = first_id;
        oracle
    }

    /// Answer the next submission with `request_id` instead of the counter.
    pub fn queue_id(&self, request_id: RequestId) {
        lock(&self.log).queued_ids.push_back(request_id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.log).unavailable = unavailable;
    }

    pub fn submissions(&self) -> Vec<(RequestId, OracleRequest)> {
        lock(&self.log).submissions.clone()
    }
}

impl RandomnessOracle for SequentialOracle {
    fn request_random_words(&mut self, request: &OracleRequest) -> Result<RequestId, OracleError> {
        let mut log = lock(&self.log);
        if log.unavailable {
            return Err(OracleError::Unavailable("oracle offline".into()));
        }
        let request_id = match log.queued_ids.pop_front() {
            Some(id) => id,
            None => {
                let id = log.next_id;
                log.next_id = log.next_id.saturating_add(1);
                id
            }
        };
        log.submissions.push((request_id, request.clone()));
        Ok(request_id)
    }
}

#[derive(Debug, Default)]
struct BankBook {
    balances: HashMap<Pubkey, u64>,
    custody: u64,
    rejected: HashSet<Pubkey>,
}

/// Account balances plus the coordinator's custody pool.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBank {
    book: Arc<Mutex<BankBook>>,
}

impl InMemoryBank {
    pub fn credit(&self, account: Pubkey, amount: u64) {
        let mut book = lock(&self.book);
        let balance = book.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Move `amount` from `from` into custody, as a caller attaching value would.
    pub fn attach(&self, from: &Pubkey, amount: u64) -> Result<(), TransferError> {
        let mut book = lock(&self.book);
        let balance = book.balances.entry(*from).or_default();
        if *balance < amount {
            return Err(TransferError(format!(
                "{from} has {balance}, cannot attach {amount}"
            )));
        }
        *balance -= amount;
        book.custody = book.custody.saturating_add(amount);
        Ok(())
    }

    pub fn balance_of(&self, account: &Pubkey) -> u64 {
        lock(&self.book).balances.get(account).copied().unwrap_or(0)
    }

    pub fn custody(&self) -> u64 {
        lock(&self.book).custody
    }

    pub fn reject_transfers_to(&self, account: Pubkey) {
        lock(&self.book).rejected.insert(account);
    }

    pub fn accept_transfers_to(&self, account: &Pubkey) {
        lock(&self.book).rejected.remove(account);
    }
}

impl ValueTransfer for InMemoryBank {
    fn transfer(&mut self, to: &Pubkey, amount: u64) -> Result<(), TransferError> {
        let mut book = lock(&self.book);
        if book.rejected.contains(to) {
            return Err(TransferError(format!("{to} rejects incoming transfers")));
        }
        if book.custody < amount {
            return Err(TransferError(format!(
                "custody holds {}, cannot send {amount}",
                book.custody
            )));
        }
        book.custody -= amount;
        let balance = book.balances.entry(*to).or_default();
        *balance = balance.saturating_add(amount);
        Ok(())
    }
}

/// Hook that records notices and optionally fails every delivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingHook {
    received: Arc<Mutex<Vec<FulfillmentNotice>>>,
    fail_with: Option<String>,
}

impl RecordingHook {
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<FulfillmentNotice> {
        lock(&self.received).clone()
    }
}

impl ConsumerHook for RecordingHook {
    fn on_fulfilled(&self, notice: &FulfillmentNotice) -> Result<(), HookError> {
        lock(&self.received).push(notice.clone());
        match &self.fail_with {
            Some(reason) => Err(HookError(reason.clone())),
            None => Ok(()),
        }
    }
}
