//! Shared application state: the coordinator behind a mutex plus everything
//! that observes its calls.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{SystemTime, UNIX_EPOCH};

use rng_coordinator::{Coordinator, CoordinatorError, FulfillOutcome, RandomWord, RequestId};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::deposits::{Custody, DepositError, VerifiedDeposit};
use crate::error::ApiError;
use crate::event_log::{EventLog, LoggedEvent};
use crate::metrics::Metrics;
use crate::replay::SeenSet;
use crate::signing::{AuthError, verify_fulfillment};
use crate::snapshot::{SnapshotRef, SnapshotStore};

/// One oracle answer with its proof signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedFulfillment {
    pub request_id: RequestId,
    pub words: Vec<RandomWord>,
    pub signature: String,
}

/// Single-use admission for a signed call: its envelope nonce and, when value
/// is attached, the deposit backing it.
#[derive(Debug, Clone)]
pub struct Admission {
    pub replay_key: String,
    pub expires_at: i64,
    pub deposit: Option<VerifiedDeposit>,
}

struct Host {
    coordinator: Coordinator,
    events: EventLog,
    envelopes: SeenSet,
    deposits: SeenSet,
}

/// Shared application state accessible from HTTP handlers and workers.
pub struct AppState {
    host: Mutex<Host>,
    snapshot: Option<SnapshotStore>,
    pub metrics: Arc<Metrics>,
    /// Oracle jobs queued or in flight.
    pub pending_count: Arc<AtomicU64>,
    pub max_signature_age_secs: i64,
    /// Treasury deposits, when value may be attached at all.
    pub custody: Option<Custody>,
    replay_capacity: usize,
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl AppState {
    pub fn new(
        coordinator: Coordinator,
        snapshot: Option<SnapshotStore>,
        metrics: Arc<Metrics>,
        event_log_capacity: usize,
        max_signature_age_secs: i64,
    ) -> Self {
        Self {
            host: Mutex::new(Host {
                coordinator,
                events: EventLog::new(event_log_capacity),
                envelopes: SeenSet::default(),
                deposits: SeenSet::default(),
            }),
            snapshot,
            metrics,
            pending_count: Arc::new(AtomicU64::new(0)),
            max_signature_age_secs,
            custody: None,
            replay_capacity: usize::MAX,
        }
    }

    pub fn with_custody(mut self, custody: Custody) -> Self {
        self.custody = Some(custody);
        self
    }

    /// Resume the used nonces and spent deposits from a snapshot.
    pub fn with_seen(mut self, envelopes: SeenSet, deposits: SeenSet) -> Self {
        let host = self.host.get_mut();
        host.envelopes = envelopes;
        host.deposits = deposits;
        self
    }

    /// Cap on live envelope nonces. Past it, signed calls are refused until
    /// old nonces expire.
    pub fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replay_capacity = capacity.max(1);
        self
    }

    /// Run one coordinator call, then publish its events and persist.
    ///
    /// Every state change emits at least one event, so a call without events
    /// left the state untouched and is not persisted.
    pub async fn execute<T>(&self, call: impl FnOnce(&mut Coordinator) -> T) -> T {
        let mut host = self.host.lock().await;
        let output = call(&mut host.coordinator);
        self.publish(&mut host, false).await;
        output
    }

    /// Run a signed call exactly once.
    ///
    /// The envelope nonce is consumed whatever the call returns. The deposit is
    /// only spent when the call succeeds, so a refused request leaves it usable.
    pub async fn execute_signed<T>(
        &self,
        admission: &Admission,
        now: i64,
        call: impl FnOnce(&mut Coordinator) -> Result<T, CoordinatorError>,
    ) -> Result<T, ApiError> {
        let mut host = self.host.lock().await;

        host.envelopes.prune(now);
        if host.envelopes.contains(&admission.replay_key) {
            warn!(key = %admission.replay_key, "Replayed envelope");
            return Err(AuthError::Replayed.into());
        }
        if host.envelopes.len() >= self.replay_capacity {
            return Err(ApiError::Busy("too many signed calls in flight".into()));
        }
        if let Some(deposit) = &admission.deposit {
            host.deposits.prune(now);
            if host.deposits.contains(&deposit.signature) {
                return Err(DepositError::AlreadySpent(deposit.signature.clone()).into());
            }
        }
        host.envelopes
            .insert(admission.replay_key.clone(), admission.expires_at);

        let output = call(&mut host.coordinator);
        if let (Ok(_), Some(deposit)) = (&output, &admission.deposit) {
            host.deposits
                .insert(deposit.signature.clone(), deposit.expires_at);
        }

        self.publish(&mut host, true).await;
        output.map_err(ApiError::from)
    }

    async fn publish(&self, host: &mut Host, seen_changed: bool) {
        let events = host.coordinator.drain_events();
        if events.is_empty() && !seen_changed {
            return;
        }
        for event in &events {
            self.metrics.observe(event);
        }
        host.events.extend(events);

        if let Some(snapshot) = &self.snapshot {
            let snapshot_ref = SnapshotRef {
                coordinator: host.coordinator.state(),
                envelopes: &host.envelopes,
                deposits: &host.deposits,
            };
            if let Err(e) = snapshot.persist(&snapshot_ref).await {
                error!(error = %format!("{e:#}"), "Failed to persist snapshot");
            }
        }
    }

    pub async fn read<T>(&self, query: impl FnOnce(&Coordinator) -> T) -> T {
        let host = self.host.lock().await;
        query(&host.coordinator)
    }

    pub async fn events_after(&self, after: u64, limit: usize) -> Vec<LoggedEvent> {
        self.host.lock().await.events.after(after, limit)
    }

    pub async fn last_event_seq(&self) -> u64 {
        self.host.lock().await.events.last_seq()
    }

    /// Deliver oracle answers after checking each proof against the trusted
    /// oracle address. One bad proof rejects the whole call.
    pub async fn fulfill(
        &self,
        deliveries: Vec<SignedFulfillment>,
    ) -> Result<Vec<FulfillOutcome>, CoordinatorError> {
        let now = unix_now();
        let outcomes = self
            .execute(|coordinator| {
                let oracle = coordinator.funding_config().coordinator_address;
                if let Some(forged) = deliveries
                    .iter()
                    .find(|d| !verify_fulfillment(&oracle, d.request_id, &d.words, &d.signature))
                {
                    error!(request_id = forged.request_id, "Fulfillment proof rejected");
                    return Err(CoordinatorError::PermissionDenied {
                        signer: Pubkey::default(),
                    });
                }

                let ctx = rng_coordinator::CallContext::new(oracle, now);
                let batch = deliveries
                    .into_iter()
                    .map(|d| (d.request_id, d.words))
                    .collect();
                coordinator.fulfill_batch(&ctx, batch)
            })
            .await?;

        for outcome in &outcomes {
            if !outcome.is_fulfilled() {
                self.metrics.record_skip();
            }
        }
        Ok(outcomes)
    }
}
