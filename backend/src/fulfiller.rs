//! Fulfillment engine: consumes oracle jobs, computes the VRF output, signs
//! it with the oracle key and delivers it through the same proof check as
//! HTTP callbacks.

use anyhow::Result;
use rng_coordinator::{FulfillOutcome, RequestId};
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info, instrument, warn};

use crate::oracle::OracleJob;
use crate::signing::sign_fulfillment;
use crate::state::{AppState, SignedFulfillment};
use crate::vrf::VrfKey;

/// Settings the fulfiller needs from the application config.
#[derive(Clone)]
pub struct FulfillerConfig {
    pub oracle_keypair: Arc<Keypair>,
    pub vrf_key: VrfKey,
    pub confirmation_delay_ms: u64,
    pub concurrency: usize,
}

/// Main fulfiller loop.
pub async fn run_fulfiller(
    config: FulfillerConfig,
    mut rx: mpsc::Receiver<OracleJob>,
    state: Arc<AppState>,
) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency));

    while let Some(job) = rx.recv().await {
        state.pending_count.fetch_add(1, Ordering::Relaxed);

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                error!("Semaphore closed, stopping fulfiller");
                break;
            }
        };
        let cfg = config.clone();
        let state = state.clone();

        tokio::spawn(async move {
            let _permit = permit;

            info!(
                request_id = job.request_id,
                num_words = job.num_words,
                confirmations = job.request_confirmations,
                "Fulfilling randomness request"
            );

            match fulfill_job(&cfg, &state, &job).await {
                Ok(FulfillOutcome::Fulfilled) => {
                    let latency_ms = job.enqueued_at.elapsed().as_millis() as u64;
                    state.metrics.record_latency(latency_ms);
                    info!(request_id = job.request_id, latency_ms, "Fulfilled successfully");
                }
                Ok(FulfillOutcome::Skipped(reason)) => {
                    warn!(
                        request_id = job.request_id,
                        reason = %reason,
                        "Skipping request (non-retryable)"
                    );
                }
                Err(e) => handle_fulfillment_error(job.request_id, e),
            }

            state.pending_count.fetch_sub(1, Ordering::Relaxed);
        });
    }

    info!("Oracle channel closed, shutting down fulfiller");
}

fn handle_fulfillment_error(request_id: RequestId, error: anyhow::Error) {
    error!(request_id, error = %format!("{error:#}"), "Failed to fulfill");
}

/// Wait out the confirmations, then compute, sign and deliver.
#[instrument(skip_all, fields(request_id = job.request_id))]
async fn fulfill_job(
    config: &FulfillerConfig,
    state: &AppState,
    job: &OracleJob,
) -> Result<FulfillOutcome> {
    let delay = config
        .confirmation_delay_ms
        .saturating_mul(u64::from(job.request_confirmations));
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let words = config
        .vrf_key
        .random_words(&job.seed, job.created_at, job.request_id, job.num_words);
    let signature = sign_fulfillment(&config.oracle_keypair, job.request_id, &words);

    let mut outcomes = state
        .fulfill(vec![SignedFulfillment {
            request_id: job.request_id,
            words,
            signature,
        }])
        .await?;

    outcomes
        .pop()
        .ok_or_else(|| anyhow::anyhow!("coordinator returned no outcome"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use rng_coordinator::memory::{InMemoryBank, SequentialOracle};
    use rng_coordinator::{
        CallContext, Coordinator, CoordinatorSettings, FulfillmentMode, FundingConfig,
        RandomnessParams,
    };
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signer;
    use std::time::Instant;

    #[tokio::test]
    async fn job_is_fulfilled_with_derived_words() {
        let owner = Pubkey::new_unique();
        let consumer = Pubkey::new_unique();
        let oracle_keypair = Arc::new(Keypair::new());
        let settings = CoordinatorSettings {
            owner,
            funding: FundingConfig {
                coordinator_address: oracle_keypair.pubkey(),
                key_hash: [0u8; 32],
                callback_gas_limit: 100_000,
                request_confirmations: 1,
                subscription_id: 0,
            },
            cooldown_window_secs: 30,
            fulfillment_mode: FulfillmentMode::Pull,
        };
        let oracle = SequentialOracle::starting_at(1);
        let mut coordinator =
            Coordinator::initialize(settings, oracle.clone(), InMemoryBank::default()).unwrap();
        coordinator
            .set_authorized_caller(&CallContext::new(owner, 100), consumer, true)
            .unwrap();
        let request_id = coordinator
            .request_random(
                &CallContext::new(consumer, 100),
                RandomnessParams {
                    beneficiary: Pubkey::new_unique(),
                    quantity: 2,
                    max_rarity_hint: 0,
                    commitment: Default::default(),
                },
            )
            .unwrap();
        let (_, submitted) = oracle.submissions().remove(0);

        let state = AppState::new(coordinator, None, Arc::new(Metrics::new()), 16, 300);
        let config = FulfillerConfig {
            oracle_keypair,
            vrf_key: VrfKey::new(b"secret").unwrap(),
            confirmation_delay_ms: 0,
            concurrency: 1,
        };
        let job = OracleJob {
            request_id,
            seed: submitted.seed,
            created_at: submitted.created_at,
            num_words: submitted.num_words,
            request_confirmations: submitted.request_confirmations,
            enqueued_at: Instant::now(),
        };

        let outcome = fulfill_job(&config, &state, &job).await.unwrap();
        assert_eq!(outcome, FulfillOutcome::Fulfilled);

        let expected = config
            .vrf_key
            .random_words(&submitted.seed, 100, request_id, 2);
        let result = state.read(|c| c.get_random_result(request_id)).await;
        assert!(result.fulfilled);
        assert_eq!(result.words, expected);

        let again = fulfill_job(&config, &state, &job).await.unwrap();
        assert!(!again.is_fulfilled());
    }
}
