//! Randomness Coordinator Service
//!
//! Hosts the randomness request coordinator behind an HTTP API. Runs four
//! concurrent subsystems:
//!
//! - **HTTP server**: signed consumer/admin calls, oracle callbacks, queries
//!   and the `/health`, `/status`, `/metrics` endpoints.
//! - **Fulfiller**: the in-process VRF oracle answering queued requests.
//! - **Payout worker**: returns attached value from the treasury.
//! - **Webhook notifier**: push-mode delivery to consumers.

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use rng_coordinator::{CallContext, Coordinator};
use solana_sdk::signature::Signer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod api;
mod config;
mod deposits;
mod error;
mod event_log;
mod fulfiller;
mod hooks;
mod metrics;
mod oracle;
mod payout;
mod replay;
mod signing;
mod snapshot;
mod state;
mod vrf;

use config::AppConfig;
use deposits::{Custody, RpcDeposits};
use fulfiller::FulfillerConfig;
use hooks::WebhookHook;
use metrics::Metrics;
use oracle::{LocalVrfOracle, OracleJob};
use payout::PayoutQueue;
use snapshot::{SnapshotStore, ensure_oracle_identity};
use state::{AppState, unix_now};
use vrf::VrfKey;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,solana_client=warn,solana_rpc_client=warn,hyper=warn,reqwest=warn")
        }))
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let vrf_key = VrfKey::new(&config.hmac_secret)?;

    info!(
        owner = %config.owner,
        oracle = %config.oracle_keypair.pubkey(),
        mode = ?config.fulfillment_mode,
        "Starting randomness coordinator"
    );

    let snapshot = config.snapshot_path.clone().map(SnapshotStore::new);
    let restored = match &snapshot {
        Some(store) => {
            info!(path = %store.path().display(), "Snapshot persistence enabled");
            store.load().await?
        }
        None => None,
    };
    if let Some(restored) = &restored {
        ensure_oracle_identity(&restored.coordinator, &config.oracle_keypair.pubkey())?;
    }

    // Resume ID assignment after the largest persisted request.
    let next_id = restored
        .as_ref()
        .and_then(|snapshot| snapshot.coordinator.registry.max_request_id())
        .map_or(1, |id| id.saturating_add(1));
    let (job_tx, job_rx) = mpsc::channel(config.oracle_queue_capacity);
    let oracle = LocalVrfOracle::new(next_id, job_tx.clone());

    let (payout_tx, payout_rx) = mpsc::unbounded_channel();
    let (bank, custody) = match &config.treasury_keypair {
        Some(treasury) => {
            let lookup = Arc::new(RpcDeposits::new(config.rpc_url.clone()));
            let custody = Custody::new(treasury.pubkey(), lookup, config.max_deposit_age_secs);
            info!(
                treasury = %custody.treasury(),
                rpc = %config.rpc_url,
                "Deposits and refund payouts enabled"
            );
            (PayoutQueue::new(payout_tx), Some(custody))
        }
        None => {
            warn!("No TREASURY_KEYPAIR_PATH set, calls attaching value will be refused");
            (PayoutQueue::disabled(), None)
        }
    };

    let (mut coordinator, seen) = match restored {
        Some(snapshot) => {
            info!(
                requests = snapshot.coordinator.registry.len(),
                next_id,
                nonces = snapshot.envelopes.len(),
                deposits = snapshot.deposits.len(),
                "Restored coordinator snapshot"
            );
            let coordinator = Coordinator::restore(snapshot.coordinator, oracle, bank);
            (coordinator, Some((snapshot.envelopes, snapshot.deposits)))
        }
        None => {
            let coordinator = Coordinator::initialize(config.coordinator_settings(), oracle, bank)
                .context("failed to initialize coordinator")?;
            (coordinator, None)
        }
    };

    let metrics = Arc::new(Metrics::new());
    let (hook_tx, hook_rx) = mpsc::channel(config.oracle_queue_capacity);
    for (consumer, url) in &config.consumer_hooks {
        info!(%consumer, %url, "Registered consumer webhook");
        let hook = WebhookHook::new(url.as_str(), hook_tx.clone());
        coordinator.register_hook(*consumer, Arc::new(hook));
    }
    drop(hook_tx);

    let mut app_state = AppState::new(
        coordinator,
        snapshot,
        metrics.clone(),
        config.event_log_capacity,
        config.max_signature_age_secs,
    )
    .with_replay_capacity(config.replay_cache_capacity);
    if let Some(custody) = custody {
        app_state = app_state.with_custody(custody);
    }
    if let Some((envelopes, deposits)) = seen {
        app_state = app_state.with_seen(envelopes, deposits);
    }
    let state = Arc::new(app_state);

    let now = unix_now();
    for caller in &config.authorized_callers {
        let already_enabled = state
            .read(|c| c.authorized_caller(caller).is_some_and(|entry| entry.enabled))
            .await;
        if already_enabled {
            continue;
        }
        state
            .execute(|c| c.set_authorized_caller(&CallContext::new(c.owner(), now), *caller, true))
            .await
            .with_context(|| format!("failed to enable caller {caller}"))?;
    }

    // Background: answer queued oracle jobs.
    let fulfiller_config = FulfillerConfig {
        oracle_keypair: config.oracle_keypair.clone(),
        vrf_key,
        confirmation_delay_ms: config.confirmation_delay_ms,
        concurrency: config.fulfillment_concurrency,
    };
    let fulfiller_state = state.clone();
    tokio::spawn(async move {
        fulfiller::run_fulfiller(fulfiller_config, job_rx, fulfiller_state).await;
    });

    // Re-queue requests that were still pending when the service stopped.
    let pending: Vec<OracleJob> = state
        .read(|c| {
            let confirmations = c.funding_config().request_confirmations;
            c.pending_requests()
                .into_iter()
                .map(|request| OracleJob::for_pending(request, confirmations))
                .collect()
        })
        .await;
    if !pending.is_empty() {
        info!(count = pending.len(), "Re-queueing pending requests");
    }
    for job in pending {
        job_tx.send(job).await.context("oracle queue closed during catch-up")?;
    }
    drop(job_tx);

    // Background: pay refunds from the treasury.
    if let Some(treasury) = config.treasury_keypair.clone() {
        let payout_config = config.clone();
        let payout_state = state.clone();
        tokio::spawn(async move {
            payout::run_payout_worker(payout_config, treasury, payout_rx, payout_state).await;
        });
    }

    // Background: deliver push-mode webhooks.
    let hook_timeout = Duration::from_millis(config.hook_timeout_ms);
    tokio::spawn(async move {
        hooks::run_notifier(hook_rx, hook_timeout, metrics).await;
    });

    let addr = ("0.0.0.0", config.http_port);
    info!(addr = %format!("{}:{}", addr.0, addr.1), "Starting HTTP server");

    let data = web::Data::from(state);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(api::configure))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
