//! Application configuration loaded from environment variables.
//!
//! Required: `OWNER_PUBKEY`, `HMAC_SECRET`
//! Optional: `ORACLE_KEYPAIR_PATH`, `HTTP_PORT`, `COOLDOWN_WINDOW_SECS`,
//!           `KEY_HASH`, `CALLBACK_GAS_LIMIT`, `REQUEST_CONFIRMATIONS`,
//!           `SUBSCRIPTION_ID`, `FULFILLMENT_MODE`, `CONFIRMATION_DELAY_MS`,
//!           `FULFILLMENT_CONCURRENCY`, `ORACLE_QUEUE_CAPACITY`,
//!           `AUTHORIZED_CALLERS`, `CONSUMER_HOOKS`, `HOOK_TIMEOUT_MS`,
//!           `SNAPSHOT_PATH`, `RPC_URL`, `TREASURY_KEYPAIR_PATH`,
//!           `MAX_RETRIES`, `INITIAL_RETRY_DELAY_MS`,
//!           `PRIORITY_FEE_MICRO_LAMPORTS`, `CLUSTER`,
//!           `MAX_SIGNATURE_AGE_SECS`, `EVENT_LOG_CAPACITY`,
//!           `MAX_DEPOSIT_AGE_SECS`, `REPLAY_CACHE_CAPACITY`

use anyhow::{Context, Result, bail};
use rng_coordinator::encoding::decode_bytes32;
use rng_coordinator::state::DEFAULT_COOLDOWN_WINDOW_SECS;
use rng_coordinator::{CoordinatorSettings, FulfillmentMode, FundingConfig};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer, read_keypair_file};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Application configuration for the coordinator service.
#[derive(Clone)]
pub struct AppConfig {
    /// Owner of the coordinator; the only signer allowed on admin routes.
    pub owner: Pubkey,
    /// Ed25519 keypair of the in-process oracle. Its public key is the
    /// trusted fulfillment sender.
    pub oracle_keypair: Arc<Keypair>,
    /// Secret key for HMAC-SHA256 randomness generation.
    pub hmac_secret: Vec<u8>,
    /// HTTP server port.
    pub http_port: u16,
    pub cooldown_window_secs: i64,
    pub key_hash: [u8; 32],
    /// Callback gas per requested word.
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
    pub subscription_id: u64,
    pub fulfillment_mode: FulfillmentMode,
    /// Simulated wait per confirmation before the oracle answers.
    pub confirmation_delay_ms: u64,
    /// Maximum concurrent fulfillment tasks.
    pub fulfillment_concurrency: usize,
    /// Capacity of the oracle job queue. A full queue rejects submissions.
    pub oracle_queue_capacity: usize,
    /// Callers enabled at startup.
    pub authorized_callers: Vec<Pubkey>,
    /// Push-mode webhooks, keyed by consumer address.
    pub consumer_hooks: Vec<(Pubkey, String)>,
    pub hook_timeout_ms: u64,
    /// Where the coordinator state is persisted, if anywhere.
    pub snapshot_path: Option<PathBuf>,
    /// Solana JSON-RPC endpoint used for refund payouts.
    pub rpc_url: String,
    /// Treasury that pays refunds. Without it every refund is held.
    pub treasury_keypair: Option<Arc<Keypair>>,
    /// Maximum send attempts per payout.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Priority fee in micro-lamports per compute unit.
    pub priority_fee_micro_lamports: u64,
    /// Cluster name for explorer URLs.
    pub cluster: String,
    /// Signed envelopes whose `issued_at` is further than this from now are rejected.
    pub max_signature_age_secs: i64,
    /// Number of events kept for `/v1/events`.
    pub event_log_capacity: usize,
    /// Treasury deposits older than this cannot back attached value.
    pub max_deposit_age_secs: i64,
    /// Envelope nonces remembered at once. Signed calls get 503 past it.
    pub replay_cache_capacity: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn read_keypair(path: &str) -> Result<Keypair> {
    let path = shellexpand::tilde(path).to_string();
    read_keypair_file(&path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("failed to read keypair from {path}"))
}

fn parse_pubkey_list(raw: &str) -> Result<Vec<Pubkey>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Pubkey::from_str(s).with_context(|| format!("invalid pubkey: {s}")))
        .collect()
}

/// `pubkey=url` pairs separated by commas.
fn parse_hooks(raw: &str) -> Result<Vec<(Pubkey, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let Some((consumer, url)) = entry.split_once('=') else {
                bail!("invalid hook entry {entry}, expected pubkey=url");
            };
            let consumer = Pubkey::from_str(consumer.trim())
                .with_context(|| format!("invalid hook consumer: {consumer}"))?;
            Ok((consumer, url.trim().to_string()))
        })
        .collect()
}

fn parse_mode(raw: &str) -> Result<FulfillmentMode> {
    match raw.to_ascii_lowercase().as_str() {
        "pull" => Ok(FulfillmentMode::Pull),
        "push" => Ok(FulfillmentMode::Push),
        other => bail!("invalid FULFILLMENT_MODE: {other}"),
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let owner_str = std::env::var("OWNER_PUBKEY").context("OWNER_PUBKEY env var must be set")?;
        let owner = Pubkey::from_str(&owner_str)
            .with_context(|| format!("invalid OWNER_PUBKEY: {owner_str}"))?;

        let hmac_secret = std::env::var("HMAC_SECRET")
            .context("HMAC_SECRET env var must be set")?
            .into_bytes();

        let keypair_path = std::env::var("ORACLE_KEYPAIR_PATH")
            .unwrap_or_else(|_| "~/.config/solana/id.json".into());
        let oracle_keypair = read_keypair(&keypair_path)?;

        let treasury_keypair = match std::env::var("TREASURY_KEYPAIR_PATH") {
            Ok(path) => Some(Arc::new(read_keypair(&path)?)),
            Err(_) => None,
        };

        let key_hash = match std::env::var("KEY_HASH") {
            Ok(raw) => decode_bytes32(&raw)
                .with_context(|| format!("invalid KEY_HASH: {raw}, expected 32 bytes base58"))?,
            Err(_) => [0u8; 32],
        };

        let fulfillment_mode = match std::env::var("FULFILLMENT_MODE") {
            Ok(raw) => parse_mode(&raw)?,
            Err(_) => FulfillmentMode::Pull,
        };

        let authorized_callers = match std::env::var("AUTHORIZED_CALLERS") {
            Ok(raw) => parse_pubkey_list(&raw).context("invalid AUTHORIZED_CALLERS")?,
            Err(_) => Vec::new(),
        };

        let consumer_hooks = match std::env::var("CONSUMER_HOOKS") {
            Ok(raw) => parse_hooks(&raw).context("invalid CONSUMER_HOOKS")?,
            Err(_) => Vec::new(),
        };

        let snapshot_path = std::env::var("SNAPSHOT_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(|p| PathBuf::from(shellexpand::tilde(&p).to_string()));

        Ok(Self {
            owner,
            oracle_keypair: Arc::new(oracle_keypair),
            hmac_secret,
            http_port: env_or("HTTP_PORT", 8080),
            cooldown_window_secs: env_or("COOLDOWN_WINDOW_SECS", DEFAULT_COOLDOWN_WINDOW_SECS),
            key_hash,
            callback_gas_limit: env_or("CALLBACK_GAS_LIMIT", 100_000),
            request_confirmations: env_or("REQUEST_CONFIRMATIONS", 3),
            subscription_id: env_or("SUBSCRIPTION_ID", 0),
            fulfillment_mode,
            confirmation_delay_ms: env_or("CONFIRMATION_DELAY_MS", 400),
            fulfillment_concurrency: env_or("FULFILLMENT_CONCURRENCY", 4usize).max(1),
            oracle_queue_capacity: env_or("ORACLE_QUEUE_CAPACITY", 256usize).max(1),
            authorized_callers,
            consumer_hooks,
            hook_timeout_ms: env_or("HOOK_TIMEOUT_MS", 3_000),
            snapshot_path,
            rpc_url: std::env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8899".into()),
            treasury_keypair,
            max_retries: env_or("MAX_RETRIES", 5u32).max(1),
            initial_retry_delay_ms: env_or("INITIAL_RETRY_DELAY_MS", 500),
            priority_fee_micro_lamports: env_or("PRIORITY_FEE_MICRO_LAMPORTS", 0),
            cluster: std::env::var("CLUSTER").unwrap_or_else(|_| "devnet".into()),
            max_signature_age_secs: env_or("MAX_SIGNATURE_AGE_SECS", 300),
            event_log_capacity: env_or("EVENT_LOG_CAPACITY", 1024usize).max(1),
            max_deposit_age_secs: env_or("MAX_DEPOSIT_AGE_SECS", 600i64).max(0),
            replay_cache_capacity: env_or("REPLAY_CACHE_CAPACITY", 100_000usize).max(1),
        })
    }

    /// Initial coordinator settings. The oracle keypair is the trusted fulfillment sender.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            owner: self.owner,
            funding: FundingConfig {
                coordinator_address: self.oracle_keypair.pubkey(),
                key_hash: self.key_hash,
                callback_gas_limit: self.callback_gas_limit,
                request_confirmations: self.request_confirmations,
                subscription_id: self.subscription_id,
            },
            cooldown_window_secs: self.cooldown_window_secs,
            fulfillment_mode: self.fulfillment_mode,
        }
    }

    /// Return the Solscan explorer URL for a given transaction signature.
    pub fn explorer_url(&self, signature: &str) -> String {
        match self.cluster.as_str() {
            "mainnet-beta" => format!("https://solscan.io/tx/{signature}"),
            cluster => format!("https://solscan.io/tx/{signature}?cluster={cluster}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_pairs_are_parsed() {
        let consumer = Pubkey::new_unique();
        let raw = format!(" {consumer}=https://game.example/hook ,");
        let hooks = parse_hooks(&raw).unwrap();
        assert_eq!(hooks, vec![(consumer, "https://game.example/hook".to_string())]);
    }

    #[test]
    fn malformed_hook_entry_is_rejected() {
        assert!(parse_hooks("not-a-pair").is_err());
    }

    #[test]
    fn caller_list_skips_blanks() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let callers = parse_pubkey_list(&format!("{a}, ,{b}")).unwrap();
        assert_eq!(callers, vec![a, b]);
    }

    #[test]
    fn mode_is_case_insensitive() {
        assert_eq!(parse_mode("PUSH").unwrap(), FulfillmentMode::Push);
        assert!(parse_mode("webhook").is_err());
    }
}
