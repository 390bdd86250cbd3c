//! Refund payout rail.
//!
//! The coordinator returns attached value through [`PayoutQueue`], which only
//! enqueues. A worker submits each payout as a SOL transfer from the treasury:
//!
//! 1. (Optional) A `set_compute_unit_price` instruction for priority fees.
//! 2. A system-program transfer from the treasury to the recipient.
//!
//! A payout that ultimately fails is handed back to the coordinator as held
//! value, recoverable by the owner.

use anyhow::{Context, Result};
use rng_coordinator::{TransferError, ValueTransfer};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::state::AppState;

const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::from_str_const("11111111111111111111111111111111");
const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ComputeBudget111111111111111111111111111111");

/// System program `Transfer` instruction index.
const SYSTEM_TRANSFER: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutOrder {
    pub to: Pubkey,
    pub lamports: u64,
}

/// [`ValueTransfer`] backed by the payout worker.
///
/// Without a treasury every transfer fails, so the coordinator holds the value.
#[derive(Clone, Default)]
pub struct PayoutQueue {
    orders: Option<mpsc::UnboundedSender<PayoutOrder>>,
}

impl PayoutQueue {
    pub fn new(orders: mpsc::UnboundedSender<PayoutOrder>) -> Self {
        Self {
            orders: Some(orders),
        }
    }

    /// Rail with no treasury behind it.
    pub fn disabled() -> Self {
        Self::default()
    }
}

impl ValueTransfer for PayoutQueue {
    fn transfer(&mut self, to: &Pubkey, amount: u64) -> Result<(), TransferError> {
        let Some(orders) = &self.orders else {
            return Err(TransferError("no treasury configured".into()));
        };
        orders
            .send(PayoutOrder {
                to: *to,
                lamports: amount,
            })
            .map_err(|_| TransferError("payout worker stopped".into()))
    }
}

/// Main payout loop. Orders are paid one at a time.
pub async fn run_payout_worker(
    config: AppConfig,
    treasury: Arc<Keypair>,
    mut rx: mpsc::UnboundedReceiver<PayoutOrder>,
    state: Arc<AppState>,
) {
    let rpc_client = RpcClient::new_with_commitment(
        config.rpc_url.clone(),
        CommitmentConfig::confirmed(),
    );

    while let Some(order) = rx.recv().await {
        match pay(&rpc_client, &config, &treasury, order).await {
            Ok(sig) => info!(
                to = %order.to,
                lamports = order.lamports,
                signature = %sig,
                explorer = %config.explorer_url(&sig),
                "Refund paid"
            ),
            Err(e) => {
                let reason = format!("{e:#}");
                state.metrics.record_payout_failure();
                error!(
                    to = %order.to,
                    lamports = order.lamports,
                    error = %reason,
                    "Refund payout failed"
                );
                state
                    .execute(|coordinator| {
                        coordinator.hold_undelivered_refund(order.to, order.lamports, reason)
                    })
                    .await;
            }
        }
    }

    info!("Payout channel closed, shutting down");
}

#[instrument(skip_all, fields(to = %order.to, lamports = order.lamports))]
async fn pay(
    rpc_client: &RpcClient,
    config: &AppConfig,
    treasury: &Keypair,
    order: PayoutOrder,
) -> Result<String> {
    let mut instructions = Vec::with_capacity(2);
    if config.priority_fee_micro_lamports > 0 {
        instructions.push(build_set_compute_unit_price_instruction(
            config.priority_fee_micro_lamports,
        ));
    }
    instructions.push(build_transfer_instruction(
        &treasury.pubkey(),
        &order.to,
        order.lamports,
    ));

    send_with_retries(rpc_client, config, treasury, &instructions).await
}

/// Send a transaction with exponential backoff on BlockhashNotFound.
async fn send_with_retries(
    rpc_client: &RpcClient,
    config: &AppConfig,
    payer: &Keypair,
    instructions: &[Instruction],
) -> Result<String> {
    let mut retry_delay = Duration::from_millis(config.initial_retry_delay_ms);

    for attempt in 0..config.max_retries {
        let blockhash = rpc_client
            .get_latest_blockhash()
            .await
            .context("failed to fetch latest blockhash")?;

        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&payer.pubkey()),
            &[payer],
            blockhash,
        );

        match rpc_client.send_and_confirm_transaction(&tx).await {
            Ok(sig) => return Ok(sig.to_string()),
            Err(e)
                if e.to_string().contains("BlockhashNotFound")
                    && attempt + 1 < config.max_retries =>
            {
                warn!(
                    attempt = attempt + 1,
                    delay = ?retry_delay,
                    "BlockhashNotFound, retrying"
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay = retry_delay.saturating_mul(2).min(Duration::from_secs(60));
            }
            Err(e) => return Err(e).context("send_and_confirm_transaction failed"),
        }
    }

    anyhow::bail!("max retries ({}) exceeded", config.max_retries)
}

/// Build a system-program `Transfer`: `u32 LE index || u64 LE lamports`.
fn build_transfer_instruction(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

/// Build a `SetComputeUnitPrice` instruction.
fn build_set_compute_unit_price_instruction(micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(3u8);
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_instruction_layout() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let ix = build_transfer_instruction(&from, &to, 1_500);

        assert_eq!(ix.program_id, SYSTEM_PROGRAM_ID);
        assert_eq!(&ix.data[..4], &2u32.to_le_bytes());
        assert_eq!(&ix.data[4..], &1_500u64.to_le_bytes());
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert!(!ix.accounts[1].is_signer && ix.accounts[1].is_writable);
    }

    #[test]
    fn priority_fee_instruction_layout() {
        let ix = build_set_compute_unit_price_instruction(42);
        assert_eq!(ix.data[0], 3);
        assert_eq!(&ix.data[1..], &42u64.to_le_bytes());
    }

    #[test]
    fn disabled_rail_refuses_transfers() {
        let mut queue = PayoutQueue::disabled();
        assert!(queue.transfer(&Pubkey::new_unique(), 10).is_err());
    }

    #[tokio::test]
    async fn enabled_rail_enqueues_orders() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut queue = PayoutQueue::new(tx);
        let to = Pubkey::new_unique();

        queue.transfer(&to, 10).unwrap();
        assert_eq!(rx.recv().await, Some(PayoutOrder { to, lamports: 10 }));
    }
}
