use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::encoding::{bytes32, pubkey};
use crate::funding::EntryPoint;
use crate::state::{FulfillmentMode, RandomWord, RequestId};

/// Emitted when a request has been submitted to the oracle and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomRequested {
    pub request_id: RequestId,
    #[serde(with = "pubkey")]
    pub requester: Pubkey,
    #[serde(with = "pubkey")]
    pub beneficiary: Pubkey,
    pub quantity: u32,
}

/// Emitted when the oracle's words have been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomWordsFulfilled {
    pub request_id: RequestId,
    pub words: Vec<RandomWord>,
}

/// Emitted whenever a caller attaches value that the subscription model does not need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedValueReceived {
    #[serde(with = "pubkey")]
    pub sender: Pubkey,
    pub amount: u64,
    pub entry_point: EntryPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRefunded {
    #[serde(with = "pubkey")]
    pub to: Pubkey,
    pub amount: u64,
}

/// Emitted when returning value failed and the amount moved into the held ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundFailed {
    #[serde(with = "pubkey")]
    pub sender: Pubkey,
    pub amount: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedCallerUpdated {
    #[serde(with = "pubkey")]
    pub address: Pubkey,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingConfigUpdated {
    #[serde(with = "bytes32")]
    pub key_hash: [u8; 32],
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransferred {
    #[serde(with = "pubkey")]
    pub previous_owner: Pubkey,
    #[serde(with = "pubkey")]
    pub new_owner: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldValueReleased {
    #[serde(with = "pubkey")]
    pub to: Pubkey,
    pub amount: u64,
}

/// Emitted when a push-mode consumer hook failed; the fulfillment itself stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerHookFailed {
    pub request_id: RequestId,
    #[serde(with = "pubkey")]
    pub consumer: Pubkey,
    pub reason: String,
}

/// Every event the coordinator emits, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    RandomRequested(RandomRequested),
    RandomWordsFulfilled(RandomWordsFulfilled),
    UnusedValueReceived(UnusedValueReceived),
    ValueRefunded(ValueRefunded),
    RefundFailed(RefundFailed),
    AuthorizedCallerUpdated(AuthorizedCallerUpdated),
    FundingConfigUpdated(FundingConfigUpdated),
    CooldownWindowUpdated { window_secs: i64 },
    FulfillmentModeUpdated { mode: FulfillmentMode },
    OwnershipTransferred(OwnershipTransferred),
    EmergencyWithdrawal(HeldValueReleased),
    ManualRefund(HeldValueReleased),
    ConsumerHookFailed(ConsumerHookFailed),
}

impl CoordinatorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CoordinatorEvent::RandomRequested(_) => "RandomRequested",
            CoordinatorEvent::RandomWordsFulfilled(_) => "RandomWordsFulfilled",
            CoordinatorEvent::UnusedValueReceived(_) => "UnusedValueReceived",
            CoordinatorEvent::ValueRefunded(_) => "ValueRefunded",
            CoordinatorEvent::RefundFailed(_) => "RefundFailed",
            CoordinatorEvent::AuthorizedCallerUpdated(_) => "AuthorizedCallerUpdated",
            CoordinatorEvent::FundingConfigUpdated(_) => "FundingConfigUpdated",
            CoordinatorEvent::CooldownWindowUpdated { .. } => "CooldownWindowUpdated",
            CoordinatorEvent::FulfillmentModeUpdated { .. } => "FulfillmentModeUpdated",
            CoordinatorEvent::OwnershipTransferred(_) => "OwnershipTransferred",
            CoordinatorEvent::EmergencyWithdrawal(_) => "EmergencyWithdrawal",
            CoordinatorEvent::ManualRefund(_) => "ManualRefund",
            CoordinatorEvent::ConsumerHookFailed(_) => "ConsumerHookFailed",
        }
    }
}
