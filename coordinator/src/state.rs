use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;

use crate::authorization::AuthorizationLedger;
use crate::encoding::{self, bytes32, pubkey, pubkey_map};
use crate::rate_limit::RateLimiter;
use crate::registry::RequestRegistry;

/// Oracle-assigned request identifier.
pub type RequestId = u64;

/// Maximum number of words a single request may ask for.
pub const MAX_BATCH: u32 = 25;

/// Upper bound for the callback gas forwarded to the oracle, after scaling by quantity.
pub const MAX_CALLBACK_GAS_LIMIT: u32 = 2_500_000;

/// Upper bound for block confirmations the oracle waits before answering.
pub const MAX_REQUEST_CONFIRMATIONS: u16 = 200;

pub const DEFAULT_COOLDOWN_WINDOW_SECS: i64 = 30;

/// One 256-bit random value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RandomWord(pub [u8; 32]);

impl RandomWord {
    /// First 8 bytes as a little-endian integer, for consumers that only need a small range.
    pub fn as_u64(&self) -> u64 {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(low)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for RandomWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::encode_bytes32(&self.0))
    }
}

impl fmt::Debug for RandomWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomWord({self})")
    }
}

impl Serialize for RandomWord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bytes32::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for RandomWord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bytes32::deserialize(deserializer).map(RandomWord)
    }
}

/// Opaque correlation token chosen by the requester.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Commitment used by entry points that predate commitments.
    pub const ZERO: Commitment = Commitment([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::encode_bytes32(&self.0))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({self})")
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        bytes32::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bytes32::deserialize(deserializer).map(Commitment)
    }
}

/// A randomness request, one per oracle-assigned ID.
///
/// Lifecycle: pending (`fulfilled == false`, no words) -> fulfilled. Records
/// are never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomRequest {
    pub request_id: RequestId,
    /// Consumer that submitted the request.
    #[serde(with = "pubkey")]
    pub requester: Pubkey,
    /// End user the randomness is for.
    #[serde(with = "pubkey")]
    pub beneficiary: Pubkey,
    /// Number of words requested.
    pub quantity: u32,
    /// Passed through for the consumer; the coordinator does not interpret it.
    pub max_rarity_hint: u8,
    pub commitment: Commitment,
    /// Unix timestamp of submission.
    pub created_at: i64,
    pub fulfilled: bool,
    /// Empty until fulfilled, then exactly `quantity` words.
    pub random_words: Vec<RandomWord>,
    pub fulfilled_at: Option<i64>,
}

impl RandomRequest {
    pub fn is_pending(&self) -> bool {
        !self.fulfilled
    }
}

/// Allow-list entry for a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedCaller {
    #[serde(with = "pubkey")]
    pub address: Pubkey,
    pub enabled: bool,
    pub updated_at: i64,
}

/// Per-beneficiary cooldown bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    pub last_request_at: i64,
}

/// Static parameters forwarded to the oracle on every submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingConfig {
    /// The oracle coordinator; the only address allowed to deliver fulfillments.
    #[serde(with = "pubkey")]
    pub coordinator_address: Pubkey,
    #[serde(with = "bytes32")]
    pub key_hash: [u8; 32],
    /// Callback gas per requested word.
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
    pub subscription_id: u64,
}

/// How consumers learn about fulfillments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentMode {
    /// Consumers poll the result accessors.
    #[default]
    Pull,
    /// Registered consumer hooks are invoked after each fulfillment.
    Push,
}

/// Accounting for value attached by legacy callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedValueLedger {
    /// All value ever attached, whether returned or held.
    pub total_received: u64,
    #[serde(with = "pubkey_map")]
    pub per_sender_received: HashMap<Pubkey, u64>,
    /// Value whose return failed and awaits an admin withdrawal.
    pub total_held: u64,
    #[serde(with = "pubkey_map")]
    pub held_by_sender: HashMap<Pubkey, u64>,
}

impl UnusedValueLedger {
    pub fn record_received(&mut self, sender: Pubkey, amount: u64) {
        self.total_received = self.total_received.saturating_add(amount);
        let entry = self.per_sender_received.entry(sender).or_default();
        *entry = entry.saturating_add(amount);
    }

    pub fn hold(&mut self, sender: Pubkey, amount: u64) {
        self.total_held = self.total_held.saturating_add(amount);
        let entry = self.held_by_sender.entry(sender).or_default();
        *entry = entry.saturating_add(amount);
    }

    pub fn held_for(&self, sender: &Pubkey) -> u64 {
        self.held_by_sender.get(sender).copied().unwrap_or(0)
    }

    pub fn received_from(&self, sender: &Pubkey) -> u64 {
        self.per_sender_received.get(sender).copied().unwrap_or(0)
    }

    /// Release `amount` held for `sender`. Caller checks the amount first.
    pub(crate) fn release(&mut self, sender: &Pubkey, amount: u64) {
        if let Some(held) = self.held_by_sender.get_mut(sender) {
            *held = held.saturating_sub(amount);
            if *held == 0 {
                self.held_by_sender.remove(sender);
            }
        }
        self.total_held = self.total_held.saturating_sub(amount);
    }

    pub(crate) fn release_all(&mut self) -> u64 {
        let total = self.total_held;
        self.total_held = 0;
        self.held_by_sender.clear();
        total
    }
}

/// Parameters supplied once at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    #[serde(with = "pubkey")]
    pub owner: Pubkey,
    pub funding: FundingConfig,
    pub cooldown_window_secs: i64,
    #[serde(default)]
    pub fulfillment_mode: FulfillmentMode,
}

/// Everything the coordinator persists. Adapters (oracle, value rail, hooks)
/// are supplied by the host and are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorState {
    #[serde(with = "pubkey")]
    pub owner: Pubkey,
    pub funding: FundingConfig,
    pub fulfillment_mode: FulfillmentMode,
    pub authorization: AuthorizationLedger,
    pub rate_limiter: RateLimiter,
    pub ledger: UnusedValueLedger,
    pub registry: RequestRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_as_u64_reads_low_bytes() {
        let mut bytes = [0u8; 32];
        bytes[0] = 6;
        bytes[1] = 1;
        bytes[31] = 0xFF;
        assert_eq!(RandomWord(bytes).as_u64(), 0x0106);
    }

    #[test]
    fn ledger_hold_and_release() {
        let sender = Pubkey::new_unique();
        let mut ledger = UnusedValueLedger::default();

        ledger.record_received(sender, 10);
        ledger.hold(sender, 10);
        ledger.hold(sender, 5);
        assert_eq!(ledger.total_received, 10);
        assert_eq!(ledger.held_for(&sender), 15);

        ledger.release(&sender, 15);
        assert_eq!(ledger.total_held, 0);
        assert!(ledger.held_by_sender.is_empty());
        assert_eq!(ledger.received_from(&sender), 10);
    }

    #[test]
    fn fulfillment_mode_serializes_lowercase() {
        let text = serde_json::to_string(&FulfillmentMode::Push).unwrap();
        assert_eq!(text, "\"push\"");
    }
}
