//! Outbound side of the oracle bridge, plus the shared word derivation and
//! proof-message layout used by oracle implementations.

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::state::{Commitment, FundingConfig, RandomWord, RequestId, MAX_CALLBACK_GAS_LIMIT};

/// Parameters handed to the oracle for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub request_confirmations: u16,
    /// Already scaled by `num_words` and capped.
    pub callback_gas_limit: u32,
    pub num_words: u32,
    /// Entropy mixed into the VRF input. Derived from the commitment, never the commitment itself.
    pub seed: [u8; 32],
    /// Submission time; part of the VRF input on oracles that bind to it.
    pub created_at: i64,
}

impl OracleRequest {
    pub(crate) fn new(
        funding: &FundingConfig,
        num_words: u32,
        seed: [u8; 32],
        created_at: i64,
    ) -> Self {
        Self {
            key_hash: funding.key_hash,
            subscription_id: funding.subscription_id,
            request_confirmations: funding.request_confirmations,
            callback_gas_limit: scaled_callback_gas(funding.callback_gas_limit, num_words),
            num_words,
            seed,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle rejected request: {0}")]
    Rejected(String),
}

/// Submission side of the external VRF service.
///
/// The returned ID is assigned by the oracle and later echoed back in the
/// fulfillment callback.
pub trait RandomnessOracle: Send {
    fn request_random_words(&mut self, request: &OracleRequest) -> Result<RequestId, OracleError>;
}

/// Callback gas for a bundle: per-word limit times word count, capped.
pub fn scaled_callback_gas(per_word: u32, num_words: u32) -> u32 {
    per_word
        .saturating_mul(num_words)
        .min(MAX_CALLBACK_GAS_LIMIT)
}

/// `seed = SHA256(requester || beneficiary || commitment || created_at_le)`
pub fn derive_seed(
    requester: &Pubkey,
    beneficiary: &Pubkey,
    commitment: &Commitment,
    created_at: i64,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(requester.as_ref());
    hasher.update(beneficiary.as_ref());
    hasher.update(commitment.as_bytes());
    hasher.update(created_at.to_le_bytes());
    hasher.finalize().into()
}

/// Expand base randomness into multiple words: `word[i] = SHA256(randomness || i_le_bytes)`.
pub fn expand_randomness(base_randomness: &[u8; 32], num_words: u32) -> Vec<RandomWord> {
    (0..num_words)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(base_randomness);
            hasher.update(i.to_le_bytes());
            RandomWord(hasher.finalize().into())
        })
        .collect()
}

/// Message the oracle signs for a fulfillment:
///
/// ```text
/// request_id (8 LE) || word_0 (32) || ... || word_n (32)
/// ```
pub fn fulfillment_message(request_id: RequestId, words: &[RandomWord]) -> Vec<u8> {
    let mut message = Vec::with_capacity(8 + 32 * words.len());
    message.extend_from_slice(&request_id.to_le_bytes());
    for word in words {
        message.extend_from_slice(&word.0);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_scales_with_quantity_and_caps() {
        assert_eq!(scaled_callback_gas(100_000, 5), 500_000);
        assert_eq!(scaled_callback_gas(200_000, 25), MAX_CALLBACK_GAS_LIMIT);
        assert_eq!(scaled_callback_gas(u32::MAX, 2), MAX_CALLBACK_GAS_LIMIT);
    }

    #[test]
    fn expansion_is_deterministic_and_distinct() {
        let base = [42u8; 32];
        let words = expand_randomness(&base, 3);

        assert_eq!(words.len(), 3);
        assert_eq!(words, expand_randomness(&base, 3));
        assert_ne!(words[0], words[1]);
        assert_ne!(words[1], words[2]);
    }

    #[test]
    fn seed_hides_commitment() {
        let requester = Pubkey::new_unique();
        let beneficiary = Pubkey::new_unique();
        let commitment = Commitment([3u8; 32]);

        let seed = derive_seed(&requester, &beneficiary, &commitment, 1_000);
        assert_ne!(&seed, commitment.as_bytes());
        assert_ne!(seed, derive_seed(&requester, &beneficiary, &commitment, 1_001));
    }

    #[test]
    fn message_layout() {
        let words = vec![RandomWord([1u8; 32]), RandomWord([2u8; 32])];
        let message = fulfillment_message(9, &words);

        assert_eq!(message.len(), 8 + 64);
        assert_eq!(&message[..8], &9u64.to_le_bytes());
        assert_eq!(&message[8..40], &[1u8; 32]);
        assert_eq!(&message[40..], &[2u8; 32]);
    }
}
