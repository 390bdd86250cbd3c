//! Deterministic VRF output computation.
//!
//! Uses HMAC-SHA256 keyed by the oracle's secret to produce a 32-byte
//! pseudo-random output that is deterministic (same inputs = same output)
//! but unpredictable without the secret key.

use anyhow::{Result, anyhow};
use hmac::{Hmac, Mac};
use rng_coordinator::RandomWord;
use rng_coordinator::oracle::expand_randomness;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Oracle secret, keyed once at startup.
#[derive(Clone)]
pub struct VrfKey {
    mac: HmacSha256,
}

impl VrfKey {
    pub fn new(hmac_secret: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(hmac_secret)
            .map_err(|e| anyhow!("invalid HMAC secret: {e}"))?;
        Ok(Self { mac })
    }

    /// Compute the 32-byte VRF output for a given randomness request.
    ///
    /// ```text
    /// output = HMAC-SHA256(secret, seed || created_at_le || request_id_le)
    /// ```
    ///
    /// The coordinator-derived `seed` prevents the oracle from pre-computing
    /// outputs, `created_at` binds the output to submission time, and
    /// `request_id` ensures uniqueness across requests.
    pub fn compute_randomness(
        &self,
        seed: &[u8; 32],
        created_at: i64,
        request_id: u64,
    ) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(seed);
        mac.update(&created_at.to_le_bytes());
        mac.update(&request_id.to_le_bytes());
        mac.finalize().into_bytes().into()
    }

    /// VRF output expanded into `num_words` words.
    pub fn random_words(
        &self,
        seed: &[u8; 32],
        created_at: i64,
        request_id: u64,
        num_words: u32,
    ) -> Vec<RandomWord> {
        let base = self.compute_randomness(seed, created_at, request_id);
        expand_randomness(&base, num_words)
    }
}
