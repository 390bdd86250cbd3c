//! Ed25519-signed envelopes for consumer/admin calls and oracle proofs.
//!
//! A consumer or admin call carries `{signer, signature, payload}`. `payload`
//! is a JSON string with an `issued_at` timestamp, a single-use `nonce` and the
//! call's fields, and the signature covers:
//!
//! ```text
//! "rng-coordinator:v1:<action>\n" || payload
//! ```
//!
//! Oracle fulfillments are signed over
//! [`rng_coordinator::oracle::fulfillment_message`].

use rng_coordinator::oracle::fulfillment_message;
use rng_coordinator::{RandomWord, RequestId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use std::str::FromStr;
use thiserror::Error;

const DOMAIN: &str = "rng-coordinator:v1";
const MAX_NONCE_LEN: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid signer {0}")]
    InvalidSigner(String),
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not match signer")]
    BadSignature,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("envelope issued at {issued_at} is outside the accepted window")]
    Stale { issued_at: i64 },
    #[error("envelope nonce was already used")]
    Replayed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub signer: String,
    pub signature: String,
    pub payload: String,
}

#[derive(Deserialize)]
struct Stamped<T> {
    issued_at: i64,
    nonce: String,
    #[serde(flatten)]
    body: T,
}

/// An envelope whose signature and freshness checked out.
///
/// It still has to be admitted once through [`Opened::replay_key`] before the
/// call runs.
#[derive(Debug)]
pub struct Opened<T> {
    pub signer: Pubkey,
    pub body: T,
    pub replay_key: String,
    /// Last moment the envelope passes the freshness check.
    pub expires_at: i64,
}

pub fn signing_message(action: &str, payload: &str) -> Vec<u8> {
    format!("{DOMAIN}:{action}\n{payload}").into_bytes()
}

fn decode_signature(text: &str) -> Result<Signature, AuthError> {
    let bytes = bs58::decode(text)
        .into_vec()
        .map_err(|_| AuthError::MalformedSignature)?;
    Signature::try_from(bytes.as_slice()).map_err(|_| AuthError::MalformedSignature)
}

impl SignedEnvelope {
    /// Verify the envelope for `action` and decode its body.
    ///
    /// The authenticated signer becomes the call's sender.
    pub fn open<T: DeserializeOwned>(
        &self,
        action: &str,
        now: i64,
        max_age_secs: i64,
    ) -> Result<Opened<T>, AuthError> {
        let signer = Pubkey::from_str(&self.signer)
            .map_err(|_| AuthError::InvalidSigner(self.signer.clone()))?;
        let signature = decode_signature(&self.signature)?;
        if !signature.verify(signer.as_ref(), &signing_message(action, &self.payload)) {
            return Err(AuthError::BadSignature);
        }

        let stamped: Stamped<T> = serde_json::from_str(&self.payload)
            .map_err(|e| AuthError::MalformedPayload(e.to_string()))?;
        if stamped.nonce.is_empty() || stamped.nonce.len() > MAX_NONCE_LEN {
            return Err(AuthError::MalformedPayload(format!(
                "nonce must be 1 to {MAX_NONCE_LEN} characters"
            )));
        }
        let max_age = max_age_secs.max(0);
        if now.abs_diff(stamped.issued_at) > max_age.unsigned_abs() {
            return Err(AuthError::Stale {
                issued_at: stamped.issued_at,
            });
        }

        Ok(Opened {
            signer,
            body: stamped.body,
            replay_key: format!("{signer}:{}", stamped.nonce),
            expires_at: stamped.issued_at.saturating_add(max_age),
        })
    }

    /// Client side: sign `payload` for `action`.
    #[cfg(test)]
    pub fn seal(keypair: &Keypair, action: &str, payload: String) -> Self {
        let signature = keypair.sign_message(&signing_message(action, &payload));
        Self {
            signer: keypair.pubkey().to_string(),
            signature: signature.to_string(),
            payload,
        }
    }
}

pub fn sign_fulfillment(keypair: &Keypair, request_id: RequestId, words: &[RandomWord]) -> String {
    keypair
        .sign_message(&fulfillment_message(request_id, words))
        .to_string()
}

pub fn verify_fulfillment(
    oracle: &Pubkey,
    request_id: RequestId,
    words: &[RandomWord],
    signature: &str,
) -> bool {
    decode_signature(signature)
        .map(|sig| sig.verify(oracle.as_ref(), &fulfillment_message(request_id, words)))
        .unwrap_or(false)
}
