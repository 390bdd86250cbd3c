use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::state::RequestId;

/// Error codes for the randomness coordinator.
///
/// Submission paths fail fast with these and leave no state behind. The oracle
/// callback path reports the request-state variants as skip reasons instead of
/// failing (see [`crate::FulfillOutcome`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Signer is not allowed to perform this call (not an enabled caller, not
    /// the owner, or not the trusted oracle address).
    #[error("permission denied for {signer}")]
    PermissionDenied { signer: Pubkey },

    /// The beneficiary's cooldown window has not elapsed. Retryable.
    #[error("cooldown active, retry in {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    /// Requested bundle size is outside `1..=max`.
    #[error("invalid quantity {quantity}, expected 1..={max}")]
    InvalidQuantity { quantity: u32, max: u32 },

    /// The fulfillment references an ID that is unknown or no longer pending.
    #[error("request {request_id} is unknown or already fulfilled")]
    UnknownOrAlreadyFulfilledRequest { request_id: RequestId },

    /// The oracle delivered a different number of words than were requested.
    #[error("request {request_id} expects {expected} words, got {actual}")]
    WordCountMismatch {
        request_id: RequestId,
        expected: u32,
        actual: usize,
    },

    /// Returning value to `to` failed; the value stays held.
    #[error("refund of {amount} to {to} failed: {reason}")]
    RefundFailed {
        to: Pubkey,
        amount: u64,
        reason: String,
    },

    /// The oracle refused or could not accept the submission.
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The oracle handed out an ID that is already stored.
    #[error("oracle assigned duplicate request id {request_id}")]
    DuplicateRequestId { request_id: RequestId },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Manual refund larger than the value held for the target.
    #[error("held value for {to} is {held}, cannot release {requested}")]
    InsufficientHeldValue {
        to: Pubkey,
        held: u64,
        requested: u64,
    },

    /// A public key argument was the zero address.
    #[error("zero address not allowed")]
    ZeroAddressNotAllowed,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

impl CoordinatorError {
    /// Whether the caller can retry the same call later and expect success.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::CooldownActive { .. } | CoordinatorError::OracleUnavailable(_)
        )
    }
}
