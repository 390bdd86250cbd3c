//! Result accessors and optional push delivery to consumer hooks.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::encoding::pubkey;
use crate::state::{Commitment, RandomRequest, RandomWord, RequestId};

/// `(fulfilled, words)` as seen by a consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomResult {
    pub fulfilled: bool,
    pub words: Vec<RandomWord>,
}

impl From<&RandomRequest> for RandomResult {
    fn from(request: &RandomRequest) -> Self {
        Self {
            fulfilled: request.fulfilled,
            words: request.random_words.clone(),
        }
    }
}

/// Payload delivered to a push-mode consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentNotice {
    pub request_id: RequestId,
    #[serde(with = "pubkey")]
    pub requester: Pubkey,
    #[serde(with = "pubkey")]
    pub beneficiary: Pubkey,
    pub commitment: Commitment,
    pub words: Vec<RandomWord>,
}

impl From<&RandomRequest> for FulfillmentNotice {
    fn from(request: &RandomRequest) -> Self {
        Self {
            request_id: request.request_id,
            requester: request.requester,
            beneficiary: request.beneficiary,
            commitment: request.commitment,
            words: request.random_words.clone(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(pub String);

/// Consumer-side receiver for push-mode fulfillments.
pub trait ConsumerHook: Send + Sync {
    fn on_fulfilled(&self, notice: &FulfillmentNotice) -> Result<(), HookError>;
}

/// Hooks keyed by the consumer (requester) address.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<Pubkey, Arc<dyn ConsumerHook>>,
}

impl HookRegistry {
    pub fn register(&mut self, consumer: Pubkey, hook: Arc<dyn ConsumerHook>) {
        self.hooks.insert(consumer, hook);
    }

    pub fn unregister(&mut self, consumer: &Pubkey) -> bool {
        self.hooks.remove(consumer).is_some()
    }

    pub fn contains(&self, consumer: &Pubkey) -> bool {
        self.hooks.contains_key(consumer)
    }

    /// Call the requester's hook, if any. Errors and panics are contained and
    /// returned as `Some(reason)`.
    pub(crate) fn deliver(&self, notice: &FulfillmentNotice) -> Option<String> {
        let hook = self.hooks.get(&notice.requester)?;
        match catch_unwind(AssertUnwindSafe(|| hook.on_fulfilled(notice))) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.0),
            Err(_) => Some("consumer hook panicked".to_string()),
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("consumers", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}
