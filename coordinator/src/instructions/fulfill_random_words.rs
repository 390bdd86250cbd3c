use tracing::{info, warn};

use crate::errors::{CoordinatorError, Result};
use crate::events::{ConsumerHookFailed, CoordinatorEvent, RandomWordsFulfilled};
use crate::router::FulfillmentNotice;
use crate::state::{FulfillmentMode, RandomWord, RequestId};
use crate::{CallContext, Coordinator};

/// Result of one delivery from the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillOutcome {
    Fulfilled,
    /// Nothing changed. Carries `UnknownOrAlreadyFulfilledRequest` or `WordCountMismatch`.
    Skipped(CoordinatorError),
}

impl FulfillOutcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, FulfillOutcome::Fulfilled)
    }
}

/// The oracle callback is the trust boundary: only the configured oracle
/// address may write randomness.
fn require_oracle(coordinator: &Coordinator, ctx: &CallContext) -> Result<()> {
    if ctx.signer == coordinator.state.funding.coordinator_address {
        Ok(())
    } else {
        warn!(signer = %ctx.signer, "Rejected fulfillment from untrusted sender");
        Err(CoordinatorError::PermissionDenied { signer: ctx.signer })
    }
}

pub(crate) fn handler(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    request_id: RequestId,
    words: Vec<RandomWord>,
) -> Result<FulfillOutcome> {
    require_oracle(coordinator, ctx)?;
    Ok(fulfill_one(coordinator, ctx.timestamp, request_id, words))
}

pub(crate) fn batch_handler(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    deliveries: Vec<(RequestId, Vec<RandomWord>)>,
) -> Result<Vec<FulfillOutcome>> {
    require_oracle(coordinator, ctx)?;
    Ok(deliveries
        .into_iter()
        .map(|(request_id, words)| fulfill_one(coordinator, ctx.timestamp, request_id, words))
        .collect())
}

fn fulfill_one(
    coordinator: &mut Coordinator,
    now: i64,
    request_id: RequestId,
    words: Vec<RandomWord>,
) -> FulfillOutcome {
    let request = match coordinator.state.registry.complete(request_id, words, now) {
        Ok(request) => request,
        Err(e) => {
            warn!(request_id, reason = %e, "Skipping fulfillment");
            return FulfillOutcome::Skipped(e);
        }
    };

    let latency_secs = now.saturating_sub(request.created_at);
    let notice = (coordinator.state.fulfillment_mode == FulfillmentMode::Push)
        .then(|| FulfillmentNotice::from(request));

    coordinator
        .events
        .push(CoordinatorEvent::RandomWordsFulfilled(RandomWordsFulfilled {
            request_id,
            words: request.random_words.clone(),
        }));

    info!(request_id, latency_secs, "Randomness fulfilled");

    if let Some(notice) = notice {
        if let Some(reason) = coordinator.hooks.deliver(&notice) {
            warn!(
                request_id,
                consumer = %notice.requester,
                reason = %reason,
                "Consumer hook failed"
            );
            coordinator
                .events
                .push(CoordinatorEvent::ConsumerHookFailed(ConsumerHookFailed {
                    request_id,
                    consumer: notice.requester,
                    reason,
                }));
        }
    }

    FulfillOutcome::Fulfilled
}
