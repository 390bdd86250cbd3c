use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info};

use crate::encoding::pubkey;
use crate::errors::{CoordinatorError, Result};
use crate::events::{CoordinatorEvent, RandomRequested};
use crate::funding::{absorb_attached_value, EntryPoint};
use crate::oracle::{derive_seed, OracleRequest};
use crate::state::{Commitment, RandomRequest, RequestId, MAX_BATCH};
use crate::{CallContext, Coordinator};

/// Caller-supplied part of a randomness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessParams {
    #[serde(with = "pubkey")]
    pub beneficiary: Pubkey,
    pub quantity: u32,
    #[serde(default)]
    pub max_rarity_hint: u8,
    #[serde(default)]
    pub commitment: Commitment,
}

/// Validate, submit to the oracle, then commit every effect at once.
///
/// Checks run in order: authorization, quantity, beneficiary, cooldown. The
/// oracle call is the only fallible step with an outside effect, so state is
/// written only after it returned an unused ID.
pub(crate) fn handler(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    params: RandomnessParams,
    entry_point: EntryPoint,
) -> Result<RequestId> {
    let state = &coordinator.state;

    state.authorization.ensure_enabled(&ctx.signer)?;

    if params.quantity == 0 || params.quantity > MAX_BATCH {
        return Err(CoordinatorError::InvalidQuantity {
            quantity: params.quantity,
            max: MAX_BATCH,
        });
    }
    if params.beneficiary == Pubkey::default() {
        return Err(CoordinatorError::ZeroAddressNotAllowed);
    }

    state.rate_limiter.check(&params.beneficiary, ctx.timestamp)?;

    let seed = derive_seed(
        &ctx.signer,
        &params.beneficiary,
        &params.commitment,
        ctx.timestamp,
    );
    let oracle_request = OracleRequest::new(&state.funding, params.quantity, seed, ctx.timestamp);

    let request_id = coordinator
        .oracle
        .request_random_words(&oracle_request)
        .map_err(|e| CoordinatorError::OracleUnavailable(e.to_string()))?;

    if coordinator.state.registry.contains(request_id) {
        error!(request_id, "Oracle reused a request id, reverting submission");
        return Err(CoordinatorError::DuplicateRequestId { request_id });
    }

    // Commit.
    coordinator
        .state
        .rate_limiter
        .record(params.beneficiary, ctx.timestamp);

    absorb_attached_value(
        &mut coordinator.state.ledger,
        coordinator.bank.as_mut(),
        &mut coordinator.events,
        ctx.signer,
        ctx.value,
        entry_point,
    );

    coordinator.state.registry.insert(RandomRequest {
        request_id,
        requester: ctx.signer,
        beneficiary: params.beneficiary,
        quantity: params.quantity,
        max_rarity_hint: params.max_rarity_hint,
        commitment: params.commitment,
        created_at: ctx.timestamp,
        fulfilled: false,
        random_words: Vec::new(),
        fulfilled_at: None,
    })?;

    coordinator
        .events
        .push(CoordinatorEvent::RandomRequested(RandomRequested {
            request_id,
            requester: ctx.signer,
            beneficiary: params.beneficiary,
            quantity: params.quantity,
        }));

    info!(
        request_id,
        requester = %ctx.signer,
        beneficiary = %params.beneficiary,
        quantity = params.quantity,
        entry_point = entry_point.as_str(),
        "Randomness requested"
    );

    Ok(request_id)
}
