use tracing::info;

use crate::errors::{CoordinatorError, Result};
use crate::events::{CoordinatorEvent, FundingConfigUpdated};
use crate::instructions::require_owner;
use crate::state::{MAX_CALLBACK_GAS_LIMIT, MAX_REQUEST_CONFIRMATIONS};
use crate::{CallContext, Coordinator};

pub(crate) fn validate_funding_params(
    callback_gas_limit: u32,
    request_confirmations: u16,
) -> Result<()> {
    if callback_gas_limit == 0 || callback_gas_limit > MAX_CALLBACK_GAS_LIMIT {
        return Err(CoordinatorError::InvalidConfig(format!(
            "callback gas limit {callback_gas_limit} outside 1..={MAX_CALLBACK_GAS_LIMIT}"
        )));
    }
    if request_confirmations == 0 || request_confirmations > MAX_REQUEST_CONFIRMATIONS {
        return Err(CoordinatorError::InvalidConfig(format!(
            "request confirmations {request_confirmations} outside 1..={MAX_REQUEST_CONFIRMATIONS}"
        )));
    }
    Ok(())
}

/// Replace the key hash, per-word callback gas and confirmation count.
pub(crate) fn handler(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    key_hash: [u8; 32],
    callback_gas_limit: u32,
    request_confirmations: u16,
) -> Result<()> {
    require_owner(&coordinator.state, ctx)?;
    validate_funding_params(callback_gas_limit, request_confirmations)?;

    let funding = &mut coordinator.state.funding;
    funding.key_hash = key_hash;
    funding.callback_gas_limit = callback_gas_limit;
    funding.request_confirmations = request_confirmations;

    coordinator
        .events
        .push(CoordinatorEvent::FundingConfigUpdated(FundingConfigUpdated {
            key_hash,
            callback_gas_limit,
            request_confirmations,
        }));

    info!(callback_gas_limit, request_confirmations, "Funding config updated");
    Ok(())
}
