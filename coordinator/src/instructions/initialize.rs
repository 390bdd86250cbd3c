use solana_sdk::pubkey::Pubkey;

use crate::authorization::AuthorizationLedger;
use crate::errors::{CoordinatorError, Result};
use crate::instructions::update_funding_config::validate_funding_params;
use crate::rate_limit::RateLimiter;
use crate::registry::RequestRegistry;
use crate::state::{CoordinatorSettings, CoordinatorState, UnusedValueLedger};

/// Build the initial coordinator state from `settings`.
pub(crate) fn handler(settings: CoordinatorSettings) -> Result<CoordinatorState> {
    if settings.owner == Pubkey::default()
        || settings.funding.coordinator_address == Pubkey::default()
    {
        return Err(CoordinatorError::ZeroAddressNotAllowed);
    }
    validate_funding_params(
        settings.funding.callback_gas_limit,
        settings.funding.request_confirmations,
    )?;
    if settings.cooldown_window_secs < 0 {
        return Err(CoordinatorError::InvalidConfig(
            "cooldown window must not be negative".into(),
        ));
    }

    Ok(CoordinatorState {
        owner: settings.owner,
        funding: settings.funding,
        fulfillment_mode: settings.fulfillment_mode,
        authorization: AuthorizationLedger::default(),
        rate_limiter: RateLimiter::new(settings.cooldown_window_secs),
        ledger: UnusedValueLedger::default(),
        registry: RequestRegistry::default(),
    })
}
