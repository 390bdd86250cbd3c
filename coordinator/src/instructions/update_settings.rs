use solana_sdk::pubkey::Pubkey;
use tracing::info;

use crate::errors::{CoordinatorError, Result};
use crate::events::{CoordinatorEvent, OwnershipTransferred};
use crate::instructions::require_owner;
use crate::state::FulfillmentMode;
use crate::{CallContext, Coordinator};

pub(crate) fn set_cooldown_window(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    window_secs: i64,
) -> Result<()> {
    require_owner(&coordinator.state, ctx)?;
    if window_secs < 0 {
        return Err(CoordinatorError::InvalidConfig(
            "cooldown window must not be negative".into(),
        ));
    }

    coordinator.state.rate_limiter.set_window(window_secs);
    coordinator
        .events
        .push(CoordinatorEvent::CooldownWindowUpdated { window_secs });

    info!(window_secs, "Cooldown window updated");
    Ok(())
}

pub(crate) fn set_fulfillment_mode(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    mode: FulfillmentMode,
) -> Result<()> {
    require_owner(&coordinator.state, ctx)?;

    coordinator.state.fulfillment_mode = mode;
    coordinator
        .events
        .push(CoordinatorEvent::FulfillmentModeUpdated { mode });

    info!(?mode, "Fulfillment mode updated");
    Ok(())
}

pub(crate) fn transfer_ownership(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    new_owner: Pubkey,
) -> Result<()> {
    require_owner(&coordinator.state, ctx)?;
    if new_owner == Pubkey::default() {
        return Err(CoordinatorError::ZeroAddressNotAllowed);
    }

    let previous_owner = std::mem::replace(&mut coordinator.state.owner, new_owner);
    coordinator
        .events
        .push(CoordinatorEvent::OwnershipTransferred(OwnershipTransferred {
            previous_owner,
            new_owner,
        }));

    info!(previous = %previous_owner, new = %new_owner, "Ownership transferred");
    Ok(())
}
