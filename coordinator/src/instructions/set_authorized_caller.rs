use solana_sdk::pubkey::Pubkey;
use tracing::info;

use crate::errors::{CoordinatorError, Result};
use crate::events::{AuthorizedCallerUpdated, CoordinatorEvent};
use crate::instructions::require_owner;
use crate::{CallContext, Coordinator};

/// Enable or disable a consumer on the allow-list.
pub(crate) fn handler(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    address: Pubkey,
    enabled: bool,
) -> Result<()> {
    require_owner(&coordinator.state, ctx)?;
    if address == Pubkey::default() {
        return Err(CoordinatorError::ZeroAddressNotAllowed);
    }

    coordinator
        .state
        .authorization
        .set(address, enabled, ctx.timestamp);
    coordinator
        .events
        .push(CoordinatorEvent::AuthorizedCallerUpdated(
            AuthorizedCallerUpdated { address, enabled },
        ));

    info!(caller = %address, enabled, "Authorized caller updated");
    Ok(())
}
