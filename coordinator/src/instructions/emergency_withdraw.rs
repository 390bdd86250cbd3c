use tracing::{info, warn};

use crate::errors::Result;
use crate::events::{CoordinatorEvent, HeldValueReleased};
use crate::funding::pay_out_held;
use crate::instructions::require_owner;
use crate::{CallContext, Coordinator};

/// Send the whole held balance to the owner and clear every hold.
pub(crate) fn handler(coordinator: &mut Coordinator, ctx: &CallContext) -> Result<u64> {
    require_owner(&coordinator.state, ctx)?;

    let owner = coordinator.state.owner;
    let amount = coordinator.state.ledger.total_held;
    if amount == 0 {
        return Ok(0);
    }

    if let Err(e) = pay_out_held(coordinator.bank.as_mut(), owner, amount) {
        warn!(%owner, amount, reason = %e, "Emergency withdrawal failed");
        return Err(e);
    }
    coordinator.state.ledger.release_all();

    coordinator
        .events
        .push(CoordinatorEvent::EmergencyWithdrawal(HeldValueReleased {
            to: owner,
            amount,
        }));

    info!(%owner, amount, "Emergency withdrawal");
    Ok(amount)
}
