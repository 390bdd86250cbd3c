use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::errors::{CoordinatorError, Result};
use crate::events::{CoordinatorEvent, HeldValueReleased, RefundFailed};
use crate::funding::pay_out_held;
use crate::instructions::require_owner;
use crate::{CallContext, Coordinator};

/// Return value held for `to`. The hold is only released once the transfer went through.
pub(crate) fn handler(
    coordinator: &mut Coordinator,
    ctx: &CallContext,
    to: Pubkey,
    amount: u64,
) -> Result<()> {
    require_owner(&coordinator.state, ctx)?;
    if to == Pubkey::default() {
        return Err(CoordinatorError::ZeroAddressNotAllowed);
    }

    let held = coordinator.state.ledger.held_for(&to);
    if amount == 0 || amount > held {
        return Err(CoordinatorError::InsufficientHeldValue {
            to,
            held,
            requested: amount,
        });
    }

    pay_out_held(coordinator.bank.as_mut(), to, amount)?;
    coordinator.state.ledger.release(&to, amount);

    coordinator
        .events
        .push(CoordinatorEvent::ManualRefund(HeldValueReleased { to, amount }));

    info!(%to, amount, remaining = held - amount, "Manual refund");
    Ok(())
}

pub(crate) fn hold_undelivered(
    coordinator: &mut Coordinator,
    to: Pubkey,
    amount: u64,
    reason: String,
) {
    if amount == 0 {
        return;
    }
    warn!(%to, amount, reason = %reason, "Refund was not delivered, holding value");

    coordinator.state.ledger.hold(to, amount);
    coordinator
        .events
        .push(CoordinatorEvent::RefundFailed(RefundFailed {
            sender: to,
            amount,
            reason,
        }));
}
