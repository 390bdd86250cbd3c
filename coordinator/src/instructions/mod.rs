pub mod emergency_withdraw;
pub mod fulfill_random_words;
pub mod initialize;
pub mod manual_refund;
pub mod receive;
pub mod request_random;
pub mod set_authorized_caller;
pub mod update_funding_config;
pub mod update_settings;

pub use fulfill_random_words::FulfillOutcome;
pub use request_random::RandomnessParams;

use crate::errors::{CoordinatorError, Result};
use crate::state::CoordinatorState;
use crate::CallContext;

/// Admin calls must come from the current owner.
pub(crate) fn require_owner(state: &CoordinatorState, ctx: &CallContext) -> Result<()> {
    if ctx.signer == state.owner {
        Ok(())
    } else {
        Err(CoordinatorError::PermissionDenied { signer: ctx.signer })
    }
}
