use crate::funding::{absorb_attached_value, EntryPoint, ValueDisposition};
use crate::{CallContext, Coordinator};

/// Plain value transfer with no request attached. Open to any sender.
pub(crate) fn handler(coordinator: &mut Coordinator, ctx: &CallContext) -> ValueDisposition {
    absorb_attached_value(
        &mut coordinator.state.ledger,
        coordinator.bank.as_mut(),
        &mut coordinator.events,
        ctx.signer,
        ctx.value,
        EntryPoint::Receive,
    )
}
