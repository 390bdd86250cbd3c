//! Compatibility shim for callers that still attach a per-call fee.
//!
//! Requests are paid for by a pre-funded oracle subscription, so attached
//! value is never needed. Every value-accepting entry point routes the value
//! through [`absorb_attached_value`]: it is recorded, announced, and sent back
//! to the sender in the same call. If the return transfer fails the amount is
//! held in the [`UnusedValueLedger`] until the owner releases it.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{info, warn};

use crate::errors::{CoordinatorError, Result};
use crate::events::{CoordinatorEvent, RefundFailed, UnusedValueReceived, ValueRefunded};
use crate::state::UnusedValueLedger;

/// Value-accepting entry point through which value arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryPoint {
    RequestRandom,
    RequestRandomWords,
    Receive,
}

impl EntryPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::RequestRandom => "requestRandom",
            EntryPoint::RequestRandomWords => "requestRandomWords",
            EntryPoint::Receive => "receive",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransferError(pub String);

/// Rail used to send value out of the coordinator's custody.
pub trait ValueTransfer: Send {
    fn transfer(&mut self, to: &Pubkey, amount: u64) -> std::result::Result<(), TransferError>;
}

/// What happened to value attached to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDisposition {
    None,
    Returned(u64),
    Held(u64),
}

/// Price of one request under subscription funding.
pub fn request_price() -> u64 {
    0
}

/// Total fee a legacy caller must attach.
pub fn total_fee() -> u64 {
    0
}

pub(crate) fn absorb_attached_value(
    ledger: &mut UnusedValueLedger,
    bank: &mut dyn ValueTransfer,
    events: &mut Vec<CoordinatorEvent>,
    sender: Pubkey,
    amount: u64,
    entry_point: EntryPoint,
) -> ValueDisposition {
    if amount == 0 {
        return ValueDisposition::None;
    }

    ledger.record_received(sender, amount);
    events.push(CoordinatorEvent::UnusedValueReceived(UnusedValueReceived {
        sender,
        amount,
        entry_point,
    }));

    match bank.transfer(&sender, amount) {
        Ok(()) => {
            info!(%sender, amount, entry_point = entry_point.as_str(), "Returned unused value");
            events.push(CoordinatorEvent::ValueRefunded(ValueRefunded { to: sender, amount }));
            ValueDisposition::Returned(amount)
        }
        Err(e) => {
            warn!(%sender, amount, reason = %e, "Refund failed, holding value");
            ledger.hold(sender, amount);
            events.push(CoordinatorEvent::RefundFailed(RefundFailed {
                sender,
                amount,
                reason: e.0,
            }));
            ValueDisposition::Held(amount)
        }
    }
}

/// Pay out held value. The ledger is only touched after the transfer succeeded.
pub(crate) fn pay_out_held(bank: &mut dyn ValueTransfer, to: Pubkey, amount: u64) -> Result<()> {
    bank.transfer(&to, amount).map_err(|e| CoordinatorError::RefundFailed {
        to,
        amount,
        reason: e.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBank;

    #[test]
    fn zero_value_is_ignored() {
        let mut ledger = UnusedValueLedger::default();
        let mut bank = InMemoryBank::default();
        let mut events = Vec::new();

        let disposition = absorb_attached_value(
            &mut ledger,
            &mut bank,
            &mut events,
            Pubkey::new_unique(),
            0,
            EntryPoint::RequestRandom,
        );

        assert_eq!(disposition, ValueDisposition::None);
        assert!(events.is_empty());
        assert_eq!(ledger, UnusedValueLedger::default());
    }

    #[test]
    fn attached_value_is_recorded_and_returned() {
        let sender = Pubkey::new_unique();
        let mut ledger = UnusedValueLedger::default();
        let mut bank = InMemoryBank::default();
        bank.credit(sender, 1_000);
        bank.attach(&sender, 250).unwrap();
        let mut events = Vec::new();

        let disposition = absorb_attached_value(
            &mut ledger,
            &mut bank,
            &mut events,
            sender,
            250,
            EntryPoint::RequestRandomWords,
        );

        assert_eq!(disposition, ValueDisposition::Returned(250));
        assert_eq!(bank.balance_of(&sender), 1_000);
        assert_eq!(ledger.total_received, 250);
        assert_eq!(ledger.total_held, 0);
        assert_eq!(
            events[0],
            CoordinatorEvent::UnusedValueReceived(UnusedValueReceived {
                sender,
                amount: 250,
                entry_point: EntryPoint::RequestRandomWords,
            })
        );
    }

    #[test]
    fn failed_return_is_held() {
        let sender = Pubkey::new_unique();
        let mut ledger = UnusedValueLedger::default();
        let mut bank = InMemoryBank::default();
        bank.credit(sender, 100);
        bank.attach(&sender, 100).unwrap();
        bank.reject_transfers_to(sender);
        let mut events = Vec::new();

        let disposition = absorb_attached_value(
            &mut ledger,
            &mut bank,
            &mut events,
            sender,
            100,
            EntryPoint::Receive,
        );

        assert_eq!(disposition, ValueDisposition::Held(100));
        assert_eq!(ledger.held_for(&sender), 100);
        assert_eq!(bank.custody(), 100);
        assert!(matches!(events.last(), Some(CoordinatorEvent::RefundFailed(_))));
    }

    #[test]
    fn legacy_price_accessors_are_zero() {
        assert_eq!(request_price(), 0);
        assert_eq!(total_fee(), 0);
    }
}
