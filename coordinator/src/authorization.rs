//! Allow-list of consumers permitted to submit requests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::encoding::pubkey_map;
use crate::errors::{CoordinatorError, Result};
use crate::state::AuthorizedCaller;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationLedger {
    #[serde(with = "pubkey_map")]
    callers: HashMap<Pubkey, AuthorizedCaller>,
}

impl AuthorizationLedger {
    /// Enable or disable `address`. Disabled entries are kept so the history stays inspectable.
    pub fn set(&mut self, address: Pubkey, enabled: bool, now: i64) {
        self.callers.insert(
            address,
            AuthorizedCaller {
                address,
                enabled,
                updated_at: now,
            },
        );
    }

    pub fn is_enabled(&self, address: &Pubkey) -> bool {
        self.callers.get(address).is_some_and(|caller| caller.enabled)
    }

    pub fn ensure_enabled(&self, address: &Pubkey) -> Result<()> {
        if self.is_enabled(address) {
            Ok(())
        } else {
            Err(CoordinatorError::PermissionDenied { signer: *address })
        }
    }

    pub fn get(&self, address: &Pubkey) -> Option<&AuthorizedCaller> {
        self.callers.get(address)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &AuthorizedCaller> {
        self.callers.values().filter(|caller| caller.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_address_is_denied() {
        let ledger = AuthorizationLedger::default();
        let stranger = Pubkey::new_unique();

        assert!(!ledger.is_enabled(&stranger));
        assert_eq!(
            ledger.ensure_enabled(&stranger),
            Err(CoordinatorError::PermissionDenied { signer: stranger })
        );
    }

    #[test]
    fn disable_keeps_entry() {
        let mut ledger = AuthorizationLedger::default();
        let minter = Pubkey::new_unique();

        ledger.set(minter, true, 10);
        assert!(ledger.ensure_enabled(&minter).is_ok());

        ledger.set(minter, false, 20);
        assert!(!ledger.is_enabled(&minter));
        let entry = ledger.get(&minter).unwrap();
        assert!(!entry.enabled);
        assert_eq!(entry.updated_at, 20);
        assert_eq!(ledger.enabled().count(), 0);
    }
}
