//! Durable record of every request, keyed by oracle-assigned ID.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::encoding::pubkey_map;
use crate::errors::{CoordinatorError, Result};
use crate::state::{RandomRequest, RandomWord, RequestId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRegistry {
    requests: BTreeMap<RequestId, RandomRequest>,
    /// Most recent request per beneficiary. Later submissions overwrite earlier ones.
    #[serde(with = "pubkey_map")]
    latest_by_beneficiary: HashMap<Pubkey, RequestId>,
}

impl RequestRegistry {
    /// Store a new pending request. IDs are never reused.
    pub(crate) fn insert(&mut self, request: RandomRequest) -> Result<()> {
        let request_id = request.request_id;
        if self.requests.contains_key(&request_id) {
            return Err(CoordinatorError::DuplicateRequestId { request_id });
        }
        self.latest_by_beneficiary
            .insert(request.beneficiary, request_id);
        self.requests.insert(request_id, request);
        Ok(())
    }

    pub fn contains(&self, request_id: RequestId) -> bool {
        self.requests.contains_key(&request_id)
    }

    pub fn get(&self, request_id: RequestId) -> Option<&RandomRequest> {
        self.requests.get(&request_id)
    }

    pub fn latest_for(&self, beneficiary: &Pubkey) -> Option<&RandomRequest> {
        self.latest_by_beneficiary
            .get(beneficiary)
            .and_then(|id| self.requests.get(id))
    }

    /// Check that `words` can complete `request_id` without mutating anything.
    pub fn validate_fulfillment(&self, request_id: RequestId, words: &[RandomWord]) -> Result<()> {
        let request = self
            .requests
            .get(&request_id)
            .filter(|request| request.is_pending())
            .ok_or(CoordinatorError::UnknownOrAlreadyFulfilledRequest { request_id })?;

        if words.len() != request.quantity as usize {
            return Err(CoordinatorError::WordCountMismatch {
                request_id,
                expected: request.quantity,
                actual: words.len(),
            });
        }
        Ok(())
    }

    /// Transition a pending request to fulfilled. Happens at most once per ID.
    pub(crate) fn complete(
        &mut self,
        request_id: RequestId,
        words: Vec<RandomWord>,
        now: i64,
    ) -> Result<&RandomRequest> {
        self.validate_fulfillment(request_id, &words)?;
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(CoordinatorError::UnknownOrAlreadyFulfilledRequest { request_id })?;
        request.random_words = words;
        request.fulfilled = true;
        request.fulfilled_at = Some(now);
        Ok(&*request)
    }

    pub fn pending(&self) -> impl Iterator<Item = &RandomRequest> {
        self.requests.values().filter(|request| request.is_pending())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RandomRequest> {
        self.requests.values()
    }

    pub fn max_request_id(&self) -> Option<RequestId> {
        self.requests.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Commitment;

    fn pending(request_id: RequestId, beneficiary: Pubkey, quantity: u32) -> RandomRequest {
        RandomRequest {
            request_id,
            requester: Pubkey::new_unique(),
            beneficiary,
            quantity,
            max_rarity_hint: 0,
            commitment: Commitment::ZERO,
            created_at: 100,
            fulfilled: false,
            random_words: Vec::new(),
            fulfilled_at: None,
        }
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = RequestRegistry::default();
        let user = Pubkey::new_unique();
        registry.insert(pending(7, user, 1)).unwrap();

        assert_eq!(
            registry.insert(pending(7, user, 1)),
            Err(CoordinatorError::DuplicateRequestId { request_id: 7 })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn complete_happens_once() {
        let mut registry = RequestRegistry::default();
        registry.insert(pending(1, Pubkey::new_unique(), 2)).unwrap();
        let words = vec![RandomWord([1; 32]), RandomWord([2; 32])];

        let request = registry.complete(1, words.clone(), 200).unwrap();
        assert!(request.fulfilled);
        assert_eq!(request.fulfilled_at, Some(200));

        assert_eq!(
            registry.complete(1, vec![RandomWord([9; 32]); 2], 300),
            Err(CoordinatorError::UnknownOrAlreadyFulfilledRequest { request_id: 1 })
        );
        assert_eq!(registry.get(1).unwrap().random_words, words);
    }

    #[test]
    fn word_count_must_match_quantity() {
        let mut registry = RequestRegistry::default();
        registry.insert(pending(3, Pubkey::new_unique(), 5)).unwrap();

        assert_eq!(
            registry.complete(3, vec![RandomWord([0; 32]); 4], 10),
            Err(CoordinatorError::WordCountMismatch {
                request_id: 3,
                expected: 5,
                actual: 4
            })
        );
        assert!(registry.get(3).unwrap().is_pending());
    }

    #[test]
    fn latest_for_beneficiary_wins() {
        let mut registry = RequestRegistry::default();
        let user = Pubkey::new_unique();
        registry.insert(pending(10, user, 1)).unwrap();
        registry.insert(pending(11, user, 1)).unwrap();

        assert_eq!(registry.latest_for(&user).unwrap().request_id, 11);
        assert_eq!(registry.pending().count(), 2);
        assert_eq!(registry.max_request_id(), Some(11));
    }
}
