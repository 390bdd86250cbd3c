//! In-process VRF oracle: assigns request IDs and queues fulfillment jobs.

use std::time::Instant;

use rng_coordinator::oracle::derive_seed;
use rng_coordinator::{OracleError, OracleRequest, RandomRequest, RandomnessOracle, RequestId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One pending answer for the fulfiller.
#[derive(Debug, Clone)]
pub struct OracleJob {
    pub request_id: RequestId,
    pub seed: [u8; 32],
    pub created_at: i64,
    pub num_words: u32,
    pub request_confirmations: u16,
    pub enqueued_at: Instant,
}

impl OracleJob {
    /// Rebuild the job for a request found pending at startup.
    pub fn for_pending(request: &RandomRequest, request_confirmations: u16) -> Self {
        Self {
            request_id: request.request_id,
            seed: derive_seed(
                &request.requester,
                &request.beneficiary,
                &request.commitment,
                request.created_at,
            ),
            created_at: request.created_at,
            num_words: request.quantity,
            request_confirmations,
            enqueued_at: Instant::now(),
        }
    }
}

/// Hands out sequential IDs. A submission only consumes an ID once its job is queued.
pub struct LocalVrfOracle {
    next_id: RequestId,
    jobs: mpsc::Sender<OracleJob>,
}

impl LocalVrfOracle {
    pub fn new(next_id: RequestId, jobs: mpsc::Sender<OracleJob>) -> Self {
        Self { next_id, jobs }
    }
}

impl RandomnessOracle for LocalVrfOracle {
    fn request_random_words(&mut self, request: &OracleRequest) -> Result<RequestId, OracleError> {
        let request_id = self.next_id;
        let next_id = request_id
            .checked_add(1)
            .ok_or_else(|| OracleError::Rejected("request id space exhausted".into()))?;

        let job = OracleJob {
            request_id,
            seed: request.seed,
            created_at: request.created_at,
            num_words: request.num_words,
            request_confirmations: request.request_confirmations,
            enqueued_at: Instant::now(),
        };
        self.jobs.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => OracleError::Unavailable("oracle queue full".into()),
            TrySendError::Closed(_) => OracleError::Unavailable("oracle worker stopped".into()),
        })?;

        self.next_id = next_id;
        Ok(request_id)
    }
}
