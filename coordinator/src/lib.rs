pub mod authorization;
pub mod encoding;
pub mod errors;
pub mod events;
pub mod funding;
pub mod instructions;
pub mod memory;
pub mod oracle;
pub mod rate_limit;
pub mod registry;
pub mod router;
pub mod state;

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

pub use errors::{CoordinatorError, Result};
pub use events::CoordinatorEvent;
pub use funding::{EntryPoint, TransferError, ValueDisposition, ValueTransfer};
pub use instructions::{FulfillOutcome, RandomnessParams};
pub use oracle::{OracleError, OracleRequest, RandomnessOracle};
pub use router::{ConsumerHook, FulfillmentNotice, HookError, HookRegistry, RandomResult};
pub use state::{
    AuthorizedCaller, Commitment, CoordinatorSettings, CoordinatorState, FulfillmentMode,
    FundingConfig, RandomRequest, RandomWord, RequestId, UnusedValueLedger, MAX_BATCH,
};

/// Who is calling, what value they attached, and when.
///
/// The host authenticates `signer` before building a context; the coordinator
/// trusts it as the call's sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub signer: Pubkey,
    /// Value attached to the call, already in the coordinator's custody.
    pub value: u64,
    /// Unix timestamp of the call.
    pub timestamp: i64,
}

impl CallContext {
    pub fn new(signer: Pubkey, timestamp: i64) -> Self {
        Self {
            signer,
            value: 0,
            timestamp,
        }
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }
}

/// Randomness request coordinator.
///
/// Sits between consumer services and an external VRF oracle. Each call is
/// atomic: it either applies all of its effects or returns an error and
/// changes nothing.
///
/// ## Request lifecycle
///
/// 1. **Request**: an enabled consumer calls [`Coordinator::request_random`];
///    the beneficiary's cooldown is checked, the request is submitted to the
///    oracle, which assigns the ID, and a pending record is stored.
/// 2. **Fulfill**: the trusted oracle address calls
///    [`Coordinator::fulfill_random_words`]; the words are stored exactly once.
/// 3. **Read**: consumers poll [`Coordinator::get_random_result`] (exact) or
///    [`Coordinator::get_random_for_user`] (latest per beneficiary). In push
///    mode the consumer's hook is also called.
///
/// Records are never deleted.
pub struct Coordinator {
    pub(crate) state: CoordinatorState,
    pub(crate) oracle: Box<dyn RandomnessOracle>,
    pub(crate) bank: Box<dyn ValueTransfer>,
    pub(crate) hooks: HookRegistry,
    pub(crate) events: Vec<CoordinatorEvent>,
}

impl Coordinator {
    /// Create a fresh coordinator.
    ///
    /// Rejects zero owner / oracle addresses and out-of-range funding parameters.
    pub fn initialize(
        settings: CoordinatorSettings,
        oracle: impl RandomnessOracle + 'static,
        bank: impl ValueTransfer + 'static,
    ) -> Result<Self> {
        let state = instructions::initialize::handler(settings)?;
        Ok(Self::restore(state, oracle, bank))
    }

    /// Resume from previously persisted state.
    pub fn restore(
        state: CoordinatorState,
        oracle: impl RandomnessOracle + 'static,
        bank: impl ValueTransfer + 'static,
    ) -> Self {
        Self {
            state,
            oracle: Box::new(oracle),
            bank: Box::new(bank),
            hooks: HookRegistry::default(),
            events: Vec::new(),
        }
    }

    /// Submit a randomness request on behalf of `params.beneficiary`.
    ///
    /// Only enabled callers may submit. Any attached value is returned (or held
    /// if the return fails). Returns the oracle-assigned request ID.
    pub fn request_random(
        &mut self,
        ctx: &CallContext,
        params: RandomnessParams,
    ) -> Result<RequestId> {
        instructions::request_random::handler(self, ctx, params, EntryPoint::RequestRandom)
    }

    /// Older submission signature kept for deployed callers.
    ///
    /// Same as [`Coordinator::request_random`] with no rarity hint and a zero commitment.
    pub fn request_random_words(
        &mut self,
        ctx: &CallContext,
        beneficiary: Pubkey,
        quantity: u32,
    ) -> Result<RequestId> {
        let params = RandomnessParams {
            beneficiary,
            quantity,
            max_rarity_hint: 0,
            commitment: Commitment::ZERO,
        };
        instructions::request_random::handler(self, ctx, params, EntryPoint::RequestRandomWords)
    }

    /// Bare value-accepting entry point. Records and returns whatever was attached.
    pub fn receive(&mut self, ctx: &CallContext) -> ValueDisposition {
        instructions::receive::handler(self, ctx)
    }

    /// Oracle callback. Only the trusted oracle address may call it.
    ///
    /// Unknown, already fulfilled, or malformed deliveries are skipped and
    /// reported in the outcome rather than failing the call.
    pub fn fulfill_random_words(
        &mut self,
        ctx: &CallContext,
        request_id: RequestId,
        words: Vec<RandomWord>,
    ) -> Result<FulfillOutcome> {
        instructions::fulfill_random_words::handler(self, ctx, request_id, words)
    }

    /// Deliver several fulfillments in one call; each is handled independently.
    pub fn fulfill_batch(
        &mut self,
        ctx: &CallContext,
        deliveries: Vec<(RequestId, Vec<RandomWord>)>,
    ) -> Result<Vec<FulfillOutcome>> {
        instructions::fulfill_random_words::batch_handler(self, ctx, deliveries)
    }

    /// Enable or disable a consumer (owner-only).
    pub fn set_authorized_caller(
        &mut self,
        ctx: &CallContext,
        address: Pubkey,
        enabled: bool,
    ) -> Result<()> {
        instructions::set_authorized_caller::handler(self, ctx, address, enabled)
    }

    /// Update the oracle funding parameters (owner-only).
    ///
    /// The trusted oracle address and subscription are fixed at initialization.
    pub fn update_funding_config(
        &mut self,
        ctx: &CallContext,
        key_hash: [u8; 32],
        callback_gas_limit: u32,
        request_confirmations: u16,
    ) -> Result<()> {
        instructions::update_funding_config::handler(
            self,
            ctx,
            key_hash,
            callback_gas_limit,
            request_confirmations,
        )
    }

    pub fn set_cooldown_window(&mut self, ctx: &CallContext, window_secs: i64) -> Result<()> {
        instructions::update_settings::set_cooldown_window(self, ctx, window_secs)
    }

    pub fn set_fulfillment_mode(&mut self, ctx: &CallContext, mode: FulfillmentMode) -> Result<()> {
        instructions::update_settings::set_fulfillment_mode(self, ctx, mode)
    }

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Pubkey) -> Result<()> {
        instructions::update_settings::transfer_ownership(self, ctx, new_owner)
    }

    /// Send all held value to the owner (owner-only). Returns the amount sent.
    pub fn emergency_withdraw(&mut self, ctx: &CallContext) -> Result<u64> {
        instructions::emergency_withdraw::handler(self, ctx)
    }

    /// Release value held for `to` back to it (owner-only).
    pub fn manual_refund(&mut self, ctx: &CallContext, to: Pubkey, amount: u64) -> Result<()> {
        instructions::manual_refund::handler(self, ctx, to, amount)
    }

    /// Record that a refund accepted by an asynchronous value rail did not arrive.
    ///
    /// Only reachable in-process; the amount becomes recoverable through
    /// [`Coordinator::manual_refund`] / [`Coordinator::emergency_withdraw`].
    pub fn hold_undelivered_refund(&mut self, to: Pubkey, amount: u64, reason: String) {
        instructions::manual_refund::hold_undelivered(self, to, amount, reason)
    }

    /// Register a push-mode hook for a consumer.
    pub fn register_hook(&mut self, consumer: Pubkey, hook: Arc<dyn ConsumerHook>) {
        self.hooks.register(consumer, hook);
    }

    pub fn unregister_hook(&mut self, consumer: &Pubkey) -> bool {
        self.hooks.unregister(consumer)
    }

    /// Exact accessor. Unknown IDs read as not fulfilled with no words.
    pub fn get_random_result(&self, request_id: RequestId) -> RandomResult {
        self.state
            .registry
            .get(request_id)
            .map(RandomResult::from)
            .unwrap_or_default()
    }

    /// Latest request for `beneficiary`. Only the newest request is visible;
    /// callers with parallel requests must use [`Coordinator::get_random_result`].
    pub fn get_random_for_user(&self, beneficiary: &Pubkey) -> RandomResult {
        self.state
            .registry
            .latest_for(beneficiary)
            .map(RandomResult::from)
            .unwrap_or_default()
    }

    pub fn get_request_price(&self) -> u64 {
        funding::request_price()
    }

    pub fn get_total_fee(&self) -> u64 {
        funding::total_fee()
    }

    pub fn request(&self, request_id: RequestId) -> Option<&RandomRequest> {
        self.state.registry.get(request_id)
    }

    pub fn pending_requests(&self) -> Vec<&RandomRequest> {
        self.state.registry.pending().collect()
    }

    pub fn authorized_caller(&self, address: &Pubkey) -> Option<&AuthorizedCaller> {
        self.state.authorization.get(address)
    }

    pub fn cooldown_remaining(&self, beneficiary: &Pubkey, now: i64) -> i64 {
        self.state.rate_limiter.remaining(beneficiary, now)
    }

    pub fn unused_value_ledger(&self) -> &UnusedValueLedger {
        &self.state.ledger
    }

    pub fn funding_config(&self) -> &FundingConfig {
        &self.state.funding
    }

    pub fn owner(&self) -> Pubkey {
        self.state.owner
    }

    pub fn fulfillment_mode(&self) -> FulfillmentMode {
        self.state.fulfillment_mode
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// Take all events emitted since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<CoordinatorEvent> {
        std::mem::take(&mut self.events)
    }
}
