//! HTTP surface of the coordinator.
//!
//! Consumer and admin calls carry a [`SignedEnvelope`]; the verified signer
//! becomes the call's sender and each envelope nonce is accepted once. Value
//! can only be attached by naming a treasury deposit the caller made. Oracle
//! callbacks carry a proof signature per fulfillment instead. Read-only
//! queries are open.

use actix_web::{HttpResponse, web};
use rng_coordinator::encoding::{bytes32, pubkey};
use rng_coordinator::{
    CallContext, Commitment, FulfillOutcome, FulfillmentMode, RandomnessParams, RequestId,
    ValueDisposition,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use tracing::warn;

use crate::deposits::{DepositError, VerifiedDeposit};
use crate::error::ApiError;
use crate::signing::{Opened, SignedEnvelope};
use crate::state::{Admission, AppState, SignedFulfillment, unix_now};

const DEFAULT_EVENT_PAGE: usize = 100;
const MAX_EVENT_PAGE: usize = 1_000;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/status", web::get().to(status))
        .route("/metrics", web::get().to(metrics))
        .service(
            web::scope("/v1")
                .route("/requests", web::post().to(request_random))
                .route("/requests/legacy", web::post().to(request_random_words))
                .route("/requests/pending", web::get().to(pending_requests))
                .route("/requests/{id}", web::get().to(get_request))
                .route("/receive", web::post().to(receive))
                .route("/results/{id}", web::get().to(get_random_result))
                .route("/users/{beneficiary}/latest", web::get().to(get_random_for_user))
                .route("/callers/{address}", web::get().to(get_authorized_caller))
                .route("/cooldowns/{beneficiary}", web::get().to(get_cooldown))
                .route("/fees", web::get().to(get_fees))
                .route("/ledger", web::get().to(get_ledger))
                .route("/config", web::get().to(get_config))
                .route("/events", web::get().to(get_events))
                .route("/oracle/fulfill", web::post().to(oracle_fulfill))
                .service(
                    web::scope("/admin")
                        .route("/authorized-callers", web::post().to(set_authorized_caller))
                        .route("/funding-config", web::post().to(update_funding_config))
                        .route("/cooldown", web::post().to(set_cooldown_window))
                        .route("/fulfillment-mode", web::post().to(set_fulfillment_mode))
                        .route("/ownership", web::post().to(transfer_ownership))
                        .route("/emergency-withdraw", web::post().to(emergency_withdraw))
                        .route("/manual-refund", web::post().to(manual_refund)),
                ),
        );
}

fn open<T: DeserializeOwned>(
    state: &AppState,
    envelope: &SignedEnvelope,
    action: &str,
    now: i64,
) -> Result<Opened<T>, ApiError> {
    envelope
        .open(action, now, state.max_signature_age_secs)
        .map_err(|e| {
            state.metrics.record_rejection();
            warn!(action, signer = %envelope.signer, error = %e, "Rejected envelope");
            e.into()
        })
}

fn counted<T, E: Into<ApiError>>(state: &AppState, result: Result<T, E>) -> Result<T, ApiError> {
    result.map_err(|e| {
        state.metrics.record_rejection();
        e.into()
    })
}

fn admission<T>(opened: &Opened<T>, deposit: Option<VerifiedDeposit>) -> Admission {
    Admission {
        replay_key: opened.replay_key.clone(),
        expires_at: opened.expires_at,
        deposit,
    }
}

/// Check the deposit backing `value`. Zero value needs none.
///
/// Only the verified deposit's lamports are ever attached to the call.
async fn verify_deposit(
    state: &AppState,
    depositor: &Pubkey,
    value: u64,
    deposit: Option<&str>,
    now: i64,
) -> Result<Option<VerifiedDeposit>, ApiError> {
    if value == 0 {
        return Ok(None);
    }
    let Some(custody) = &state.custody else {
        return counted(state, Err(DepositError::NoCustody));
    };
    let Some(deposit) = deposit else {
        return counted(state, Err(DepositError::Missing));
    };
    let verified = custody.verify(depositor, deposit, value, now).await;
    if let Err(e) = &verified {
        warn!(%depositor, deposit, error = %e, "Rejected deposit");
    }
    counted(state, verified).map(Some)
}

fn parse_pubkey(raw: &str) -> Result<Pubkey, ApiError> {
    Pubkey::from_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid address {raw}")))
}

/// Liveness check. Returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

/// Readiness and status summary.
async fn status(state: web::Data<AppState>) -> HttpResponse {
    let pending_fulfillments = state.pending_count.load(Ordering::Relaxed);
    let (pending_requests, mode) = state
        .read(|c| (c.pending_requests().len(), c.fulfillment_mode()))
        .await;
    HttpResponse::Ok().json(json!({
        "status": "running",
        "pending_fulfillments": pending_fulfillments,
        "pending_requests": pending_requests,
        "fulfillment_mode": mode,
        "accepts_value": state.custody.is_some(),
        "last_event_seq": state.last_event_seq().await,
    }))
}

async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.metrics.to_json())
}

#[derive(Deserialize)]
struct RequestBody {
    #[serde(with = "pubkey")]
    beneficiary: Pubkey,
    quantity: u32,
    #[serde(default)]
    max_rarity_hint: u8,
    #[serde(default)]
    commitment: Commitment,
    #[serde(default)]
    value: u64,
    /// Treasury deposit transaction backing `value`.
    deposit: Option<String>,
}

async fn request_random(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<RequestBody> = open(&state, &envelope, "requestRandom", now)?;
    let body = &opened.body;
    let deposit =
        verify_deposit(&state, &opened.signer, body.value, body.deposit.as_deref(), now).await?;

    let value = deposit.as_ref().map_or(0, |d| d.lamports);
    let ctx = CallContext::new(opened.signer, now).with_value(value);
    let params = RandomnessParams {
        beneficiary: body.beneficiary,
        quantity: body.quantity,
        max_rarity_hint: body.max_rarity_hint,
        commitment: body.commitment,
    };
    let request_id = counted(
        &state,
        state
            .execute_signed(&admission(&opened, deposit), now, |c| {
                c.request_random(&ctx, params)
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"request_id": request_id})))
}

#[derive(Deserialize)]
struct LegacyRequestBody {
    #[serde(with = "pubkey")]
    beneficiary: Pubkey,
    quantity: u32,
    #[serde(default)]
    value: u64,
    deposit: Option<String>,
}

async fn request_random_words(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<LegacyRequestBody> = open(&state, &envelope, "requestRandomWords", now)?;
    let body = &opened.body;
    let deposit =
        verify_deposit(&state, &opened.signer, body.value, body.deposit.as_deref(), now).await?;

    let value = deposit.as_ref().map_or(0, |d| d.lamports);
    let ctx = CallContext::new(opened.signer, now).with_value(value);
    let request_id = counted(
        &state,
        state
            .execute_signed(&admission(&opened, deposit), now, |c| {
                c.request_random_words(&ctx, body.beneficiary, body.quantity)
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"request_id": request_id})))
}

#[derive(Deserialize)]
struct ReceiveBody {
    #[serde(default)]
    value: u64,
    deposit: Option<String>,
}

async fn receive(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<ReceiveBody> = open(&state, &envelope, "receive", now)?;
    let body = &opened.body;
    let deposit =
        verify_deposit(&state, &opened.signer, body.value, body.deposit.as_deref(), now).await?;

    let value = deposit.as_ref().map_or(0, |d| d.lamports);
    let ctx = CallContext::new(opened.signer, now).with_value(value);
    let disposition = counted(
        &state,
        state
            .execute_signed(&admission(&opened, deposit), now, |c| Ok(c.receive(&ctx)))
            .await,
    )?;
    let (disposition, amount) = match disposition {
        ValueDisposition::None => ("none", 0),
        ValueDisposition::Returned(amount) => ("returned", amount),
        ValueDisposition::Held(amount) => ("held", amount),
    };
    Ok(HttpResponse::Ok().json(json!({"disposition": disposition, "amount": amount})))
}

async fn get_random_result(state: web::Data<AppState>, path: web::Path<RequestId>) -> HttpResponse {
    let request_id = path.into_inner();
    let result = state.read(|c| c.get_random_result(request_id)).await;
    HttpResponse::Ok().json(result)
}

async fn get_request(
    state: web::Data<AppState>,
    path: web::Path<RequestId>,
) -> Result<HttpResponse, ApiError> {
    let request_id = path.into_inner();
    state
        .read(|c| c.request(request_id).cloned())
        .await
        .map(|request| HttpResponse::Ok().json(request))
        .ok_or_else(|| ApiError::NotFound(format!("request {request_id}")))
}

async fn pending_requests(state: web::Data<AppState>) -> HttpResponse {
    let pending: Vec<_> = state
        .read(|c| c.pending_requests().into_iter().cloned().collect())
        .await;
    HttpResponse::Ok().json(pending)
}

async fn get_random_for_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let beneficiary = parse_pubkey(&path)?;
    let result = state.read(|c| c.get_random_for_user(&beneficiary)).await;
    Ok(HttpResponse::Ok().json(result))
}

async fn get_authorized_caller(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let address = parse_pubkey(&path)?;
    state
        .read(|c| c.authorized_caller(&address).cloned())
        .await
        .map(|caller| HttpResponse::Ok().json(caller))
        .ok_or_else(|| ApiError::NotFound(format!("caller {address}")))
}

async fn get_cooldown(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let beneficiary = parse_pubkey(&path)?;
    let now = unix_now();
    let remaining_secs = state.read(|c| c.cooldown_remaining(&beneficiary, now)).await;
    Ok(HttpResponse::Ok().json(json!({
        "beneficiary": beneficiary.to_string(),
        "remaining_secs": remaining_secs,
    })))
}

async fn get_fees(state: web::Data<AppState>) -> HttpResponse {
    let (request_price, total_fee) = state
        .read(|c| (c.get_request_price(), c.get_total_fee()))
        .await;
    HttpResponse::Ok().json(json!({"request_price": request_price, "total_fee": total_fee}))
}

async fn get_ledger(state: web::Data<AppState>) -> HttpResponse {
    let ledger = state.read(|c| c.unused_value_ledger().clone()).await;
    HttpResponse::Ok().json(ledger)
}

async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    let body = state
        .read(|c| {
            json!({
                "owner": c.owner().to_string(),
                "funding": c.funding_config(),
                "fulfillment_mode": c.fulfillment_mode(),
                "cooldown_window_secs": c.state().rate_limiter.window_secs(),
            })
        })
        .await;
    HttpResponse::Ok().json(body)
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default)]
    after: u64,
    limit: Option<usize>,
}

async fn get_events(state: web::Data<AppState>, query: web::Query<EventsQuery>) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE).min(MAX_EVENT_PAGE);
    HttpResponse::Ok().json(state.events_after(query.after, limit).await)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FulfillBody {
    Batch(Vec<SignedFulfillment>),
    Single(SignedFulfillment),
}

async fn oracle_fulfill(
    state: web::Data<AppState>,
    body: web::Json<FulfillBody>,
) -> Result<HttpResponse, ApiError> {
    let deliveries = match body.into_inner() {
        FulfillBody::Batch(deliveries) => deliveries,
        FulfillBody::Single(delivery) => vec![delivery],
    };
    let request_ids: Vec<RequestId> = deliveries.iter().map(|d| d.request_id).collect();

    let outcomes = counted(&state, state.fulfill(deliveries).await)?;
    let report: Vec<_> = request_ids
        .into_iter()
        .zip(outcomes)
        .map(|(request_id, outcome)| match outcome {
            FulfillOutcome::Fulfilled => json!({"request_id": request_id, "status": "fulfilled"}),
            FulfillOutcome::Skipped(reason) => json!({
                "request_id": request_id,
                "status": "skipped",
                "reason": ApiError::from(reason.clone()).code(),
                "message": reason.to_string(),
            }),
        })
        .collect();
    Ok(HttpResponse::Ok().json(report))
}

#[derive(Deserialize)]
struct AuthorizedCallerBody {
    #[serde(with = "pubkey")]
    address: Pubkey,
    enabled: bool,
}

async fn set_authorized_caller(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<AuthorizedCallerBody> =
        open(&state, &envelope, "setAuthorizedCaller", now)?;
    let ctx = CallContext::new(opened.signer, now);
    let AuthorizedCallerBody { address, enabled } = opened.body;

    counted(
        &state,
        state
            .execute_signed(&admission(&opened, None), now, |c| {
                c.set_authorized_caller(&ctx, address, enabled)
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"address": address.to_string(), "enabled": enabled})))
}

#[derive(Deserialize)]
struct FundingConfigBody {
    #[serde(with = "bytes32")]
    key_hash: [u8; 32],
    callback_gas_limit: u32,
    request_confirmations: u16,
}

async fn update_funding_config(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<FundingConfigBody> = open(&state, &envelope, "updateFundingConfig", now)?;
    let ctx = CallContext::new(opened.signer, now);
    let body = &opened.body;

    let funding = counted(
        &state,
        state
            .execute_signed(&admission(&opened, None), now, |c| {
                c.update_funding_config(
                    &ctx,
                    body.key_hash,
                    body.callback_gas_limit,
                    body.request_confirmations,
                )
                .map(|()| c.funding_config().clone())
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(funding))
}

#[derive(Deserialize)]
struct CooldownBody {
    window_secs: i64,
}

async fn set_cooldown_window(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<CooldownBody> = open(&state, &envelope, "setCooldownWindow", now)?;
    let ctx = CallContext::new(opened.signer, now);
    let window_secs = opened.body.window_secs;

    counted(
        &state,
        state
            .execute_signed(&admission(&opened, None), now, |c| {
                c.set_cooldown_window(&ctx, window_secs)
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"window_secs": window_secs})))
}

#[derive(Deserialize)]
struct FulfillmentModeBody {
    mode: FulfillmentMode,
}

async fn set_fulfillment_mode(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<FulfillmentModeBody> =
        open(&state, &envelope, "setFulfillmentMode", now)?;
    let ctx = CallContext::new(opened.signer, now);
    let mode = opened.body.mode;

    counted(
        &state,
        state
            .execute_signed(&admission(&opened, None), now, |c| {
                c.set_fulfillment_mode(&ctx, mode)
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"mode": mode})))
}

#[derive(Deserialize)]
struct OwnershipBody {
    #[serde(with = "pubkey")]
    new_owner: Pubkey,
}

async fn transfer_ownership(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<OwnershipBody> = open(&state, &envelope, "transferOwnership", now)?;
    let ctx = CallContext::new(opened.signer, now);
    let new_owner = opened.body.new_owner;

    counted(
        &state,
        state
            .execute_signed(&admission(&opened, None), now, |c| {
                c.transfer_ownership(&ctx, new_owner)
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"owner": new_owner.to_string()})))
}

#[derive(Deserialize)]
struct EmptyBody {}

async fn emergency_withdraw(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<EmptyBody> = open(&state, &envelope, "emergencyWithdraw", now)?;
    let ctx = CallContext::new(opened.signer, now);

    let amount = counted(
        &state,
        state
            .execute_signed(&admission(&opened, None), now, |c| c.emergency_withdraw(&ctx))
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"amount": amount})))
}

#[derive(Deserialize)]
struct ManualRefundBody {
    #[serde(with = "pubkey")]
    to: Pubkey,
    amount: u64,
}

async fn manual_refund(
    state: web::Data<AppState>,
    envelope: web::Json<SignedEnvelope>,
) -> Result<HttpResponse, ApiError> {
    let now = unix_now();
    let opened: Opened<ManualRefundBody> = open(&state, &envelope, "manualRefund", now)?;
    let ctx = CallContext::new(opened.signer, now);
    let ManualRefundBody { to, amount } = opened.body;

    counted(
        &state,
        state
            .execute_signed(&admission(&opened, None), now, |c| {
                c.manual_refund(&ctx, to, amount)
            })
            .await,
    )?;
    Ok(HttpResponse::Ok().json(json!({"to": to.to_string(), "amount": amount})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposits::{Custody, DepositTx, FixedDeposits};
    use crate::metrics::Metrics;
    use crate::payout::{PayoutOrder, PayoutQueue};
    use crate::signing::sign_fulfillment;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test};
    use rng_coordinator::memory::{InMemoryBank, SequentialOracle};
    use rng_coordinator::{
        Coordinator, CoordinatorSettings, FundingConfig, RandomWord, ValueTransfer,
    };
    use serde_json::Value;
    use solana_sdk::signature::{Keypair, Signature, Signer};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Fixture {
        state: web::Data<AppState>,
        owner: Keypair,
        oracle: Keypair,
        consumer: Keypair,
    }

    fn build(
        bank: impl ValueTransfer + 'static,
        custody: impl FnOnce(&Keypair) -> Option<Custody>,
    ) -> Fixture {
        let owner = Keypair::new();
        let oracle = Keypair::new();
        let consumer = Keypair::new();
        let settings = CoordinatorSettings {
            owner: owner.pubkey(),
            funding: FundingConfig {
                coordinator_address: oracle.pubkey(),
                key_hash: [0u8; 32],
                callback_gas_limit: 100_000,
                request_confirmations: 3,
                subscription_id: 1,
            },
            cooldown_window_secs: 30,
            fulfillment_mode: FulfillmentMode::Pull,
        };
        let coordinator =
            Coordinator::initialize(settings, SequentialOracle::starting_at(1), bank).unwrap();
        let mut state = AppState::new(coordinator, None, Arc::new(Metrics::new()), 64, 300);
        if let Some(custody) = custody(&consumer) {
            state = state.with_custody(custody);
        }

        Fixture {
            state: web::Data::new(state),
            owner,
            oracle,
            consumer,
        }
    }

    fn fixture() -> Fixture {
        build(InMemoryBank::default(), |_| None)
    }

    /// Treasury-backed fixture where the consumer has paid `lamports` in one deposit.
    fn treasury_fixture(lamports: u64) -> (Fixture, String, mpsc::UnboundedReceiver<PayoutOrder>) {
        let (orders, payouts) = mpsc::unbounded_channel();
        let deposit = Signature::from([7u8; 64]).to_string();
        let f = build(PayoutQueue::new(orders), |consumer| {
            let paid = DepositTx {
                succeeded: true,
                signers: vec![consumer.pubkey()],
                treasury_credit: lamports,
                block_time: Some(unix_now()),
            };
            let lookup = FixedDeposits(HashMap::from([(deposit.clone(), paid)]));
            Some(Custody::new(Pubkey::new_unique(), Arc::new(lookup), 600))
        });
        (f, deposit, payouts)
    }

    fn envelope(keypair: &Keypair, action: &str, mut body: Value) -> SignedEnvelope {
        body["issued_at"] = json!(unix_now());
        body["nonce"] = json!(Pubkey::new_unique().to_string());
        SignedEnvelope::seal(keypair, action, body.to_string())
    }

    macro_rules! post {
        ($app:expr, $uri:expr, $body:expr) => {
            test::call_service(
                &$app,
                test::TestRequest::post().uri($uri).set_json($body).to_request(),
            )
            .await
        };
    }

    macro_rules! get_json {
        ($app:expr, $uri:expr) => {{
            let response =
                test::call_service(&$app, test::TestRequest::get().uri($uri).to_request()).await;
            assert!(response.status().is_success(), "GET {} failed", $uri);
            let body: Value = test::read_body_json(response).await;
            body
        }};
    }

    fn enable(f: &Fixture, enabled: bool) -> SignedEnvelope {
        envelope(
            &f.owner,
            "setAuthorizedCaller",
            json!({"address": f.consumer.pubkey().to_string(), "enabled": enabled}),
        )
    }

    #[actix_web::test]
    async fn request_then_fulfill_round_trip() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;
        let beneficiary = Pubkey::new_unique();

        assert_eq!(
            post!(app, "/v1/admin/authorized-callers", &enable(&f, true)).status(),
            StatusCode::OK
        );

        let request = envelope(
            &f.consumer,
            "requestRandom",
            json!({"beneficiary": beneficiary.to_string(), "quantity": 2}),
        );
        let response = post!(app, "/v1/requests", &request);
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["request_id"], 1);

        let pending = get_json!(app, "/v1/results/1");
        assert_eq!(pending, json!({"fulfilled": false, "words": []}));

        let words = vec![RandomWord([1u8; 32]), RandomWord([2u8; 32])];
        let delivery = SignedFulfillment {
            request_id: 1,
            signature: sign_fulfillment(&f.oracle, 1, &words),
            words: words.clone(),
        };
        let response = post!(app, "/v1/oracle/fulfill", &delivery);
        assert_eq!(response.status(), StatusCode::OK);
        let report: Value = test::read_body_json(response).await;
        assert_eq!(report[0]["status"], "fulfilled");

        let latest = get_json!(app, &format!("/v1/users/{beneficiary}/latest"));
        assert_eq!(latest["fulfilled"], true);
        assert_eq!(latest["words"][1], json!(words[1].to_string()));

        let again = post!(app, "/v1/oracle/fulfill", vec![&delivery]);
        let report: Value = test::read_body_json(again).await;
        assert_eq!(report[0]["status"], "skipped");
        assert_eq!(report[0]["reason"], "unknown_or_already_fulfilled_request");
    }

    #[actix_web::test]
    async fn unauthorized_consumer_gets_403() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        let request = envelope(
            &f.consumer,
            "requestRandom",
            json!({"beneficiary": Pubkey::new_unique().to_string(), "quantity": 1}),
        );
        let response = post!(app, "/v1/requests", &request);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "permission_denied");

        let metrics = get_json!(app, "/metrics");
        assert_eq!(metrics["calls_rejected"], 1);
    }

    #[actix_web::test]
    async fn cooldown_returns_429_with_retry_after() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;
        let beneficiary = Pubkey::new_unique().to_string();

        post!(app, "/v1/admin/authorized-callers", &enable(&f, true));

        let body = json!({"beneficiary": beneficiary, "quantity": 1});
        let first = envelope(&f.consumer, "requestRandom", body.clone());
        assert_eq!(post!(app, "/v1/requests", &first).status(), StatusCode::OK);

        let second = post!(app, "/v1/requests", &envelope(&f.consumer, "requestRandom", body));
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }

    #[actix_web::test]
    async fn envelope_signed_for_other_action_is_401() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        let wrong_action = envelope(
            &f.owner,
            "transferOwnership",
            json!({"address": f.consumer.pubkey().to_string(), "enabled": true}),
        );
        let response = post!(app, "/v1/admin/authorized-callers", &wrong_action);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn revoked_caller_stays_revoked_when_old_grant_is_resent() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        let grant = enable(&f, true);
        assert_eq!(post!(app, "/v1/admin/authorized-callers", &grant).status(), StatusCode::OK);
        assert_eq!(
            post!(app, "/v1/admin/authorized-callers", &enable(&f, false)).status(),
            StatusCode::OK
        );

        let resent = post!(app, "/v1/admin/authorized-callers", &grant);
        assert_eq!(resent.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resent).await;
        assert_eq!(body["error"], "replayed_envelope");

        let caller = get_json!(app, &format!("/v1/callers/{}", f.consumer.pubkey()));
        assert_eq!(caller["enabled"], false);
    }

    #[actix_web::test]
    async fn request_envelope_is_accepted_once() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        post!(app, "/v1/admin/authorized-callers", &enable(&f, true));
        let no_cooldown = envelope(&f.owner, "setCooldownWindow", json!({"window_secs": 0}));
        assert_eq!(post!(app, "/v1/admin/cooldown", &no_cooldown).status(), StatusCode::OK);

        let request = envelope(
            &f.consumer,
            "requestRandom",
            json!({"beneficiary": Pubkey::new_unique().to_string(), "quantity": 1}),
        );
        assert_eq!(post!(app, "/v1/requests", &request).status(), StatusCode::OK);
        assert_eq!(post!(app, "/v1/requests", &request).status(), StatusCode::UNAUTHORIZED);

        let pending = get_json!(app, "/v1/requests/pending");
        assert_eq!(pending.as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn admin_routes_reject_non_owner() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        let withdraw = envelope(&f.consumer, "emergencyWithdraw", json!({}));
        let response = post!(app, "/v1/admin/emergency-withdraw", &withdraw);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let withdraw = envelope(&f.owner, "emergencyWithdraw", json!({}));
        let response = post!(app, "/v1/admin/emergency-withdraw", &withdraw);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["amount"], 0);
    }

    #[actix_web::test]
    async fn forged_oracle_proof_is_403() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        let words = vec![RandomWord([9u8; 32])];
        let forged = SignedFulfillment {
            request_id: 1,
            signature: sign_fulfillment(&f.consumer, 1, &words),
            words,
        };
        let response = post!(app, "/v1/oracle/fulfill", &forged);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn value_is_refused_without_a_treasury() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        let receive = envelope(&f.consumer, "receive", json!({"value": 40}));
        let response = post!(app, "/v1/receive", &receive);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "value_not_accepted");

        let ledger = get_json!(app, "/v1/ledger");
        assert_eq!(ledger["total_received"], 0);
        assert_eq!(ledger["total_held"], 0);

        let zero = envelope(&f.consumer, "receive", json!({"value": 0}));
        let body: Value = test::read_body_json(post!(app, "/v1/receive", &zero)).await;
        assert_eq!(body, json!({"disposition": "none", "amount": 0}));
    }

    #[actix_web::test]
    async fn undeposited_value_queues_no_payout() {
        let (f, deposit, mut payouts) = treasury_fixture(500);
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;
        let stranger = Keypair::new();

        let declared = envelope(&stranger, "receive", json!({"value": 1_000_000_000u64}));
        let response = post!(app, "/v1/receive", &declared);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let borrowed = envelope(
            &stranger,
            "receive",
            json!({"value": 500, "deposit": deposit.clone()}),
        );
        let response = post!(app, "/v1/receive", &borrowed);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "deposit_rejected");

        let inflated = envelope(
            &f.consumer,
            "receive",
            json!({"value": 5_000, "deposit": deposit}),
        );
        assert_eq!(post!(app, "/v1/receive", &inflated).status(), StatusCode::BAD_REQUEST);

        assert!(payouts.try_recv().is_err());
        let ledger = get_json!(app, "/v1/ledger");
        assert_eq!(ledger["total_received"], 0);
    }

    #[actix_web::test]
    async fn deposit_is_returned_exactly_once() {
        let (f, deposit, mut payouts) = treasury_fixture(500);
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;
        let body = json!({"value": 500, "deposit": deposit});

        let response = post!(app, "/v1/receive", &envelope(&f.consumer, "receive", body.clone()));
        assert_eq!(response.status(), StatusCode::OK);
        let report: Value = test::read_body_json(response).await;
        assert_eq!(report, json!({"disposition": "returned", "amount": 500}));

        let response = post!(app, "/v1/receive", &envelope(&f.consumer, "receive", body));
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let report: Value = test::read_body_json(response).await;
        assert_eq!(report["error"], "deposit_already_spent");

        // 500 deposited, 500 paid back.
        assert_eq!(
            payouts.try_recv().unwrap(),
            PayoutOrder {
                to: f.consumer.pubkey(),
                lamports: 500,
            }
        );
        assert!(payouts.try_recv().is_err());

        let ledger = get_json!(app, "/v1/ledger");
        assert_eq!(ledger["total_received"], 500);
        assert_eq!(ledger["total_held"], 0);
    }

    #[actix_web::test]
    async fn refused_request_leaves_its_deposit_usable() {
        let (f, deposit, mut payouts) = treasury_fixture(250);
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;
        post!(app, "/v1/admin/authorized-callers", &enable(&f, true));
        let beneficiary = Pubkey::new_unique().to_string();

        let too_large = envelope(
            &f.consumer,
            "requestRandom",
            json!({
                "beneficiary": beneficiary.clone(),
                "quantity": 26,
                "value": 250,
                "deposit": deposit.clone(),
            }),
        );
        assert_eq!(post!(app, "/v1/requests", &too_large).status(), StatusCode::BAD_REQUEST);
        assert!(payouts.try_recv().is_err());

        let legacy = envelope(
            &f.consumer,
            "requestRandomWords",
            json!({"beneficiary": beneficiary, "quantity": 1, "value": 250, "deposit": deposit}),
        );
        assert_eq!(post!(app, "/v1/requests/legacy", &legacy).status(), StatusCode::OK);
        assert_eq!(
            payouts.try_recv().unwrap(),
            PayoutOrder {
                to: f.consumer.pubkey(),
                lamports: 250,
            }
        );
    }

    #[actix_web::test]
    async fn events_page_follows_cursor() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        post!(app, "/v1/admin/authorized-callers", &enable(&f, true));
        post!(app, "/v1/admin/authorized-callers", &enable(&f, false));

        let events = get_json!(app, "/v1/events?after=0");
        assert_eq!(events[0]["event"], "authorized_caller_updated");
        assert_eq!(events[0]["enabled"], true);
        assert_eq!(events[1]["enabled"], false);

        let later = get_json!(app, "/v1/events?after=1");
        assert_eq!(later.as_array().unwrap().len(), 1);

        let status = get_json!(app, "/status");
        assert_eq!(status["last_event_seq"], 2);
        assert_eq!(status["accepts_value"], false);
    }

    #[actix_web::test]
    async fn unknown_request_is_404_and_bad_address_is_400() {
        let f = fixture();
        let app =
            test::init_service(App::new().app_data(f.state.clone()).configure(configure)).await;

        let response =
            test::call_service(&app, test::TestRequest::get().uri("/v1/requests/77").to_request())
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri("/v1/users/not-a-key/latest").to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let unknown = get_json!(app, "/v1/results/77");
        assert_eq!(unknown, json!({"fulfilled": false, "words": []}));
    }
}
