//! HTTP mapping of coordinator and authentication failures.

use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, ResponseError};
use rng_coordinator::CoordinatorError;
use serde::Serialize;
use thiserror::Error;

use crate::deposits::DepositError;
use crate::signing::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Deposit(#[from] DepositError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("service busy: {0}")]
    Busy(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl ApiError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Coordinator(e) => match e {
                CoordinatorError::PermissionDenied { .. } => "permission_denied",
                CoordinatorError::CooldownActive { .. } => "cooldown_active",
                CoordinatorError::InvalidQuantity { .. } => "invalid_quantity",
                CoordinatorError::UnknownOrAlreadyFulfilledRequest { .. } => {
                    "unknown_or_already_fulfilled_request"
                }
                CoordinatorError::WordCountMismatch { .. } => "word_count_mismatch",
                CoordinatorError::RefundFailed { .. } => "refund_failed",
                CoordinatorError::OracleUnavailable(_) => "oracle_unavailable",
                CoordinatorError::DuplicateRequestId { .. } => "duplicate_request_id",
                CoordinatorError::InvalidConfig(_) => "invalid_config",
                CoordinatorError::InsufficientHeldValue { .. } => "insufficient_held_value",
                CoordinatorError::ZeroAddressNotAllowed => "zero_address_not_allowed",
            },
            ApiError::Auth(AuthError::Replayed) => "replayed_envelope",
            ApiError::Auth(_) => "unauthenticated",
            ApiError::Deposit(DepositError::NoCustody) => "value_not_accepted",
            ApiError::Deposit(DepositError::AlreadySpent(_)) => "deposit_already_spent",
            ApiError::Deposit(_) => "deposit_rejected",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Busy(_) => "busy",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Coordinator(e) => match e {
                CoordinatorError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                CoordinatorError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
                CoordinatorError::InvalidQuantity { .. }
                | CoordinatorError::InvalidConfig(_)
                | CoordinatorError::InsufficientHeldValue { .. }
                | CoordinatorError::ZeroAddressNotAllowed => StatusCode::BAD_REQUEST,
                CoordinatorError::UnknownOrAlreadyFulfilledRequest { .. } => StatusCode::NOT_FOUND,
                CoordinatorError::WordCountMismatch { .. }
                | CoordinatorError::DuplicateRequestId { .. } => StatusCode::CONFLICT,
                CoordinatorError::RefundFailed { .. } => StatusCode::BAD_GATEWAY,
                CoordinatorError::OracleUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Deposit(DepositError::AlreadySpent(_)) => StatusCode::CONFLICT,
            ApiError::Deposit(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        if let ApiError::Coordinator(CoordinatorError::CooldownActive { remaining_secs }) = self {
            response.insert_header((header::RETRY_AFTER, remaining_secs.to_string()));
        }
        response.json(ErrorResponse {
            error: self.code(),
            message: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use solana_sdk::pubkey::Pubkey;

    #[actix_web::test]
    async fn cooldown_sets_retry_after() {
        let error = ApiError::from(CoordinatorError::CooldownActive { remaining_secs: 12 });
        let response = error.error_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "12");

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "cooldown_active");
    }

    #[test]
    fn statuses_follow_error_kind() {
        let denied = ApiError::from(CoordinatorError::PermissionDenied {
            signer: Pubkey::new_unique(),
        });
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(CoordinatorError::OracleUnavailable("down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(AuthError::BadSignature).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::from(AuthError::Replayed).code(), "replayed_envelope");
        assert_eq!(
            ApiError::from(DepositError::NoCustody).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DepositError::AlreadySpent("sig".into())).status_code(),
            StatusCode::CONFLICT
        );
    }
}
