//! Error types for the payments service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid business shortcode")]
    InvalidShortcode,

    #[error("Invalid unit number")]
    InvalidUnit,

    #[error("Unit has no current tenant")]
    UnitVacant,

    #[error("Amount is less than rent amount")]
    AmountTooLow,

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Transaction has already been reconciled")]
    AlreadyReconciled,

    #[error("Paybill is not configured for this company")]
    PaybillNotConfigured,

    #[error("Gateway authentication failed: {0}")]
    GatewayAuthFailed(String),

    #[error("Gateway URL registration failed: {0}")]
    GatewayRegistrationFailed(String),

    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Missing permission: {0}")]
    Forbidden(&'static str),

    #[error("Credential encryption failed: {0}")]
    Crypto(String),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl PaymentError {
    /// `ResultDesc` sent back to the gateway when a webhook is rejected
    pub fn result_desc(&self) -> &'static str {
        match self {
            PaymentError::InvalidShortcode => "Invalid business shortcode",
            PaymentError::InvalidUnit => "Invalid unit number",
            PaymentError::UnitVacant => "Unit has no current tenant",
            PaymentError::AmountTooLow => "Amount is less than rent amount",
            PaymentError::InvalidPayload(_) => "Invalid request payload",
            PaymentError::Timeout => "Request timed out",
            _ => "Internal error",
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = match &self {
            PaymentError::TransactionNotFound | PaymentError::PaybillNotConfigured => {
                StatusCode::NOT_FOUND
            }
            PaymentError::AlreadyReconciled => StatusCode::CONFLICT,
            PaymentError::InvalidShortcode
            | PaymentError::InvalidUnit
            | PaymentError::UnitVacant
            | PaymentError::AmountTooLow
            | PaymentError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            PaymentError::Forbidden(_) => StatusCode::FORBIDDEN,
            PaymentError::GatewayAuthFailed(_) | PaymentError::GatewayRegistrationFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            PaymentError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PaymentError::Crypto(_) | PaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal payments failure: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_descriptions_match_the_gateway_contract() {
        assert_eq!(
            PaymentError::InvalidShortcode.result_desc(),
            "Invalid business shortcode"
        );
        assert_eq!(
            PaymentError::AmountTooLow.result_desc(),
            "Amount is less than rent amount"
        );
        assert_eq!(PaymentError::Timeout.result_desc(), "Request timed out");
    }

    #[test]
    fn internal_details_stay_out_of_webhook_replies() {
        let err = PaymentError::Store(DatabaseError::Decode("bad status".into()));
        assert_eq!(err.result_desc(), "Internal error");
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn reconciliation_conflicts_are_409() {
        assert_eq!(
            PaymentError::AlreadyReconciled.into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
