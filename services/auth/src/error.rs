//! Error types for the authentication service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Why an invitation could not be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationMismatch {
    /// The supplied email differs from the invited address
    EmailMismatch,
    /// The invited account is not a tenant account
    WrongRole,
    /// The invited account is no longer pending
    AlreadyUsed,
    /// No account exists for the invitation
    NotFound,
}

impl InvitationMismatch {
    pub fn reason(&self) -> &'static str {
        match self {
            InvitationMismatch::EmailMismatch => "Email does not match the invitation",
            InvitationMismatch::WrongRole => "Invitation is not for a tenant account",
            InvitationMismatch::AlreadyUsed => "Invitation has already been used",
            InvitationMismatch::NotFound => "Invitation not found",
        }
    }
}

/// Authentication and session failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Account is not active")]
    AccountInactive,

    #[error("Email address has not been verified")]
    NotVerified,

    #[error("Email is already registered")]
    DuplicateEmail,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has already been used")]
    TokenAlreadyUsed,

    #[error("Invalid invitation: {}", .0.reason())]
    InvitationMismatch(InvitationMismatch),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error(transparent)]
    Store(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::AccountInactive | AuthError::NotVerified => StatusCode::FORBIDDEN,
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::TokenAlreadyUsed
            | AuthError::InvitationMismatch(_)
            | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal authentication failure: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Type alias for authentication results
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitation_mismatch_message_names_the_field() {
        let err = AuthError::InvitationMismatch(InvitationMismatch::EmailMismatch);
        assert_eq!(
            err.to_string(),
            "Invalid invitation: Email does not match the invitation"
        );
    }

    #[test]
    fn status_codes_follow_the_failure_kind() {
        assert_eq!(
            AuthError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AccountInactive.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::DuplicateEmail.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::Store(DatabaseError::Decode("bad role".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
