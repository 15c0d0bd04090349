//! Bearer session validation for protected routes

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

use crate::{error::AuthError, jwt::JwtService};

/// Validate the bearer session token and expose its [`Claims`] to handlers
/// through request extensions.
///
/// [`Claims`]: crate::jwt::Claims
pub async fn require_session(
    State(jwt): State<JwtService>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return AuthError::InvalidToken.into_response();
    };

    match jwt.validate_session(bearer.token()) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            debug!("Rejected session token: {}", e);
            e.into_response()
        }
    }
}
