//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState,
    error::AuthResult,
    jwt::Claims,
    middleware::require_session,
    models::ClientInfo,
    session::{LoginRequest, RegisterRequest},
};

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/change-password", post(change_password))
        .route_layer(from_fn_with_state(
            state.jwt_service.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/resend-verification", post(resend_verification))
        .merge(protected)
        .with_state(state)
}

/// Client details recorded against refresh tokens
fn client_info(headers: &HeaderMap) -> ClientInfo {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    ClientInfo {
        device_info: text("x-device-info"),
        ip_address: text("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| text("x-real-ip")),
        user_agent: text(header::USER_AGENT.as_str()),
    }
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let outcome = state
        .session_manager
        .register(payload, client_info(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> AuthResult<impl IntoResponse> {
    let verification = state.session_manager.verify_email(&payload.token).await?;
    Ok(Json(json!({ "success": true, "status": verification })))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    let session = state
        .session_manager
        .login(payload, client_info(&headers))
        .await?;
    Ok(Json(session))
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    let session = state
        .session_manager
        .refresh(&payload.refresh_token, client_info(&headers))
        .await?;
    Ok(Json(session))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    state.session_manager.logout(&payload.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> impl IntoResponse {
    Json(
        state
            .session_manager
            .request_password_reset(&payload.email)
            .await,
    )
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    state
        .session_manager
        .reset_password(&payload.token, &payload.new_password)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Password has been reset. Please sign in again."
    })))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AuthResult<impl IntoResponse> {
    let response = state
        .session_manager
        .resend_verification_email(&payload.email)
        .await?;
    Ok(Json(response))
}

pub async fn me(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    Json(claims)
}

pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AuthResult<impl IntoResponse> {
    let revoked = state.session_manager.logout_all(claims.sub).await?;
    Ok(Json(json!({ "revoked": revoked })))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .session_manager
        .change_password(
            claims.sub,
            payload.current_password.as_deref(),
            &payload.new_password,
        )
        .await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_info_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("197.232.1.10, 10.0.0.2"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("MakaziApp/2.1"));

        let info = client_info(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("197.232.1.10"));
        assert_eq!(info.user_agent.as_deref(), Some("MakaziApp/2.1"));
        assert!(info.device_info.is_none());
    }
}
