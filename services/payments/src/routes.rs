//! Payments service routes

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use uuid::Uuid;

use auth::{jwt::Claims, middleware::require_session, models::UserRole};

use crate::{
    AppState,
    error::{PaymentError, PaymentResult},
    setup::PaybillSetupRequest,
};

const RECONCILE_PERMISSION: &str = "payments:reconcile";
const PAYBILL_PERMISSION: &str = "paybill:manage";

/// Create the router for the payments service
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/mpesa/transactions/:id/reconcile", post(reconcile))
        .route("/paybill/setup", post(setup_paybill))
        .route("/paybill/register-urls", post(reregister_urls))
        .route_layer(from_fn_with_state(
            state.jwt_service.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/mpesa/validation", post(validation))
        .route("/mpesa/confirmation", post(confirmation))
        .merge(admin)
        .with_state(state)
}

fn require_permission(claims: &Claims, permission: &'static str) -> PaymentResult<()> {
    if claims.has_permission(permission) {
        Ok(())
    } else {
        Err(PaymentError::Forbidden(permission))
    }
}

/// Company an administrator acts for
fn acting_company(claims: &Claims) -> PaymentResult<Uuid> {
    claims.company_id.ok_or(PaymentError::PaybillNotConfigured)
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "payments-service"
    }))
}

pub async fn validation(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    Json(state.webhook_processor.validate(&body).await)
}

pub async fn confirmation(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    Json(state.webhook_processor.confirm(&body).await)
}

pub async fn reconcile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(transaction_id): Path<Uuid>,
) -> PaymentResult<impl IntoResponse> {
    require_permission(&claims, RECONCILE_PERMISSION)?;

    let payment = if claims.role == UserRole::SuperAdmin {
        state
            .reconciler
            .reconcile(transaction_id, Some(claims.sub))
            .await?
    } else {
        state
            .reconciler
            .reconcile_for_company(transaction_id, acting_company(&claims)?, Some(claims.sub))
            .await?
    };

    Ok(Json(payment))
}

pub async fn setup_paybill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PaybillSetupRequest>,
) -> PaymentResult<impl IntoResponse> {
    require_permission(&claims, PAYBILL_PERMISSION)?;
    let settings = state
        .paybill_setup
        .configure(acting_company(&claims)?, payload)
        .await?;
    Ok(Json(settings))
}

pub async fn reregister_urls(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> PaymentResult<impl IntoResponse> {
    require_permission(&claims, PAYBILL_PERMISSION)?;
    let settings = state
        .paybill_setup
        .reregister(acting_company(&claims)?)
        .await?;
    Ok(Json(settings))
}
