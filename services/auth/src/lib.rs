//! Authentication and session lifecycle for Makazi
//!
//! The [`session::SessionManager`] owns registration, email verification,
//! login, refresh, logout and password recovery. Persistence sits behind
//! [`repositories::AccountStore`] and outbound mail behind
//! [`mailer::Mailer`]. Other services validate session tokens with
//! [`jwt::JwtService`] and the [`middleware::require_session`] layer.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod jwt;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod opaque;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod validation;

use crate::{jwt::JwtService, session::SessionManager};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
    pub jwt_service: JwtService,
}
