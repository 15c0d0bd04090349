//! M-Pesa payment intake for Makazi
//!
//! [`webhook::WebhookProcessor`] answers the provider's validation and
//! confirmation callbacks, [`reconcile::Reconciler`] turns confirmed
//! transactions into ledger payments exactly once, and
//! [`setup::PaybillSetup`] onboards a company's paybill through
//! [`gateway::DarajaClient`].

use std::sync::Arc;

use auth::jwt::JwtService;

pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod models;
pub mod reconcile;
pub mod repositories;
pub mod routes;
pub mod setup;
pub mod token_cache;
pub mod webhook;

use crate::{reconcile::Reconciler, setup::PaybillSetup, webhook::WebhookProcessor};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub webhook_processor: Arc<WebhookProcessor>,
    pub reconciler: Arc<Reconciler>,
    pub paybill_setup: Arc<PaybillSetup>,
    pub jwt_service: JwtService,
}
