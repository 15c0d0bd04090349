//! Payments service settings
//!
//! Loaded from `config/payments.toml` when present, overridden by
//! `PAYMENTS__*` variables, e.g. `PAYMENTS__CREDENTIAL_KEY`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::gateway::GatewayConfig;

/// Where gateway bearer tokens are cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCacheKind {
    Memory,
    Redis,
}

#[derive(Clone, Deserialize)]
pub struct PaymentsSettings {
    pub gateway_base_url: String,
    pub gateway_timeout_secs: u64,
    pub webhook_timeout_secs: u64,
    /// Base64 encoded 32-byte key for stored consumer credentials
    pub credential_key: String,
    /// Public origin the gateway calls back on
    pub public_base_url: String,
    pub token_cache: TokenCacheKind,
    /// Shared with the auth service to verify administrator sessions
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub bind_address: String,
}

impl std::fmt::Debug for PaymentsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentsSettings")
            .field("gateway_base_url", &self.gateway_base_url)
            .field("gateway_timeout_secs", &self.gateway_timeout_secs)
            .field("webhook_timeout_secs", &self.webhook_timeout_secs)
            .field("credential_key", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .field("token_cache", &self.token_cache)
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .finish_non_exhaustive()
    }
}

impl PaymentsSettings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("config/payments").required(false))
            .add_source(Environment::with_prefix("PAYMENTS").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("gateway_base_url", "https://sandbox.safaricom.co.ke")?
            .set_default("gateway_timeout_secs", 15)?
            .set_default("webhook_timeout_secs", 8)?
            .set_default("credential_key", "")?
            .set_default("public_base_url", "http://localhost:3001")?
            .set_default("token_cache", "memory")?
            .set_default("jwt_secret", "")?
            .set_default("jwt_issuer", "makazi-auth")?
            .set_default("bind_address", "0.0.0.0:3001")
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.gateway_base_url.clone(),
            timeout: Duration::from_secs(self.gateway_timeout_secs),
        }
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}
