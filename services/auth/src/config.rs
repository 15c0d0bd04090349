//! Auth service settings
//!
//! Infrastructure (database, Redis) is read by `common` from the process
//! environment. Everything else comes from `config/auth.toml` when present,
//! overridden by `AUTH__*` variables, e.g. `AUTH__JWT_SECRET`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    jwt::JwtConfig, mailer::HttpMailerConfig, rate_limiter::LoginThrottleConfig,
    session::SessionConfig,
};

#[derive(Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub session_timeout_hours: i64,
    pub remember_me_days: i64,
    pub require_email_verification: bool,
    pub rotate_refresh_tokens: bool,
    pub frontend_url: String,
    /// Mail API endpoint. Without it links are only logged.
    pub mail_api_url: Option<String>,
    pub mail_api_key: String,
    pub mail_from: String,
    pub mail_timeout_secs: u64,
    pub login_max_attempts: u32,
    pub login_window_seconds: u64,
    pub login_ban_seconds: u64,
    pub bind_address: String,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("session_timeout_hours", &self.session_timeout_hours)
            .field("require_email_verification", &self.require_email_verification)
            .field("rotate_refresh_tokens", &self.rotate_refresh_tokens)
            .field("mail_api_url", &self.mail_api_url)
            .field("bind_address", &self.bind_address)
            .finish_non_exhaustive()
    }
}

impl AuthSettings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("config/auth").required(false))
            .add_source(Environment::with_prefix("AUTH").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("jwt_secret", "")?
            .set_default("jwt_issuer", "makazi-auth")?
            .set_default("session_timeout_hours", 24)?
            .set_default("remember_me_days", 30)?
            .set_default("require_email_verification", true)?
            .set_default("rotate_refresh_tokens", false)?
            .set_default("frontend_url", "http://localhost:5173")?
            .set_default("mail_api_key", "")?
            .set_default("mail_from", "Makazi <no-reply@makazi.co.ke>")?
            .set_default("mail_timeout_secs", 10)?
            .set_default("login_max_attempts", 5)?
            .set_default("login_window_seconds", 300)?
            .set_default("login_ban_seconds", 900)?
            .set_default("bind_address", "0.0.0.0:3000")
    }

    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig {
            secret: self.jwt_secret.clone(),
            issuer: self.jwt_issuer.clone(),
            session_timeout_hours: self.session_timeout_hours,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            require_email_verification: self.require_email_verification,
            session_timeout_hours: self.session_timeout_hours,
            remember_me_days: self.remember_me_days,
            rotate_refresh_tokens: self.rotate_refresh_tokens,
            frontend_url: self.frontend_url.clone(),
        }
    }

    pub fn throttle_config(&self) -> LoginThrottleConfig {
        LoginThrottleConfig {
            max_attempts: self.login_max_attempts,
            window_seconds: self.login_window_seconds,
            ban_seconds: self.login_ban_seconds,
        }
    }

    pub fn mailer_config(&self) -> Option<HttpMailerConfig> {
        self.mail_api_url.as_ref().map(|api_url| HttpMailerConfig {
            api_url: api_url.clone(),
            api_key: self.mail_api_key.clone(),
            from: self.mail_from.clone(),
            timeout: Duration::from_secs(self.mail_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_without_overrides() {
        let settings: AuthSettings = AuthSettings::builder()
            .expect("defaults")
            .build()
            .expect("builds")
            .try_deserialize()
            .expect("deserializes");

        assert_eq!(settings.session_timeout_hours, 24);
        assert!(settings.require_email_verification);
        assert!(!settings.rotate_refresh_tokens);
        assert!(settings.mailer_config().is_none());
        assert_eq!(settings.throttle_config().max_attempts, 5);
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        unsafe {
            std::env::set_var("AUTH__JWT_SECRET", "an-overridden-secret-of-sufficient-length");
            std::env::set_var("AUTH__ROTATE_REFRESH_TOKENS", "true");
            std::env::set_var("AUTH__MAIL_API_URL", "https://mail.example.com/send");
        }

        let settings = AuthSettings::load().expect("loads");

        unsafe {
            std::env::remove_var("AUTH__JWT_SECRET");
            std::env::remove_var("AUTH__ROTATE_REFRESH_TOKENS");
            std::env::remove_var("AUTH__MAIL_API_URL");
        }

        assert_eq!(
            settings.jwt_config().secret,
            "an-overridden-secret-of-sufficient-length"
        );
        assert!(settings.session_config().rotate_refresh_tokens);
        let mailer = settings.mailer_config().expect("mail API configured");
        assert_eq!(mailer.timeout, Duration::from_secs(10));
    }

    #[test]
    fn debug_hides_secret() {
        let mut settings: AuthSettings = AuthSettings::builder()
            .expect("defaults")
            .build()
            .expect("builds")
            .try_deserialize()
            .expect("deserializes");
        settings.jwt_secret = "super-secret-value".to_string();
        assert!(!format!("{:?}", settings).contains("super-secret-value"));
    }
}
