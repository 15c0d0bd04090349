//! Login throttling against password guessing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Login throttle configuration
#[derive(Debug, Clone)]
pub struct LoginThrottleConfig {
    /// Failed attempts allowed inside one window
    pub max_attempts: u32,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds once the limit is hit
    pub ban_seconds: u64,
}

impl Default for LoginThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,
            ban_seconds: 900,
        }
    }
}

#[derive(Debug)]
struct AttemptWindow {
    attempts: u32,
    window_started: Instant,
    banned_until: Option<Instant>,
}

/// Counts failed logins per `ip|email` key
#[derive(Debug, Clone)]
pub struct LoginThrottle {
    config: LoginThrottleConfig,
    windows: Arc<Mutex<HashMap<String, AttemptWindow>>>,
}

impl LoginThrottle {
    pub fn new(config: LoginThrottleConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build the throttle key for a login attempt
    pub fn key(ip: Option<&str>, email: &str) -> String {
        format!("{}|{}", ip.unwrap_or("unknown"), email)
    }

    /// Returns false while the key is banned
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        let Some(banned_until) = windows.get(key).map(|w| w.banned_until) else {
            return true;
        };

        match banned_until {
            Some(until) if now < until => false,
            Some(_) => {
                windows.remove(key);
                true
            }
            None => true,
        }
    }

    /// Record a failed attempt, banning the key once the limit is reached
    pub async fn record_failure(&self, key: &str) {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window_len = Duration::from_secs(self.config.window_seconds);

        let window = windows.entry(key.to_string()).or_insert(AttemptWindow {
            attempts: 0,
            window_started: now,
            banned_until: None,
        });

        if now.duration_since(window.window_started) >= window_len {
            window.attempts = 0;
            window.window_started = now;
        }

        window.attempts += 1;

        if window.attempts >= self.config.max_attempts {
            window.banned_until = Some(now + Duration::from_secs(self.config.ban_seconds));
            warn!(
                "Login throttled for key {} for {} seconds",
                key, self.config.ban_seconds
            );
        }
    }

    /// Forget a key after a successful login
    pub async fn reset(&self, key: &str) {
        self.windows.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max_attempts: u32) -> LoginThrottle {
        LoginThrottle::new(LoginThrottleConfig {
            max_attempts,
            window_seconds: 60,
            ban_seconds: 60,
        })
    }

    #[tokio::test]
    async fn bans_after_max_failures() {
        let throttle = throttle(3);
        let key = LoginThrottle::key(Some("10.0.0.1"), "mwangi@example.com");

        for _ in 0..2 {
            throttle.record_failure(&key).await;
            assert!(throttle.is_allowed(&key).await);
        }

        throttle.record_failure(&key).await;
        assert!(!throttle.is_allowed(&key).await);
    }

    #[tokio::test]
    async fn reset_clears_failures() {
        let throttle = throttle(2);
        let key = LoginThrottle::key(None, "mwangi@example.com");

        throttle.record_failure(&key).await;
        throttle.reset(&key).await;
        throttle.record_failure(&key).await;
        assert!(throttle.is_allowed(&key).await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let throttle = throttle(1);
        let a = LoginThrottle::key(Some("10.0.0.1"), "a@example.com");
        let b = LoginThrottle::key(Some("10.0.0.1"), "b@example.com");

        throttle.record_failure(&a).await;
        assert!(!throttle.is_allowed(&a).await);
        assert!(throttle.is_allowed(&b).await);
    }
}
