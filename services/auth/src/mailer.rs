//! Transactional email dispatch
//!
//! Dispatch never fails the caller: every outcome, including transport
//! errors and timeouts, comes back as a [`DispatchOutcome`].

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(
        &self,
        address: &str,
        url: &str,
        display_name: &str,
    ) -> DispatchOutcome;

    async fn send_password_reset_email(
        &self,
        address: &str,
        url: &str,
        display_name: &str,
    ) -> DispatchOutcome;
}

/// Mail API settings
#[derive(Debug, Clone)]
pub struct HttpMailerConfig {
    /// Endpoint accepting `{from, to, subject, text}` JSON
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Sends mail through an HTTP transactional email provider
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    config: HttpMailerConfig,
}

impl HttpMailer {
    pub fn new(config: HttpMailerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn deliver(&self, to: &str, subject: &str, text: String) -> DispatchOutcome {
        let message = OutboundMessage {
            from: &self.config.from,
            to,
            subject,
            text,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&message)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                info!("Sent '{}' email to {}", subject, to);
                DispatchOutcome::sent()
            }
            Ok(response) => {
                DispatchOutcome::failed(format!("mail API responded {}", response.status()))
            }
            Err(e) if e.is_timeout() => DispatchOutcome::failed("mail API timed out"),
            Err(e) => DispatchOutcome::failed(e.to_string()),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_verification_email(
        &self,
        address: &str,
        url: &str,
        display_name: &str,
    ) -> DispatchOutcome {
        let text = format!(
            "Hi {},\n\nConfirm your email address to activate your Makazi account:\n{}\n\n\
             The link expires in 24 hours.",
            display_name, url
        );
        self.deliver(address, "Verify your email address", text).await
    }

    async fn send_password_reset_email(
        &self,
        address: &str,
        url: &str,
        display_name: &str,
    ) -> DispatchOutcome {
        let text = format!(
            "Hi {},\n\nUse the link below to choose a new password:\n{}\n\n\
             The link expires in 1 hour. Ignore this email if you did not ask for it.",
            display_name, url
        );
        self.deliver(address, "Reset your password", text).await
    }
}

/// Logs messages instead of sending them; used when no mail API is set
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_email(
        &self,
        address: &str,
        url: &str,
        _display_name: &str,
    ) -> DispatchOutcome {
        warn!("No mail API configured; verification link for {}: {}", address, url);
        DispatchOutcome::sent()
    }

    async fn send_password_reset_email(
        &self,
        address: &str,
        url: &str,
        _display_name: &str,
    ) -> DispatchOutcome {
        warn!("No mail API configured; reset link for {}: {}", address, url);
        DispatchOutcome::sent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mailer(server: &MockServer, timeout: Duration) -> HttpMailer {
        HttpMailer::new(HttpMailerConfig {
            api_url: format!("{}/send", server.uri()),
            api_key: "mail-key".to_string(),
            from: "no-reply@makazi.co.ke".to_string(),
            timeout,
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn accepted_message_is_a_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer mail-key"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = mailer(&server, Duration::from_secs(5))
            .send_verification_email("njeri@example.com", "https://app/verify?t=1", "Njeri")
            .await;
        assert_eq!(outcome, DispatchOutcome::sent());
    }

    #[tokio::test]
    async fn provider_error_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let outcome = mailer(&server, Duration::from_secs(5))
            .send_password_reset_email("njeri@example.com", "https://app/reset?t=1", "Njeri")
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap_or_default().contains("500"));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let outcome = mailer(&server, Duration::from_millis(50))
            .send_verification_email("njeri@example.com", "https://app/verify?t=1", "Njeri")
            .await;
        assert_eq!(outcome, DispatchOutcome::failed("mail API timed out"));
    }
}
