//! Daraja (M-Pesa) API client
//!
//! Covers the two calls the paybill flow needs: the client-credentials
//! token grant and C2B URL registration.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{PaymentError, PaymentResult};
use crate::token_cache::{TokenCache, credential_fingerprint};

/// Seconds shaved off `expires_in` before a cached token is refreshed
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Consumer key and secret of a Daraja app
#[derive(Clone)]
pub struct GatewayCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// e.g. `https://sandbox.safaricom.co.ke`
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Daraja sends this as a string
    expires_in: serde_json::Value,
}

#[derive(Serialize)]
struct RegisterUrlRequest<'a> {
    #[serde(rename = "ShortCode")]
    short_code: &'a str,
    #[serde(rename = "ResponseType")]
    response_type: &'a str,
    #[serde(rename = "ConfirmationURL")]
    confirmation_url: &'a str,
    #[serde(rename = "ValidationURL")]
    validation_url: &'a str,
}

/// Provider acknowledgement of a URL registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUrlResponse {
    #[serde(rename = "OriginatorCoversationID", default)]
    pub originator_conversation_id: Option<String>,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
}

#[derive(Clone)]
pub struct DarajaClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<dyn TokenCache>,
}

impl DarajaClient {
    pub fn new(config: GatewayConfig, cache: Arc<dyn TokenCache>) -> PaymentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::GatewayAuthFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// Bearer token for the credentials, from cache when still valid
    pub async fn get_access_token(&self, credentials: &GatewayCredentials) -> PaymentResult<String> {
        let fingerprint =
            credential_fingerprint(&credentials.consumer_key, &credentials.consumer_secret);

        if let Some(token) = self.cache.get(&fingerprint).await {
            debug!("Using cached gateway token");
            return Ok(token);
        }

        let response = self
            .http
            .get(format!("{}/oauth/v1/generate", self.base_url))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&credentials.consumer_key, Some(&credentials.consumer_secret))
            .send()
            .await
            .map_err(|e| PaymentError::GatewayAuthFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::GatewayAuthFailed(format!(
                "provider responded {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::GatewayAuthFailed(format!("malformed token: {}", e)))?;

        let ttl = parse_expires_in(&token.expires_in)
            .map(|secs| Duration::from_secs(secs.saturating_sub(EXPIRY_MARGIN_SECS)))
            .unwrap_or(Duration::ZERO);
        self.cache.put(&fingerprint, &token.access_token, ttl).await;

        info!("Obtained gateway token valid for {}s", ttl.as_secs());
        Ok(token.access_token)
    }

    /// Register the C2B validation and confirmation URLs for a shortcode
    pub async fn register_webhook_urls(
        &self,
        credentials: &GatewayCredentials,
        shortcode: &str,
        validation_url: &str,
        confirmation_url: &str,
    ) -> PaymentResult<RegisterUrlResponse> {
        let token = self.get_access_token(credentials).await?;

        let response = self
            .http
            .post(format!("{}/mpesa/c2b/v1/registerurl", self.base_url))
            .bearer_auth(token)
            .json(&RegisterUrlRequest {
                short_code: shortcode,
                response_type: "Completed",
                confirmation_url,
                validation_url,
            })
            .send()
            .await
            .map_err(|e| PaymentError::GatewayRegistrationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::GatewayRegistrationFailed(format!(
                "provider responded {}: {}",
                status, body
            )));
        }

        let registered: RegisterUrlResponse = response.json().await.map_err(|e| {
            PaymentError::GatewayRegistrationFailed(format!("malformed response: {}", e))
        })?;

        info!("Registered C2B URLs for shortcode {}", shortcode);
        Ok(registered)
    }
}

fn parse_expires_in(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_cache::MemoryTokenCache;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> GatewayCredentials {
        GatewayCredentials {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
        }
    }

    fn client(server: &MockServer) -> DarajaClient {
        DarajaClient::new(
            GatewayConfig {
                base_url: server.uri(),
                timeout: Duration::from_secs(5),
            },
            Arc::new(MemoryTokenCache::new()),
        )
        .expect("client builds")
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .and(query_param("grant_type", "client_credentials"))
            // base64("ck:cs")
            .and(header("authorization", "Basic Y2s6Y3M="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "daraja-token",
                "expires_in": "3599"
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn token_is_fetched_once_then_cached() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        let client = client(&server);

        assert_eq!(
            client.get_access_token(&credentials()).await.expect("token"),
            "daraja-token"
        );
        assert_eq!(
            client.get_access_token(&credentials()).await.expect("cached"),
            "daraja-token"
        );
    }

    #[tokio::test]
    async fn rejected_credentials_fail_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request"))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_access_token(&credentials())
            .await
            .expect_err("rejected");
        assert!(matches!(err, PaymentError::GatewayAuthFailed(_)));
    }

    #[tokio::test]
    async fn registers_urls_with_bearer_token() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/mpesa/c2b/v1/registerurl"))
            .and(header("authorization", "Bearer daraja-token"))
            .and(body_json(json!({
                "ShortCode": "600984",
                "ResponseType": "Completed",
                "ConfirmationURL": "https://api.makazi.test/mpesa/confirmation",
                "ValidationURL": "https://api.makazi.test/mpesa/validation"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "OriginatorCoversationID": "7619-37765134-1",
                "ResponseCode": "0",
                "ResponseDescription": "success"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registered = client(&server)
            .register_webhook_urls(
                &credentials(),
                "600984",
                "https://api.makazi.test/mpesa/validation",
                "https://api.makazi.test/mpesa/confirmation",
            )
            .await
            .expect("registers");
        assert_eq!(registered.response_code.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn provider_registration_error_propagates() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/mpesa/c2b/v1/registerurl"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "errorCode": "500.003.1001",
                "errorMessage": "Urls are already registered"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .register_webhook_urls(&credentials(), "600984", "https://v", "https://c")
            .await
            .expect_err("provider error");
        match err {
            PaymentError::GatewayRegistrationFailed(detail) => {
                assert!(detail.contains("already registered"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn expires_in_accepts_string_or_number() {
        assert_eq!(parse_expires_in(&json!("3599")), Some(3599));
        assert_eq!(parse_expires_in(&json!(3599)), Some(3599));
        assert_eq!(parse_expires_in(&json!(null)), None);
    }
}
