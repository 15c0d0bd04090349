//! Paybill onboarding for a company

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    crypto::CredentialCipher,
    error::{PaymentError, PaymentResult},
    gateway::{DarajaClient, GatewayCredentials},
    models::{NewPaybillSettings, PaybillSettings},
    repositories::PaymentStore,
};

#[derive(Clone, Deserialize)]
pub struct PaybillSetupRequest {
    pub shortcode: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default)]
    pub auto_reconcile: bool,
}

#[derive(Clone)]
pub struct PaybillSetup {
    store: Arc<dyn PaymentStore>,
    gateway: DarajaClient,
    cipher: CredentialCipher,
    public_base_url: String,
}

impl PaybillSetup {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: DarajaClient,
        cipher: CredentialCipher,
        public_base_url: &str,
    ) -> Self {
        Self {
            store,
            gateway,
            cipher,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn validation_url(&self) -> String {
        format!("{}/mpesa/validation", self.public_base_url)
    }

    pub fn confirmation_url(&self) -> String {
        format!("{}/mpesa/confirmation", self.public_base_url)
    }

    /// Register the webhook URLs with the provider, then store the
    /// company's settings with encrypted credentials. Nothing is stored if
    /// the provider refuses.
    pub async fn configure(
        &self,
        company_id: Uuid,
        request: PaybillSetupRequest,
    ) -> PaymentResult<PaybillSettings> {
        let shortcode = request.shortcode.trim().to_string();
        if shortcode.is_empty() || !shortcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(PaymentError::InvalidPayload(
                "shortcode must be numeric".to_string(),
            ));
        }

        let credentials = GatewayCredentials {
            consumer_key: request.consumer_key,
            consumer_secret: request.consumer_secret,
        };
        let validation_url = self.validation_url();
        let confirmation_url = self.confirmation_url();

        self.gateway
            .register_webhook_urls(&credentials, &shortcode, &validation_url, &confirmation_url)
            .await?;

        let settings = self
            .store
            .upsert_paybill_settings(NewPaybillSettings {
                company_id,
                shortcode,
                consumer_key_encrypted: self.cipher.encrypt(&credentials.consumer_key)?,
                consumer_secret_encrypted: self.cipher.encrypt(&credentials.consumer_secret)?,
                validation_url,
                confirmation_url,
                auto_reconcile: request.auto_reconcile,
            })
            .await?;

        info!(
            "Paybill {} configured for company {}",
            settings.shortcode, company_id
        );
        Ok(settings)
    }

    /// Repeat URL registration with the stored credentials
    pub async fn reregister(&self, company_id: Uuid) -> PaymentResult<PaybillSettings> {
        let settings = self
            .store
            .find_paybill_by_company(company_id)
            .await?
            .ok_or(PaymentError::PaybillNotConfigured)?;

        let credentials = self.credentials(&settings)?;
        self.gateway
            .register_webhook_urls(
                &credentials,
                &settings.shortcode,
                &settings.validation_url,
                &settings.confirmation_url,
            )
            .await?;

        Ok(settings)
    }

    fn credentials(&self, settings: &PaybillSettings) -> PaymentResult<GatewayCredentials> {
        Ok(GatewayCredentials {
            consumer_key: self.cipher.decrypt(&settings.consumer_key_encrypted)?,
            consumer_secret: self.cipher.decrypt(&settings.consumer_secret_encrypted)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayConfig;
    use crate::repositories::MemoryPaymentStore;
    use crate::token_cache::MemoryTokenCache;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(server: &MockServer, store: &MemoryPaymentStore) -> PaybillSetup {
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "daraja-token",
                "expires_in": "3599"
            })))
            .mount(server)
            .await;

        let gateway = DarajaClient::new(
            GatewayConfig {
                base_url: server.uri(),
                timeout: Duration::from_secs(5),
            },
            Arc::new(MemoryTokenCache::new()),
        )
        .expect("client builds");
        let cipher =
            CredentialCipher::from_base64_key(&STANDARD.encode([9u8; 32])).expect("valid key");

        PaybillSetup::new(
            Arc::new(store.clone()),
            gateway,
            cipher,
            "https://api.makazi.test/",
        )
    }

    fn request() -> PaybillSetupRequest {
        PaybillSetupRequest {
            shortcode: "600984".to_string(),
            consumer_key: "consumer-key".to_string(),
            consumer_secret: "consumer-secret".to_string(),
            auto_reconcile: true,
        }
    }

    #[tokio::test]
    async fn configure_stores_encrypted_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mpesa/c2b/v1/registerurl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResponseCode": "0",
                "ResponseDescription": "success"
            })))
            .expect(2)
            .mount(&server)
            .await;
        let store = MemoryPaymentStore::new();
        let setup = setup(&server, &store).await;
        let company_id = Uuid::new_v4();

        let settings = setup
            .configure(company_id, request())
            .await
            .expect("configures");
        assert!(settings.is_active);
        assert!(settings.auto_reconcile);
        assert_eq!(
            settings.confirmation_url,
            "https://api.makazi.test/mpesa/confirmation"
        );
        assert_ne!(settings.consumer_secret_encrypted, "consumer-secret");

        let credentials = setup.credentials(&settings).expect("decrypts");
        assert_eq!(credentials.consumer_secret, "consumer-secret");

        setup.reregister(company_id).await.expect("re-registers");
    }

    #[tokio::test]
    async fn provider_failure_stores_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mpesa/c2b/v1/registerurl"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let store = MemoryPaymentStore::new();
        let setup = setup(&server, &store).await;
        let company_id = Uuid::new_v4();

        let err = setup
            .configure(company_id, request())
            .await
            .expect_err("provider refused");
        assert!(matches!(err, PaymentError::GatewayRegistrationFailed(_)));
        assert!(
            store
                .find_paybill_by_company(company_id)
                .await
                .expect("reads")
                .is_none()
        );
    }

    #[tokio::test]
    async fn non_numeric_shortcode_is_rejected() {
        let server = MockServer::start().await;
        let store = MemoryPaymentStore::new();
        let setup = setup(&server, &store).await;

        let mut bad = request();
        bad.shortcode = "60-0984".to_string();
        assert!(matches!(
            setup.configure(Uuid::new_v4(), bad).await,
            Err(PaymentError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn reregister_requires_existing_settings() {
        let server = MockServer::start().await;
        let store = MemoryPaymentStore::new();
        let setup = setup(&server, &store).await;

        assert!(matches!(
            setup.reregister(Uuid::new_v4()).await,
            Err(PaymentError::PaybillNotConfigured)
        ));
    }
}
