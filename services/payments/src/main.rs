use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::jwt::{JwtConfig, JwtService};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use payments::{
    AppState,
    config::{PaymentsSettings, TokenCacheKind},
    crypto::CredentialCipher,
    gateway::DarajaClient,
    reconcile::Reconciler,
    repositories::{PaymentStore, PgPaymentStore},
    routes,
    setup::PaybillSetup,
    token_cache::{MemoryTokenCache, RedisTokenCache, TokenCache},
    webhook::WebhookProcessor,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting payments service");

    let settings = PaymentsSettings::load()?;
    info!("Loaded settings: {:?}", settings);

    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let token_cache: Arc<dyn TokenCache> = match settings.token_cache {
        TokenCacheKind::Memory => Arc::new(MemoryTokenCache::new()),
        TokenCacheKind::Redis => {
            let redis = RedisPool::new(&RedisConfig::from_env())?;
            if !redis.health_check().await? {
                anyhow::bail!("Failed to connect to Redis");
            }
            Arc::new(RedisTokenCache::new(redis))
        }
    };

    let jwt_service = JwtService::new(JwtConfig {
        secret: settings.jwt_secret.clone(),
        issuer: settings.jwt_issuer.clone(),
        session_timeout_hours: 24,
    })?;

    let store: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(pool));
    let reconciler = Reconciler::new(store.clone());
    let gateway = DarajaClient::new(settings.gateway_config(), token_cache)?;
    let cipher = CredentialCipher::from_base64_key(&settings.credential_key)?;

    let app_state = AppState {
        webhook_processor: Arc::new(WebhookProcessor::new(
            store.clone(),
            reconciler.clone(),
            settings.webhook_timeout(),
        )),
        reconciler: Arc::new(reconciler),
        paybill_setup: Arc::new(PaybillSetup::new(
            store,
            gateway,
            cipher,
            &settings.public_base_url,
        )),
        jwt_service,
    };

    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("Payments service listening on {}", settings.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
