use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use auth::{
    AppState,
    config::AuthSettings,
    jwt::JwtService,
    mailer::{HttpMailer, LogMailer, Mailer},
    rate_limiter::LoginThrottle,
    repositories::PgAccountStore,
    routes,
    session::SessionManager,
};
use common::database::{DatabaseConfig, health_check, init_pool};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

    let settings = AuthSettings::load()?;
    info!("Loaded settings: {:?}", settings);

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let jwt_service = JwtService::new(settings.jwt_config())?;

    let mailer: Arc<dyn Mailer> = match settings.mailer_config() {
        Some(config) => Arc::new(HttpMailer::new(config)?),
        None => {
            warn!("AUTH__MAIL_API_URL not set; email links will only be logged");
            Arc::new(LogMailer)
        }
    };

    let session_manager = SessionManager::new(
        Arc::new(PgAccountStore::new(pool)),
        jwt_service.clone(),
        mailer,
        LoginThrottle::new(settings.throttle_config()),
        settings.session_config(),
    );

    let app_state = AppState {
        session_manager: Arc::new(session_manager),
        jwt_service,
    };

    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("Authentication service listening on {}", settings.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
