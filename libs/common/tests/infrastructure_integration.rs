//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database and Redis cache used by
//! the services are reachable. They need live instances, so they are
//! ignored by default; run them with `cargo test -- --ignored`.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use sqlx::Row;
use std::time::Duration;

#[tokio::test]
#[ignore = "requires running PostgreSQL and Redis instances"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_pool = RedisPool::new(&RedisConfig::from_env())?;
    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    redis_pool
        .set_expiring("integration:mpesa:token", "bearer", Duration::from_secs(10))
        .await?;
    assert_eq!(
        redis_pool.get("integration:mpesa:token").await?,
        Some("bearer".to_string()),
        "Redis SET/GET test failed"
    );

    Ok(())
}
