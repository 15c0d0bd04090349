//! Common library for the Makazi property-management backend
//!
//! This crate provides the infrastructure shared by the auth and payments
//! services: PostgreSQL pooling, the Redis client wrapper and the database
//! error taxonomy every store implementation reports through.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     assert!(health_check(&pool).await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
