//! Account storage
//!
//! [`AccountStore`] is the seam between the session manager and
//! persistence. Every method that touches more than one row is atomic:
//! either all of its writes land or none do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use uuid::Uuid;

use crate::models::{
    CompanyLookup, InitialVerification, NewCompany, NewOneTimeToken, NewRefreshToken, NewUser, OneTimePurpose,
    OneTimeToken, RefreshToken, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryAccountStore;
pub use postgres::PgAccountStore;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    /// Lookup by normalized email
    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    /// Resolve or create the owning company (when given), insert the user
    /// and its first verification token (when given) in one transaction.
    /// A taken email surfaces as `DatabaseError::UniqueViolation`; any
    /// failure leaves neither company, user nor token behind.
    async fn create_account(
        &self,
        user: NewUser,
        company: Option<NewCompany>,
        verification: Option<InitialVerification>,
    ) -> DatabaseResult<(User, Option<CompanyLookup>)>;

    /// Set the password of a pending invited account and activate it.
    /// Returns `None` when the account is no longer pending.
    async fn activate_invited_account(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<Option<User>>;

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> DatabaseResult<RefreshToken>;

    async fn find_refresh_token(&self, token_hash: &str) -> DatabaseResult<Option<RefreshToken>>;

    async fn revoke_refresh_token(&self, id: Uuid) -> DatabaseResult<()>;

    /// Revoke every live refresh token of a user, returning how many
    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> DatabaseResult<u64>;

    /// Mark all unused tokens of the same purpose for the user as used,
    /// then insert the new one
    async fn replace_one_time_token(
        &self,
        purpose: OneTimePurpose,
        token: NewOneTimeToken,
    ) -> DatabaseResult<OneTimeToken>;

    async fn find_one_time_token(
        &self,
        purpose: OneTimePurpose,
        token_hash: &str,
    ) -> DatabaseResult<Option<OneTimeToken>>;

    /// Flag the user verified and active, and consume every unused
    /// verification token carrying `token_hash`
    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<()>;

    /// Store the new password, consume the reset token and revoke all
    /// refresh tokens of the user. Returns the number of revoked tokens, or
    /// `None` if the reset token was consumed concurrently.
    async fn reset_password(
        &self,
        user_id: Uuid,
        reset_token_id: Uuid,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<u64>>;

    /// Store a new password; `pending_setup` accounts become `active`
    async fn change_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<Option<User>>;
}
