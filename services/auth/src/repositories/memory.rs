//! In-memory account store for tests and local development
//!
//! All tables sit behind one mutex, so each trait method observes and
//! mutates a consistent snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::AccountStore;
use crate::models::{
    Company, CompanyLookup, InitialVerification, NewCompany, NewOneTimeToken, NewRefreshToken, NewUser,
    OneTimePurpose, OneTimeToken, RefreshToken, User, UserStatus,
    company::{DEFAULT_MAX_PROPERTIES, DEFAULT_MAX_UNITS, DEFAULT_PLAN},
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    companies: Vec<Company>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    verification_tokens: Vec<OneTimeToken>,
    reset_tokens: Vec<OneTimeToken>,
    one_time_writes_fail: bool,
}

impl Tables {
    fn one_time(&mut self, purpose: OneTimePurpose) -> &mut Vec<OneTimeToken> {
        match purpose {
            OneTimePurpose::EmailVerification => &mut self.verification_tokens,
            OneTimePurpose::PasswordReset => &mut self.reset_tokens,
        }
    }

    /// Append a single-use token, honouring the simulated write failure
    fn push_one_time(
        &mut self,
        purpose: OneTimePurpose,
        token: NewOneTimeToken,
        now: DateTime<Utc>,
    ) -> OneTimeToken {
        let stored = OneTimeToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            email: token.email,
            expires_at: token.expires_at,
            is_used: false,
            used_at: None,
            created_at: now,
        };
        self.one_time(purpose).push(stored.clone());
        stored
    }

    fn check_one_time_writable(&self) -> DatabaseResult<()> {
        if self.one_time_writes_fail {
            return Err(DatabaseError::Query(sqlx::Error::Protocol(
                "single-use token table unavailable".to_string(),
            )));
        }
        Ok(())
    }

    fn find_or_create_company_by_name(&mut self, company: NewCompany) -> CompanyLookup {
        if let Some(found) = self.companies.iter().find(|c| c.name == company.name) {
            return CompanyLookup::Found(found.clone());
        }

        let created = Company {
            id: Uuid::new_v4(),
            name: company.name,
            owner_email: company.owner_email,
            plan: DEFAULT_PLAN.to_string(),
            max_units: DEFAULT_MAX_UNITS,
            max_properties: DEFAULT_MAX_PROPERTIES,
            created_at: Utc::now(),
        };
        self.companies.push(created.clone());
        CompanyLookup::Created(created)
    }
}

/// Account store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed user, e.g. an invited tenant or a seeded admin
    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn company_count(&self) -> usize {
        self.tables.lock().await.companies.len()
    }

    /// Refresh tokens belonging to a user, revoked ones included
    pub async fn refresh_tokens_of(&self, user_id: Uuid) -> Vec<RefreshToken> {
        self.tables
            .lock()
            .await
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Single-use tokens of a purpose belonging to a user
    pub async fn one_time_tokens_of(
        &self,
        purpose: OneTimePurpose,
        user_id: Uuid,
    ) -> Vec<OneTimeToken> {
        self.tables
            .lock()
            .await
            .one_time(purpose)
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Force a token's expiry, used to simulate the passage of time
    pub async fn expire_one_time_token(&self, purpose: OneTimePurpose, token_hash: &str) {
        let mut tables = self.tables.lock().await;
        for token in tables.one_time(purpose).iter_mut() {
            if token.token_hash == token_hash {
                token.expires_at = Utc::now() - chrono::Duration::minutes(1);
            }
        }
    }

    /// Make every later single-use token write fail until switched back
    pub async fn fail_one_time_writes(&self, fail: bool) {
        self.tables.lock().await.one_time_writes_fail = fail;
    }

    /// Force a refresh token's expiry
    pub async fn expire_refresh_token(&self, token_hash: &str) {
        let mut tables = self.tables.lock().await;
        for token in tables.refresh_tokens.values_mut() {
            if token.token_hash == token_hash {
                token.expires_at = Utc::now() - chrono::Duration::minutes(1);
            }
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_account(
        &self,
        user: NewUser,
        company: Option<NewCompany>,
        verification: Option<InitialVerification>,
    ) -> DatabaseResult<(User, Option<CompanyLookup>)> {
        let mut tables = self.tables.lock().await;

        if let Some(email) = user.email.as_deref() {
            if tables.users.values().any(|u| u.email.as_deref() == Some(email)) {
                return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
            }
        }
        // Every check runs before the first write
        if verification.is_some() {
            tables.check_one_time_writable()?;
        }

        let lookup = company.map(|c| tables.find_or_create_company_by_name(c));
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            phone_number: user.phone_number,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            role: user.role,
            status: user.status,
            email_verified: user.email_verified,
            company_id: lookup.as_ref().map(|l| l.company().id),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        if let Some(verification) = verification {
            tables.push_one_time(
                OneTimePurpose::EmailVerification,
                verification.for_user(created.id),
                now,
            );
        }

        Ok((created, lookup))
    }

    async fn activate_invited_account(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        if user.status != UserStatus::Pending {
            return Ok(None);
        }

        user.password_hash = Some(password_hash.to_string());
        user.status = UserStatus::Active;
        user.email_verified = true;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> DatabaseResult<RefreshToken> {
        let mut tables = self.tables.lock().await;
        if tables
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(DatabaseError::UniqueViolation(
                "refresh_tokens_token_hash_key".to_string(),
            ));
        }

        let stored = RefreshToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            device_info: token.client.device_info,
            ip_address: token.client.ip_address,
            user_agent: token.client.user_agent,
            expires_at: token.expires_at,
            is_revoked: false,
            created_at: Utc::now(),
        };
        tables.refresh_tokens.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> DatabaseResult<Option<RefreshToken>> {
        Ok(self
            .tables
            .lock()
            .await
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> DatabaseResult<()> {
        if let Some(token) = self.tables.lock().await.refresh_tokens.get_mut(&id) {
            token.is_revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut revoked = 0;
        for token in tables.refresh_tokens.values_mut() {
            if token.user_id == user_id && !token.is_revoked {
                token.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn replace_one_time_token(
        &self,
        purpose: OneTimePurpose,
        token: NewOneTimeToken,
    ) -> DatabaseResult<OneTimeToken> {
        let mut tables = self.tables.lock().await;
        tables.check_one_time_writable()?;
        let now = Utc::now();

        for prior in tables
            .one_time(purpose)
            .iter_mut()
            .filter(|t| t.user_id == token.user_id && !t.is_used)
        {
            prior.is_used = true;
            prior.used_at = Some(now);
        }

        Ok(tables.push_one_time(purpose, token, now))
    }

    async fn find_one_time_token(
        &self,
        purpose: OneTimePurpose,
        token_hash: &str,
    ) -> DatabaseResult<Option<OneTimeToken>> {
        let mut tables = self.tables.lock().await;
        let tokens = tables.one_time(purpose);
        // Prefer an unused match, like the SQL ordering does
        let found = tokens
            .iter()
            .filter(|t| t.token_hash == token_hash)
            .min_by_key(|t| t.is_used)
            .cloned();
        Ok(found)
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<()> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let Some(user) = tables.users.get_mut(&user_id) else {
            return Err(DatabaseError::Decode(format!(
                "verification token references missing user {}",
                user_id
            )));
        };
        user.email_verified = true;
        user.status = UserStatus::Active;
        user.updated_at = at;

        for token in tables
            .verification_tokens
            .iter_mut()
            .filter(|t| t.token_hash == token_hash && !t.is_used)
        {
            token.is_used = true;
            token.used_at = Some(at);
        }
        Ok(())
    }

    async fn reset_password(
        &self,
        user_id: Uuid,
        reset_token_id: Uuid,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<u64>> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        if !tables.users.contains_key(&user_id) {
            return Ok(None);
        }
        let Some(token) = tables
            .reset_tokens
            .iter_mut()
            .find(|t| t.id == reset_token_id && !t.is_used)
        else {
            return Ok(None);
        };

        token.is_used = true;
        token.used_at = Some(at);

        if let Some(user) = tables.users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = at;
        }

        let mut revoked = 0;
        for refresh in tables.refresh_tokens.values_mut() {
            if refresh.user_id == user_id && !refresh.is_revoked {
                refresh.is_revoked = true;
                revoked += 1;
            }
        }
        Ok(Some(revoked))
    }

    async fn change_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };

        user.password_hash = Some(password_hash.to_string());
        if user.status == UserStatus::PendingSetup {
            user.status = UserStatus::Active;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}
