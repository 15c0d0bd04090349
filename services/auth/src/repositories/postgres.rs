//! PostgreSQL account store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use super::AccountStore;
use crate::models::{
    Company, CompanyLookup, InitialVerification, NewCompany, NewOneTimeToken, NewRefreshToken, NewUser,
    OneTimePurpose, OneTimeToken, RefreshToken, User,
    company::{DEFAULT_MAX_PROPERTIES, DEFAULT_MAX_UNITS, DEFAULT_PLAN},
};

const USER_COLUMNS: &str = "id, email, phone_number, first_name, last_name, password_hash, \
     role, status, email_verified, company_id, last_login_at, created_at, updated_at";

const REFRESH_COLUMNS: &str = "id, user_id, token_hash, device_info, ip_address, user_agent, \
     expires_at, is_revoked, created_at";

const ONE_TIME_COLUMNS: &str =
    "id, user_id, token_hash, email, expires_at, is_used, used_at, created_at";

const COMPANY_COLUMNS: &str = "id, name, owner_email, plan, max_units, max_properties, created_at";

fn one_time_table(purpose: OneTimePurpose) -> &'static str {
    match purpose {
        OneTimePurpose::EmailVerification => "email_verification_tokens",
        OneTimePurpose::PasswordReset => "password_reset_tokens",
    }
}

fn user_from_row(row: &PgRow) -> DatabaseResult<User> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;

    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse().map_err(DatabaseError::Decode)?,
        status: status.parse().map_err(DatabaseError::Decode)?,
        email_verified: row.try_get("email_verified")?,
        company_id: row.try_get("company_id")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn refresh_from_row(row: &PgRow) -> DatabaseResult<RefreshToken> {
    Ok(RefreshToken {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token_hash: row.try_get("token_hash")?,
        device_info: row.try_get("device_info")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        expires_at: row.try_get("expires_at")?,
        is_revoked: row.try_get("is_revoked")?,
        created_at: row.try_get("created_at")?,
    })
}

fn one_time_from_row(row: &PgRow) -> DatabaseResult<OneTimeToken> {
    Ok(OneTimeToken {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token_hash: row.try_get("token_hash")?,
        email: row.try_get("email")?,
        expires_at: row.try_get("expires_at")?,
        is_used: row.try_get("is_used")?,
        used_at: row.try_get("used_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn company_from_row(row: &PgRow) -> DatabaseResult<Company> {
    Ok(Company {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        owner_email: row.try_get("owner_email")?,
        plan: row.try_get("plan")?,
        max_units: row.try_get("max_units")?,
        max_properties: row.try_get("max_properties")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Reuse a company with exactly the same name, or create one on the
/// default plan
async fn find_or_create_company_by_name(
    conn: &mut PgConnection,
    company: NewCompany,
) -> DatabaseResult<CompanyLookup> {
    let existing = sqlx::query(&format!(
        "SELECT {} FROM companies WHERE name = $1 LIMIT 1",
        COMPANY_COLUMNS
    ))
    .bind(&company.name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = existing {
        return Ok(CompanyLookup::Found(company_from_row(&row)?));
    }

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO companies (name, owner_email, plan, max_units, max_properties)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        COMPANY_COLUMNS
    ))
    .bind(&company.name)
    .bind(&company.owner_email)
    .bind(DEFAULT_PLAN)
    .bind(DEFAULT_MAX_UNITS)
    .bind(DEFAULT_MAX_PROPERTIES)
    .fetch_one(&mut *conn)
    .await?;

    info!("Created company {}", company.name);
    Ok(CompanyLookup::Created(company_from_row(&row)?))
}

/// Account store backed by PostgreSQL
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        debug!("Finding user by email: {}", email);

        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_account(
        &self,
        user: NewUser,
        company: Option<NewCompany>,
        verification: Option<InitialVerification>,
    ) -> DatabaseResult<(User, Option<CompanyLookup>)> {
        let mut tx = self.pool.begin().await?;

        let lookup = match company {
            Some(company) => Some(find_or_create_company_by_name(&mut *tx, company).await?),
            None => None,
        };

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (email, phone_number, first_name, last_name, password_hash,
                               role, status, email_verified, company_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.email_verified)
        .bind(lookup.as_ref().map(|l| l.company().id))
        .fetch_one(&mut *tx)
        .await?;

        let created = user_from_row(&row)?;

        if let Some(verification) = verification {
            let token = verification.for_user(created.id);
            sqlx::query(
                r#"
                INSERT INTO email_verification_tokens (user_id, token_hash, email, expires_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(&token.email)
            .bind(token.expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok((created, lookup))
    }

    async fn activate_invited_account(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET password_hash = $2, status = 'active', email_verified = TRUE, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> DatabaseResult<RefreshToken> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, device_info, ip_address,
                                        user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            REFRESH_COLUMNS
        ))
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.client.device_info)
        .bind(&token.client.ip_address)
        .bind(&token.client.user_agent)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;

        refresh_from_row(&row)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> DatabaseResult<Option<RefreshToken>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM refresh_tokens WHERE token_hash = $1",
            REFRESH_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(refresh_from_row).transpose()
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> DatabaseResult<()> {
        sqlx::query("UPDATE refresh_tokens SET is_revoked = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_one_time_token(
        &self,
        purpose: OneTimePurpose,
        token: NewOneTimeToken,
    ) -> DatabaseResult<OneTimeToken> {
        let table = one_time_table(purpose);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "UPDATE {} SET is_used = TRUE, used_at = NOW() WHERE user_id = $1 AND is_used = FALSE",
            table
        ))
        .bind(token.user_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO {} (user_id, token_hash, email, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            table, ONE_TIME_COLUMNS
        ))
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.email)
        .bind(token.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let stored = one_time_from_row(&row)?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn find_one_time_token(
        &self,
        purpose: OneTimePurpose,
        token_hash: &str,
    ) -> DatabaseResult<Option<OneTimeToken>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE token_hash = $1 ORDER BY is_used ASC, created_at DESC LIMIT 1",
            ONE_TIME_COLUMNS,
            one_time_table(purpose)
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(one_time_from_row).transpose()
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE users SET email_verified = TRUE, status = 'active', updated_at = $2 WHERE id = $1",
        )
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE email_verification_tokens
            SET is_used = TRUE, used_at = $2
            WHERE token_hash = $1 AND is_used = FALSE
            "#,
        )
        .bind(token_hash)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn reset_password(
        &self,
        user_id: Uuid,
        reset_token_id: Uuid,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            r#"
            UPDATE password_reset_tokens
            SET is_used = TRUE, used_at = $3
            WHERE id = $1 AND user_id = $2 AND is_used = FALSE
            "#,
        )
        .bind(reset_token_id)
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(revoked.rows_affected()))
    }

    async fn change_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                status = CASE WHEN status = 'pending_setup' THEN 'active' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}
