//! Session lifecycle: registration, verification, login, refresh, logout
//! and password recovery

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult, InvitationMismatch},
    jwt::JwtService,
    mailer::Mailer,
    models::{
        ClientInfo, InitialVerification, NewCompany, NewOneTimeToken, NewRefreshToken, NewUser,
        OneTimePurpose, User, UserRole, UserStatus,
    },
    opaque::{hash_opaque_token, new_opaque_secret},
    password::{hash_password, verify_password},
    rate_limiter::LoginThrottle,
    repositories::AccountStore,
    validation::{normalize_email, validate_email, validate_password, validate_phone_number},
};

/// Verification links stay valid for a day
const VERIFICATION_TTL_HOURS: i64 = 24;
/// Reset links stay valid for an hour
const RESET_TTL_HOURS: i64 = 1;

const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent";

/// Session manager settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub require_email_verification: bool,
    /// Lifetime of a default refresh token, in hours
    pub session_timeout_hours: i64,
    /// Lifetime of a "remember me" refresh token, in days
    pub remember_me_days: i64,
    /// Replace the refresh token on every refresh instead of reusing it
    pub rotate_refresh_tokens: bool,
    /// Base URL of the web client, used to build email links
    pub frontend_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: UserRole,
    pub company_name: Option<String>,
    /// Signed invitation handed out when a tenant is invited
    pub invitation_token: Option<String>,
}

fn default_role() -> UserRole {
    UserRole::Tenant
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub remember_me: bool,
}

/// Freshly issued session
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: User,
    pub expires_at: chrono::DateTime<Utc>,
    pub requires_password_change: bool,
}

/// Registration result: a session, or a pending email verification
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RegisterOutcome {
    Session(SessionResponse),
    VerificationRequired {
        user: User,
        requires_mfa: bool,
        mfa_methods: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailVerification {
    Verified,
    AlreadyVerified,
}

/// Response of best-effort operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }
}

/// Session manager
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn AccountStore>,
    jwt: JwtService,
    mailer: Arc<dyn Mailer>,
    throttle: LoginThrottle,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn AccountStore>,
        jwt: JwtService,
        mailer: Arc<dyn Mailer>,
        throttle: LoginThrottle,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            jwt,
            mailer,
            throttle,
            config,
        }
    }

    /// Register a new account, or accept a tenant invitation
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: ClientInfo,
    ) -> AuthResult<RegisterOutcome> {
        if let Some(invitation) = request.invitation_token.clone() {
            return self.accept_invitation(&invitation, request, client).await;
        }

        let email = request.email.as_deref().map(normalize_email);
        if let Some(email) = email.as_deref() {
            validate_email(email)?;
            if self.store.find_user_by_email(email).await?.is_some() {
                return Err(AuthError::DuplicateEmail);
            }
        }
        if let Some(phone) = request.phone_number.as_deref() {
            validate_phone_number(phone)?;
        }

        let password_hash = match request.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let company = request.role.owns_company().then(|| NewCompany {
            name: company_name(&request),
            owner_email: email.clone(),
        });

        let needs_verification = self.config.require_email_verification && email.is_some();
        let new_user = NewUser {
            email: email.clone(),
            phone_number: request.phone_number.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            password_hash,
            role: request.role,
            status: if needs_verification {
                UserStatus::Pending
            } else {
                UserStatus::Active
            },
            email_verified: !self.config.require_email_verification,
        };

        // Raw verification secret and its address, stored with the account
        let pending = match email {
            Some(address) if needs_verification => Some((new_opaque_secret(), address)),
            _ => None,
        };
        let verification = pending.as_ref().map(|(raw, address)| InitialVerification {
            token_hash: hash_opaque_token(raw),
            email: address.clone(),
            expires_at: Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS),
        });

        let (user, company) = self
            .store
            .create_account(new_user, company, verification)
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    AuthError::DuplicateEmail
                } else {
                    AuthError::Store(e)
                }
            })?;

        info!("Registered {} account {}", user.role, user.id);
        if let Some(company) = company {
            info!(
                "Account {} owns company {}",
                user.id,
                company.company().name
            );
        }

        match pending {
            Some((raw, address)) => {
                let url = self.link("verify-email", &raw);
                let outcome = self
                    .mailer
                    .send_verification_email(&address, &url, &user.display_name())
                    .await;
                if !outcome.success {
                    warn!(
                        "Verification email to {} failed ({}); verify manually at {}",
                        address,
                        outcome.error.unwrap_or_default(),
                        url
                    );
                }

                Ok(RegisterOutcome::VerificationRequired {
                    user,
                    requires_mfa: true,
                    mfa_methods: vec!["email".to_string()],
                })
            }
            None => {
                let session = self.issue_session(user, client, false).await?;
                Ok(RegisterOutcome::Session(session))
            }
        }
    }

    async fn accept_invitation(
        &self,
        invitation: &str,
        request: RegisterRequest,
        client: ClientInfo,
    ) -> AuthResult<RegisterOutcome> {
        let claims = self.jwt.decode_invitation(invitation)?;

        let Some(invited) = self.store.find_user_by_id(claims.sub).await? else {
            return Err(AuthError::InvitationMismatch(InvitationMismatch::NotFound));
        };

        let supplied = request.email.as_deref().map(normalize_email);
        if supplied.is_none() || supplied != invited.email {
            return Err(AuthError::InvitationMismatch(
                InvitationMismatch::EmailMismatch,
            ));
        }
        if invited.role != UserRole::Tenant {
            return Err(AuthError::InvitationMismatch(InvitationMismatch::WrongRole));
        }
        if invited.status != UserStatus::Pending {
            return Err(AuthError::InvitationMismatch(
                InvitationMismatch::AlreadyUsed,
            ));
        }

        let password = request
            .password
            .as_deref()
            .ok_or_else(|| AuthError::Validation("Password is required".to_string()))?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .store
            .activate_invited_account(invited.id, &password_hash)
            .await?
            .ok_or(AuthError::InvitationMismatch(
                InvitationMismatch::AlreadyUsed,
            ))?;

        info!("Tenant {} accepted invitation", user.id);
        let session = self.issue_session(user, client, false).await?;
        Ok(RegisterOutcome::Session(session))
    }

    /// Consume an email verification token
    pub async fn verify_email(&self, raw_token: &str) -> AuthResult<EmailVerification> {
        let token_hash = hash_opaque_token(raw_token);
        let token = self
            .store
            .find_one_time_token(OneTimePurpose::EmailVerification, &token_hash)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .store
            .find_user_by_id(token.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.email_verified {
            return Ok(EmailVerification::AlreadyVerified);
        }
        if token.is_used {
            return Err(AuthError::TokenAlreadyUsed);
        }
        let now = Utc::now();
        if token.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        self.store
            .mark_email_verified(user.id, &token_hash, now)
            .await?;
        info!("Email verified for user {}", user.id);
        Ok(EmailVerification::Verified)
    }

    /// Authenticate with email and password
    pub async fn login(
        &self,
        request: LoginRequest,
        client: ClientInfo,
    ) -> AuthResult<SessionResponse> {
        let (Some(email), Some(password)) = (request.email.as_deref(), request.password.as_deref())
        else {
            return Err(AuthError::InvalidCredentials);
        };
        let email = normalize_email(email);

        let throttle_key = LoginThrottle::key(client.ip_address.as_deref(), &email);
        if !self.throttle.is_allowed(&throttle_key).await {
            return Err(AuthError::RateLimited);
        }

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            self.throttle.record_failure(&throttle_key).await;
            return Err(AuthError::UserNotFound);
        };

        if !user.status.can_login() {
            return Err(AuthError::AccountInactive);
        }

        let password_ok = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(password, hash));
        if !password_ok {
            self.throttle.record_failure(&throttle_key).await;
            return Err(AuthError::InvalidCredentials);
        }

        if self.config.require_email_verification && !user.email_verified {
            return Err(AuthError::NotVerified);
        }

        let now = Utc::now();
        self.store.record_login(user.id, now).await?;
        self.throttle.reset(&throttle_key).await;

        let mut user = user;
        user.last_login_at = Some(now);
        info!("User {} logged in", user.id);
        self.issue_session(user, client, request.remember_me).await
    }

    /// Exchange a refresh token for a new session token
    pub async fn refresh(
        &self,
        raw_refresh_token: &str,
        client: ClientInfo,
    ) -> AuthResult<SessionResponse> {
        let stored = self
            .store
            .find_refresh_token(&hash_opaque_token(raw_refresh_token))
            .await?
            .filter(|t| !t.is_revoked)
            .ok_or(AuthError::InvalidToken)?;

        if stored.is_expired(Utc::now()) {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .store
            .find_user_by_id(stored.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.status != UserStatus::Active {
            return Err(AuthError::AccountInactive);
        }

        if self.config.rotate_refresh_tokens {
            self.store.revoke_refresh_token(stored.id).await?;
            return self.issue_session(user, client, false).await;
        }

        let (token, expires_at) =
            self.jwt
                .sign_session(&user, Uuid::new_v4(), user.role.permissions())?;

        Ok(SessionResponse {
            token,
            refresh_token: raw_refresh_token.to_string(),
            requires_password_change: false,
            user,
            expires_at,
        })
    }

    /// Revoke one refresh token. Unknown tokens are ignored.
    pub async fn logout(&self, raw_refresh_token: &str) -> AuthResult<()> {
        if let Some(stored) = self
            .store
            .find_refresh_token(&hash_opaque_token(raw_refresh_token))
            .await?
        {
            if !stored.is_revoked {
                self.store.revoke_refresh_token(stored.id).await?;
                info!("User {} logged out", stored.user_id);
            }
        }
        Ok(())
    }

    /// Revoke every refresh token of a user
    pub async fn logout_all(&self, user_id: Uuid) -> AuthResult<u64> {
        let revoked = self.store.revoke_all_refresh_tokens(user_id).await?;
        info!("Revoked {} sessions of user {}", revoked, user_id);
        Ok(revoked)
    }

    /// Start password recovery. The response never reveals whether the
    /// email belongs to an account.
    pub async fn request_password_reset(&self, email: &str) -> MessageResponse {
        let email = normalize_email(email);

        match self.store.find_user_by_email(&email).await {
            Ok(Some(user)) => {
                if let Err(e) = self.send_reset_link(&user, &email).await {
                    error!("Failed to issue reset token for user {}: {}", user.id, e);
                }
            }
            Ok(None) => info!("Password reset requested for unknown email"),
            Err(e) => error!("Password reset lookup failed: {}", e),
        }

        MessageResponse::new(true, RESET_REQUESTED_MESSAGE)
    }

    async fn send_reset_link(&self, user: &User, email: &str) -> AuthResult<()> {
        let raw = new_opaque_secret();
        self.store
            .replace_one_time_token(
                OneTimePurpose::PasswordReset,
                NewOneTimeToken {
                    user_id: user.id,
                    token_hash: hash_opaque_token(&raw),
                    email: Some(email.to_string()),
                    expires_at: Utc::now() + Duration::hours(RESET_TTL_HOURS),
                },
            )
            .await?;

        let url = self.link("reset-password", &raw);
        let outcome = self
            .mailer
            .send_password_reset_email(email, &url, &user.display_name())
            .await;
        if !outcome.success {
            warn!(
                "Reset email to {} failed ({}); reset manually at {}",
                email,
                outcome.error.unwrap_or_default(),
                url
            );
        }
        Ok(())
    }

    /// Set a new password with a reset token and sign out everywhere
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> AuthResult<()> {
        let token = self
            .store
            .find_one_time_token(OneTimePurpose::PasswordReset, &hash_opaque_token(raw_token))
            .await?
            .filter(|t| !t.is_used)
            .ok_or(AuthError::InvalidToken)?;

        let now = Utc::now();
        if token.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;

        let revoked = self
            .store
            .reset_password(token.user_id, token.id, &password_hash, now)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        info!(
            "Password reset for user {}; revoked {} sessions",
            token.user_id, revoked
        );
        Ok(())
    }

    /// Issue a fresh verification link, invalidating earlier ones
    pub async fn resend_verification_email(&self, email: &str) -> AuthResult<MessageResponse> {
        let email = normalize_email(email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Ok(MessageResponse::new(false, "No account found for that email"));
        };
        if user.email_verified {
            return Ok(MessageResponse::new(false, "Email is already verified"));
        }

        let raw = self.issue_verification_token(&user, &email).await?;
        let url = self.link("verify-email", &raw);
        let outcome = self
            .mailer
            .send_verification_email(&email, &url, &user.display_name())
            .await;

        if outcome.success {
            Ok(MessageResponse::new(true, "Verification email sent"))
        } else {
            warn!(
                "Verification email to {} failed ({}); verify manually at {}",
                email,
                outcome.error.as_deref().unwrap_or_default(),
                url
            );
            Ok(MessageResponse::new(
                false,
                "Failed to send verification email",
            ))
        }
    }

    /// Change the password of a signed-in user. Accounts created with a
    /// temporary password leave `pending_setup` here.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: Option<&str>,
        new_password: &str,
    ) -> AuthResult<User> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(stored) = user.password_hash.as_deref() {
            let current = current_password.ok_or(AuthError::InvalidCredentials)?;
            if !verify_password(current, stored) {
                return Err(AuthError::InvalidCredentials);
            }
        }

        validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;

        let updated = self
            .store
            .change_password(user_id, &password_hash)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        info!("Password changed for user {}", user_id);
        Ok(updated)
    }

    async fn issue_verification_token(&self, user: &User, email: &str) -> AuthResult<String> {
        let raw = new_opaque_secret();
        self.store
            .replace_one_time_token(
                OneTimePurpose::EmailVerification,
                NewOneTimeToken {
                    user_id: user.id,
                    token_hash: hash_opaque_token(&raw),
                    email: Some(email.to_string()),
                    expires_at: Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS),
                },
            )
            .await?;
        Ok(raw)
    }

    async fn issue_session(
        &self,
        user: User,
        client: ClientInfo,
        remember_me: bool,
    ) -> AuthResult<SessionResponse> {
        let (token, expires_at) =
            self.jwt
                .sign_session(&user, Uuid::new_v4(), user.role.permissions())?;

        let lifetime = if remember_me {
            Duration::days(self.config.remember_me_days)
        } else {
            Duration::hours(self.config.session_timeout_hours)
        };

        let raw = new_opaque_secret();
        self.store
            .insert_refresh_token(NewRefreshToken {
                user_id: user.id,
                token_hash: hash_opaque_token(&raw),
                expires_at: Utc::now() + lifetime,
                client,
            })
            .await?;

        Ok(SessionResponse {
            token,
            refresh_token: raw,
            requires_password_change: user.status == UserStatus::PendingSetup,
            user,
            expires_at,
        })
    }

    fn link(&self, page: &str, raw_token: &str) -> String {
        format!(
            "{}/{}?token={}",
            self.config.frontend_url.trim_end_matches('/'),
            page,
            raw_token
        )
    }
}

/// Company name for a landlord or agency registration
fn company_name(request: &RegisterRequest) -> String {
    if let Some(name) = request
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }

    let owner = [request.first_name.as_deref(), request.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if owner.is_empty() {
        "My Properties".to_string()
    } else {
        format!("{} Properties", owner)
    }
}
