//! JWT service for session and invitation tokens
//!
//! Session tokens carry the identity, role, scoping ids and permissions of
//! a user and are signed with a server-held HMAC secret. Invitation tokens
//! use the same key but a distinct `token_type`, so neither can stand in
//! for the other.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::{User, UserRole};

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC secret used to sign tokens
    pub secret: String,
    /// Value of the `iss` claim
    pub issuer: String,
    /// Session token lifetime in hours
    pub session_timeout_hours: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("session_timeout_hours", &self.session_timeout_hours)
            .finish()
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Session (access) token
    Access,
    /// Tenant invitation token
    Invitation,
}

/// Session claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub role: UserRole,
    pub tenant_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub agency_id: Option<Uuid>,
    pub landlord_id: Option<Uuid>,
    pub session_id: Uuid,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub token_type: TokenType,
}

impl Claims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Invitation claims, issued when a landlord or agent invites a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationClaims {
    /// Invited (pending) user ID
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub token_type: TokenType,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        if config.secret.len() < 32 {
            return Err(AuthError::Internal(
                "JWT secret must be at least 32 bytes".to_string(),
            ));
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        Ok(JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        })
    }

    /// Sign a session token for a user. Returns the token and its expiry.
    pub fn sign_session(
        &self,
        user: &User,
        session_id: Uuid,
        permissions: Vec<String>,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.config.session_timeout_hours);

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            role: user.role,
            tenant_id: (user.role == UserRole::Tenant).then_some(user.id),
            company_id: user.company_id,
            agency_id: user.company_id.filter(|_| user.role.is_agency_scoped()),
            landlord_id: (user.role == UserRole::Landlord).then_some(user.id),
            session_id,
            permissions,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            token_type: TokenType::Access,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign session: {}", e)))?;

        Ok((token, expires_at))
    }

    /// Validate a session token and return its claims
    pub fn validate_session(&self, token: &str) -> AuthResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(map_decode_error)?
            .claims;

        if claims.token_type != TokenType::Access {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    /// Sign an invitation for a pending tenant account
    pub fn sign_invitation(&self, user_id: Uuid, email: &str, ttl: Duration) -> AuthResult<String> {
        let now = Utc::now();
        let claims = InvitationClaims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.issuer.clone(),
            token_type: TokenType::Invitation,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign invitation: {}", e)))
    }

    /// Decode an invitation token
    pub fn decode_invitation(&self, token: &str) -> AuthResult<InvitationClaims> {
        let mut validation = self.validation.clone();
        validation.validate_nbf = false;

        let claims = decode::<InvitationClaims>(token, &self.decoding_key, &validation)
            .map_err(map_decode_error)?
            .claims;

        if claims.token_type != TokenType::Invitation {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserStatus;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            issuer: "makazi-auth".to_string(),
            session_timeout_hours: 24,
        })
        .expect("valid config")
    }

    fn user(role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: Some("otieno@example.com".to_string()),
            phone_number: Some("254700000001".to_string()),
            first_name: Some("Otieno".to_string()),
            last_name: None,
            password_hash: None,
            role,
            status: UserStatus::Active,
            email_verified: true,
            company_id: Some(Uuid::new_v4()),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rejects_short_secret() {
        let result = JwtService::new(JwtConfig {
            secret: "short".to_string(),
            issuer: "makazi-auth".to_string(),
            session_timeout_hours: 24,
        });
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[test]
    fn session_round_trip_carries_scoping_ids() {
        let jwt = service();
        let agent = user(UserRole::Agent);
        let session_id = Uuid::new_v4();

        let (token, expires_at) = jwt
            .sign_session(&agent, session_id, agent.role.permissions())
            .expect("signing succeeds");
        let claims = jwt.validate_session(&token).expect("token validates");

        assert_eq!(claims.sub, agent.id);
        assert_eq!(claims.session_id, session_id);
        assert_eq!(claims.agency_id, agent.company_id);
        assert_eq!(claims.landlord_id, None);
        assert_eq!(claims.tenant_id, None);
        assert_eq!(claims.iss, "makazi-auth");
        assert_eq!(claims.exp, expires_at.timestamp());
        assert!(claims.has_permission("payments:reconcile"));
    }

    #[test]
    fn landlord_and_tenant_scopes() {
        let jwt = service();
        let landlord = user(UserRole::Landlord);
        let (token, _) = jwt
            .sign_session(&landlord, Uuid::new_v4(), vec![])
            .expect("signing succeeds");
        let claims = jwt.validate_session(&token).expect("token validates");
        assert_eq!(claims.landlord_id, Some(landlord.id));
        assert_eq!(claims.agency_id, None);

        let tenant = user(UserRole::Tenant);
        let (token, _) = jwt
            .sign_session(&tenant, Uuid::new_v4(), vec![])
            .expect("signing succeeds");
        let claims = jwt.validate_session(&token).expect("token validates");
        assert_eq!(claims.tenant_id, Some(tenant.id));
    }

    #[test]
    fn expired_session_is_reported_as_expired() {
        let jwt = JwtService::new(JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            issuer: "makazi-auth".to_string(),
            session_timeout_hours: -2,
        })
        .expect("valid config");
        let (token, _) = jwt
            .sign_session(&user(UserRole::Tenant), Uuid::new_v4(), vec![])
            .expect("signing succeeds");

        assert!(matches!(
            jwt.validate_session(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let other = JwtService::new(JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            issuer: "someone-else".to_string(),
            session_timeout_hours: 1,
        })
        .expect("valid config");
        let (token, _) = other
            .sign_session(&user(UserRole::Tenant), Uuid::new_v4(), vec![])
            .expect("signing succeeds");

        assert!(matches!(
            service().validate_session(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn invitation_and_session_tokens_are_not_interchangeable() {
        let jwt = service();
        let invited = Uuid::new_v4();
        let invitation = jwt
            .sign_invitation(invited, "tenant@example.com", Duration::days(7))
            .expect("signing succeeds");

        let claims = jwt.decode_invitation(&invitation).expect("invitation decodes");
        assert_eq!(claims.sub, invited);
        assert_eq!(claims.email, "tenant@example.com");
        assert!(jwt.validate_session(&invitation).is_err());

        let (session, _) = jwt
            .sign_session(&user(UserRole::Tenant), Uuid::new_v4(), vec![])
            .expect("signing succeeds");
        assert!(jwt.decode_invitation(&session).is_err());
    }
