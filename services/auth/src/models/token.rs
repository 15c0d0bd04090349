//! Single-use email verification and password reset tokens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purpose of a single-use token; each purpose lives in its own table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneTimePurpose {
    EmailVerification,
    PasswordReset,
}

/// Stored single-use token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// New single-use token payload
#[derive(Debug, Clone)]
pub struct NewOneTimeToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Verification token stored together with a freshly created account
#[derive(Debug, Clone)]
pub struct InitialVerification {
    pub token_hash: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl InitialVerification {
    pub fn for_user(self, user_id: Uuid) -> NewOneTimeToken {
        NewOneTimeToken {
            user_id,
            token_hash: self.token_hash,
            email: Some(self.email),
            expires_at: self.expires_at,
        }
    }
}
