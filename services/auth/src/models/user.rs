//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Roles a Makazi account can hold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    AgencyAdmin,
    Agent,
    Landlord,
    Caretaker,
    Tenant,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::AgencyAdmin => "agency_admin",
            UserRole::Agent => "agent",
            UserRole::Landlord => "landlord",
            UserRole::Caretaker => "caretaker",
            UserRole::Tenant => "tenant",
        }
    }

    /// Roles that own a company record created at registration
    pub fn owns_company(&self) -> bool {
        matches!(self, UserRole::Landlord | UserRole::AgencyAdmin)
    }

    /// Roles scoped to an agency rather than to a single landlord
    pub fn is_agency_scoped(&self) -> bool {
        matches!(self, UserRole::AgencyAdmin | UserRole::Agent)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(UserRole::SuperAdmin),
            "agency_admin" => Ok(UserRole::AgencyAdmin),
            "agent" => Ok(UserRole::Agent),
            "landlord" => Ok(UserRole::Landlord),
            "caretaker" => Ok(UserRole::Caretaker),
            "tenant" => Ok(UserRole::Tenant),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Account lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Waiting for email verification or for an invitation to be accepted
    Pending,
    /// Created by an administrator, password must be changed on first login
    PendingSetup,
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::PendingSetup => "pending_setup",
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    /// Statuses allowed to authenticate with a password
    pub fn can_login(&self) -> bool {
        matches!(self, UserStatus::Active | UserStatus::PendingSetup)
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UserStatus::Pending),
            "pending_setup" => Ok(UserStatus::PendingSetup),
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            other => Err(format!("unknown user status: {}", other)),
        }
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    pub company_id: Option<Uuid>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name used to greet the user in emails
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        if !full.is_empty() {
            full
        } else {
            self.email.clone().unwrap_or_else(|| "there".to_string())
        }
    }
}

/// New user creation payload, password already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
}
