//! Company model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Units a company may manage on the default plan
pub const DEFAULT_MAX_UNITS: i32 = 50;
/// Properties a company may manage on the default plan
pub const DEFAULT_MAX_PROPERTIES: i32 = 5;
/// Plan assigned to companies created at registration
pub const DEFAULT_PLAN: &str = "starter";

/// Company entity owning properties, units and a paybill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub owner_email: Option<String>,
    pub plan: String,
    pub max_units: i32,
    pub max_properties: i32,
    pub created_at: DateTime<Utc>,
}

/// Company creation payload
#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub owner_email: Option<String>,
}

/// Outcome of resolving a company by exact name
#[derive(Debug, Clone)]
pub enum CompanyLookup {
    Found(Company),
    Created(Company),
}

impl CompanyLookup {
    pub fn company(&self) -> &Company {
        match self {
            CompanyLookup::Found(company) | CompanyLookup::Created(company) => company,
        }
    }
}
