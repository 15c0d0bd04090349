use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// M-Pesa paybill configuration of a company. Consumer credentials are
/// stored encrypted and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaybillSettings {
    pub id: Uuid,
    pub company_id: Uuid,
    pub shortcode: String,
    #[serde(skip_serializing, default)]
    pub consumer_key_encrypted: String,
    #[serde(skip_serializing, default)]
    pub consumer_secret_encrypted: String,
    pub validation_url: String,
    pub confirmation_url: String,
    pub is_active: bool,
    pub auto_reconcile: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert-or-replace payload, one row per company
#[derive(Debug, Clone)]
pub struct NewPaybillSettings {
    pub company_id: Uuid,
    pub shortcode: String,
    pub consumer_key_encrypted: String,
    pub consumer_secret_encrypted: String,
    pub validation_url: String,
    pub confirmation_url: String,
    pub auto_reconcile: bool,
}
