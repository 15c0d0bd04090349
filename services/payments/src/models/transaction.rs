use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payment method recorded for M-Pesa receipts
pub const MPESA_PAYMENT_METHOD: &str = "mpesa";
/// Currency of every M-Pesa amount
pub const MPESA_CURRENCY: &str = "KES";

/// Lifecycle of a received M-Pesa transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Confirmed,
    Reconciled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Reconciled => "reconciled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "reconciled" => Ok(TransactionStatus::Reconciled),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Confirmed M-Pesa payment, unique by `trans_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaTransaction {
    pub id: Uuid,
    pub trans_id: String,
    pub transaction_type: Option<String>,
    pub trans_time: Option<DateTime<Utc>>,
    pub trans_amount: Decimal,
    pub business_short_code: String,
    pub bill_ref_number: String,
    pub msisdn: String,
    pub payer_name: Option<String>,
    pub company_id: Uuid,
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub status: TransactionStatus,
    pub payment_id: Option<Uuid>,
    /// Webhook body exactly as received
    pub raw_payload: serde_json::Value,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMpesaTransaction {
    pub trans_id: String,
    pub transaction_type: Option<String>,
    pub trans_time: Option<DateTime<Utc>>,
    pub trans_amount: Decimal,
    pub business_short_code: String,
    pub bill_ref_number: String,
    pub msisdn: String,
    pub payer_name: Option<String>,
    pub company_id: Uuid,
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub raw_payload: serde_json::Value,
}

/// Result of recording a confirmation
#[derive(Debug, Clone)]
pub enum TransactionInsert {
    Created(MpesaTransaction),
    /// A row with the same `trans_id` already existed
    Duplicate(MpesaTransaction),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "approved" => Ok(PaymentStatus::Approved),
            "rejected" => Ok(PaymentStatus::Rejected),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// Ledger payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub tenant_id: Uuid,
    pub unit_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub receipt_number: String,
    pub reference_phone: String,
    pub reference_account: String,
    pub processed_by: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub company_id: Uuid,
    pub tenant_id: Uuid,
    pub unit_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub receipt_number: String,
    pub reference_phone: String,
    pub reference_account: String,
    pub processed_by: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_parse_their_column_values() {
        for status in [TransactionStatus::Confirmed, TransactionStatus::Reconciled] {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("settled".parse::<TransactionStatus>().is_err());
        assert_eq!("approved".parse::<PaymentStatus>(), Ok(PaymentStatus::Approved));
    }
}
