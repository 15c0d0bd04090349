use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rentable unit, resolved from the bill reference of a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub company_id: Uuid,
    pub property_id: Uuid,
    pub unit_number: String,
    pub current_tenant_id: Option<Uuid>,
    pub rent_amount: Decimal,
}
