//! M-Pesa C2B webhook wire types
//!
//! Field names follow the provider payload exactly.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// East Africa Time, the zone of `TransTime`
const EAT_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2bEvent {
    #[serde(rename = "TransactionType", default)]
    pub transaction_type: Option<String>,
    #[serde(rename = "TransID")]
    pub trans_id: String,
    #[serde(rename = "TransTime", default)]
    pub trans_time: Option<String>,
    #[serde(rename = "TransAmount")]
    pub trans_amount: Decimal,
    #[serde(rename = "BusinessShortCode", deserialize_with = "string_or_number")]
    pub business_short_code: String,
    #[serde(rename = "BillRefNumber", default)]
    pub bill_ref_number: String,
    #[serde(rename = "InvoiceNumber", default)]
    pub invoice_number: Option<String>,
    #[serde(rename = "OrgAccountBalance", default)]
    pub org_account_balance: Option<String>,
    #[serde(rename = "ThirdPartyTransID", default)]
    pub third_party_trans_id: Option<String>,
    #[serde(rename = "MSISDN", default)]
    pub msisdn: String,
    #[serde(rename = "FirstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "MiddleName", default)]
    pub middle_name: Option<String>,
    #[serde(rename = "LastName", default)]
    pub last_name: Option<String>,
}

impl C2bEvent {
    /// Bill reference as typed by the payer, trimmed
    pub fn unit_reference(&self) -> &str {
        self.bill_ref_number.trim()
    }

    /// `TransTime` (`YYYYMMDDHHMMSS`, EAT) as a UTC instant
    pub fn transacted_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.trans_time.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S").ok()?;
        let eat = FixedOffset::east_opt(EAT_OFFSET_SECS)?;
        eat.from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn payer_name(&self) -> Option<String> {
        let name = [
            self.first_name.as_deref(),
            self.middle_name.as_deref(),
            self.last_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        (!name.is_empty()).then_some(name)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// Reply body expected by the gateway: `0` accepts, `1` rejects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    #[serde(rename = "ResultCode")]
    pub result_code: u8,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl WebhookResponse {
    pub fn accept(desc: impl Into<String>) -> Self {
        Self {
            result_code: 0,
            result_desc: desc.into(),
        }
    }

    pub fn reject(desc: impl Into<String>) -> Self {
        Self {
            result_code: 1,
            result_desc: desc.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.result_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "TransactionType": "Pay Bill",
            "TransID": "RKTQDM7W6S",
            "TransTime": "20240105143012",
            "TransAmount": "5000.00",
            "BusinessShortCode": 600984,
            "BillRefNumber": " A12 ",
            "InvoiceNumber": "",
            "OrgAccountBalance": "49197.00",
            "ThirdPartyTransID": "",
            "MSISDN": "254708374149",
            "FirstName": "John",
            "MiddleName": "",
            "LastName": "Doe"
        })
    }

    #[test]
    fn decodes_provider_payload() {
        let event: C2bEvent = serde_json::from_value(sample()).expect("valid payload");

        assert_eq!(event.trans_id, "RKTQDM7W6S");
        assert_eq!(event.trans_amount, Decimal::new(5000, 0));
        assert_eq!(event.business_short_code, "600984");
        assert_eq!(event.unit_reference(), "A12");
        assert_eq!(event.payer_name().as_deref(), Some("John Doe"));
    }

    #[test]
    fn transaction_time_is_converted_from_eat() {
        let event: C2bEvent = serde_json::from_value(sample()).expect("valid payload");
        let at = event.transacted_at().expect("parsable time");

        assert_eq!(at.day(), 5);
        assert_eq!(at.hour(), 11);
        assert_eq!(at.minute(), 30);
    }

    #[test]
    fn missing_transaction_id_is_rejected() {
        let mut payload = sample();
        payload
            .as_object_mut()
            .expect("object")
            .remove("TransID");
        assert!(serde_json::from_value::<C2bEvent>(payload).is_err());
    }

    #[test]
    fn response_uses_provider_field_names() {
        let body = serde_json::to_value(WebhookResponse::reject("Invalid business shortcode"))
            .expect("serializes");
        assert_eq!(
            body,
            json!({ "ResultCode": 1, "ResultDesc": "Invalid business shortcode" })
        );
    }
}
