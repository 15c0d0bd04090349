//! M-Pesa C2B validation and confirmation webhooks
//!
//! Both entry points always answer with a [`WebhookResponse`]. Failures,
//! including timeouts and malformed bodies, become a `ResultCode: 1` reply
//! and a log line. The deadline covers recording a confirmation, not the
//! auto-reconciliation that follows it: once a transaction is stored the
//! reply is always a success.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{PaymentError, PaymentResult},
    models::{
        C2bEvent, MpesaTransaction, NewMpesaTransaction, PaybillSettings, TransactionInsert, Unit,
        WebhookResponse,
    },
    reconcile::Reconciler,
    repositories::PaymentStore,
};

const ACCEPTED: &str = "Accepted";
const CONFIRMED: &str = "Success";
const ALREADY_PROCESSED: &str = "Already processed";

/// What a confirmation left in the store
enum Recorded {
    Duplicate,
    Created {
        transaction: MpesaTransaction,
        auto_reconcile: bool,
    },
}

/// Paybill, unit and tenant an event pays for
struct Target {
    paybill: PaybillSettings,
    unit: Unit,
    tenant_id: Uuid,
}

#[derive(Clone)]
pub struct WebhookProcessor {
    store: Arc<dyn PaymentStore>,
    reconciler: Reconciler,
    timeout: Duration,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn PaymentStore>, reconciler: Reconciler, timeout: Duration) -> Self {
        Self {
            store,
            reconciler,
            timeout,
        }
    }

    /// Decide whether the gateway should accept a pending payment
    pub async fn validate(&self, body: &[u8]) -> WebhookResponse {
        match self.bounded("validation", self.try_validate(body)).await {
            Ok(desc) => WebhookResponse::accept(desc),
            Err(rejection) => rejection,
        }
    }

    /// Record a completed payment
    pub async fn confirm(&self, body: &[u8]) -> WebhookResponse {
        match self.bounded("confirmation", self.record(body)).await {
            Ok(Recorded::Duplicate) => WebhookResponse::accept(ALREADY_PROCESSED),
            Ok(Recorded::Created {
                transaction,
                auto_reconcile,
            }) => {
                if auto_reconcile {
                    self.auto_reconcile(&transaction).await;
                }
                WebhookResponse::accept(CONFIRMED)
            }
            Err(rejection) => rejection,
        }
    }

    /// Run `work` under the webhook deadline, turning failures into the
    /// rejection the gateway receives
    async fn bounded<T, F>(&self, stage: &str, work: F) -> Result<T, WebhookResponse>
    where
        F: Future<Output = PaymentResult<T>>,
    {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Rejected M-Pesa {}: {}", stage, e);
                Err(WebhookResponse::reject(e.result_desc()))
            }
            Err(_) => {
                warn!(
                    "M-Pesa {} did not finish within {:?}",
                    stage, self.timeout
                );
                Err(WebhookResponse::reject(PaymentError::Timeout.result_desc()))
            }
        }
    }

    /// Reconcile a freshly stored transaction. Failures and overruns are
    /// logged and leave it `confirmed` for manual reconciliation.
    async fn auto_reconcile(&self, transaction: &MpesaTransaction) {
        let work = self.reconciler.reconcile(transaction.id, None);
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(payment)) => info!(
                "Auto-reconciled {} as {}",
                transaction.trans_id, payment.receipt_number
            ),
            Ok(Err(e)) => error!(
                "Auto-reconciliation of {} failed: {}",
                transaction.trans_id, e
            ),
            Err(_) => error!(
                "Auto-reconciliation of {} did not finish within {:?}",
                transaction.trans_id, self.timeout
            ),
        }
    }

    async fn try_validate(&self, body: &[u8]) -> PaymentResult<&'static str> {
        let (event, _) = parse(body)?;
        let target = self.resolve(&event).await?;

        if event.trans_amount < target.unit.rent_amount {
            return Err(PaymentError::AmountTooLow);
        }

        info!(
            "Validated {} of {} for unit {}",
            event.trans_id, event.trans_amount, target.unit.unit_number
        );
        Ok(ACCEPTED)
    }

    async fn record(&self, body: &[u8]) -> PaymentResult<Recorded> {
        let (event, raw_payload) = parse(body)?;
        let target = self.resolve(&event).await?;

        if self
            .store
            .find_transaction_by_trans_id(&event.trans_id)
            .await?
            .is_some()
        {
            info!("Transaction {} already processed", event.trans_id);
            return Ok(Recorded::Duplicate);
        }

        let inserted = self
            .store
            .insert_transaction(NewMpesaTransaction {
                trans_id: event.trans_id.clone(),
                transaction_type: event.transaction_type.clone(),
                trans_time: event.transacted_at(),
                trans_amount: event.trans_amount,
                business_short_code: event.business_short_code.clone(),
                bill_ref_number: event.unit_reference().to_string(),
                msisdn: event.msisdn.clone(),
                payer_name: event.payer_name(),
                company_id: target.paybill.company_id,
                unit_id: target.unit.id,
                tenant_id: target.tenant_id,
                property_id: target.unit.property_id,
                raw_payload,
            })
            .await?;

        let transaction = match inserted {
            TransactionInsert::Created(transaction) => transaction,
            TransactionInsert::Duplicate(_) => {
                info!("Transaction {} already processed", event.trans_id);
                return Ok(Recorded::Duplicate);
            }
        };

        info!(
            "Recorded M-Pesa transaction {} for unit {}",
            transaction.trans_id, target.unit.unit_number
        );
        Ok(Recorded::Created {
            transaction,
            auto_reconcile: target.paybill.auto_reconcile,
        })
    }

    async fn resolve(&self, event: &C2bEvent) -> PaymentResult<Target> {
        let paybill = self
            .store
            .find_active_paybill_by_shortcode(event.business_short_code.trim())
            .await?
            .ok_or(PaymentError::InvalidShortcode)?;

        let reference = event.unit_reference();
        if reference.is_empty() {
            return Err(PaymentError::InvalidUnit);
        }

        let unit = self
            .store
            .find_unit_by_number(paybill.company_id, reference)
            .await?
            .ok_or(PaymentError::InvalidUnit)?;

        let tenant_id = unit.current_tenant_id.ok_or(PaymentError::UnitVacant)?;

        Ok(Target {
            paybill,
            unit,
            tenant_id,
        })
    }
}

/// Decode the event while keeping the body verbatim for audit
fn parse(body: &[u8]) -> PaymentResult<(C2bEvent, serde_json::Value)> {
    let raw: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
    let event = serde_json::from_value(raw.clone())
        .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
    Ok((event, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_the_raw_body() {
        let body = br#"{"TransID":"X1","TransAmount":"10","BusinessShortCode":"600984","MSISDN":"254700000000","Extra":"kept"}"#;
        let (event, raw) = parse(body).expect("parses");
        assert_eq!(event.trans_id, "X1");
        assert_eq!(raw["Extra"], "kept");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse(b"not json"),
            Err(PaymentError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse(br#"{"TransAmount":"10"}"#),
            Err(PaymentError::InvalidPayload(_))
        ));
    }
}
