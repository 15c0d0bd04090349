use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use payments::{
    error::PaymentError,
    models::{
        MpesaTransaction, NewMpesaTransaction, NewPaybillSettings, NewPayment, PaybillSettings,
        Payment, TransactionInsert, TransactionStatus, Unit, WebhookResponse,
    },
    reconcile::Reconciler,
    repositories::{MemoryPaymentStore, PaymentStore},
    webhook::WebhookProcessor,
};

const SHORTCODE: &str = "600984";

struct Fixture {
    store: MemoryPaymentStore,
    processor: WebhookProcessor,
    reconciler: Reconciler,
    company_id: Uuid,
    tenant_id: Uuid,
}

async fn fixture(auto_reconcile: bool) -> Fixture {
    let store = MemoryPaymentStore::new();
    let company_id = Uuid::new_v4();
    let tenant_id = Uuid::new_v4();
    let property_id = Uuid::new_v4();

    store
        .upsert_paybill_settings(NewPaybillSettings {
            company_id,
            shortcode: SHORTCODE.to_string(),
            consumer_key_encrypted: "sealed-key".to_string(),
            consumer_secret_encrypted: "sealed-secret".to_string(),
            validation_url: "https://api.makazi.test/mpesa/validation".to_string(),
            confirmation_url: "https://api.makazi.test/mpesa/confirmation".to_string(),
            auto_reconcile,
        })
        .await
        .expect("paybill saved");

    store
        .insert_unit(Unit {
            id: Uuid::new_v4(),
            company_id,
            property_id,
            unit_number: "A12".to_string(),
            current_tenant_id: Some(tenant_id),
            rent_amount: Decimal::new(5000, 0),
        })
        .await;
    store
        .insert_unit(Unit {
            id: Uuid::new_v4(),
            company_id,
            property_id,
            unit_number: "B7".to_string(),
            current_tenant_id: None,
            rent_amount: Decimal::new(4500, 0),
        })
        .await;

    let shared: Arc<dyn PaymentStore> = Arc::new(store.clone());
    let reconciler = Reconciler::new(shared.clone());
    let processor = WebhookProcessor::new(shared, reconciler.clone(), Duration::from_secs(2));

    Fixture {
        store,
        processor,
        reconciler,
        company_id,
        tenant_id,
    }
}

fn event(trans_id: &str, amount: &str, bill_ref: &str, shortcode: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "TransactionType": "Pay Bill",
        "TransID": trans_id,
        "TransTime": "20240105143012",
        "TransAmount": amount,
        "BusinessShortCode": shortcode,
        "BillRefNumber": bill_ref,
        "InvoiceNumber": "",
        "OrgAccountBalance": "49197.00",
        "ThirdPartyTransID": "",
        "MSISDN": "254708374149",
        "FirstName": "John",
        "MiddleName": "",
        "LastName": "Doe"
    }))
    .expect("serializes")
}

fn rejected(desc: &str) -> WebhookResponse {
    WebhookResponse::reject(desc)
}

#[tokio::test]
async fn underpayment_is_rejected_at_validation() {
    let f = fixture(false).await;

    let response = f
        .processor
        .validate(&event("RKT001", "4000.00", "A12", SHORTCODE))
        .await;
    assert_eq!(response, rejected("Amount is less than rent amount"));

    let response = f
        .processor
        .validate(&event("RKT001", "5000.00", "a12", SHORTCODE))
        .await;
    assert!(response.is_accepted());
}

#[tokio::test]
async fn unknown_shortcode_is_rejected_by_both_hooks() {
    let f = fixture(false).await;
    let body = event("RKT002", "5000", "A12", "174379");

    assert_eq!(
        f.processor.validate(&body).await,
        rejected("Invalid business shortcode")
    );
    assert_eq!(
        f.processor.confirm(&body).await,
        rejected("Invalid business shortcode")
    );
    assert_eq!(f.store.transaction_count().await, 0);
}

#[tokio::test]
async fn inactive_paybill_is_treated_as_unknown() {
    let f = fixture(false).await;
    f.store.set_paybill_active(f.company_id, false).await;

    assert_eq!(
        f.processor
            .validate(&event("RKT003", "5000", "A12", SHORTCODE))
            .await,
        rejected("Invalid business shortcode")
    );
}

#[tokio::test]
async fn unknown_and_vacant_units_are_rejected() {
    let f = fixture(false).await;

    assert_eq!(
        f.processor
            .validate(&event("RKT004", "5000", "Z99", SHORTCODE))
            .await,
        rejected("Invalid unit number")
    );
    assert_eq!(
        f.processor
            .confirm(&event("RKT004", "5000", "B7", SHORTCODE))
            .await,
        rejected("Unit has no current tenant")
    );
    assert_eq!(f.store.transaction_count().await, 0);
}

#[tokio::test]
async fn malformed_body_is_rejected_not_raised() {
    let f = fixture(false).await;

    let response = f.processor.confirm(b"{\"TransID\": ").await;
    assert_eq!(response.result_code, 1);
    assert_eq!(response.result_desc, "Invalid request payload");
}

#[tokio::test]
async fn repeated_confirmation_records_one_transaction() {
    let f = fixture(false).await;
    let body = event("RKT005", "5000.00", "A12", SHORTCODE);

    let first = f.processor.confirm(&body).await;
    let second = f.processor.confirm(&body).await;

    assert_eq!(first, WebhookResponse::accept("Success"));
    assert_eq!(second, WebhookResponse::accept("Already processed"));
    assert_eq!(f.store.transaction_count().await, 1);

    let stored = f
        .store
        .find_transaction_by_trans_id("RKT005")
        .await
        .expect("reads")
        .expect("recorded");
    assert_eq!(stored.status, TransactionStatus::Confirmed);
    assert_eq!(stored.tenant_id, f.tenant_id);
    assert_eq!(stored.payment_id, None);
    assert_eq!(stored.payer_name.as_deref(), Some("John Doe"));
    assert_eq!(stored.raw_payload["MSISDN"], "254708374149");
    assert_eq!(stored.raw_payload["OrgAccountBalance"], "49197.00");
    assert!(f.store.payments().await.is_empty());
}

#[tokio::test]
async fn confirmation_accepts_partial_payments() {
    let f = fixture(false).await;

    let response = f
        .processor
        .confirm(&event("RKT006", "1500", "A12", SHORTCODE))
        .await;
    assert!(response.is_accepted());
}

#[tokio::test]
async fn auto_reconcile_creates_one_payment() {
    let f = fixture(true).await;
    let body = event("RKT007", "5000.00", "A12", SHORTCODE);

    assert!(f.processor.confirm(&body).await.is_accepted());
    assert!(f.processor.confirm(&body).await.is_accepted());

    let payments = f.store.payments().await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].receipt_number, "MPESA-RKT007");
    assert_eq!(payments[0].tenant_id, f.tenant_id);
    assert_eq!(payments[0].processed_by, None);

    let stored = f
        .store
        .find_transaction_by_trans_id("RKT007")
        .await
        .expect("reads")
        .expect("recorded");
    assert_eq!(stored.status, TransactionStatus::Reconciled);
    assert_eq!(stored.payment_id, Some(payments[0].id));
}

#[tokio::test]
async fn manual_reconciliation_happens_once() {
    let f = fixture(false).await;
    assert!(
        f.processor
            .confirm(&event("RKT008", "5000", "A12", SHORTCODE))
            .await
            .is_accepted()
    );
    let stored = f
        .store
        .find_transaction_by_trans_id("RKT008")
        .await
        .expect("reads")
        .expect("recorded");

    let admin = Uuid::new_v4();
    let payment = f
        .reconciler
        .reconcile_for_company(stored.id, f.company_id, Some(admin))
        .await
        .expect("reconciles");
    assert_eq!(payment.created_by, Some(admin));

    let err = f
        .reconciler
        .reconcile(stored.id, Some(admin))
        .await
        .expect_err("already done");
    assert!(matches!(err, PaymentError::AlreadyReconciled));
    assert_eq!(f.store.payments().await.len(), 1);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stall {
    PaybillLookup,
    Reconciliation,
}

/// Store that sleeps past the webhook deadline in one chosen call
struct StallingStore {
    inner: MemoryPaymentStore,
    stall: Stall,
}

impl StallingStore {
    fn shared(inner: &MemoryPaymentStore, stall: Stall) -> Arc<dyn PaymentStore> {
        Arc::new(Self {
            inner: inner.clone(),
            stall,
        })
    }

    async fn maybe_stall(&self, at: Stall) {
        if self.stall == at {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[async_trait]
impl PaymentStore for StallingStore {
    async fn find_active_paybill_by_shortcode(
        &self,
        shortcode: &str,
    ) -> DatabaseResult<Option<PaybillSettings>> {
        self.maybe_stall(Stall::PaybillLookup).await;
        self.inner.find_active_paybill_by_shortcode(shortcode).await
    }

    async fn find_paybill_by_company(
        &self,
        company_id: Uuid,
    ) -> DatabaseResult<Option<PaybillSettings>> {
        self.inner.find_paybill_by_company(company_id).await
    }

    async fn upsert_paybill_settings(
        &self,
        settings: NewPaybillSettings,
    ) -> DatabaseResult<PaybillSettings> {
        self.inner.upsert_paybill_settings(settings).await
    }

    async fn find_unit_by_number(
        &self,
        company_id: Uuid,
        unit_number: &str,
    ) -> DatabaseResult<Option<Unit>> {
        self.inner.find_unit_by_number(company_id, unit_number).await
    }

    async fn find_transaction(&self, id: Uuid) -> DatabaseResult<Option<MpesaTransaction>> {
        self.inner.find_transaction(id).await
    }

    async fn find_transaction_by_trans_id(
        &self,
        trans_id: &str,
    ) -> DatabaseResult<Option<MpesaTransaction>> {
        self.inner.find_transaction_by_trans_id(trans_id).await
    }

    async fn insert_transaction(
        &self,
        transaction: NewMpesaTransaction,
    ) -> DatabaseResult<TransactionInsert> {
        self.inner.insert_transaction(transaction).await
    }

    async fn record_reconciliation(
        &self,
        transaction_id: Uuid,
        payment: NewPayment,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<(Payment, MpesaTransaction)>> {
        self.maybe_stall(Stall::Reconciliation).await;
        self.inner
            .record_reconciliation(transaction_id, payment, at)
            .await
    }
}

#[tokio::test]
async fn slow_processing_answers_with_a_timeout_rejection() {
    let f = fixture(false).await;
    let stalling = StallingStore::shared(&f.store, Stall::PaybillLookup);
    let processor = WebhookProcessor::new(
        stalling.clone(),
        Reconciler::new(stalling),
        Duration::from_millis(50),
    );

    let response = processor
        .validate(&event("RKT009", "5000", "A12", SHORTCODE))
        .await;
    assert_eq!(response, rejected("Request timed out"));
}

#[tokio::test]
async fn slow_auto_reconciliation_keeps_the_confirmation_accepted() {
    let f = fixture(true).await;
    let stalling = StallingStore::shared(&f.store, Stall::Reconciliation);
    let processor = WebhookProcessor::new(
        stalling.clone(),
        Reconciler::new(stalling),
        Duration::from_millis(100),
    );

    let response = processor
        .confirm(&event("RKT010", "5000", "A12", SHORTCODE))
        .await;
    assert_eq!(response, WebhookResponse::accept("Success"));
    assert_eq!(response.result_code, 0);

    assert_eq!(f.store.transaction_count().await, 1);
    let stored = f
        .store
        .find_transaction_by_trans_id("RKT010")
        .await
        .expect("reads")
        .expect("recorded");
    assert_eq!(stored.status, TransactionStatus::Confirmed);
    assert_eq!(stored.payment_id, None);
    assert!(f.store.payments().await.is_empty());

    let payment = f
        .reconciler
        .reconcile(stored.id, None)
        .await
        .expect("left for manual reconciliation");
    assert_eq!(payment.receipt_number, "MPESA-RKT010");
}

#[test]
fn webhook_reply_shape_is_stable() {
    let body: Value =
        serde_json::to_value(WebhookResponse::accept("Success")).expect("serializes");
    assert_eq!(body, json!({ "ResultCode": 0, "ResultDesc": "Success" }));
}
