//! Turns confirmed M-Pesa transactions into ledger payments, exactly once

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{PaymentError, PaymentResult},
    models::{
        MpesaTransaction, NewPayment, Payment, PaymentStatus,
        transaction::{MPESA_CURRENCY, MPESA_PAYMENT_METHOD},
    },
    repositories::PaymentStore,
};

/// Receipt number of the payment created for an M-Pesa transaction
pub fn receipt_number(trans_id: &str) -> String {
    format!("MPESA-{}", trans_id)
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    /// Reconcile a transaction. `actor` is the administrator, if any.
    pub async fn reconcile(
        &self,
        transaction_id: Uuid,
        actor: Option<Uuid>,
    ) -> PaymentResult<Payment> {
        let transaction = self
            .store
            .find_transaction(transaction_id)
            .await?
            .ok_or(PaymentError::TransactionNotFound)?;

        self.reconcile_loaded(transaction, actor).await
    }

    /// Reconcile a transaction belonging to `company_id`. Other companies'
    /// transactions are reported as not found.
    pub async fn reconcile_for_company(
        &self,
        transaction_id: Uuid,
        company_id: Uuid,
        actor: Option<Uuid>,
    ) -> PaymentResult<Payment> {
        let transaction = self
            .store
            .find_transaction(transaction_id)
            .await?
            .filter(|t| t.company_id == company_id)
            .ok_or(PaymentError::TransactionNotFound)?;

        self.reconcile_loaded(transaction, actor).await
    }

    async fn reconcile_loaded(
        &self,
        transaction: MpesaTransaction,
        actor: Option<Uuid>,
    ) -> PaymentResult<Payment> {
        if transaction.payment_id.is_some() {
            return Err(PaymentError::AlreadyReconciled);
        }

        let payment = NewPayment {
            company_id: transaction.company_id,
            tenant_id: transaction.tenant_id,
            unit_id: transaction.unit_id,
            amount: transaction.trans_amount,
            currency: MPESA_CURRENCY.to_string(),
            payment_method: MPESA_PAYMENT_METHOD.to_string(),
            status: PaymentStatus::Approved,
            receipt_number: receipt_number(&transaction.trans_id),
            reference_phone: transaction.msisdn.clone(),
            reference_account: transaction.bill_ref_number.clone(),
            processed_by: actor,
            created_by: actor,
        };

        let (payment, _) = self
            .store
            .record_reconciliation(transaction.id, payment, Utc::now())
            .await?
            .ok_or(PaymentError::AlreadyReconciled)?;

        info!(
            "Reconciled transaction {} into payment {} ({})",
            transaction.trans_id, payment.id, payment.receipt_number
        );
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewMpesaTransaction, TransactionInsert, TransactionStatus};
    use crate::repositories::MemoryPaymentStore;
    use rust_decimal::Decimal;

    async fn confirmed(store: &MemoryPaymentStore) -> MpesaTransaction {
        let inserted = store
            .insert_transaction(NewMpesaTransaction {
                trans_id: "RKTQDM7W6S".to_string(),
                transaction_type: Some("Pay Bill".to_string()),
                trans_time: None,
                trans_amount: Decimal::new(500000, 2),
                business_short_code: "600984".to_string(),
                bill_ref_number: "A12".to_string(),
                msisdn: "254708374149".to_string(),
                payer_name: None,
                company_id: Uuid::new_v4(),
                unit_id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                property_id: Uuid::new_v4(),
                raw_payload: serde_json::json!({ "TransID": "RKTQDM7W6S" }),
            })
            .await
            .expect("inserts");

        match inserted {
            TransactionInsert::Created(t) => t,
            TransactionInsert::Duplicate(_) => panic!("fresh store"),
        }
    }

    #[test]
    fn receipt_number_is_derived_from_trans_id() {
        assert_eq!(receipt_number("RKTQDM7W6S"), "MPESA-RKTQDM7W6S");
    }

    #[tokio::test]
    async fn reconciles_exactly_once() {
        let store = MemoryPaymentStore::new();
        let transaction = confirmed(&store).await;
        let reconciler = Reconciler::new(Arc::new(store.clone()));
        let admin = Uuid::new_v4();

        let payment = reconciler
            .reconcile(transaction.id, Some(admin))
            .await
            .expect("reconciles");
        assert_eq!(payment.receipt_number, "MPESA-RKTQDM7W6S");
        assert_eq!(payment.amount, Decimal::new(5000, 0));
        assert_eq!(payment.payment_method, "mpesa");
        assert_eq!(payment.status, PaymentStatus::Approved);
        assert_eq!(payment.reference_phone, "254708374149");
        assert_eq!(payment.processed_by, Some(admin));

        let err = reconciler
            .reconcile(transaction.id, None)
            .await
            .expect_err("second attempt");
        assert!(matches!(err, PaymentError::AlreadyReconciled));
        assert_eq!(store.payments().await.len(), 1);

        let stored = store
            .find_transaction(transaction.id)
            .await
            .expect("reads")
            .expect("exists");
        assert_eq!(stored.status, TransactionStatus::Reconciled);
        assert_eq!(stored.payment_id, Some(payment.id));
        assert!(stored.processed_at.is_some());
    }

    #[tokio::test]
    async fn unknown_transaction_is_reported() {
        let reconciler = Reconciler::new(Arc::new(MemoryPaymentStore::new()));
        let err = reconciler
            .reconcile(Uuid::new_v4(), None)
            .await
            .expect_err("unknown");
        assert!(matches!(err, PaymentError::TransactionNotFound));
    }

    #[tokio::test]
    async fn other_companies_cannot_reconcile() {
        let store = MemoryPaymentStore::new();
        let transaction = confirmed(&store).await;
        let reconciler = Reconciler::new(Arc::new(store.clone()));

        let err = reconciler
            .reconcile_for_company(transaction.id, Uuid::new_v4(), None)
            .await
            .expect_err("foreign company");
        assert!(matches!(err, PaymentError::TransactionNotFound));
        assert!(store.payments().await.is_empty());
    }
}
