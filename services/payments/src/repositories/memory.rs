//! In-memory payment store for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::PaymentStore;
use crate::models::{
    MpesaTransaction, NewMpesaTransaction, NewPaybillSettings, NewPayment, PaybillSettings,
    Payment, TransactionInsert, TransactionStatus, Unit,
};

#[derive(Debug, Default)]
struct Tables {
    paybills: HashMap<Uuid, PaybillSettings>,
    units: Vec<Unit>,
    transactions: HashMap<Uuid, MpesaTransaction>,
    payments: Vec<Payment>,
}

/// Payment store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPaymentStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_unit(&self, unit: Unit) {
        self.tables.lock().await.units.push(unit);
    }

    /// Flip `is_active` on a company's paybill
    pub async fn set_paybill_active(&self, company_id: Uuid, is_active: bool) {
        if let Some(paybill) = self.tables.lock().await.paybills.get_mut(&company_id) {
            paybill.is_active = is_active;
        }
    }

    pub async fn transaction_count(&self) -> usize {
        self.tables.lock().await.transactions.len()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.tables.lock().await.payments.clone()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn find_active_paybill_by_shortcode(
        &self,
        shortcode: &str,
    ) -> DatabaseResult<Option<PaybillSettings>> {
        Ok(self
            .tables
            .lock()
            .await
            .paybills
            .values()
            .find(|p| p.is_active && p.shortcode == shortcode)
            .cloned())
    }

    async fn find_paybill_by_company(
        &self,
        company_id: Uuid,
    ) -> DatabaseResult<Option<PaybillSettings>> {
        Ok(self.tables.lock().await.paybills.get(&company_id).cloned())
    }

    async fn upsert_paybill_settings(
        &self,
        settings: NewPaybillSettings,
    ) -> DatabaseResult<PaybillSettings> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        let (id, created_at) = tables
            .paybills
            .get(&settings.company_id)
            .map(|existing| (existing.id, existing.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        let stored = PaybillSettings {
            id,
            company_id: settings.company_id,
            shortcode: settings.shortcode,
            consumer_key_encrypted: settings.consumer_key_encrypted,
            consumer_secret_encrypted: settings.consumer_secret_encrypted,
            validation_url: settings.validation_url,
            confirmation_url: settings.confirmation_url,
            is_active: true,
            auto_reconcile: settings.auto_reconcile,
            created_at,
            updated_at: now,
        };
        tables.paybills.insert(stored.company_id, stored.clone());
        Ok(stored)
    }

    async fn find_unit_by_number(
        &self,
        company_id: Uuid,
        unit_number: &str,
    ) -> DatabaseResult<Option<Unit>> {
        Ok(self
            .tables
            .lock()
            .await
            .units
            .iter()
            .find(|u| u.company_id == company_id && u.unit_number.eq_ignore_ascii_case(unit_number))
            .cloned())
    }

    async fn find_transaction(&self, id: Uuid) -> DatabaseResult<Option<MpesaTransaction>> {
        Ok(self.tables.lock().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_trans_id(
        &self,
        trans_id: &str,
    ) -> DatabaseResult<Option<MpesaTransaction>> {
        Ok(self
            .tables
            .lock()
            .await
            .transactions
            .values()
            .find(|t| t.trans_id == trans_id)
            .cloned())
    }

    async fn insert_transaction(
        &self,
        transaction: NewMpesaTransaction,
    ) -> DatabaseResult<TransactionInsert> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables
            .transactions
            .values()
            .find(|t| t.trans_id == transaction.trans_id)
        {
            return Ok(TransactionInsert::Duplicate(existing.clone()));
        }

        let stored = MpesaTransaction {
            id: Uuid::new_v4(),
            trans_id: transaction.trans_id,
            transaction_type: transaction.transaction_type,
            trans_time: transaction.trans_time,
            trans_amount: transaction.trans_amount,
            business_short_code: transaction.business_short_code,
            bill_ref_number: transaction.bill_ref_number,
            msisdn: transaction.msisdn,
            payer_name: transaction.payer_name,
            company_id: transaction.company_id,
            unit_id: transaction.unit_id,
            tenant_id: transaction.tenant_id,
            property_id: transaction.property_id,
            status: TransactionStatus::Confirmed,
            payment_id: None,
            raw_payload: transaction.raw_payload,
            processed_at: None,
            created_at: Utc::now(),
        };
        tables.transactions.insert(stored.id, stored.clone());
        Ok(TransactionInsert::Created(stored))
    }

    async fn record_reconciliation(
        &self,
        transaction_id: Uuid,
        payment: NewPayment,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<(Payment, MpesaTransaction)>> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let Some(transaction) = tables
            .transactions
            .get_mut(&transaction_id)
            .filter(|t| t.payment_id.is_none())
        else {
            return Ok(None);
        };

        let created = Payment {
            id: Uuid::new_v4(),
            company_id: payment.company_id,
            tenant_id: payment.tenant_id,
            unit_id: payment.unit_id,
            amount: payment.amount,
            currency: payment.currency,
            payment_method: payment.payment_method,
            status: payment.status,
            receipt_number: payment.receipt_number,
            reference_phone: payment.reference_phone,
            reference_account: payment.reference_account,
            processed_by: payment.processed_by,
            created_by: payment.created_by,
            created_at: at,
        };

        transaction.payment_id = Some(created.id);
        transaction.status = TransactionStatus::Reconciled;
        transaction.processed_at = Some(at);
        let updated = transaction.clone();

        tables.payments.push(created.clone());
        Ok(Some((created, updated)))
    }
}
