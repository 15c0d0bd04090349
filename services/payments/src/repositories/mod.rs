//! Payment storage
//!
//! [`PaymentStore`] backs the webhook processor, the reconciler and paybill
//! setup. Uniqueness of `trans_id` and the "payment_id is set once" rule are
//! enforced here, so concurrent deliveries cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use uuid::Uuid;

use crate::models::{
    MpesaTransaction, NewMpesaTransaction, NewPaybillSettings, NewPayment, PaybillSettings,
    Payment, TransactionInsert, Unit,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryPaymentStore;
pub use postgres::PgPaymentStore;

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_active_paybill_by_shortcode(
        &self,
        shortcode: &str,
    ) -> DatabaseResult<Option<PaybillSettings>>;

    async fn find_paybill_by_company(
        &self,
        company_id: Uuid,
    ) -> DatabaseResult<Option<PaybillSettings>>;

    /// Insert or replace the company's paybill settings and mark them active
    async fn upsert_paybill_settings(
        &self,
        settings: NewPaybillSettings,
    ) -> DatabaseResult<PaybillSettings>;

    /// Case-insensitive unit number lookup within one company
    async fn find_unit_by_number(
        &self,
        company_id: Uuid,
        unit_number: &str,
    ) -> DatabaseResult<Option<Unit>>;

    async fn find_transaction(&self, id: Uuid) -> DatabaseResult<Option<MpesaTransaction>>;

    async fn find_transaction_by_trans_id(
        &self,
        trans_id: &str,
    ) -> DatabaseResult<Option<MpesaTransaction>>;

    /// Record a confirmed transaction. A concurrent insert of the same
    /// `trans_id` yields [`TransactionInsert::Duplicate`], not an error.
    async fn insert_transaction(
        &self,
        transaction: NewMpesaTransaction,
    ) -> DatabaseResult<TransactionInsert>;

    /// Insert the payment and link it to the transaction in one unit of
    /// work. Returns `None`, writing nothing, when the transaction is
    /// missing or already carries a payment.
    async fn record_reconciliation(
        &self,
        transaction_id: Uuid,
        payment: NewPayment,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<(Payment, MpesaTransaction)>>;
}
