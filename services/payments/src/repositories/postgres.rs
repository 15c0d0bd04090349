//! PostgreSQL payment store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use super::PaymentStore;
use crate::models::{
    MpesaTransaction, NewMpesaTransaction, NewPaybillSettings, NewPayment, PaybillSettings,
    Payment, TransactionInsert, Unit,
};

const PAYBILL_COLUMNS: &str = "id, company_id, shortcode, consumer_key_encrypted, \
     consumer_secret_encrypted, validation_url, confirmation_url, is_active, auto_reconcile, \
     created_at, updated_at";

const UNIT_COLUMNS: &str = "id, company_id, property_id, unit_number, current_tenant_id, rent_amount";

const TRANSACTION_COLUMNS: &str = "id, trans_id, transaction_type, trans_time, trans_amount, \
     business_short_code, bill_ref_number, msisdn, payer_name, company_id, unit_id, tenant_id, \
     property_id, status, payment_id, raw_payload, processed_at, created_at";

const PAYMENT_COLUMNS: &str = "id, company_id, tenant_id, unit_id, amount, currency, \
     payment_method, status, receipt_number, reference_phone, reference_account, processed_by, \
     created_by, created_at";

fn paybill_from_row(row: &PgRow) -> DatabaseResult<PaybillSettings> {
    Ok(PaybillSettings {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        shortcode: row.try_get("shortcode")?,
        consumer_key_encrypted: row.try_get("consumer_key_encrypted")?,
        consumer_secret_encrypted: row.try_get("consumer_secret_encrypted")?,
        validation_url: row.try_get("validation_url")?,
        confirmation_url: row.try_get("confirmation_url")?,
        is_active: row.try_get("is_active")?,
        auto_reconcile: row.try_get("auto_reconcile")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn unit_from_row(row: &PgRow) -> DatabaseResult<Unit> {
    Ok(Unit {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        property_id: row.try_get("property_id")?,
        unit_number: row.try_get("unit_number")?,
        current_tenant_id: row.try_get("current_tenant_id")?,
        rent_amount: row.try_get("rent_amount")?,
    })
}

fn transaction_from_row(row: &PgRow) -> DatabaseResult<MpesaTransaction> {
    let status: String = row.try_get("status")?;

    Ok(MpesaTransaction {
        id: row.try_get("id")?,
        trans_id: row.try_get("trans_id")?,
        transaction_type: row.try_get("transaction_type")?,
        trans_time: row.try_get("trans_time")?,
        trans_amount: row.try_get("trans_amount")?,
        business_short_code: row.try_get("business_short_code")?,
        bill_ref_number: row.try_get("bill_ref_number")?,
        msisdn: row.try_get("msisdn")?,
        payer_name: row.try_get("payer_name")?,
        company_id: row.try_get("company_id")?,
        unit_id: row.try_get("unit_id")?,
        tenant_id: row.try_get("tenant_id")?,
        property_id: row.try_get("property_id")?,
        status: status.parse().map_err(DatabaseError::Decode)?,
        payment_id: row.try_get("payment_id")?,
        raw_payload: row.try_get("raw_payload")?,
        processed_at: row.try_get("processed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> DatabaseResult<Payment> {
    let status: String = row.try_get("status")?;

    Ok(Payment {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        tenant_id: row.try_get("tenant_id")?,
        unit_id: row.try_get("unit_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        payment_method: row.try_get("payment_method")?,
        status: status.parse().map_err(DatabaseError::Decode)?,
        receipt_number: row.try_get("receipt_number")?,
        reference_phone: row.try_get("reference_phone")?,
        reference_account: row.try_get("reference_account")?,
        processed_by: row.try_get("processed_by")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Payment store backed by PostgreSQL
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_active_paybill_by_shortcode(
        &self,
        shortcode: &str,
    ) -> DatabaseResult<Option<PaybillSettings>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM paybill_settings WHERE shortcode = $1 AND is_active = TRUE LIMIT 1",
            PAYBILL_COLUMNS
        ))
        .bind(shortcode)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(paybill_from_row).transpose()
    }

    async fn find_paybill_by_company(
        &self,
        company_id: Uuid,
    ) -> DatabaseResult<Option<PaybillSettings>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM paybill_settings WHERE company_id = $1",
            PAYBILL_COLUMNS
        ))
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(paybill_from_row).transpose()
    }

    async fn upsert_paybill_settings(
        &self,
        settings: NewPaybillSettings,
    ) -> DatabaseResult<PaybillSettings> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO paybill_settings (
                company_id, shortcode, consumer_key_encrypted, consumer_secret_encrypted,
                validation_url, confirmation_url, is_active, auto_reconcile
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            ON CONFLICT (company_id) DO UPDATE SET
                shortcode = EXCLUDED.shortcode,
                consumer_key_encrypted = EXCLUDED.consumer_key_encrypted,
                consumer_secret_encrypted = EXCLUDED.consumer_secret_encrypted,
                validation_url = EXCLUDED.validation_url,
                confirmation_url = EXCLUDED.confirmation_url,
                is_active = TRUE,
                auto_reconcile = EXCLUDED.auto_reconcile,
                updated_at = NOW()
            RETURNING {}
            "#,
            PAYBILL_COLUMNS
        ))
        .bind(settings.company_id)
        .bind(&settings.shortcode)
        .bind(&settings.consumer_key_encrypted)
        .bind(&settings.consumer_secret_encrypted)
        .bind(&settings.validation_url)
        .bind(&settings.confirmation_url)
        .bind(settings.auto_reconcile)
        .fetch_one(&self.pool)
        .await?;

        info!("Saved paybill settings for company {}", settings.company_id);
        paybill_from_row(&row)
    }

    async fn find_unit_by_number(
        &self,
        company_id: Uuid,
        unit_number: &str,
    ) -> DatabaseResult<Option<Unit>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM units WHERE company_id = $1 AND LOWER(unit_number) = LOWER($2) LIMIT 1",
            UNIT_COLUMNS
        ))
        .bind(company_id)
        .bind(unit_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(unit_from_row).transpose()
    }

    async fn find_transaction(&self, id: Uuid) -> DatabaseResult<Option<MpesaTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM mpesa_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn find_transaction_by_trans_id(
        &self,
        trans_id: &str,
    ) -> DatabaseResult<Option<MpesaTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM mpesa_transactions WHERE trans_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(trans_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn insert_transaction(
        &self,
        transaction: NewMpesaTransaction,
    ) -> DatabaseResult<TransactionInsert> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO mpesa_transactions (
                trans_id, transaction_type, trans_time, trans_amount, business_short_code,
                bill_ref_number, msisdn, payer_name, company_id, unit_id, tenant_id,
                property_id, status, raw_payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'confirmed', $13)
            ON CONFLICT (trans_id) DO NOTHING
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(&transaction.trans_id)
        .bind(&transaction.transaction_type)
        .bind(transaction.trans_time)
        .bind(transaction.trans_amount)
        .bind(&transaction.business_short_code)
        .bind(&transaction.bill_ref_number)
        .bind(&transaction.msisdn)
        .bind(&transaction.payer_name)
        .bind(transaction.company_id)
        .bind(transaction.unit_id)
        .bind(transaction.tenant_id)
        .bind(transaction.property_id)
        .bind(&transaction.raw_payload)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(TransactionInsert::Created(transaction_from_row(&row)?));
        }

        debug!("Transaction {} already recorded", transaction.trans_id);
        self.find_transaction_by_trans_id(&transaction.trans_id)
            .await?
            .map(TransactionInsert::Duplicate)
            .ok_or_else(|| {
                DatabaseError::Decode(format!(
                    "transaction {} conflicted but could not be read back",
                    transaction.trans_id
                ))
            })
    }

    async fn record_reconciliation(
        &self,
        transaction_id: Uuid,
        payment: NewPayment,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<(Payment, MpesaTransaction)>> {
        let mut tx = self.pool.begin().await?;

        let payment_row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (
                company_id, tenant_id, unit_id, amount, currency, payment_method, status,
                receipt_number, reference_phone, reference_account, processed_by, created_by,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(payment.company_id)
        .bind(payment.tenant_id)
        .bind(payment.unit_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.payment_method)
        .bind(payment.status.as_str())
        .bind(&payment.receipt_number)
        .bind(&payment.reference_phone)
        .bind(&payment.reference_account)
        .bind(payment.processed_by)
        .bind(payment.created_by)
        .bind(at)
        .fetch_one(&mut *tx)
        .await;

        // A second reconciliation collides on the receipt number
        let payment_row = match payment_row {
            Ok(row) => row,
            Err(e) => {
                let err = DatabaseError::from(e);
                if err.is_unique_violation() {
                    tx.rollback().await?;
                    return Ok(None);
                }
                return Err(err);
            }
        };
        let created = payment_from_row(&payment_row)?;

        let updated = sqlx::query(&format!(
            r#"
            UPDATE mpesa_transactions
            SET payment_id = $2, status = 'reconciled', processed_at = $3
            WHERE id = $1 AND payment_id IS NULL
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .bind(created.id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };
        let transaction = transaction_from_row(&row)?;

        tx.commit().await?;
        Ok(Some((created, transaction)))
    }
}
