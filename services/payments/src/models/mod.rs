//! Payment domain models

pub mod event;
pub mod paybill;
pub mod transaction;
pub mod unit;

pub use event::{C2bEvent, WebhookResponse};
pub use paybill::{NewPaybillSettings, PaybillSettings};
pub use transaction::{
    MpesaTransaction, NewMpesaTransaction, NewPayment, Payment, PaymentStatus, TransactionInsert,
    TransactionStatus,
};
pub use unit::Unit;
