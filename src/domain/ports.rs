use super::contact_log::{ContactKey, ContactLogEntry};
use super::customer::{CustomerId, InstallmentId};
use super::installment::{Installment, InstallmentRecord};
use super::money::Amount;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Read/write access to installments and their contract/customer aggregate.
#[async_trait]
pub trait InstallmentRepository: Send + Sync {
    /// Pending installments that already carry a gateway payment reference.
    async fn pending_with_payment(&self) -> Result<Vec<InstallmentRecord>>;
    /// Pending installments whose due date is exactly `day`.
    async fn pending_due_on(&self, day: NaiveDate) -> Result<Vec<InstallmentRecord>>;
    /// Pending installments whose due date is strictly before `day`.
    async fn pending_due_before(&self, day: NaiveDate) -> Result<Vec<InstallmentRecord>>;
    async fn get(&self, id: InstallmentId) -> Result<Option<InstallmentRecord>>;
    /// Writes back the installment's mutable fields.
    async fn save(&self, installment: &Installment) -> Result<()>;
    /// Loads a record (customer, contract and installment) from provisioning.
    async fn provision(&self, record: InstallmentRecord) -> Result<()>;
}

/// The per-customer, per-day deduplication ledger.
#[async_trait]
pub trait ContactLogRepository: Send + Sync {
    /// Non-transactional lookup used as a fast path only.
    async fn contacted_on(&self, customer_id: CustomerId, day: NaiveDate) -> Result<bool>;
    /// Opens a transaction holding the write lock on `key` until it is
    /// committed, rolled back or dropped.
    async fn begin(&self, key: ContactKey) -> Result<ContactLogTransactionBox>;
    async fn entries_for(&self, customer_id: CustomerId) -> Result<Vec<ContactLogEntry>>;
}

/// A check-then-insert unit over one `(customer, day)` key.
///
/// Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait ContactLogTransaction: Send {
    fn key(&self) -> ContactKey;
    /// Re-validates the dedup condition under the lock.
    async fn contacted(&mut self) -> Result<bool>;
    /// Stages the entry; it becomes visible only on commit.
    async fn insert(&mut self, entry: ContactLogEntry) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Identity of the payer attached to a payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payer {
    pub name: String,
    pub email: String,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub description: String,
    pub external_reference: String,
    pub payer: Payer,
}

/// A gateway payment and the code the debtor redeems to settle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedPayment {
    pub payment_id: String,
    pub pix_code: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<IssuedPayment, GatewayError>;
    /// `true` only when the gateway reports the payment as approved. Errors read as `false`.
    async fn check_status(&self, payment_id: &str) -> bool;
    /// Re-reads an existing payment's redeemable code without creating a new charge.
    async fn fetch_payment(
        &self,
        payment_id: &str,
    ) -> std::result::Result<IssuedPayment, GatewayError>;
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Delivers one text message. Never fails loudly; `false` means not delivered.
    async fn send(&self, address: &str, text: &str) -> bool;
}

pub type InstallmentRepositoryRef = Arc<dyn InstallmentRepository>;
pub type ContactLogRepositoryRef = Arc<dyn ContactLogRepository>;
pub type ContactLogTransactionBox = Box<dyn ContactLogTransaction>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type MessengerRef = Arc<dyn Messenger>;
