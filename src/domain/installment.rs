use super::customer::{Contract, ContractId, Customer, InstallmentId};
use super::money::Amount;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum PaymentMethod {
    /// Settled by redeeming a gateway-issued code.
    #[serde(rename = "gateway-code")]
    GatewayCode,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GatewayCode => f.write_str("gateway-code"),
        }
    }
}

/// One scheduled debt payment within a contract.
///
/// Only two mutations are allowed once an installment exists: attaching the
/// gateway's payment reference and the one-way transition to `Paid`. Keeping
/// both behind methods is what holds `status == Paid` iff `payment_date` and
/// `paid_amount` are set.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Installment {
    pub id: InstallmentId,
    pub contract_id: ContractId,
    /// Position of this installment within its contract, starting at 1.
    pub sequence: u32,
    pub amount: Amount,
    pub due_date: NaiveDate,
    payment_date: Option<DateTime<Utc>>,
    status: InstallmentStatus,
    paid_amount: Option<Amount>,
    payment_method: Option<PaymentMethod>,
    payment_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Installment {
    pub fn new(
        id: InstallmentId,
        contract_id: ContractId,
        sequence: u32,
        amount: Amount,
        due_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            contract_id,
            sequence,
            amount,
            due_date,
            payment_date: None,
            status: InstallmentStatus::Pending,
            paid_amount: None,
            payment_method: None,
            payment_id: None,
            note: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn status(&self) -> InstallmentStatus {
        self.status
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    pub fn payment_date(&self) -> Option<DateTime<Utc>> {
        self.payment_date
    }

    pub fn paid_amount(&self) -> Option<Amount> {
        self.paid_amount
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        !self.is_paid() && self.due_date == day
    }

    pub fn is_overdue_on(&self, day: NaiveDate) -> bool {
        !self.is_paid() && self.due_date < day
    }

    /// Records the gateway's payment reference for this installment.
    pub fn attach_payment(&mut self, payment_id: impl Into<String>, now: DateTime<Utc>) {
        self.payment_id = Some(payment_id.into());
        self.updated_at = now;
    }

    /// Transitions to `Paid`. Returns `false`, leaving every field untouched,
    /// when the installment was already paid.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_paid() {
            return false;
        }
        self.status = InstallmentStatus::Paid;
        self.payment_date = Some(now);
        self.paid_amount = Some(self.amount);
        self.payment_method = Some(PaymentMethod::GatewayCode);
        self.updated_at = now;
        true
    }
}

/// An installment joined with its owning contract and customer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InstallmentRecord {
    pub installment: Installment,
    pub contract: Contract,
    pub customer: Customer,
}
