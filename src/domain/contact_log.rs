use super::customer::CustomerId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proof that a customer was messaged on a given calendar day.
///
/// This is a deduplication token, not an audit trail: it carries no message
/// content. At most one entry exists per `(customer_id, contact_date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLogEntry {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub contact_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl ContactLogEntry {
    pub fn new(customer_id: CustomerId, contact_date: NaiveDate, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            contact_date,
            created_at,
        }
    }

    pub fn key(&self) -> ContactKey {
        ContactKey::new(self.customer_id, self.contact_date)
    }
}

/// The `(customer, day)` pair the ledger is unique on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactKey {
    pub customer_id: CustomerId,
    pub day: NaiveDate,
}

impl ContactKey {
    pub fn new(customer_id: CustomerId, day: NaiveDate) -> Self {
        Self { customer_id, day }
    }
}
