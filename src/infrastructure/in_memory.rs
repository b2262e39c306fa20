use super::key_lock::KeyLocks;
use crate::domain::contact_log::{ContactKey, ContactLogEntry};
use crate::domain::customer::{Contract, ContractId, Customer, CustomerId, InstallmentId};
use crate::domain::installment::{Installment, InstallmentRecord};
use crate::domain::ports::{
    ContactLogRepository, ContactLogTransaction, ContactLogTransactionBox, InstallmentRepository,
};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedMutexGuard, RwLock};

#[derive(Default)]
struct Tables {
    installments: HashMap<InstallmentId, Installment>,
    contracts: HashMap<ContractId, Contract>,
    customers: HashMap<CustomerId, Customer>,
}

impl Tables {
    fn join(&self, installment: &Installment) -> Option<InstallmentRecord> {
        let contract = self.contracts.get(&installment.contract_id)?;
        let customer = self.customers.get(&contract.customer_id)?;
        Some(InstallmentRecord {
            installment: installment.clone(),
            contract: *contract,
            customer: customer.clone(),
        })
    }

    /// Joined records matching `filter`, ordered by due date then id.
    fn select(&self, filter: impl Fn(&Installment) -> bool) -> Vec<InstallmentRecord> {
        let mut records: Vec<InstallmentRecord> = self
            .installments
            .values()
            .filter(|i| filter(i))
            .filter_map(|i| self.join(i))
            .collect();
        records.sort_by_key(|r| (r.installment.due_date, r.installment.id));
        records
    }
}

/// A thread-safe in-memory installment store.
///
/// Keeps installments, contracts and customers in separate maps behind one
/// `tokio::sync::RwLock`, joining them on read the way a relational store would.
#[derive(Default, Clone)]
pub struct InMemoryInstallmentStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryInstallmentStore {
    /// Creates a new, empty in-memory installment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstallmentRepository for InMemoryInstallmentStore {
    async fn pending_with_payment(&self) -> Result<Vec<InstallmentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.select(|i| !i.is_paid() && i.payment_id().is_some()))
    }

    async fn pending_due_on(&self, day: NaiveDate) -> Result<Vec<InstallmentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.select(|i| i.is_due_on(day)))
    }

    async fn pending_due_before(&self, day: NaiveDate) -> Result<Vec<InstallmentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.select(|i| i.is_overdue_on(day)))
    }

    async fn get(&self, id: InstallmentId) -> Result<Option<InstallmentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.installments.get(&id).and_then(|i| tables.join(i)))
    }

    async fn save(&self, installment: &Installment) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.installments.get_mut(&installment.id) {
            Some(stored) => {
                *stored = installment.clone();
                Ok(())
            }
            None => Err(ReconcileError::InstallmentNotFound(installment.id)),
        }
    }

    async fn provision(&self, record: InstallmentRecord) -> Result<()> {
        if record.contract.customer_id != record.customer.id
            || record.installment.contract_id != record.contract.id
        {
            return Err(ReconcileError::ValidationError(format!(
                "installment {} does not belong to contract {} of customer {}",
                record.installment.id, record.contract.id, record.customer.id
            )));
        }
        let mut tables = self.tables.write().await;
        tables.customers.insert(record.customer.id, record.customer);
        tables.contracts.insert(record.contract.id, record.contract);
        tables
            .installments
            .insert(record.installment.id, record.installment);
        Ok(())
    }
}

/// A thread-safe in-memory contact log.
///
/// Entries are keyed by `(customer, day)`, which doubles as the unique
/// constraint; transactions serialize per key through [`KeyLocks`].
#[derive(Default, Clone)]
pub struct InMemoryContactLog {
    entries: Arc<RwLock<HashMap<ContactKey, ContactLogEntry>>>,
    locks: KeyLocks,
}

impl InMemoryContactLog {
    /// Creates a new, empty in-memory contact log.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactLogRepository for InMemoryContactLog {
    async fn contacted_on(&self, customer_id: CustomerId, day: NaiveDate) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(&ContactKey::new(customer_id, day)))
    }

    async fn begin(&self, key: ContactKey) -> Result<ContactLogTransactionBox> {
        let guard = self.locks.acquire(key).await;
        Ok(Box::new(InMemoryContactLogTransaction {
            key,
            entries: Arc::clone(&self.entries),
            staged: None,
            _guard: guard,
        }))
    }

    async fn entries_for(&self, customer_id: CustomerId) -> Result<Vec<ContactLogEntry>> {
        let entries = self.entries.read().await;
        let mut found: Vec<ContactLogEntry> = entries
            .values()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.contact_date);
        Ok(found)
    }
}

struct InMemoryContactLogTransaction {
    key: ContactKey,
    entries: Arc<RwLock<HashMap<ContactKey, ContactLogEntry>>>,
    staged: Option<ContactLogEntry>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl ContactLogTransaction for InMemoryContactLogTransaction {
    fn key(&self) -> ContactKey {
        self.key
    }

    async fn contacted(&mut self) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(&self.key))
    }

    async fn insert(&mut self, entry: ContactLogEntry) -> Result<()> {
        if entry.key() != self.key {
            return Err(ReconcileError::ValidationError(format!(
                "entry for customer {} on {} staged in transaction for customer {} on {}",
                entry.customer_id, entry.contact_date, self.key.customer_id, self.key.day
            )));
        }
        self.staged = Some(entry);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            key,
            entries,
            staged,
            _guard,
        } = *self;
        let Some(entry) = staged else {
            return Ok(());
        };
        let mut entries = entries.write().await;
        if entries.contains_key(&key) {
            return Err(ReconcileError::DuplicateContact {
                customer_id: key.customer_id,
                day: key.day,
            });
        }
        entries.insert(key, entry);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
