use super::key_lock::KeyLocks;
use crate::domain::contact_log::{ContactKey, ContactLogEntry};
use crate::domain::customer::{Contract, Customer, CustomerId, InstallmentId};
use crate::domain::installment::{Installment, InstallmentRecord};
use crate::domain::ports::{
    ContactLogRepository, ContactLogTransaction, ContactLogTransactionBox, InstallmentRepository,
};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Column Family for installment rows.
pub const CF_INSTALLMENTS: &str = "installments";
/// Column Family for contract reference data.
pub const CF_CONTRACTS: &str = "contracts";
/// Column Family for customer reference data.
pub const CF_CUSTOMERS: &str = "customers";
/// Column Family for the contact log, keyed by `(customer, day)`.
pub const CF_CONTACT_LOG: &str = "contact_log";

/// A persistent store implementation using RocksDB.
///
/// Serves both the installment repository and the contact log, one Column
/// Family per logical table. Values are JSON; ids are stored big-endian so
/// iteration follows id order.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>` and the
/// contact-log key locks).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    locks: KeyLocks,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that every required column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_INSTALLMENTS, CF_CONTRACTS, CF_CUSTOMERS, CF_CONTACT_LOG]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            locks: KeyLocks::new(),
        })
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = cf_handle(&self.db, cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = cf_handle(&self.db, cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn join(&self, installment: Installment) -> Result<Option<InstallmentRecord>> {
        let Some(contract) =
            self.get_json::<Contract>(CF_CONTRACTS, &installment.contract_id.to_be_bytes())?
        else {
            return Ok(None);
        };
        let Some(customer) =
            self.get_json::<Customer>(CF_CUSTOMERS, &contract.customer_id.to_be_bytes())?
        else {
            return Ok(None);
        };
        Ok(Some(InstallmentRecord {
            installment,
            contract,
            customer,
        }))
    }

    /// Full scan of the installments family; there is no secondary index.
    fn select(&self, filter: impl Fn(&Installment) -> bool) -> Result<Vec<InstallmentRecord>> {
        let cf = cf_handle(&self.db, CF_INSTALLMENTS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let installment: Installment = serde_json::from_slice(&value)?;
            if filter(&installment)
                && let Some(record) = self.join(installment)?
            {
                records.push(record);
            }
        }
        records.sort_by_key(|r| (r.installment.due_date, r.installment.id));
        Ok(records)
    }
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name).ok_or_else(|| {
        ReconcileError::InternalError(Box::new(std::io::Error::other(format!(
            "{name} column family not found"
        ))))
    })
}

fn contact_key_bytes(key: &ContactKey) -> Vec<u8> {
    let mut bytes = key.customer_id.to_be_bytes().to_vec();
    bytes.extend_from_slice(key.day.format("%Y-%m-%d").to_string().as_bytes());
    bytes
}

#[async_trait]
impl InstallmentRepository for RocksDBStore {
    async fn pending_with_payment(&self) -> Result<Vec<InstallmentRecord>> {
        self.select(|i| !i.is_paid() && i.payment_id().is_some())
    }

    async fn pending_due_on(&self, day: NaiveDate) -> Result<Vec<InstallmentRecord>> {
        self.select(|i| i.is_due_on(day))
    }

    async fn pending_due_before(&self, day: NaiveDate) -> Result<Vec<InstallmentRecord>> {
        self.select(|i| i.is_overdue_on(day))
    }

    async fn get(&self, id: InstallmentId) -> Result<Option<InstallmentRecord>> {
        match self.get_json::<Installment>(CF_INSTALLMENTS, &id.to_be_bytes())? {
            Some(installment) => self.join(installment),
            None => Ok(None),
        }
    }

    async fn save(&self, installment: &Installment) -> Result<()> {
        let key = installment.id.to_be_bytes();
        let cf = cf_handle(&self.db, CF_INSTALLMENTS)?;
        if self.db.get_pinned_cf(&cf, key)?.is_none() {
            return Err(ReconcileError::InstallmentNotFound(installment.id));
        }
        self.put_json(CF_INSTALLMENTS, &key, installment)
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
        self.put_json(CF_CUSTOMERS, &record.customer.id.to_be_bytes(), &record.customer)?;
        self.put_json(CF_CONTRACTS, &record.contract.id.to_be_bytes(), &record.contract)?;
        self.put_json(
            CF_INSTALLMENTS,
            &record.installment.id.to_be_bytes(),
            &record.installment,
        )
    }
}

#[async_trait]
impl ContactLogRepository for RocksDBStore {
    async fn contacted_on(&self, customer_id: CustomerId, day: NaiveDate) -> Result<bool> {
        let cf = cf_handle(&self.db, CF_CONTACT_LOG)?;
        let key = contact_key_bytes(&ContactKey::new(customer_id, day));
        Ok(self.db.get_pinned_cf(&cf, key)?.is_some())
    }

    async fn begin(&self, key: ContactKey) -> Result<ContactLogTransactionBox> {
        let guard = self.locks.acquire(key).await;
        Ok(Box::new(RocksDBContactLogTransaction {
            key,
            db: Arc::clone(&self.db),
            staged: None,
            _guard: guard,
        }))
    }

    async fn entries_for(&self, customer_id: CustomerId) -> Result<Vec<ContactLogEntry>> {
        let cf = cf_handle(&self.db, CF_CONTACT_LOG)?;
        let prefix = customer_id.to_be_bytes();
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix[..], Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }
}

struct RocksDBContactLogTransaction {
    key: ContactKey,
    db: Arc<DB>,
    staged: Option<ContactLogEntry>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl ContactLogTransaction for RocksDBContactLogTransaction {
    fn key(&self) -> ContactKey {
        self.key
    }

    async fn contacted(&mut self) -> Result<bool> {
        let cf = cf_handle(&self.db, CF_CONTACT_LOG)?;
        Ok(self.db.get_pinned_cf(&cf, contact_key_bytes(&self.key))?.is_some())
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
            db,
            staged,
            _guard,
        } = *self;
        let Some(entry) = staged else {
            return Ok(());
        };
        let cf = cf_handle(&db, CF_CONTACT_LOG)?;
        let bytes = contact_key_bytes(&key);
        if db.get_pinned_cf(&cf, &bytes)?.is_some() {
            return Err(ReconcileError::DuplicateContact {
                customer_id: key.customer_id,
                day: key.day,
            });
        }
        db.put_cf(&cf, bytes, serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
