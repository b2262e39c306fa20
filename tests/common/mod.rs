#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use pix_reconciler::application::engine::{EngineSettings, ReconciliationEngine};
use pix_reconciler::domain::clock::{Clock, FixedClock};
use pix_reconciler::domain::customer::{Contract, Customer, InstallmentId};
use pix_reconciler::domain::installment::{Installment, InstallmentRecord};
use pix_reconciler::domain::money::Amount;
use pix_reconciler::domain::ports::{
    InstallmentRepository, IssuedPayment, Messenger, PaymentGateway, PaymentRequest,
};
use pix_reconciler::error::{GatewayError, ReconcileError, Result};
use pix_reconciler::infrastructure::in_memory::{InMemoryContactLog, InMemoryInstallmentStore};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PIX_CODE: &str = "00020126580014br.gov.bcb.pix0136";

/// Gateway double whose answers are set per test and whose calls are counted.
#[derive(Default)]
pub struct ScriptedGateway {
    next_payment: Mutex<Option<IssuedPayment>>,
    approved: Mutex<HashSet<String>>,
    codes: Mutex<HashMap<String, String>>,
    pub create_requests: Mutex<Vec<PaymentRequest>>,
    pub create_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedGateway {
    /// The next `create_payment` succeeds with this payment.
    pub fn will_create(&self, payment_id: &str, pix_code: &str) {
        *self.next_payment.lock().unwrap() = Some(IssuedPayment {
            payment_id: payment_id.to_string(),
            pix_code: pix_code.to_string(),
        });
        self.codes
            .lock()
            .unwrap()
            .insert(payment_id.to_string(), pix_code.to_string());
    }

    /// An already issued payment that `fetch_payment` can return.
    pub fn knows(&self, payment_id: &str, pix_code: &str) {
        self.codes
            .lock()
            .unwrap()
            .insert(payment_id.to_string(), pix_code.to_string());
    }

    pub fn approve(&self, payment_id: &str) {
        self.approved.lock().unwrap().insert(payment_id.to_string());
    }

    pub fn total_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.check_calls.load(Ordering::SeqCst)
            + self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<IssuedPayment, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create_requests.lock().unwrap().push(request);
        self.next_payment.lock().unwrap().take().ok_or(GatewayError::Rejected {
            status: 400,
            body: "{\"error\":\"bad_request\"}".to_string(),
        })
    }

    async fn check_status(&self, payment_id: &str) -> bool {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.approved.lock().unwrap().contains(payment_id)
    }

    async fn fetch_payment(
        &self,
        payment_id: &str,
    ) -> std::result::Result<IssuedPayment, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let code = self.codes.lock().unwrap().get(payment_id).cloned();
        code.map(|pix_code| IssuedPayment {
            payment_id: payment_id.to_string(),
            pix_code,
        })
        .ok_or(GatewayError::MissingCode)
    }
}

/// Messenger double that records every attempt and fails chosen calls.
#[derive(Default)]
pub struct RecordingMessenger {
    attempts: AtomicUsize,
    failing: Mutex<HashSet<usize>>,
    pub delivered: Mutex<Vec<(String, String)>>,
    pub latency: Mutex<Option<Duration>>,
}

impl RecordingMessenger {
    /// Makes the `n`-th send attempt (1-based, counted across the test) fail.
    pub fn fail_attempt(&self, n: usize) {
        self.failing.lock().unwrap().insert(n);
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, address: &str, text: &str) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.lock().unwrap().contains(&attempt) {
            return false;
        }
        self.delivered
            .lock()
            .unwrap()
            .push((address.to_string(), text.to_string()));
        true
    }
}

/// Installment store that cannot be reached.
pub struct UnreachableStore;

#[async_trait]
impl InstallmentRepository for UnreachableStore {
    async fn pending_with_payment(&self) -> Result<Vec<InstallmentRecord>> {
        Err(unreachable_error())
    }
    async fn pending_due_on(&self, _day: NaiveDate) -> Result<Vec<InstallmentRecord>> {
        Err(unreachable_error())
    }
    async fn pending_due_before(&self, _day: NaiveDate) -> Result<Vec<InstallmentRecord>> {
        Err(unreachable_error())
    }
    async fn get(&self, _id: InstallmentId) -> Result<Option<InstallmentRecord>> {
        Err(unreachable_error())
    }
    async fn save(&self, _installment: &Installment) -> Result<()> {
        Err(unreachable_error())
    }
    async fn provision(&self, _record: InstallmentRecord) -> Result<()> {
        Err(unreachable_error())
    }
}

fn unreachable_error() -> ReconcileError {
    ReconcileError::IoError(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "store unreachable",
    ))
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

pub fn record(
    id: InstallmentId,
    customer_id: u64,
    due_date: NaiveDate,
    amount: Decimal,
) -> InstallmentRecord {
    let contract_id = customer_id * 100;
    InstallmentRecord {
        installment: Installment::new(
            id,
            contract_id,
            id as u32,
            Amount::new(amount).unwrap(),
            due_date,
            fixed_now() - ChronoDuration::days(90),
        ),
        contract: Contract {
            id: contract_id,
            customer_id,
        },
        customer: Customer {
            id: customer_id,
            name: format!("Customer {customer_id}"),
            phone: format!("(11) 9{customer_id:04}-0000"),
            tax_id: "52998224725".to_string(),
            email: format!("customer{customer_id}@example.com"),
        },
    }
}

pub struct Harness {
    pub engine: ReconciliationEngine,
    pub store: InMemoryInstallmentStore,
    pub contact_log: InMemoryContactLog,
    pub gateway: Arc<ScriptedGateway>,
    pub messenger: Arc<RecordingMessenger>,
    pub clock: FixedClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings {
            dispatch_pause: Duration::ZERO,
            recheck_delay: Duration::from_millis(10),
        })
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let store = InMemoryInstallmentStore::new();
        let contact_log = InMemoryContactLog::new();
        let gateway = Arc::new(ScriptedGateway::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let clock = FixedClock::new(fixed_now());
        let engine = ReconciliationEngine::new(
            Arc::new(store.clone()),
            Arc::new(contact_log.clone()),
            gateway.clone(),
            messenger.clone(),
            Arc::new(clock.clone()),
        )
        .with_settings(settings);
        Self {
            engine,
            store,
            contact_log,
            gateway,
            messenger,
            clock,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn installment(&self, id: InstallmentId) -> Installment {
        self.store.get(id).await.unwrap().unwrap().installment
    }
}

pub const SEED_HEADER: &str = "installment_id,contract_id,customer_id,sequence,amount,due_date,payment_id,note,customer_name,phone,tax_id,email";

/// Writes a seed CSV with one installment of customer 1 due on `due_date`.
pub fn seed_csv(due_date: NaiveDate, amount: &str) -> tempfile::NamedTempFile {
    use std::io::Write;

    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "{SEED_HEADER}").unwrap();
    writeln!(
        csv,
        "1,10,1,1,{amount},{},,,Maria Souza,(11) 98765-4321,529.982.247-25,maria@example.com",
        due_date.format("%Y-%m-%d")
    )
    .unwrap();
    csv
}

/// The binary with every required setting pointed at unreachable endpoints.
pub fn offline_command() -> std::process::Command {
    let mut cmd = std::process::Command::new(assert_cmd::cargo_bin!("pix-reconciler"));
    for var in [
        "MP_API_URL",
        "MP_ACCESS_TOKEN",
        "EVOLUTION_API_URL",
        "EVOLUTION_API_KEY",
        "INSTANCE_ID",
        "DB_PATH",
        "SEED_CSV",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.arg("--once")
        .args(["--gateway-url", "http://127.0.0.1:9"])
        .args(["--gateway-token", "test-token"])
        .args(["--messaging-url", "http://127.0.0.1:9"])
        .args(["--messaging-api-key", "test-key"])
        .args(["--instance-id", "test-instance"])
        .args(["--gateway-timeout-secs", "2"])
        .args(["--messaging-timeout-secs", "2"]);
    cmd
}
