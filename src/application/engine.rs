use super::recheck::RecheckRegistry;
use crate::domain::clock::ClockRef;
use crate::domain::contact_log::{ContactKey, ContactLogEntry};
use crate::domain::customer::InstallmentId;
use crate::domain::installment::InstallmentRecord;
use crate::domain::message::{
    Notice, compose_confirmation, compose_notice, external_reference, payment_description,
};
use crate::domain::ports::{
    ContactLogRepositoryRef, InstallmentRepositoryRef, IssuedPayment, MessengerRef, Payer,
    PaymentGatewayRef, PaymentRequest,
};
use crate::error::{ReconcileError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Timing knobs for the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Pause between the two parts of a reminder so they arrive in order.
    pub dispatch_pause: Duration,
    /// How long after a reminder the payment status is checked again.
    pub recheck_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dispatch_pause: Duration::from_secs(1),
            recheck_delay: Duration::from_secs(30),
        }
    }
}

/// What a single `process` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The gateway already reported the payment as approved.
    Paid,
    /// Both reminder parts were delivered and the contact was recorded.
    Notified,
    /// The customer was already contacted today.
    AlreadyContacted,
    /// The installment was settled after the scan listed it.
    AlreadyPaid,
    /// No redeemable code could be created or fetched.
    NoPaymentData,
    /// A reminder part failed to deliver; nothing was recorded.
    DispatchFailed,
}

/// Counters for one scan, logged by the scheduler after every tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub reconciled: usize,
    pub notified: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: &Result<ProcessOutcome>) {
        match outcome {
            Ok(ProcessOutcome::Paid) => self.reconciled += 1,
            Ok(ProcessOutcome::Notified) => self.notified += 1,
            Ok(ProcessOutcome::AlreadyContacted | ProcessOutcome::AlreadyPaid) => {
                self.skipped += 1
            }
            Ok(ProcessOutcome::NoPaymentData | ProcessOutcome::DispatchFailed) | Err(_) => {
                self.failed += 1
            }
        }
    }
}

/// Reconciles installments against the payment gateway and reminds debtors.
///
/// `ReconciliationEngine` owns every cross-cutting rule of the workflow: a
/// customer is messaged at most once per calendar day, a payment is created at
/// most once per installment, and the "contacted today" record is committed
/// only after the whole reminder was delivered. Cloning is cheap and shares
/// the underlying ports.
#[derive(Clone)]
pub struct ReconciliationEngine {
    installments: InstallmentRepositoryRef,
    contact_log: ContactLogRepositoryRef,
    gateway: PaymentGatewayRef,
    messenger: MessengerRef,
    clock: ClockRef,
    rechecks: RecheckRegistry,
    settings: EngineSettings,
    settling: Arc<Mutex<()>>,
}

impl ReconciliationEngine {
    /// Creates a new `ReconciliationEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `installments` - The store for installments and their customers.
    /// * `contact_log` - The per-customer, per-day deduplication ledger.
    /// * `gateway` - The payment gateway issuing redeemable codes.
    /// * `messenger` - The channel reminders and confirmations go through.
    /// * `clock` - The source of "now" and "today".
    pub fn new(
        installments: InstallmentRepositoryRef,
        contact_log: ContactLogRepositoryRef,
        gateway: PaymentGatewayRef,
        messenger: MessengerRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            installments,
            contact_log,
            gateway,
            messenger,
            clock,
            rechecks: RecheckRegistry::new(),
            settings: EngineSettings::default(),
            settling: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn rechecks(&self) -> &RecheckRegistry {
        &self.rechecks
    }

    /// Runs one full reconciliation pass.
    ///
    /// Settles issued payments first, then reminds installments due today,
    /// then overdue ones. Failures on a single installment are logged and
    /// counted; only failing to load the due-today or overdue lists aborts
    /// the scan.
    pub async fn scan(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        match self.installments.pending_with_payment().await {
            Ok(issued) => {
                for record in issued {
                    self.reconcile_issued(&record, &mut report).await;
                }
            }
            Err(e) => error!(error = %e, "failed to load installments with issued payments"),
        }

        let today = self.clock.today();
        let due_today = self.installments.pending_due_on(today).await?;
        let overdue = self.installments.pending_due_before(today).await?;
        debug!(
            %today,
            due_today = due_today.len(),
            overdue = overdue.len(),
            "classified pending installments"
        );

        for (records, is_overdue) in [(due_today, false), (overdue, true)] {
            for record in records {
                let outcome = self.process(&record, is_overdue).await;
                if let Err(e) = &outcome {
                    error!(
                        installment_id = record.installment.id,
                        customer_id = record.customer.id,
                        overdue = is_overdue,
                        error = %e,
                        "failed to process installment"
                    );
                }
                report.record(&outcome);
            }
        }

        Ok(report)
    }

    async fn reconcile_issued(&self, record: &InstallmentRecord, report: &mut ScanReport) {
        let Some(payment_id) = record.installment.payment_id() else {
            return;
        };
        if !self.gateway.check_status(payment_id).await {
            return;
        }
        match self.mark_paid(record.installment.id).await {
            Ok(true) => report.reconciled += 1,
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                error!(
                    installment_id = record.installment.id,
                    payment_id,
                    error = %e,
                    "failed to settle paid installment"
                );
            }
        }
    }

    /// Drives one installment through the reminder workflow.
    ///
    /// The contact-log transaction opened here is the single durable decision
    /// point: it is committed only after the redeemable code was obtained and
    /// both reminder parts were delivered, and rolled back on every other path.
    pub async fn process(&self, record: &InstallmentRecord, overdue: bool) -> Result<ProcessOutcome> {
        let installment = &record.installment;

        if let Some(payment_id) = installment.payment_id()
            && self.gateway.check_status(payment_id).await
        {
            self.mark_paid(installment.id).await?;
            return Ok(ProcessOutcome::Paid);
        }

        let today = self.clock.today();
        let customer_id = record.customer.id;
        if self.contact_log.contacted_on(customer_id, today).await? {
            debug!(installment_id = installment.id, customer_id, "customer already contacted today");
            return Ok(ProcessOutcome::AlreadyContacted);
        }

        let mut tx = self
            .contact_log
            .begin(ContactKey::new(customer_id, today))
            .await?;
        if tx.contacted().await? {
            debug!(
                installment_id = installment.id,
                customer_id, "customer contacted by a concurrent scan"
            );
            tx.rollback().await?;
            return Ok(ProcessOutcome::AlreadyContacted);
        }

        // The caller's snapshot predates the lock.
        let current = match self.installments.get(installment.id).await {
            Ok(Some(current)) if !current.installment.is_paid() => current,
            Ok(current) => {
                tx.rollback().await?;
                return match current {
                    Some(_) => Ok(ProcessOutcome::AlreadyPaid),
                    None => Err(ReconcileError::InstallmentNotFound(installment.id)),
                };
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };
        let record = &current;
        let installment = &record.installment;

        let Some(issued) = self.acquire_payment(record, overdue).await? else {
            tx.rollback().await?;
            return Ok(ProcessOutcome::NoPaymentData);
        };

        let notice = compose_notice(record, &issued.pix_code);
        if !self.dispatch(&record.customer.phone, &notice).await {
            warn!(
                installment_id = installment.id,
                customer_id, "reminder not fully delivered, will retry next scan"
            );
            tx.rollback().await?;
            return Ok(ProcessOutcome::DispatchFailed);
        }

        tx.insert(ContactLogEntry::new(customer_id, today, self.clock.now()))
            .await?;
        tx.commit().await?;
        info!(
            installment_id = installment.id,
            customer_id,
            payment_id = %issued.payment_id,
            overdue,
            "reminder sent"
        );

        self.schedule_recheck(installment.id, issued.payment_id);
        Ok(ProcessOutcome::Notified)
    }

    /// Reuses the stored payment when there is one, otherwise creates it and
    /// persists the new reference before anything is sent.
    async fn acquire_payment(
        &self,
        record: &InstallmentRecord,
        overdue: bool,
    ) -> Result<Option<IssuedPayment>> {
        let installment = &record.installment;

        if let Some(payment_id) = installment.payment_id() {
            return match self.gateway.fetch_payment(payment_id).await {
                Ok(issued) => Ok(Some(issued)),
                Err(e) => {
                    error!(
                        installment_id = installment.id,
                        payment_id,
                        error = %e,
                        "could not fetch existing payment"
                    );
                    Ok(None)
                }
            };
        }

        let customer = &record.customer;
        let request = PaymentRequest {
            amount: installment.amount,
            description: payment_description(record, overdue),
            external_reference: external_reference(record, overdue),
            payer: Payer {
                name: customer.name.clone(),
                email: customer.email.clone(),
                tax_id: Some(customer.tax_id.clone()).filter(|id| !id.is_empty()),
                phone: Some(customer.phone.clone()).filter(|p| !p.is_empty()),
            },
        };

        let issued = match self.gateway.create_payment(request).await {
            Ok(issued) => issued,
            Err(e) => {
                error!(installment_id = installment.id, error = %e, "could not create payment");
                return Ok(None);
            }
        };

        let mut updated = installment.clone();
        updated.attach_payment(issued.payment_id.clone(), self.clock.now());
        self.installments.save(&updated).await?;
        debug!(
            installment_id = installment.id,
            payment_id = %issued.payment_id,
            "payment reference stored"
        );
        Ok(Some(issued))
    }

    /// Sends the details, then the code. The code is only sent once the
    /// details went through.
    async fn dispatch(&self, address: &str, notice: &Notice) -> bool {
        if !self.messenger.send(address, &notice.details).await {
            return false;
        }
        if !self.settings.dispatch_pause.is_zero() {
            tokio::time::sleep(self.settings.dispatch_pause).await;
        }
        self.messenger.send(address, &notice.code).await
    }

    fn schedule_recheck(&self, installment_id: InstallmentId, payment_id: String) {
        let engine = self.clone();
        let key = payment_id.clone();
        self.rechecks
            .schedule(key, self.settings.recheck_delay, async move {
                engine.recheck(installment_id, &payment_id).await;
            });
    }

    async fn recheck(&self, installment_id: InstallmentId, payment_id: &str) {
        if !self.gateway.check_status(payment_id).await {
            debug!(installment_id, payment_id, "payment still open after re-check");
            return;
        }
        match self.mark_paid(installment_id).await {
            Ok(true) => info!(installment_id, payment_id, "payment settled on re-check"),
            Ok(false) => {}
            Err(e) => warn!(installment_id, payment_id, error = %e, "re-check could not settle payment"),
        }
    }

    /// Transitions an installment to paid and confirms it to the customer.
    ///
    /// Reads the current state from the store first, so a second call (from a
    /// later scan or a re-check) finds it paid, changes nothing and sends no
    /// confirmation. Returns whether this call performed the transition. A
    /// failed confirmation is logged and does not undo the transition.
    pub async fn mark_paid(&self, installment_id: InstallmentId) -> Result<bool> {
        let settling = self.settling.lock().await;

        let mut record = self
            .installments
            .get(installment_id)
            .await?
            .ok_or(ReconcileError::InstallmentNotFound(installment_id))?;

        let now = self.clock.now();
        if !record.installment.mark_paid(now) {
            debug!(installment_id, "installment already paid");
            return Ok(false);
        }
        self.installments.save(&record.installment).await?;
        drop(settling);
        info!(
            installment_id,
            customer_id = record.customer.id,
            amount = %record.installment.amount,
            "installment marked paid"
        );

        let confirmation = compose_confirmation(&record, now);
        if !self.messenger.send(&record.customer.phone, &confirmation).await {
            warn!(
                installment_id,
                customer_id = record.customer.id,
                "payment confirmation not delivered"
            );
        }
        Ok(true)
    }
}
