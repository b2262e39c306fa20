use super::engine::{ReconciliationEngine, ScanReport};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs one scan and logs its outcome. Errors are logged, never returned:
/// the next tick is the retry.
pub async fn run_once(engine: &ReconciliationEngine) -> Option<ScanReport> {
    match engine.scan().await {
        Ok(report) => {
            info!(
                reconciled = report.reconciled,
                notified = report.notified,
                skipped = report.skipped,
                failed = report.failed,
                "scan finished"
            );
            Some(report)
        }
        Err(e) => {
            error!(error = %e, "scan aborted");
            None
        }
    }
}

/// Scans every `every` until `shutdown` resolves.
///
/// Ticks that fire while a scan is still running are skipped rather than
/// queued, so scans from one trigger never overlap. A scan in progress when
/// shutdown is requested runs to completion.
pub async fn run_periodic<S>(engine: &ReconciliationEngine, every: Duration, shutdown: S)
where
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested, stopping scans");
                break;
            }
            _ = ticker.tick() => {
                run_once(engine).await;
            }
        }
    }
}
