//! Background maintenance
//!
//! A single ticker-driven task performs garbage collection and snapshot
//! rotation. Failures are logged and retried on the next tick; only the
//! shutdown signal stops the loop. On shutdown a final GC and snapshot run
//! before the completion signal fires.

use crate::log::NotificationLog;
use crate::snapshot;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn the maintenance task for `log`.
///
/// Ticks at `interval`; terminates on a message (or closure) of `shutdown`
/// and signals `done` once the final snapshot has completed.
pub fn spawn(
    log: Arc<NotificationLog>,
    interval: Duration,
    snapshot_path: Option<PathBuf>,
    mut shutdown: broadcast::Receiver<()>,
    done: Option<oneshot::Sender<()>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; maintenance starts one
        // interval from now.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_cycle(&log, snapshot_path.as_deref());
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        // Final maintenance pass, skipped when nothing is persisted anyway.
        if snapshot_path.is_some() {
            run_cycle(&log, snapshot_path.as_deref());
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
    })
}

/// One maintenance cycle: GC, then snapshot rotation when configured.
fn run_cycle(log: &NotificationLog, snapshot_path: Option<&Path>) {
    match log.gc() {
        Ok(removed) if removed > 0 => debug!(removed, "garbage collected expired entries"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "notification log GC failed"),
    }

    let Some(path) = snapshot_path else {
        return;
    };
    match write_snapshot(log, path) {
        Ok(bytes) => debug!(bytes, path = %path.display(), "rotated snapshot"),
        Err(e) => warn!(error = %e, path = %path.display(), "snapshot rotation failed"),
    }
}

fn write_snapshot(log: &NotificationLog, path: &Path) -> Result<usize, crate::log::LogError> {
    let mut file = snapshot::open_replace(path)?;
    let (n, result) = log.snapshot(&mut file);
    result?;
    file.close()?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{Clock, LogOptions, NotificationLog};
    use meshlog_core::Receiver;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::UNIX_EPOCH;
    use tempfile::tempdir;

    fn test_clock(secs: Arc<AtomicI64>) -> Clock {
        Arc::new(move || UNIX_EPOCH + Duration::from_secs(secs.load(Ordering::SeqCst) as u64))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_maintenance_rotates_snapshot_and_collects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot");
        let t = Arc::new(AtomicI64::new(1000));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        let log = NotificationLog::open(
            LogOptions::new()
                .with_retention(Duration::from_secs(30))
                .with_clock(test_clock(Arc::clone(&t)))
                .with_snapshot(&path)
                .with_maintenance(Duration::from_millis(20), shutdown_rx, done_tx),
        )
        .unwrap();

        let r = Receiver::new("team", "email", "A");
        log.log_active(&r, b"k", b"h").unwrap();

        // Let at least one tick pass; the snapshot file appears.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(path.exists());

        // Entry expires; a later cycle reaps it.
        t.store(1031, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(log.is_empty());

        shutdown_tx.send(()).unwrap();
        done_rx.await.unwrap();

        // The shutdown snapshot reflects the post-GC state.
        let st = snapshot::load_snapshot(std::fs::File::open(&path).unwrap()).unwrap();
        assert!(st.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_writes_final_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot");
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        let log = NotificationLog::open(
            LogOptions::new()
                .with_retention(Duration::from_secs(3600))
                .with_snapshot(&path)
                // Long interval: no tick fires before shutdown.
                .with_maintenance(Duration::from_secs(3600), shutdown_rx, done_tx),
        )
        .unwrap();

        let r = Receiver::new("team", "email", "A");
        log.log_active(&r, b"k", b"h").unwrap();

        shutdown_tx.send(()).unwrap();
        done_rx.await.unwrap();

        let st = snapshot::load_snapshot(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(st.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_maintenance_without_snapshot_path_still_collects() {
        let t = Arc::new(AtomicI64::new(1000));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        let log = NotificationLog::open(
            LogOptions::new()
                .with_clock(test_clock(Arc::clone(&t)))
                .with_maintenance(Duration::from_millis(20), shutdown_rx, done_tx),
        )
        .unwrap();

        let r = Receiver::new("team", "email", "A");
        log.log_active(&r, b"k", b"h").unwrap();

        // Zero retention: the first cycle reaps the entry.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(log.is_empty());

        shutdown_tx.send(()).unwrap();
        done_rx.await.unwrap();
    }
}
