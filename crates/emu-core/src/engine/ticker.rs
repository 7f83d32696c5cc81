//! Periodic housekeeping ticker.
//!
//! Grounded in `original_source/app/cmd/goaws.go`'s
//! `go gosqs.PeriodicTasks(1*time.Second, quit)` goroutine: a plain
//! 1-second interval loop, spawned once at startup, that sweeps every
//! queue for visibility-lease expiry and retention drops. Redrive is
//! deliberately NOT performed here — it only happens on the receive path
//! (spec.md §4.4(c)).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::registry::Registry;

/// Spawns the background ticker task. Returns a sender whose drop (or an
/// explicit `send(())`) is not required for shutdown; the task exits when
/// `shutdown` fires.
pub fn spawn_ticker(registry: Arc<Registry>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    registry.tick_all();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("periodic ticker stopped");
    })
}
