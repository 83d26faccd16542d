//! Best-effort sensor probes (battery, temperatures, GPU).
//!
//! Each probe runs on the blocking pool under its own time budget. Errors,
//! panics and timeouts all collapse to `None` for that one field; nothing here
//! can fail a tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

pub trait Probe: Send + Sync + 'static {
    type Output: Send + 'static;

    fn name(&self) -> &'static str;

    /// `Ok(None)` means the hardware or driver is simply not there.
    fn read(&self) -> anyhow::Result<Option<Self::Output>>;
}

pub type SharedProbe<T> = Arc<dyn Probe<Output = T>>;

/// Owns one probe and its failure/in-flight bookkeeping.
pub(crate) struct ProbeSlot<T> {
    probe: Option<SharedProbe<T>>,
    // set while a read is still running on the blocking pool
    in_flight: Arc<AtomicBool>,
    failing: bool,
}

impl<T: Send + 'static> ProbeSlot<T> {
    pub(crate) fn new(probe: Option<SharedProbe<T>>) -> Self {
        Self {
            probe,
            in_flight: Arc::new(AtomicBool::new(false)),
            failing: false,
        }
    }

    pub(crate) async fn read(&mut self, budget: Duration) -> Option<T> {
        let probe = self.probe.as_ref()?.clone();
        let name = probe.name();

        // A read that overran its budget is still parked on the blocking pool;
        // don't stack another one behind it.
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!(probe = name, "previous read still running; skipping");
            return None;
        }
        let in_flight = self.in_flight.clone();
        let task = tokio::task::spawn_blocking(move || {
            struct Done(Arc<AtomicBool>);
            impl Drop for Done {
                fn drop(&mut self) {
                    self.0.store(false, Ordering::Release);
                }
            }
            let _done = Done(in_flight);
            probe.read()
        });

        let outcome = match timeout(budget, task).await {
            Ok(Ok(Ok(v))) => Ok(v),
            Ok(Ok(Err(e))) => Err(format!("{e:#}")),
            Ok(Err(join)) => Err(format!("probe task aborted: {join}")),
            Err(_) => Err(format!("timed out after {budget:?}")),
        };

        match outcome {
            Ok(v) => {
                if self.failing {
                    info!(probe = name, "probe recovered");
                    self.failing = false;
                }
                v
            }
            Err(reason) => {
                if self.failing {
                    debug!(probe = name, "probe still failing: {reason}");
                } else {
                    warn!(probe = name, "probe failed: {reason}");
                    self.failing = true;
                }
                None
            }
        }
    }
}
