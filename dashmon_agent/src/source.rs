//! Host counter sources: mandatory CPU/memory reads plus cumulative I/O totals.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use tracing::debug;

use crate::error::SampleError;

#[derive(Debug, Clone, PartialEq)]
pub struct CpuUsage {
    pub total: f32,
    pub per_core: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
}

impl MemoryUsage {
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        ((self.used as f64 / self.total as f64) * 100.0).clamp(0.0, 100.0) as f32
    }
}

// cumulative since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetTotals {
    pub sent: u64,
    pub received: u64,
}

// cumulative since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskTotals {
    pub read: u64,
    pub written: u64,
}

/// Counters the sampler reads on every tick.
///
/// `cpu` and `memory` are mandatory: an error fails the whole tick. The
/// cumulative totals return `None` when the host can't report them.
pub trait HostSource: Send {
    fn cpu(&mut self) -> Result<CpuUsage, SampleError>;
    fn memory(&mut self) -> Result<MemoryUsage, SampleError>;
    fn network_totals(&mut self) -> Option<NetTotals>;
    fn disk_totals(&mut self) -> Option<DiskTotals>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// sysinfo-backed source. Keeps its handles alive across ticks so CPU usage is
/// computed against the previous refresh.
pub struct SysinfoSource {
    sys: System,
    networks: Networks,
    disks: Disks,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Self {
            sys: System::new_with_specifics(refresh_kind),
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSource for SysinfoSource {
    fn cpu(&mut self) -> Result<CpuUsage, SampleError> {
        let sys = &mut self.sys;
        if let Err(e) = catch_unwind(AssertUnwindSafe(|| sys.refresh_cpu_usage())) {
            return Err(SampleError::unavailable(
                "cpu",
                format!("sysinfo refresh panicked: {e:?}"),
            ));
        }
        let per_core: Vec<f32> = self
            .sys
            .cpus()
            .iter()
            .map(|c| c.cpu_usage().clamp(0.0, 100.0))
            .collect();
        if per_core.is_empty() {
            return Err(SampleError::unavailable("cpu", "no logical cores reported"));
        }
        Ok(CpuUsage {
            total: self.sys.global_cpu_usage().clamp(0.0, 100.0),
            per_core,
        })
    }

    fn memory(&mut self) -> Result<MemoryUsage, SampleError> {
        let sys = &mut self.sys;
        if let Err(e) = catch_unwind(AssertUnwindSafe(|| sys.refresh_memory())) {
            return Err(SampleError::unavailable(
                "memory",
                format!("sysinfo refresh panicked: {e:?}"),
            ));
        }
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(SampleError::unavailable("memory", "total memory reported as 0"));
        }
        Ok(MemoryUsage {
            total,
            used: total.saturating_sub(self.sys.available_memory()),
        })
    }

    fn network_totals(&mut self) -> Option<NetTotals> {
        self.networks.refresh(true);
        if self.networks.list().is_empty() {
            debug!("no network interfaces reported");
            return None;
        }
        Some(
            self.networks
                .list()
                .iter()
                .fold(NetTotals::default(), |acc, (_, data)| NetTotals {
                    sent: acc.sent.saturating_add(data.total_transmitted()),
                    received: acc.received.saturating_add(data.total_received()),
                }),
        )
    }

    fn disk_totals(&mut self) -> Option<DiskTotals> {
        self.disks.refresh(true);
        if self.disks.list().is_empty() {
            debug!("no disks reported");
            return None;
        }
        // A device mounted at several points shows up once per mount.
        let mut seen = HashSet::new();
        let mut totals = DiskTotals::default();
        for d in self.disks.list() {
            if !seen.insert(d.name().to_os_string()) {
                continue;
            }
            let usage = d.usage();
            totals.read = totals.read.saturating_add(usage.total_read_bytes);
            totals.written = totals.written.saturating_add(usage.total_written_bytes);
        }
        Some(totals)
    }
}
