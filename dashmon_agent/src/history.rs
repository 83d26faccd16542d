//! Bounded history buffers for charts and export.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

pub const DEFAULT_HISTORY_LEN: usize = 600; // 10 minutes at 1 Hz

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if dq.len() == cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Fixed-capacity FIFO: once full, each push evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    buf: VecDeque<T>,
    cap: usize,
}

impl<T: Clone> HistoryBuffer<T> {
    /// A capacity of 0 is raised to 1.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, v: T) {
        push_capped(&mut self.buf, v, self.cap);
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<T> {
        self.buf.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }
}

/// Series tracked by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    NetUp,
    NetDown,
    DiskRead,
    DiskWrite,
    CpuTotal,
    RamUsed,
    GpuLoad,
    GpuTemp,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::NetUp,
        Metric::NetDown,
        Metric::DiskRead,
        Metric::DiskWrite,
        Metric::CpuTotal,
        Metric::RamUsed,
        Metric::GpuLoad,
        Metric::GpuTemp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::NetUp => "net_up",
            Metric::NetDown => "net_down",
            Metric::DiskRead => "disk_read",
            Metric::DiskWrite => "disk_write",
            Metric::CpuTotal => "cpu_total",
            Metric::RamUsed => "ram_used",
            Metric::GpuLoad => "gpu_load",
            Metric::GpuTemp => "gpu_temp",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Shared, read-mostly view of every metric's history.
///
/// Cloning is cheap and every clone observes the same buffers. The sampler
/// appends a whole tick under one write lock, so readers see either the tick
/// before or the tick after, never a half-applied one.
#[derive(Debug, Clone)]
pub struct History {
    inner: Arc<RwLock<[HistoryBuffer<f64>; 8]>>,
    cap: usize,
}

impl History {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Arc::new(RwLock::new(std::array::from_fn(|_| {
                HistoryBuffer::new(cap)
            }))),
            cap,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Copy of one series, oldest first.
    pub fn snapshot(&self, metric: Metric) -> Vec<f64> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard[metric.slot()].to_vec()
    }

    /// Copy of every series taken under a single read lock.
    pub fn snapshot_all(&self) -> Vec<(Metric, Vec<f64>)> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Metric::ALL
            .iter()
            .map(|m| (*m, guard[m.slot()].to_vec()))
            .collect()
    }

    pub fn len(&self, metric: Metric) -> usize {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard[metric.slot()].len()
    }

    pub fn latest(&self, metric: Metric) -> Option<f64> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard[metric.slot()].latest()
    }

    /// Applies every value of one tick atomically with respect to readers.
    pub(crate) fn append_tick(&self, values: &[(Metric, f64)]) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for (metric, v) in values {
            guard[metric.slot()].push(*v);
        }
    }
}
