//! Tick-driven sampler: reads host counters, derives per-second rates, and
//! appends each tick into the shared history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::SamplerConfig;
use crate::error::SampleError;
use crate::gpu::GpuProbe;
use crate::history::{History, Metric};
use crate::probe::{ProbeSlot, SharedProbe};
use crate::sensors::{SysfsBatteryProbe, TemperatureProbe};
use crate::source::{Clock, HostSource, MonotonicClock, SysinfoSource};
use crate::types::{BatteryState, GpuState, Snapshot, Temperatures};

// floor for elapsed time between readings
pub const MIN_ELAPSED: Duration = Duration::from_micros(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    pub value: u64,
    pub timestamp: Instant,
}

/// `(current - previous) / elapsed`, or 0.0 when the counter went backwards
/// (reset or wraparound are not told apart).
pub fn rate_per_sec(previous: u64, current: u64, elapsed: Duration) -> f64 {
    if current < previous {
        return 0.0;
    }
    let secs = elapsed.max(MIN_ELAPSED).as_secs_f64();
    ((current - previous) as f64 / secs).max(0.0)
}

/// Previous reading of one cumulative counter.
#[derive(Debug, Default)]
struct RateCounter {
    prev: Option<CounterReading>,
}

impl RateCounter {
    /// Rate for this tick. The first reading (or the first after a gap) only
    /// sets the baseline and yields 0.0.
    fn observe(&mut self, reading: Option<CounterReading>) -> f64 {
        let Some(cur) = reading else {
            self.prev = None;
            return 0.0;
        };
        let rate = match self.prev {
            Some(prev) => rate_per_sec(
                prev.value,
                cur.value,
                cur.timestamp.saturating_duration_since(prev.timestamp),
            ),
            None => 0.0,
        };
        self.prev = Some(cur);
        rate
    }
}

pub struct Sampler {
    source: Box<dyn HostSource>,
    clock: Arc<dyn Clock>,
    probe_timeout: Duration,

    battery: ProbeSlot<BatteryState>,
    temps: ProbeSlot<Temperatures>,
    gpu: ProbeSlot<GpuState>,

    net_up: RateCounter,
    net_down: RateCounter,
    disk_read: RateCounter,
    disk_write: RateCounter,
    last_sample_at: Option<Instant>,

    history: History,
}

impl Sampler {
    /// Host sampler with the sysinfo source and every enabled sensor probe.
    pub fn new(config: &SamplerConfig) -> Self {
        let mut s = Self::with_source(SysinfoSource::new(), Arc::new(MonotonicClock), config);
        if config.battery_enabled {
            s = s.with_battery(Arc::new(SysfsBatteryProbe::new()));
        }
        if config.temp_enabled {
            s = s.with_temperatures(Arc::new(TemperatureProbe::new()));
        }
        if config.gpu_enabled {
            s = s.with_gpu(Arc::new(GpuProbe::new()));
        }
        s
    }

    /// Sampler over an arbitrary source with no optional probes attached.
    pub fn with_source<S: HostSource + 'static>(
        source: S,
        clock: Arc<dyn Clock>,
        config: &SamplerConfig,
    ) -> Self {
        Self {
            source: Box::new(source),
            clock,
            probe_timeout: config.probe_timeout,
            battery: ProbeSlot::new(None),
            temps: ProbeSlot::new(None),
            gpu: ProbeSlot::new(None),
            net_up: RateCounter::default(),
            net_down: RateCounter::default(),
            disk_read: RateCounter::default(),
            disk_write: RateCounter::default(),
            last_sample_at: None,
            history: History::new(config.history_capacity),
        }
    }

    pub fn with_battery(mut self, probe: SharedProbe<BatteryState>) -> Self {
        self.battery = ProbeSlot::new(Some(probe));
        self
    }

    pub fn with_temperatures(mut self, probe: SharedProbe<Temperatures>) -> Self {
        self.temps = ProbeSlot::new(Some(probe));
        self
    }

    pub fn with_gpu(mut self, probe: SharedProbe<GpuState>) -> Self {
        self.gpu = ProbeSlot::new(Some(probe));
        self
    }

    /// Read handle onto the history; safe to use from other threads while
    /// `sample` runs.
    pub fn history(&self) -> History {
        self.history.clone()
    }

    pub fn last_sample_at(&self) -> Option<Instant> {
        self.last_sample_at
    }

    /// Takes one tick.
    ///
    /// Fails only when CPU or memory can't be read, in which case history,
    /// counter baselines and the last sample time are left as they were.
    pub async fn sample(&mut self) -> Result<Snapshot, SampleError> {
        let now = self.clock.now();

        let cpu = self.source.cpu()?;
        let mem = self.source.memory()?;
        let net = self.source.network_totals();
        let disk = self.source.disk_totals();

        let budget = self.probe_timeout;
        let (battery, temps, gpu) = tokio::join!(
            self.battery.read(budget),
            self.temps.read(budget),
            self.gpu.read(budget)
        );
        let gpu = gpu.filter(|g| !g.is_empty());

        let at = |value: u64| CounterReading {
            value,
            timestamp: now,
        };
        let net_up_bps = self.net_up.observe(net.map(|n| at(n.sent)));
        let net_down_bps = self.net_down.observe(net.map(|n| at(n.received)));
        let disk_read_bps = self.disk_read.observe(disk.map(|d| at(d.read)));
        let disk_write_bps = self.disk_write.observe(disk.map(|d| at(d.written)));

        if let Some(prev) = self.last_sample_at {
            debug!(
                elapsed_ms = now.saturating_duration_since(prev).as_millis() as u64,
                cpu_total = cpu.total,
                "tick"
            );
        }
        self.last_sample_at = Some(now);

        let snapshot = Snapshot {
            taken_at_unix_ms: chrono::Utc::now().timestamp_millis(),
            cpu_total: cpu.total,
            cpu_per_core: cpu.per_core,
            mem_total: mem.total,
            mem_used: mem.used,
            mem_percent: mem.percent(),
            battery,
            temperatures: temps.unwrap_or_default(),
            gpu,
            net_up_bps,
            net_down_bps,
            disk_read_bps,
            disk_write_bps,
        };

        let mut tick = vec![
            (Metric::NetUp, snapshot.net_up_bps),
            (Metric::NetDown, snapshot.net_down_bps),
            (Metric::DiskRead, snapshot.disk_read_bps),
            (Metric::DiskWrite, snapshot.disk_write_bps),
            (Metric::CpuTotal, snapshot.cpu_total as f64),
            (Metric::RamUsed, snapshot.mem_used as f64),
        ];
        if let Some(g) = &snapshot.gpu {
            if let Some(load) = g.load_pct {
                tick.push((Metric::GpuLoad, load as f64));
            }
            if let Some(temp) = g.temp_c {
                tick.push((Metric::GpuTemp, temp as f64));
            }
        }
        self.history.append_tick(&tick);

        Ok(snapshot)
    }
}
