//! Per-tick data handed to callers.
//! Keep this module minimal and stable: recorders and `--json` output depend on it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    pub percent: f32,
    // true while on external power (charging or full)
    pub charging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempReading {
    pub label: String,
    pub celsius: f32,
}

/// Sensor-group name (e.g. `coretemp`, `nvme`) -> readings in sensor order.
pub type Temperatures = BTreeMap<String, Vec<TempReading>>;

/// GPU query results. Each field is independent: a driver may report load but
/// not temperature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuState {
    pub name: Option<String>,
    pub load_pct: Option<f32>, // 0..100
    pub temp_c: Option<f32>,
    pub vram_used_bytes: Option<u64>,
    pub vram_total_bytes: Option<u64>,
}

impl GpuState {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.load_pct.is_none()
            && self.temp_c.is_none()
            && self.vram_used_bytes.is_none()
            && self.vram_total_bytes.is_none()
    }
}

/// Everything derived during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at_unix_ms: i64,
    pub cpu_total: f32,
    pub cpu_per_core: Vec<f32>,
    pub mem_total: u64,
    pub mem_used: u64,
    pub mem_percent: f32,
    pub battery: Option<BatteryState>,
    pub temperatures: Temperatures,
    pub gpu: Option<GpuState>,
    // bytes/sec, never negative
    pub net_up_bps: f64,
    pub net_down_bps: f64,
    pub disk_read_bps: f64,
    pub disk_write_bps: f64,
}
