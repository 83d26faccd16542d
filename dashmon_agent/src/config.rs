//! Sampler configuration: defaults plus `DASHMON_*` environment overrides.

use std::time::Duration;

use crate::history::DEFAULT_HISTORY_LEN;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub history_capacity: usize,
    // budget for each optional sensor read (GPU / temperature / battery)
    pub probe_timeout: Duration,
    pub gpu_enabled: bool,
    pub temp_enabled: bool,
    pub battery_enabled: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_LEN,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            gpu_enabled: true,
            temp_enabled: true,
            battery_enabled: true,
        }
    }
}

impl SamplerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env` but with an injectable lookup, so tests don't have to
    /// mutate the process environment.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Self {
        let d = Self::default();
        let toggle = |key: &str, default: bool| get(key).map(|v| v != "0").unwrap_or(default);
        Self {
            history_capacity: get("DASHMON_HISTORY_LEN")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(d.history_capacity),
            probe_timeout: get("DASHMON_PROBE_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(d.probe_timeout),
            gpu_enabled: toggle("DASHMON_GPU", d.gpu_enabled),
            temp_enabled: toggle("DASHMON_TEMP", d.temp_enabled),
            battery_enabled: toggle("DASHMON_BATTERY", d.battery_enabled),
        }
    }
}
