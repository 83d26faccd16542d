//! Temperature and battery probes.
//!
//! On Linux both read sysfs directly:
//! - /sys/class/hwmon/hwmon*/temp*_input (grouped by the hwmon `name` file)
//! - /sys/class/power_supply/*/{type,capacity,status,online}
//!
//! Temperatures fall back to sysinfo components when hwmon yields nothing.
//! A missing sysfs tree means "not supported" and reads as `None`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use sysinfo::Components;

use crate::probe::Probe;
use crate::types::{BatteryState, TempReading, Temperatures};

const HWMON_ROOT: &str = "/sys/class/hwmon";
const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

pub struct TemperatureProbe {
    hwmon_root: PathBuf,
    components: Mutex<Components>,
}

impl TemperatureProbe {
    pub fn new() -> Self {
        Self {
            hwmon_root: PathBuf::from(HWMON_ROOT),
            components: Mutex::new(Components::new_with_refreshed_list()),
        }
    }

    /// Reads hwmon from `root` only; the sysinfo fallback starts empty.
    pub fn with_hwmon_root(root: impl Into<PathBuf>) -> Self {
        Self {
            hwmon_root: root.into(),
            components: Mutex::new(Components::new()),
        }
    }

    fn read_components(&self) -> anyhow::Result<Temperatures> {
        let mut components = self
            .components
            .lock()
            .map_err(|_| anyhow!("components lock poisoned"))?;
        components.refresh(false);
        let mut temps = Temperatures::new();
        for c in components.iter() {
            let Some(celsius) = c.temperature() else {
                continue;
            };
            let label = c.label().to_string();
            let group = label
                .split_whitespace()
                .next()
                .unwrap_or("unknown")
                .to_string();
            temps
                .entry(group)
                .or_default()
                .push(TempReading { label, celsius });
        }
        Ok(temps)
    }
}

impl Default for TemperatureProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for TemperatureProbe {
    type Output = Temperatures;

    fn name(&self) -> &'static str {
        "temperature"
    }

    fn read(&self) -> anyhow::Result<Option<Temperatures>> {
        let mut temps = read_hwmon(&self.hwmon_root)?;
        if temps.is_empty() {
            temps = self.read_components()?;
        }
        Ok((!temps.is_empty()).then_some(temps))
    }
}

/// Sorted `hwmon*` (or any prefixed) subdirectories of `root`.
fn prefixed_dirs(root: &Path, prefix: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .with_context(|| format!("reading {}", root.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(prefix))
                .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_hwmon(root: &Path) -> anyhow::Result<Temperatures> {
    let mut temps = Temperatures::new();
    if !root.exists() {
        return Ok(temps);
    }

    for dir in prefixed_dirs(root, "hwmon")? {
        let fallback = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let group = read_trimmed(&dir.join("name")).unwrap_or(fallback);

        // temp{N}_input, ordered by N
        let mut inputs: Vec<(u32, PathBuf)> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    let idx = name.strip_prefix("temp")?.strip_suffix("_input")?;
                    Some((idx.parse().ok()?, e.path()))
                })
                .collect(),
            Err(_) => continue,
        };
        inputs.sort_by_key(|(idx, _)| *idx);

        for (idx, path) in inputs {
            // millidegrees Celsius
            let Some(milli) = read_trimmed(&path).and_then(|s| s.parse::<i64>().ok()) else {
                continue;
            };
            let label =
                read_trimmed(&dir.join(format!("temp{idx}_label"))).unwrap_or_else(|| group.clone());
            temps.entry(group.clone()).or_default().push(TempReading {
                label,
                celsius: milli as f32 / 1000.0,
            });
        }
    }
    Ok(temps)
}

pub struct SysfsBatteryProbe {
    root: PathBuf,
}

impl SysfsBatteryProbe {
    pub fn new() -> Self {
        Self::with_root(POWER_SUPPLY_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsBatteryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for SysfsBatteryProbe {
    type Output = BatteryState;

    fn name(&self) -> &'static str {
        "battery"
    }

    fn read(&self) -> anyhow::Result<Option<BatteryState>> {
        if !self.root.exists() {
            return Ok(None);
        }
        let supplies = prefixed_dirs(&self.root, "")?;

        let mut battery: Option<PathBuf> = None;
        let mut mains_online = false;
        for dir in &supplies {
            match read_trimmed(&dir.join("type")).as_deref() {
                Some("Battery") if battery.is_none() => battery = Some(dir.clone()),
                Some("Mains") | Some("USB") => {
                    mains_online |= read_trimmed(&dir.join("online")).as_deref() == Some("1");
                }
                _ => {}
            }
        }
        let Some(dir) = battery else {
            return Ok(None);
        };

        let percent = battery_percent(&dir)
            .ok_or_else(|| anyhow!("{}: no readable charge level", dir.display()))?;
        let status = read_trimmed(&dir.join("status")).unwrap_or_default();
        let charging = mains_online || status == "Charging" || status == "Full";
        Ok(Some(BatteryState { percent, charging }))
    }
}

fn battery_percent(dir: &Path) -> Option<f32> {
    let num = |name: &str| {
        read_trimmed(&dir.join(name)).and_then(|s| s.parse::<f64>().ok())
    };
    if let Some(cap) = num("capacity") {
        return Some(cap.clamp(0.0, 100.0) as f32);
    }
    for (now, full) in [("energy_now", "energy_full"), ("charge_now", "charge_full")] {
        if let (Some(n), Some(f)) = (num(now), num(full)) {
            if f > 0.0 {
                return Some((n / f * 100.0).clamp(0.0, 100.0) as f32);
            }
        }
    }
    None
}
