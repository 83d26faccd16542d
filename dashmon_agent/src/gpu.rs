// gpu.rs
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use gfxinfo::active_gpu;
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::Nvml;
use tracing::{debug, info};

use crate::probe::Probe;
use crate::types::GpuState;

/// First GPU on the host: NVML when the NVIDIA driver is loadable, gfxinfo
/// otherwise.
///
/// If the very first successful read finds no device, probing stops for the
/// life of the probe so hosts without a GPU don't rescan every tick. Errors
/// never latch: they are returned as-is and the next tick tries again.
pub struct GpuProbe {
    nvml: Option<Nvml>,
    checked: AtomicBool,
    present: AtomicBool,
}

impl GpuProbe {
    pub fn new() -> Self {
        let nvml = match Nvml::init() {
            Ok(n) => Some(n),
            Err(e) => {
                debug!("nvml unavailable, falling back to gfxinfo: {e}");
                None
            }
        };
        Self::with_nvml(nvml)
    }

    fn with_nvml(nvml: Option<Nvml>) -> Self {
        Self {
            nvml,
            checked: AtomicBool::new(false),
            present: AtomicBool::new(false),
        }
    }

    /// Runs one backend read through the presence flags.
    fn latch(
        &self,
        read: impl FnOnce() -> anyhow::Result<Option<GpuState>>,
    ) -> anyhow::Result<Option<GpuState>> {
        if self.checked.load(Ordering::Acquire) && !self.present.load(Ordering::Acquire) {
            return Ok(None);
        }
        let result = read();
        match &result {
            Ok(Some(_)) => {
                self.present.store(true, Ordering::Release);
                self.checked.store(true, Ordering::Release);
            }
            Ok(None) if !self.checked.load(Ordering::Acquire) => {
                self.present.store(false, Ordering::Release);
                self.checked.store(true, Ordering::Release);
                info!("no GPU detected; GPU probing disabled");
            }
            // errors, and "no device" after one was seen, stay per-tick
            _ => {}
        }
        result
    }
}

impl Default for GpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for GpuProbe {
    type Output = GpuState;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn read(&self) -> anyhow::Result<Option<GpuState>> {
        self.latch(|| match &self.nvml {
            Some(nvml) => read_nvml(nvml),
            None => read_gfxinfo(),
        })
    }
}

fn read_nvml(nvml: &Nvml) -> anyhow::Result<Option<GpuState>> {
    if nvml.device_count()? == 0 {
        return Ok(None);
    }
    let device = nvml.device_by_index(0)?;
    let mem = device.memory_info().ok();
    let state = GpuState {
        name: device.name().ok(),
        load_pct: device
            .utilization_rates()
            .ok()
            .map(|u| (u.gpu as f32).clamp(0.0, 100.0)),
        temp_c: device.temperature(TemperatureSensor::Gpu).ok().map(|t| t as f32),
        vram_used_bytes: mem.as_ref().map(|m| m.used),
        vram_total_bytes: mem.as_ref().map(|m| m.total),
    };
    if state.is_empty() {
        return Err(anyhow!("nvml device 0 answered no queries"));
    }
    Ok(Some(state))
}

// gfxinfo has no "no device" result of its own; every lookup failure means
// it found nothing it can report on.
fn read_gfxinfo() -> anyhow::Result<Option<GpuState>> {
    let gpu = match active_gpu() {
        Ok(gpu) => gpu,
        Err(e) => {
            debug!("gfxinfo found no usable GPU: {e}");
            return Ok(None);
        }
    };
    let info = gpu.info();
    Ok(Some(GpuState {
        name: Some(gpu.model().to_string()),
        load_pct: Some((info.load_pct() as f32).clamp(0.0, 100.0)),
        temp_c: None,
        vram_used_bytes: Some(info.used_vram()),
        vram_total_bytes: Some(info.total_vram()),
    }))
}
