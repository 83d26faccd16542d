//! Sampler behavior against scripted host sources, clocks and probes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use dashmon_agent::probe::Probe;
use dashmon_agent::source::{Clock, CpuUsage, DiskTotals, HostSource, MemoryUsage, NetTotals};
use dashmon_agent::types::{BatteryState, GpuState, TempReading, Temperatures};
use dashmon_agent::{Metric, SampleError, Sampler, SamplerConfig};

struct HostState {
    cpu_fails: bool,
    mem_fails: bool,
    cpu_total: f32,
    net: Option<NetTotals>,
    disk: Option<DiskTotals>,
}

#[derive(Clone)]
struct FakeHost(Arc<Mutex<HostState>>);

impl FakeHost {
    fn new() -> Self {
        FakeHost(Arc::new(Mutex::new(HostState {
            cpu_fails: false,
            mem_fails: false,
            cpu_total: 20.0,
            net: Some(NetTotals::default()),
            disk: Some(DiskTotals::default()),
        })))
    }

    fn set_net(&self, sent: u64, received: u64) {
        self.0.lock().unwrap().net = Some(NetTotals { sent, received });
    }

    fn set_disk(&self, read: u64, written: u64) {
        self.0.lock().unwrap().disk = Some(DiskTotals { read, written });
    }

    fn update(&self, f: impl FnOnce(&mut HostState)) {
        f(&mut self.0.lock().unwrap());
    }
}

impl HostSource for FakeHost {
    fn cpu(&mut self) -> Result<CpuUsage, SampleError> {
        let s = self.0.lock().unwrap();
        if s.cpu_fails {
            return Err(SampleError::unavailable("cpu", "simulated fault"));
        }
        Ok(CpuUsage {
            total: s.cpu_total,
            per_core: vec![s.cpu_total; 4],
        })
    }

    fn memory(&mut self) -> Result<MemoryUsage, SampleError> {
        if self.0.lock().unwrap().mem_fails {
            return Err(SampleError::unavailable("memory", "simulated fault"));
        }
        Ok(MemoryUsage {
            total: 8 << 30,
            used: 2 << 30,
        })
    }

    fn network_totals(&mut self) -> Option<NetTotals> {
        self.0.lock().unwrap().net
    }

    fn disk_totals(&mut self) -> Option<DiskTotals> {
        self.0.lock().unwrap().disk
    }
}

struct ManualClock(Mutex<Instant>);

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(ManualClock(Mutex::new(Instant::now())))
    }

    fn advance(&self, d: Duration) {
        *self.0.lock().unwrap() += d;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock().unwrap()
    }
}

/// Hands out queued results; `Ok(None)` once the queue is drained.
struct Scripted<T> {
    name: &'static str,
    queue: Mutex<VecDeque<anyhow::Result<Option<T>>>>,
}

impl<T> Scripted<T> {
    fn new(name: &'static str, items: Vec<anyhow::Result<Option<T>>>) -> Arc<Self> {
        Arc::new(Scripted {
            name,
            queue: Mutex::new(items.into()),
        })
    }
}

impl<T: Send + 'static> Probe for Scripted<T> {
    type Output = T;

    fn name(&self) -> &'static str {
        self.name
    }

    fn read(&self) -> anyhow::Result<Option<T>> {
        self.queue.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

struct Stuck;

impl Probe for Stuck {
    type Output = BatteryState;

    fn name(&self) -> &'static str {
        "stuck"
    }

    fn read(&self) -> anyhow::Result<Option<BatteryState>> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(Some(BatteryState {
            percent: 1.0,
            charging: false,
        }))
    }
}

fn config(cap: usize) -> SamplerConfig {
    SamplerConfig {
        history_capacity: cap,
        probe_timeout: Duration::from_millis(500),
        ..SamplerConfig::default()
    }
}

fn sampler(host: &FakeHost, clock: &Arc<ManualClock>, cap: usize) -> Sampler {
    Sampler::with_source(host.clone(), clock.clone(), &config(cap))
}

fn gpu(load: f32, temp: f32) -> GpuState {
    GpuState {
        name: Some("Test GPU".into()),
        load_pct: Some(load),
        temp_c: Some(temp),
        vram_used_bytes: Some(1 << 30),
        vram_total_bytes: Some(8 << 30),
    }
}

#[tokio::test]
async fn first_tick_is_zero_then_rates_follow_counters() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = sampler(&host, &clock, 10);

    host.set_net(1000, 2000);
    host.set_disk(10_000, 40_000);
    let first = s.sample().await.unwrap();
    assert_eq!(first.net_up_bps, 0.0);
    assert_eq!(first.net_down_bps, 0.0);
    assert_eq!(first.disk_read_bps, 0.0);
    assert_eq!(first.disk_write_bps, 0.0);

    clock.advance(Duration::from_secs(2));
    host.set_net(1500, 2200);
    host.set_disk(14_000, 40_000);
    let second = s.sample().await.unwrap();
    assert!((second.net_up_bps - 250.0).abs() < 1e-9);
    assert!((second.net_down_bps - 100.0).abs() < 1e-9);
    assert!((second.disk_read_bps - 2000.0).abs() < 1e-9);
    assert_eq!(second.disk_write_bps, 0.0);

    let h = s.history();
    assert_eq!(h.snapshot(Metric::NetUp), vec![0.0, 250.0]);
    assert_eq!(h.snapshot(Metric::NetDown), vec![0.0, 100.0]);
}

#[tokio::test]
async fn counter_reset_yields_exact_zero() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = sampler(&host, &clock, 10);

    host.set_net(5000, 100);
    s.sample().await.unwrap();
    clock.advance(Duration::from_secs(1));
    host.set_net(100, 300);
    let snap = s.sample().await.unwrap();
    assert_eq!(snap.net_up_bps, 0.0);
    assert!((snap.net_down_bps - 200.0).abs() < 1e-9);

    // the reset reading becomes the new baseline
    clock.advance(Duration::from_secs(1));
    host.set_net(400, 300);
    let snap = s.sample().await.unwrap();
    assert!((snap.net_up_bps - 300.0).abs() < 1e-9);
}

#[tokio::test]
async fn rates_are_never_negative() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = sampler(&host, &clock, 64);

    // small LCG so the walk goes both up and down
    let mut x: u64 = 0x2545_F491_4F6C_DD1D;
    for _ in 0..200 {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let v = x >> 40;
        host.set_net(v, v / 2);
        host.set_disk(v / 3, v.rotate_left(7) & 0xFFFF_FFFF);
        clock.advance(Duration::from_millis(x % 1500));
        let snap = s.sample().await.unwrap();
        for r in [
            snap.net_up_bps,
            snap.net_down_bps,
            snap.disk_read_bps,
            snap.disk_write_bps,
        ] {
            assert!(r >= 0.0 && r.is_finite(), "bad rate {r}");
        }
    }
}

#[tokio::test]
async fn back_to_back_ticks_stay_finite() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = sampler(&host, &clock, 4);
    host.set_net(0, 0);
    s.sample().await.unwrap();
    host.set_net(10, 0);
    // clock not advanced
    let snap = s.sample().await.unwrap();
    assert!(snap.net_up_bps.is_finite());
    assert!(snap.net_up_bps > 0.0);
}

#[tokio::test]
async fn missing_counters_read_as_zero_rate() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = sampler(&host, &clock, 4);
    host.update(|h| {
        h.net = None;
        h.disk = None;
    });
    for _ in 0..3 {
        clock.advance(Duration::from_secs(1));
        let snap = s.sample().await.unwrap();
        assert_eq!(snap.net_up_bps, 0.0);
        assert_eq!(snap.disk_write_bps, 0.0);
    }
    assert_eq!(s.history().len(Metric::NetUp), 3);
}

#[tokio::test]
async fn gpu_gap_is_not_backfilled() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let probe = Scripted::new(
        "gpu",
        vec![Err(anyhow!("driver hiccup")), Ok(Some(gpu(40.0, 65.0)))],
    );
    let mut s = sampler(&host, &clock, 10).with_gpu(probe);

    let n = s.sample().await.unwrap();
    assert!(n.gpu.is_none());
    clock.advance(Duration::from_secs(1));
    let n1 = s.sample().await.unwrap();
    assert_eq!(n1.gpu, Some(gpu(40.0, 65.0)));

    let h = s.history();
    assert_eq!(h.len(Metric::CpuTotal), 2);
    assert_eq!(h.snapshot(Metric::GpuLoad), vec![40.0]);
    assert_eq!(h.snapshot(Metric::GpuTemp), vec![65.0]);
}

#[tokio::test]
async fn partial_gpu_fields_append_independently() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let load_only = GpuState {
        load_pct: Some(0.0),
        ..Default::default()
    };
    let probe = Scripted::new("gpu", vec![Ok(Some(load_only.clone()))]);
    let mut s = sampler(&host, &clock, 10).with_gpu(probe);

    let snap = s.sample().await.unwrap();
    // 0% load is a reading, not absence
    assert_eq!(snap.gpu, Some(load_only));
    let h = s.history();
    assert_eq!(h.snapshot(Metric::GpuLoad), vec![0.0]);
    assert!(h.snapshot(Metric::GpuTemp).is_empty());
}

#[tokio::test]
async fn optional_sensors_pass_through_or_stay_absent() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut temps = Temperatures::new();
    temps.insert(
        "coretemp".into(),
        vec![TempReading {
            label: "Package id 0".into(),
            celsius: 48.0,
        }],
    );
    let battery = BatteryState {
        percent: 64.0,
        charging: true,
    };
    let mut s = sampler(&host, &clock, 10)
        .with_battery(Scripted::new("battery", vec![Ok(Some(battery))]))
        .with_temperatures(Scripted::new(
            "temperature",
            vec![Ok(Some(temps.clone())), Err(anyhow!("i2c timeout"))],
        ));

    let first = s.sample().await.unwrap();
    assert_eq!(first.battery, Some(battery));
    assert_eq!(first.temperatures, temps);
    assert_eq!(first.cpu_per_core.len(), 4);
    assert!((first.mem_percent - 25.0).abs() < 1e-4);

    let second = s.sample().await.unwrap();
    assert_eq!(second.battery, None);
    assert!(second.temperatures.is_empty());
}

#[tokio::test]
async fn slow_probe_does_not_stall_the_tick() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = Sampler::with_source(
        host.clone(),
        clock.clone(),
        &SamplerConfig {
            probe_timeout: Duration::from_millis(50),
            ..config(4)
        },
    )
    .with_battery(Arc::new(Stuck));

    let started = Instant::now();
    let snap = s.sample().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(snap.battery.is_none());
    assert_eq!(s.history().len(Metric::CpuTotal), 1);
}

#[tokio::test]
async fn mandatory_failure_leaves_history_untouched() {
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = sampler(&host, &clock, 10).with_gpu(Scripted::new(
        "gpu",
        vec![Ok(Some(gpu(10.0, 50.0))), Ok(Some(gpu(20.0, 55.0)))],
    ));

    host.set_net(1000, 1000);
    s.sample().await.unwrap();
    let h = s.history();
    let before = h.snapshot_all();
    let last = s.last_sample_at();

    clock.advance(Duration::from_secs(1));
    host.update(|h| h.cpu_fails = true);
    let err = s.sample().await.unwrap_err();
    assert!(matches!(
        err,
        SampleError::MetricSourceUnavailable { metric: "cpu", .. }
    ));
    assert_eq!(h.snapshot_all(), before);
    assert_eq!(s.last_sample_at(), last);

    host.update(|h| {
        h.cpu_fails = false;
        h.mem_fails = true;
    });
    assert!(matches!(
        s.sample().await,
        Err(SampleError::MetricSourceUnavailable {
            metric: "memory",
            ..
        })
    ));
    assert_eq!(h.snapshot_all(), before);

    // baseline survived the failed ticks: diff spans all 3 seconds
    clock.advance(Duration::from_secs(2));
    host.update(|h| h.mem_fails = false);
    host.set_net(4000, 1000);
    let snap = s.sample().await.unwrap();
    assert!((snap.net_up_bps - 1000.0).abs() < 1e-9);
    assert_eq!(h.len(Metric::CpuTotal), 2);
}

#[tokio::test]
async fn readers_never_see_a_torn_tick() {
    const CAP: usize = 16;
    let host = FakeHost::new();
    let clock = ManualClock::new();
    let mut s = sampler(&host, &clock, CAP);
    let history = s.history();
    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut reads = 0u64;
            while !stop.load(Ordering::Acquire) {
                let all = history.snapshot_all();
                let lens: Vec<usize> = all
                    .iter()
                    .filter(|(m, _)| !matches!(m, Metric::GpuLoad | Metric::GpuTemp))
                    .map(|(_, v)| v.len())
                    .collect();
                assert!(lens.iter().all(|l| *l <= CAP));
                // every per-tick series moves together
                assert!(lens.windows(2).all(|w| w[0] == w[1]), "torn tick: {lens:?}");
                let cpu = &all.iter().find(|(m, _)| *m == Metric::CpuTotal).unwrap().1;
                assert!(cpu.iter().all(|v| (0.0..=100.0).contains(v)));
                reads += 1;
            }
            reads
        })
    };

    for i in 0..500u64 {
        host.update(|h| h.cpu_total = (i % 100) as f32);
        host.set_net(i * 100, i * 50);
        clock.advance(Duration::from_millis(10));
        s.sample().await.unwrap();
    }
    stop.store(true, Ordering::Release);
    let reads = reader.join().expect("reader thread panicked");
    assert!(reads > 0);
    assert_eq!(s.history().len(Metric::CpuTotal), CAP);
}

#[tokio::test]
async fn samplers_do_not_share_state() {
    let host_a = FakeHost::new();
    let host_b = FakeHost::new();
    let clock = ManualClock::new();
    let mut a = sampler(&host_a, &clock, 5);
    let mut b = sampler(&host_b, &clock, 5);

    host_a.set_net(0, 0);
    a.sample().await.unwrap();
    clock.advance(Duration::from_secs(1));
    host_a.set_net(100, 0);
    host_b.set_net(100, 0);
    assert!((a.sample().await.unwrap().net_up_bps - 100.0).abs() < 1e-9);
    // b has no baseline yet
    assert_eq!(b.sample().await.unwrap().net_up_bps, 0.0);

    assert_eq!(a.history().len(Metric::NetUp), 2);
    assert_eq!(b.history().len(Metric::NetUp), 1);
}
