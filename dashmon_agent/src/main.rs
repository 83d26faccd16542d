//! Entry point for dashmon_agent. Parses args, then samples the host on a fixed
//! cadence until Ctrl-C or `--count` ticks.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use dashmon_agent::recorder::CsvRecorder;
use dashmon_agent::{Metric, Sampler, SamplerConfig};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_INTERVAL_MS: u64 = 1_000;
const MIN_INTERVAL_MS: u64 = 100;
const DEFAULT_GPU_TEMP_ALERT_C: f64 = 85.0;
const DEFAULT_CPU_ALERT_PCT: f64 = 95.0;
const DEFAULT_RAM_ALERT_PCT: f64 = 95.0;

#[derive(Debug, PartialEq)]
struct ParsedArgs {
    interval_ms: u64,
    history: Option<usize>,
    log_dir: Option<PathBuf>,
    json: bool,
    count: u64,
    gpu_temp_alert: f64,
    cpu_alert: f64,
    ram_alert: f64,
}

#[derive(Debug, PartialEq)]
enum ArgsError {
    Help(String),
    Invalid(String),
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--interval-ms MS|-i MS] [--history N] [--log-dir DIR|-l DIR] [--json] [--count N|-n N] [--gpu-temp-alert C] [--cpu-alert PCT] [--ram-alert PCT]"
    )
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, ArgsError> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "dashmon_agent".into());
    let mut out = ParsedArgs {
        interval_ms: DEFAULT_INTERVAL_MS,
        history: None,
        log_dir: None,
        json: false,
        count: 0,
        gpu_temp_alert: DEFAULT_GPU_TEMP_ALERT_C,
        cpu_alert: DEFAULT_CPU_ALERT_PCT,
        ram_alert: DEFAULT_RAM_ALERT_PCT,
    };

    fn value<T: std::str::FromStr>(flag: &str, v: Option<String>) -> Result<T, ArgsError> {
        let v = v.ok_or_else(|| ArgsError::Invalid(format!("{flag} needs a value")))?;
        v.parse()
            .map_err(|_| ArgsError::Invalid(format!("invalid value for {flag}: {v}")))
    }

    while let Some(arg) = it.next() {
        // --flag=value
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let mut next = || inline.clone().or_else(|| it.next());
        match flag.as_str() {
            "-h" | "--help" => return Err(ArgsError::Help(usage(&prog))),
            "--interval-ms" | "-i" => {
                out.interval_ms = value::<u64>(&flag, next())?.max(MIN_INTERVAL_MS)
            }
            "--history" => out.history = Some(value::<usize>(&flag, next())?.max(1)),
            "--log-dir" | "-l" => out.log_dir = Some(value::<PathBuf>(&flag, next())?),
            "--json" => out.json = true,
            "--count" | "-n" => out.count = value(&flag, next())?,
            "--gpu-temp-alert" => out.gpu_temp_alert = value(&flag, next())?,
            "--cpu-alert" => out.cpu_alert = value(&flag, next())?,
            "--ram-alert" => out.ram_alert = value(&flag, next())?,
            _ => {
                return Err(ArgsError::Invalid(format!(
                    "Unexpected argument: {arg}\n{}",
                    usage(&prog)
                )))
            }
        }
    }
    Ok(out)
}

/// Warns once each time a reading crosses `limit`, and notes when it clears.
struct ThresholdAlert {
    what: &'static str,
    unit: &'static str,
    limit: f64,
    active: bool,
}

impl ThresholdAlert {
    fn new(what: &'static str, unit: &'static str, limit: f64) -> Self {
        Self {
            what,
            unit,
            limit,
            active: false,
        }
    }

    /// Returns true when this reading raised the alert.
    fn check(&mut self, latest: Option<f64>) -> bool {
        let high = latest.map(|v| v > self.limit).unwrap_or(false);
        let raised = high && !self.active;
        if let (true, Some(v)) = (raised, latest) {
            warn!(
                "{} high: {v:.0}{} (limit {:.0}{})",
                self.what, self.unit, self.limit, self.unit
            );
        } else if !high && self.active {
            info!("{} back under {:.0}{}", self.what, self.limit, self.unit);
        }
        self.active = high;
        raised
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(ArgsError::Help(msg)) => {
            println!("{msg}");
            return Ok(());
        }
        Err(ArgsError::Invalid(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut config = SamplerConfig::from_env();
    if let Some(n) = parsed.history {
        config.history_capacity = n;
    }
    let mut recorder = parsed
        .log_dir
        .clone()
        .map(CsvRecorder::new)
        .transpose()
        .context("setting up CSV recorder")?;

    let mut sampler = Sampler::new(&config);
    let history = sampler.history();
    let mut cpu_alert = ThresholdAlert::new("CPU usage", "%", parsed.cpu_alert);
    let mut ram_alert = ThresholdAlert::new("RAM usage", "%", parsed.ram_alert);
    let mut gpu_alert = ThresholdAlert::new("GPU temperature", "°C", parsed.gpu_temp_alert);

    info!(
        interval_ms = parsed.interval_ms,
        history = history.capacity(),
        gpu = config.gpu_enabled,
        temp = config.temp_enabled,
        battery = config.battery_enabled,
        "sampler running"
    );
    if let Some(rec) = &recorder {
        info!("recording to {}", rec.path().display());
    }

    let mut ticker = interval(Duration::from_millis(parsed.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut done: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted; stopping");
                break;
            }
            _ = ticker.tick() => {}
        }

        let snap = match sampler.sample().await {
            Ok(s) => s,
            Err(e) => {
                warn!("skipping tick: {e}");
                continue;
            }
        };
        debug!(
            cpu = snap.cpu_total,
            mem_pct = snap.mem_percent,
            up = snap.net_up_bps,
            down = snap.net_down_bps,
            read = snap.disk_read_bps,
            write = snap.disk_write_bps,
            "sample"
        );

        if parsed.json {
            println!("{}", serde_json::to_string(&snap)?);
        }
        if let Some(rec) = recorder.as_mut() {
            if let Err(e) = rec.record(&snap) {
                warn!("csv recorder: {e:#}");
            }
        }
        cpu_alert.check(Some(snap.cpu_total as f64));
        ram_alert.check(Some(snap.mem_percent as f64));
        gpu_alert.check(history.latest(Metric::GpuTemp));

        done += 1;
        if parsed.count > 0 && done >= parsed.count {
            break;
        }
    }
    Ok(())
}
