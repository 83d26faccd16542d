//! Daily-rotated CSV log of snapshots: `<dir>/metrics_YYYY-MM-DD.csv` (local date).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDate};

use crate::types::Snapshot;

pub const CSV_HEADER: &str = "timestamp,cpu_total,ram_percent,net_up_bps,net_down_bps,disk_read_bps,disk_write_bps,gpu_load,gpu_temp";

pub struct CsvRecorder {
    dir: PathBuf,
    date: NaiveDate,
    path: PathBuf,
}

impl CsvRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let date = Local::now().date_naive();
        let path = file_for(&dir, date);
        Ok(Self { dir, date, path })
    }

    /// File the next row goes to (until the date rolls over).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, snap: &Snapshot) -> anyhow::Result<()> {
        self.record_on(Local::now().date_naive(), snap)
    }

    fn record_on(&mut self, date: NaiveDate, snap: &Snapshot) -> anyhow::Result<()> {
        if date != self.date {
            self.date = date;
            self.path = file_for(&self.dir, date);
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        if f.metadata()?.len() == 0 {
            writeln!(f, "{CSV_HEADER}")?;
        }
        writeln!(f, "{}", csv_row(snap))
            .with_context(|| format!("appending to {}", self.path.display()))?;
        Ok(())
    }
}

fn file_for(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("metrics_{}.csv", date.format("%Y-%m-%d")))
}

/// One row matching `CSV_HEADER`; absent GPU values are empty cells.
pub fn csv_row(s: &Snapshot) -> String {
    let opt = |v: Option<f32>| v.map(|x| x.to_string()).unwrap_or_default();
    let gpu_load = s.gpu.as_ref().and_then(|g| g.load_pct);
    let gpu_temp = s.gpu.as_ref().and_then(|g| g.temp_c);
    format!(
        "{:.3},{},{},{},{},{},{},{},{}",
        s.taken_at_unix_ms as f64 / 1000.0,
        s.cpu_total,
        s.mem_percent,
        s.net_up_bps,
        s.net_down_bps,
        s.disk_read_bps,
        s.disk_write_bps,
        opt(gpu_load),
        opt(gpu_temp),
    )
}
