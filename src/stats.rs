//! Timing sinks for the sequential execution strategy.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Stat name every sequential step is reported under.
pub const STEP_TIMING_STAT: &str = "ender.handle_step.timing";

/// Tags attached to one timed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingTags {
    pub class_name: &'static str,
    pub event_type: &'static str,
    pub fn_name: &'static str,
}

pub trait Stats: Send + Sync + 'static {
    fn timing(&self, stat: &str, duration: Duration, tags: &TimingTags);
}

/// Reports timings as debug log lines.
pub struct TracingStats;

impl Stats for TracingStats {
    fn timing(&self, stat: &str, duration: Duration, tags: &TimingTags) {
        tracing::debug!(
            "{} {}ms class_name={} event_type={} fn_name={}",
            stat,
            duration.as_millis(),
            tags.class_name,
            tags.event_type,
            tags.fn_name
        );
    }
}

/// Appends timings to a CSV file.
pub struct CsvStats {
    file: Mutex<File>,
}

impl CsvStats {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        writeln!(file, "stat,class_name,event_type,fn_name,duration_us")?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Stats for CsvStats {
    fn timing(&self, stat: &str, duration: Duration, tags: &TimingTags) {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let written = writeln!(
            file,
            "{},{},{},{},{}",
            stat,
            tags.class_name,
            tags.event_type,
            tags.fn_name,
            duration.as_micros()
        )
        .and_then(|_| file.flush());

        if let Err(e) = written {
            tracing::warn!("Failed to write timing stat: {}", e);
        }
    }
}
