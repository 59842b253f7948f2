//! Telemetry Sampler: lightweight statistics over the collectors' on-disk buffers.
//!
//! Layout under the data root: `flows/` (goflow2 JSON lines), `syslog/` (fluent-bit
//! text), `snmp/` (one JSON poll per file). Every statistic is best-effort and falls back
//! to its zero value on its own.

use crate::probe::CommandRunner;
use crate::tail;
use crate::types::{
    truncate_chars, unix_millis, FlowRecord, SyslogEntry, TelemetryStats, RECENT_CAP,
    SYSLOG_MESSAGE_CAP,
};
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;
use tracing::debug;

pub const FLOWS_DIR: &str = "flows";
pub const SYSLOG_DIR: &str = "syslog";
pub const SNMP_DIR: &str = "snmp";

// goflow2 has used both spellings across releases.
const EXPORTER_KEYS: &[&str] = &["sampler_address", "SamplerAddress"];

#[derive(Debug, Default)]
struct FlowStats {
    recent: Vec<FlowRecord>,
    per_second: f64,
    devices: u64,
}

#[derive(Debug, Default)]
struct SyslogStats {
    recent: Vec<SyslogEntry>,
    count: u64,
}

#[derive(Clone)]
pub struct TelemetrySampler {
    data_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl TelemetrySampler {
    pub fn new(data_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            data_dir: data_dir.into(),
            runner,
        }
    }

    pub async fn sample(&self) -> TelemetryStats {
        self.sample_at(SystemTime::now()).await
    }

    /// Sample as if the wall clock read `now`. File ages and today's date derive from it.
    pub async fn sample_at(&self, now: SystemTime) -> TelemetryStats {
        let (flows, syslog, snmp, buffer) = tokio::join!(
            self.flow_stats(now),
            self.syslog_stats(now),
            self.snmp_poll_count(),
            self.buffer_size(),
        );

        let mut stats = TelemetryStats::default();
        match flows {
            Ok(f) => {
                stats.recent_flows = f.recent;
                stats.flows_per_second = f.per_second;
                stats.active_device_count = f.devices;
            }
            Err(e) => debug!("flow stats unavailable: {e}"),
        }
        match syslog {
            Ok(s) => {
                stats.recent_syslog = s.recent;
                stats.syslog_message_count = s.count;
            }
            Err(e) => debug!("syslog stats unavailable: {e}"),
        }
        match snmp {
            Ok(n) => stats.snmp_poll_count = n,
            Err(e) => debug!("snmp stats unavailable: {e}"),
        }
        if let Some(size) = buffer {
            stats.buffer_size_human = size;
        }
        stats
    }

    // Latest flow file of the current UTC day: names containing YYYY-MM-DD, greatest wins.
    async fn flow_stats(&self, now: SystemTime) -> io::Result<FlowStats> {
        let dir = self.data_dir.join(FLOWS_DIR);
        let Some(names) = tail::list_files(&dir).await? else {
            return Ok(FlowStats::default());
        };
        let today = utc_date(now);
        let Some(latest) = names.into_iter().filter(|n| n.contains(&today)).max() else {
            return Ok(FlowStats::default());
        };
        let path = dir.join(latest);

        let lines = tail::read_lines(&path).await?;
        let modified = tokio::fs::metadata(&path)
            .await
            .and_then(|md| md.modified());
        Ok(summarize_flows(&lines, now, modified))
    }

    // Last file in directory-listing order, not sorted.
    async fn syslog_stats(&self, now: SystemTime) -> io::Result<SyslogStats> {
        let dir = self.data_dir.join(SYSLOG_DIR);
        let Some(names) = tail::list_files(&dir).await? else {
            return Ok(SyslogStats::default());
        };
        let Some(last) = names.last() else {
            return Ok(SyslogStats::default());
        };
        let lines = tail::read_lines(&dir.join(last)).await?;
        let now_ms = unix_millis(now);
        let recent = tail::last_records(&lines, RECENT_CAP, &|l: &str| {
            Some(SyslogEntry::from_line(
                &truncate_chars(l, SYSLOG_MESSAGE_CAP),
                now_ms,
            ))
        });
        Ok(SyslogStats {
            recent,
            count: lines.len() as u64,
        })
    }

    async fn snmp_poll_count(&self) -> io::Result<u64> {
        let dir = self.data_dir.join(SNMP_DIR);
        Ok(tail::list_files(&dir)
            .await?
            .map(|names| names.len() as u64)
            .unwrap_or(0))
    }

    async fn buffer_size(&self) -> Option<String> {
        let root = self.data_dir.to_string_lossy();
        match self.runner.run("du", &["-sh", root.as_ref()]).await {
            Ok(out) => out
                .split('\t')
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            Err(e) => {
                debug!("buffer size unavailable: {e}");
                None
            }
        }
    }
}

// A missing mtime only costs the rate; recent records and devices still come through.
fn summarize_flows(lines: &[String], now: SystemTime, modified: io::Result<SystemTime>) -> FlowStats {
    let now_ms = unix_millis(now);
    let recent = tail::last_records(lines, RECENT_CAP, &|l: &str| {
        Some(FlowRecord::from_line(l, now_ms))
    });
    let per_second = match modified {
        Ok(modified) => flow_rate(lines.len(), now, modified),
        Err(e) => {
            debug!("flow file age unavailable, rate left at 0: {e}");
            0.0
        }
    };
    FlowStats {
        recent,
        per_second,
        devices: count_exporters(lines),
    }
}

/// Lines per second over the file's age. A file modified "now" or in the future has no
/// measurable window, so the rate stays 0.
fn flow_rate(lines: usize, now: SystemTime, modified: SystemTime) -> f64 {
    match now.duration_since(modified) {
        Ok(age) if age.as_secs_f64() > 0.0 => lines as f64 / age.as_secs_f64(),
        _ => 0.0,
    }
}

fn count_exporters(lines: &[String]) -> u64 {
    let mut seen = HashSet::new();
    for line in lines {
        let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(line) else {
            continue;
        };
        if let Some(addr) = EXPORTER_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        {
            seen.insert(addr.to_string());
        }
    }
    seen.len() as u64
}

/// `YYYY-MM-DD` of `now` in UTC.
pub fn utc_date(now: SystemTime) -> String {
    let date = OffsetDateTime::from(now).date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
