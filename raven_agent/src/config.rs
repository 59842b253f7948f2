//! Startup configuration: read once from the environment and command line.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_LOG_DIR: &str = "/var/log/noc-raven";
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Collector processes reported in every snapshot, with the `ps` substring that marks
/// each one as running.
pub const SERVICES: &[(&str, &str)] = &[
    ("nginx", "nginx: master"),
    ("fluent-bit", "fluent-bit"),
    ("goflow2", "goflow2"),
    ("vector", "vector"),
    ("telegraf", "telegraf"),
];

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub broadcast_interval: Duration,
    pub command_timeout: Duration,
    pub appliance: ApplianceInfo,
}

/// Appliance identity echoed by `GET /api/config`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplianceInfo {
    pub hostname: String,
    pub timezone: String,
    pub performance_profile: String,
    pub buffer_size: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            appliance: ApplianceInfo {
                hostname: "noc-raven-001".into(),
                timezone: "UTC".into(),
                performance_profile: "balanced".into(),
                buffer_size: "100GB".into(),
            },
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_sources(std::env::args(), |k| std::env::var(k).ok())
    }

    /// Build from CLI args and an env lookup. A port flag on the command line wins over
    /// `PORT`.
    pub fn from_sources<I, F>(args: I, env: F) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let non_empty = |k: &str| env(k).filter(|v| !v.trim().is_empty());

        let port_env = match non_empty("PORT") {
            Some(v) => Some(
                v.trim()
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("PORT is not a valid port: {v}")))?,
            ),
            None => None,
        };
        cfg.port = parse_port(args)?.or(port_env).unwrap_or(DEFAULT_PORT);

        if let Some(v) = non_empty("RAVEN_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("RAVEN_LOG_DIR") {
            cfg.log_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("RAVEN_BROADCAST_INTERVAL_MS") {
            cfg.broadcast_interval = parse_millis("RAVEN_BROADCAST_INTERVAL_MS", &v)?;
        }
        if let Some(v) = non_empty("RAVEN_COMMAND_TIMEOUT_MS") {
            cfg.command_timeout = parse_millis("RAVEN_COMMAND_TIMEOUT_MS", &v)?;
        }

        if let Some(v) = non_empty("HOSTNAME") {
            cfg.appliance.hostname = v;
        }
        if let Some(v) = non_empty("TZ") {
            cfg.appliance.timezone = v;
        }
        if let Some(v) = non_empty("PERFORMANCE_PROFILE") {
            cfg.appliance.performance_profile = v;
        }
        if let Some(v) = non_empty("BUFFER_SIZE") {
            cfg.appliance.buffer_size = v;
        }
        Ok(cfg)
    }
}

/// Accepts `--port N`, `-p N` and `--port=N`; the long form wins when both are given.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I) -> Result<Option<u16>> {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    match long.or(short) {
        Some(s) => s
            .parse::<u16>()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid port argument: {s}"))),
        None => Ok(None),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(Error::Config(format!(
            "{key} must be a positive number of milliseconds, got {value}"
        ))),
    }
}
