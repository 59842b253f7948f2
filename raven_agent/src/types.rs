//! Data types sent to clients over HTTP and WebSocket.
//! Field names and casing here are the wire format; clients depend on them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound for `recentFlows` / `recentSyslog` in a snapshot.
pub const RECENT_CAP: usize = 10;
/// Characters kept from a flow line that is not valid JSON.
pub const RAW_FLOW_PREFIX: usize = 100;
/// Characters kept from a syslog line inside a snapshot.
pub const SYSLOG_MESSAGE_CAP: usize = 200;

/// Service name -> observed running.
pub type Services = BTreeMap<String, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallState {
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIo {
    // cumulative totals across interfaces (client should diff to get rates)
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub cpu_usage_percent: f32,
    pub memory_usage_percent: f32,
    pub disk_usage_percent: f32,
    #[serde(rename = "networkIO")]
    pub network_io: NetworkIo,
}

/// One line of a flow file: the collector's JSON record, or the raw text when the line
/// did not parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowRecord {
    Raw { timestamp: u64, data: String },
    Parsed(serde_json::Value),
}

impl FlowRecord {
    pub fn from_line(line: &str, now_ms: u64) -> Self {
        match serde_json::from_str(line) {
            Ok(value) => FlowRecord::Parsed(value),
            Err(_) => FlowRecord::Raw {
                timestamp: now_ms,
                data: truncate_chars(line, RAW_FLOW_PREFIX),
            },
        }
    }

    pub fn parsed(&self) -> Option<&serde_json::Value> {
        match self {
            FlowRecord::Parsed(v) => Some(v),
            FlowRecord::Raw { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyslogEntry {
    pub timestamp: u64,
    pub message: String,
    pub facility: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl SyslogEntry {
    // The buffered files carry no structured metadata, so facility/severity are fixed.
    pub fn from_line(line: &str, now_ms: u64) -> Self {
        Self {
            timestamp: now_ms,
            message: line.to_string(),
            facility: "local0".into(),
            severity: "info".into(),
            host: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStats {
    pub flows_per_second: f64,
    pub syslog_message_count: u64,
    pub snmp_poll_count: u64,
    pub active_device_count: u64,
    pub buffer_size_human: String,
    pub recent_flows: Vec<FlowRecord>,
    pub recent_syslog: Vec<SyslogEntry>,
}

impl Default for TelemetryStats {
    fn default() -> Self {
        Self {
            flows_per_second: 0.0,
            syslog_message_count: 0,
            snmp_poll_count: 0,
            active_device_count: 0,
            buffer_size_human: "0B".into(),
            recent_flows: Vec::new(),
            recent_syslog: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub timestamp_ms: u64,
    pub uptime_seconds: u64,
    pub overall_state: OverallState,
    pub services: Services,
    pub resource_metrics: ResourceMetrics,
    pub telemetry_stats: TelemetryStats,
}

/// Envelope pushed over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BroadcastMessage {
    SystemStatus(StatusSnapshot),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowsResponse {
    pub flows: Vec<serde_json::Value>,
    pub total_count: usize,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyslogResponse {
    pub logs: Vec<SyslogEntry>,
    pub total_count: usize,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpResponse {
    pub polls: Vec<serde_json::Value>,
    pub total_count: usize,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: u64,
    pub uptime: f64,
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Milliseconds since the Unix epoch for `t`; clocks before the epoch read as 0.
pub fn unix_millis(t: std::time::SystemTime) -> u64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
