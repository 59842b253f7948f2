//! Appliance settings schema accepted by `POST /api/config`.
//!
//! Five fixed sections (collection, forwarding, alerts, retention, performance). Missing
//! fields take the appliance's factory values; [`Settings::validate`] runs before a
//! payload is used anywhere.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Udp,
    Tcp,
    Http,
    Https,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub collection: Collection,
    pub forwarding: Forwarding,
    pub alerts: Alerts,
    pub retention: Retention,
    pub performance: Performance,
}

// ---------- collection ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub enabled: bool,
    pub port: u16,
    pub protocol: Protocol,
    pub bind_address: String,
}

impl Listener {
    fn new(enabled: bool, port: u16, protocol: Protocol) -> Self {
        Self {
            enabled,
            port,
            protocol,
            bind_address: "0.0.0.0".into(),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.port == 0 {
            return invalid(format!("collection.{name}.port must be non-zero"));
        }
        if self.bind_address.parse::<IpAddr>().is_err() {
            return invalid(format!(
                "collection.{name}.bindAddress is not an IP address: {}",
                self.bind_address
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpCollector {
    #[serde(flatten)]
    pub listener: Listener,
    /// Seconds between polls.
    pub poll_interval: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SflowCollector {
    #[serde(flatten)]
    pub listener: Listener,
    pub sample_rate: u32,
    pub agent_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowsCollector {
    #[serde(flatten)]
    pub listener: Listener,
    pub format: String,
    /// Megabytes.
    pub buffer_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Collection {
    pub syslog: Listener,
    pub netflow: Listener,
    pub snmp: SnmpCollector,
    pub sflow: SflowCollector,
    pub telegraf: Listener,
    pub windows: WindowsCollector,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            syslog: Listener::new(true, 514, Protocol::Udp),
            netflow: Listener::new(true, 2055, Protocol::Udp),
            snmp: SnmpCollector {
                listener: Listener::new(true, 161, Protocol::Udp),
                poll_interval: 300,
            },
            sflow: SflowCollector {
                listener: Listener::new(true, 6343, Protocol::Udp),
                sample_rate: 1000,
                agent_address: "0.0.0.0".into(),
            },
            telegraf: Listener::new(true, 8125, Protocol::Udp),
            windows: WindowsCollector {
                listener: Listener::new(false, 8085, Protocol::Http),
                format: "json".into(),
                buffer_size: 10,
            },
        }
    }
}

impl Collection {
    fn validate(&self) -> Result<()> {
        self.syslog.validate("syslog")?;
        self.netflow.validate("netflow")?;
        self.snmp.listener.validate("snmp")?;
        self.sflow.listener.validate("sflow")?;
        self.telegraf.validate("telegraf")?;
        self.windows.listener.validate("windows")?;
        if self.snmp.listener.enabled && self.snmp.poll_interval == 0 {
            return invalid("collection.snmp.pollInterval must be at least 1 second");
        }
        if self.sflow.listener.enabled {
            if self.sflow.sample_rate == 0 {
                return invalid("collection.sflow.sampleRate must be at least 1");
            }
            if self.sflow.agent_address.parse::<IpAddr>().is_err() {
                return invalid("collection.sflow.agentAddress is not an IP address");
            }
        }
        if self.windows.listener.enabled && self.windows.buffer_size == 0 {
            return invalid("collection.windows.bufferSize must be at least 1");
        }
        Ok(())
    }

    /// Ports claimed by enabled listeners, for clash detection.
    fn enabled_ports(&self) -> Vec<(&'static str, u16, Protocol)> {
        [
            ("syslog", &self.syslog),
            ("netflow", &self.netflow),
            ("snmp", &self.snmp.listener),
            ("sflow", &self.sflow.listener),
            ("telegraf", &self.telegraf),
            ("windows", &self.windows.listener),
        ]
        .into_iter()
        .filter(|(_, l)| l.enabled)
        .map(|(n, l)| (n, l.port, l.protocol))
        .collect()
    }
}

// ---------- forwarding ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub enabled: bool,
    pub target_host: String,
    pub target_port: u16,
    pub protocol: Protocol,
}

impl Target {
    fn new(port: u16, protocol: Protocol) -> Self {
        Self {
            enabled: false,
            target_host: String::new(),
            target_port: port,
            protocol,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.target_host.trim().is_empty() {
            return invalid(format!("forwarding.{name}.targetHost is required when enabled"));
        }
        if self.target_port == 0 {
            return invalid(format!("forwarding.{name}.targetPort must be non-zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyslogTarget {
    #[serde(flatten)]
    pub target: Target,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetflowTarget {
    #[serde(flatten)]
    pub target: Target,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpTarget {
    #[serde(flatten)]
    pub target: Target,
    pub community: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsTarget {
    #[serde(flatten)]
    pub target: Target,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Forwarding {
    pub syslog: SyslogTarget,
    pub netflow: NetflowTarget,
    pub snmp: SnmpTarget,
    pub metrics: MetricsTarget,
}

impl Default for Forwarding {
    fn default() -> Self {
        Self {
            syslog: SyslogTarget {
                target: Target::new(514, Protocol::Udp),
                format: "RFC3164".into(),
            },
            netflow: NetflowTarget {
                target: Target::new(2055, Protocol::Udp),
                version: "v9".into(),
            },
            snmp: SnmpTarget {
                target: Target::new(162, Protocol::Udp),
                community: "public".into(),
            },
            metrics: MetricsTarget {
                target: Target::new(9090, Protocol::Http),
                endpoint: "/api/v1/write".into(),
            },
        }
    }
}

impl Forwarding {
    fn validate(&self) -> Result<()> {
        self.syslog.target.validate("syslog")?;
        self.netflow.target.validate("netflow")?;
        self.snmp.target.validate("snmp")?;
        self.metrics.target.validate("metrics")?;
        if self.syslog.target.enabled && !matches!(self.syslog.format.as_str(), "RFC3164" | "RFC5424")
        {
            return invalid("forwarding.syslog.format must be RFC3164 or RFC5424");
        }
        if self.metrics.target.enabled && !self.metrics.endpoint.starts_with('/') {
            return invalid("forwarding.metrics.endpoint must start with '/'");
        }
        Ok(())
    }
}

// ---------- alerts ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Alerts {
    pub cpu_threshold: u8,
    pub memory_threshold: u8,
    pub disk_threshold: u8,
    pub network_threshold: u8,
    pub email_enabled: bool,
    pub email_server: String,
    pub email_port: u16,
    pub email_username: String,
    pub email_password: String,
    /// Comma-separated addresses.
    pub email_recipients: String,
}

impl Default for Alerts {
    fn default() -> Self {
        Self {
            cpu_threshold: 85,
            memory_threshold: 90,
            disk_threshold: 80,
            network_threshold: 95,
            email_enabled: false,
            email_server: String::new(),
            email_port: 587,
            email_username: String::new(),
            email_password: String::new(),
            email_recipients: String::new(),
        }
    }
}

impl Alerts {
    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("cpuThreshold", self.cpu_threshold),
            ("memoryThreshold", self.memory_threshold),
            ("diskThreshold", self.disk_threshold),
            ("networkThreshold", self.network_threshold),
        ] {
            if v > 100 {
                return invalid(format!("alerts.{name} must be between 0 and 100"));
            }
        }
        if self.email_enabled {
            if self.email_server.trim().is_empty() {
                return invalid("alerts.emailServer is required when email is enabled");
            }
            if self.email_port == 0 {
                return invalid("alerts.emailPort must be non-zero");
            }
            let recipients: Vec<&str> = self
                .email_recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .collect();
            if recipients.is_empty() {
                return invalid("alerts.emailRecipients is required when email is enabled");
            }
            if let Some(bad) = recipients.iter().find(|r| !r.contains('@')) {
                return invalid(format!("alerts.emailRecipients has an invalid address: {bad}"));
            }
        }
        Ok(())
    }
}

// ---------- retention ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Retention {
    pub netflow_days: u32,
    pub syslog_days: u32,
    pub metrics_days: u32,
    pub snmp_days: u32,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            netflow_days: 30,
            syslog_days: 90,
            metrics_days: 365,
            snmp_days: 180,
        }
    }
}

impl Retention {
    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("netflowDays", self.netflow_days),
            ("syslogDays", self.syslog_days),
            ("metricsDays", self.metrics_days),
            ("snmpDays", self.snmp_days),
        ] {
            if v == 0 {
                return invalid(format!("retention.{name} must be at least 1"));
            }
        }
        Ok(())
    }
}

// ---------- performance ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Performance {
    pub max_concurrent_flows: u32,
    pub buffer_size: String,
    pub compression_enabled: bool,
    pub indexing_enabled: bool,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            max_concurrent_flows: 10_000,
            buffer_size: "64MB".into(),
            compression_enabled: true,
            indexing_enabled: true,
        }
    }
}

impl Performance {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_flows == 0 {
            return invalid("performance.maxConcurrentFlows must be at least 1");
        }
        if parse_size(&self.buffer_size).is_none() {
            return invalid(format!(
                "performance.bufferSize is not a size like 64MB: {}",
                self.buffer_size
            ));
        }
        Ok(())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.collection.validate()?;
        self.forwarding.validate()?;
        self.alerts.validate()?;
        self.retention.validate()?;
        self.performance.validate()?;

        let ports = self.collection.enabled_ports();
        for (i, (a, port, proto)) in ports.iter().enumerate() {
            if let Some((b, _, _)) = ports[i + 1..]
                .iter()
                .find(|(_, p, pr)| p == port && pr == proto)
            {
                return invalid(format!(
                    "collection.{a} and collection.{b} both listen on port {port}"
                ));
            }
        }
        Ok(())
    }

    /// Deserialize and validate in one step. The payload is laid over the factory
    /// settings first, so any object may be partial down to a single field.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let mut merged = serde_json::to_value(Settings::default())?;
        merge(&mut merged, value);
        let settings: Settings =
            serde_json::from_value(merged).map_err(|e| Error::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Parses sizes such as `64MB`, `100GB`, `512K` into bytes.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let n: u64 = num.parse().ok()?;
    let mult: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        _ => return None,
    };
    n.checked_mul(mult)
}

// Objects merge key by key; anything else in `patch` replaces what is in `base`.
fn merge(base: &mut serde_json::Value, patch: serde_json::Value) {
    use serde_json::Value;
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, patch) => *slot = patch,
    }
}

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::InvalidSettings(msg.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn partial_payload_fills_defaults() {
        let s = Settings::from_json(json!({
            "collection": { "syslog": { "enabled": true, "port": 1514, "protocol": "TCP", "bindAddress": "127.0.0.1" } },
            "retention": { "netflowDays": 7 }
        }))
        .unwrap();
        assert_eq!(s.collection.syslog.port, 1514);
        assert_eq!(s.collection.syslog.protocol, Protocol::Tcp);
        assert_eq!(s.collection.netflow.port, 2055);
        assert_eq!(s.retention.netflow_days, 7);
        assert_eq!(s.retention.syslog_days, 90);
    }

    #[test]
    fn single_field_of_a_collector_is_enough() {
        let s = Settings::from_json(json!({ "collection": { "syslog": { "port": 1514 } } }))
            .unwrap();
        assert_eq!(s.collection.syslog.port, 1514);
        assert!(s.collection.syslog.enabled);
        assert_eq!(s.collection.syslog.protocol, Protocol::Udp);
        assert_eq!(s.collection.syslog.bind_address, "0.0.0.0");

        let s = Settings::from_json(json!({
            "collection": { "snmp": { "pollInterval": 60 } },
            "forwarding": { "netflow": { "targetHost": "10.0.0.9" } }
        }))
        .unwrap();
        assert_eq!(s.collection.snmp.poll_interval, 60);
        assert_eq!(s.collection.snmp.listener.port, 161);
        assert_eq!(s.forwarding.netflow.target.target_host, "10.0.0.9");
        assert_eq!(s.forwarding.netflow.target.target_port, 2055);
        assert_eq!(s.forwarding.netflow.version, "v9");
    }

    #[test]
    fn merge_replaces_scalars_and_keeps_unmentioned_keys() {
        let mut base = json!({ "a": { "b": 1, "c": [1, 2] }, "d": true });
        merge(&mut base, json!({ "a": { "c": [3] }, "e": "new" }));
        assert_eq!(base, json!({ "a": { "b": 1, "c": [3] }, "d": true, "e": "new" }));
    }

    #[test]
    fn serializes_with_dashboard_names() {
        let v = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(v["collection"]["snmp"]["pollInterval"], 300);
        assert_eq!(v["collection"]["snmp"]["port"], 161);
        assert_eq!(v["forwarding"]["metrics"]["endpoint"], "/api/v1/write");
        assert_eq!(v["alerts"]["cpuThreshold"], 85);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut s = Settings::default();
        s.alerts.disk_threshold = 101;
        assert!(matches!(s.validate(), Err(Error::InvalidSettings(_))));

        let mut s = Settings::default();
        s.retention.snmp_days = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.collection.syslog.port = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.forwarding.syslog.target.enabled = true;
        assert!(s.validate().is_err(), "enabled target without host");
    }

    #[test]
    fn rejects_port_clash_between_listeners() {
        let mut s = Settings::default();
        s.collection.telegraf.port = 514;
        let err = s.validate().unwrap_err().to_string();
        assert!(err.contains("syslog") && err.contains("telegraf"), "{err}");
    }

    #[test]
    fn rejects_wrong_types() {
        let err = Settings::from_json(json!({ "alerts": { "cpuThreshold": "high" } }));
        assert!(matches!(err, Err(Error::InvalidSettings(_))));
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("64MB"), Some(64 << 20));
        assert_eq!(parse_size("100GB"), Some(100 << 30));
        assert_eq!(parse_size("512"), Some(512));
        assert_eq!(parse_size("lots"), None);
    }
}
