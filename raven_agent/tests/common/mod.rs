//! Fakes and wiring shared by the integration tests.
#![allow(dead_code)]

use futures_util::future::{BoxFuture, FutureExt};
use raven_agent::config::AgentConfig;
use raven_agent::probe::{CommandRunner, ResourceProbe};
use raven_agent::state::AppState;
use raven_agent::types::NetworkIo;
use raven_agent::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Canned stdout per program; anything else fails like a missing binary.
#[derive(Default)]
pub struct CannedRunner(HashMap<String, String>);

impl CannedRunner {
    pub fn with(mut self, program: &str, stdout: &str) -> Self {
        self.0.insert(program.into(), stdout.into());
        self
    }
}

impl CommandRunner for CannedRunner {
    fn run<'a>(&'a self, program: &'a str, _args: &'a [&'a str]) -> BoxFuture<'a, Result<String>> {
        async move {
            self.0.get(program).cloned().ok_or_else(|| Error::CommandFailed {
                command: program.into(),
                reason: "not found".into(),
            })
        }
        .boxed()
    }
}

pub struct QuietHost;

impl ResourceProbe for QuietHost {
    fn cpu_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async { Ok(12.5) }.boxed()
    }
    fn memory_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async { Ok(40.0) }.boxed()
    }
    fn disk_percent<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<f32>> {
        async { Ok(55.0) }.boxed()
    }
    fn network_io(&self) -> BoxFuture<'_, Result<NetworkIo>> {
        async {
            Ok(NetworkIo {
                rx_bytes: 4096,
                tx_bytes: 1024,
            })
        }
        .boxed()
    }
}

pub const PS_ALL_UP: &str = "\
USER PID COMMAND
root 1 nginx: master process nginx
root 2 /fluent-bit/bin/fluent-bit -c /etc/fluent-bit/fluent-bit.conf
root 3 goflow2 -listen netflow://:2055
root 4 vector --config /etc/vector/vector.toml
root 5 telegraf --config /etc/telegraf/telegraf.conf
";

pub fn config(data_dir: &Path, interval: Duration) -> AgentConfig {
    AgentConfig {
        data_dir: data_dir.to_path_buf(),
        log_dir: data_dir.join("logs"),
        broadcast_interval: interval,
        ..AgentConfig::default()
    }
}

pub fn state(data_dir: &Path, runner: CannedRunner, interval: Duration) -> (AppState, JoinHandle<()>) {
    AppState::new(config(data_dir, interval), Arc::new(runner), Arc::new(QuietHost))
}
