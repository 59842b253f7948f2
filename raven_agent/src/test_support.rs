//! Fakes for the inspection seams, shared by unit tests.

use crate::error::{Error, Result};
use crate::probe::{CommandRunner, ResourceProbe};
use crate::types::NetworkIo;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Every command fails as if the binary were missing.
pub struct FailingRunner;

impl CommandRunner for FailingRunner {
    fn run<'a>(&'a self, program: &'a str, _args: &'a [&'a str]) -> BoxFuture<'a, Result<String>> {
        async move {
            Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{program}: not found"),
            )))
        }
        .boxed()
    }
}

/// Canned stdout per program name; unknown programs fail. Counts calls per program.
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: HashMap<String, String>,
    calls: std::sync::Mutex<HashMap<String, usize>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, program: &str, stdout: &str) -> Self {
        self.outputs.insert(program.to_string(), stdout.to_string());
        self
    }

    pub fn calls(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(program)
            .copied()
            .unwrap_or(0)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, _args: &'a [&'a str]) -> BoxFuture<'a, Result<String>> {
        async move {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(program.to_string())
                .or_default() += 1;
            self.outputs
                .get(program)
                .cloned()
                .ok_or_else(|| Error::CommandFailed {
                    command: program.to_string(),
                    reason: "not scripted".into(),
                })
        }
        .boxed()
    }
}

/// Fixed resource figures; `Err(())` makes that one measurement fail.
pub struct FixedResources {
    pub cpu: std::result::Result<f32, ()>,
    pub memory: std::result::Result<f32, ()>,
    pub disk: std::result::Result<f32, ()>,
    pub network: std::result::Result<NetworkIo, ()>,
}

impl Default for FixedResources {
    fn default() -> Self {
        Self {
            cpu: Ok(10.0),
            memory: Ok(20.0),
            disk: Ok(30.0),
            network: Ok(NetworkIo {
                rx_bytes: 1000,
                tx_bytes: 2000,
            }),
        }
    }
}

fn fixed<T: Copy>(what: &str, v: &std::result::Result<T, ()>) -> Result<T> {
    v.map_err(|_| Error::Unavailable(what.to_string()))
}

impl ResourceProbe for FixedResources {
    fn cpu_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async move { fixed("cpu", &self.cpu) }.boxed()
    }

    fn memory_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async move { fixed("memory", &self.memory) }.boxed()
    }

    fn disk_percent<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<f32>> {
        async move { fixed("disk", &self.disk) }.boxed()
    }

    fn network_io(&self) -> BoxFuture<'_, Result<NetworkIo>> {
        async move { fixed("network", &self.network) }.boxed()
    }
}

/// Panics on every CPU sample, standing in for a collaborator bug.
pub struct PanickingResources {
    pub cpu_calls: AtomicUsize,
}

impl PanickingResources {
    pub fn new() -> Self {
        Self {
            cpu_calls: AtomicUsize::new(0),
        }
    }
}

fn explode() -> Result<f32> {
    panic!("cpu counter exploded")
}

impl ResourceProbe for PanickingResources {
    fn cpu_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async move {
            self.cpu_calls.fetch_add(1, Ordering::Relaxed);
            explode()
        }
        .boxed()
    }

    fn memory_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async move { Ok(50.0) }.boxed()
    }

    fn disk_percent<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<f32>> {
        async move { Ok(50.0) }.boxed()
    }

    fn network_io(&self) -> BoxFuture<'_, Result<NetworkIo>> {
        async move { Ok(NetworkIo::default()) }.boxed()
    }
}
