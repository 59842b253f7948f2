//! Process Inspector: which collector processes are running, and host CPU/memory/disk/
//! network figures.
//!
//! Both halves degrade instead of failing. A broken `ps` reports every service as down;
//! a broken measurement reports that one figure as 0.

use crate::config::SERVICES;
use crate::error::{Error, Result};
use crate::types::{NetworkIo, ResourceMetrics, Services};
use futures_util::future::{BoxFuture, FutureExt};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Runs an external inspection command and returns its stdout.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, program: &'a str, args: &'a [&'a str]) -> BoxFuture<'a, Result<String>>;
}

/// Spawns real processes, bounded by a timeout. The child is killed if the timeout fires.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ShellRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [&'a str]) -> BoxFuture<'a, Result<String>> {
        async move {
            let command = std::iter::once(program)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            let child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output();
            let output = match tokio::time::timeout(self.timeout, child).await {
                Ok(res) => res?,
                Err(_) => {
                    return Err(Error::CommandTimeout {
                        command,
                        timeout: self.timeout,
                    })
                }
            };
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::CommandFailed {
                    command,
                    reason: format!("{} {}", output.status, stderr.trim()),
                });
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        .boxed()
    }
}

/// Host resource counters. Each figure is sampled independently.
pub trait ResourceProbe: Send + Sync {
    fn cpu_percent(&self) -> BoxFuture<'_, Result<f32>>;
    fn memory_percent(&self) -> BoxFuture<'_, Result<f32>>;
    /// Usage of the filesystem holding `path`.
    fn disk_percent<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<f32>>;
    fn network_io(&self) -> BoxFuture<'_, Result<NetworkIo>>;
}

/// sysinfo-backed probe. Handles are kept for the process lifetime so CPU usage is a
/// delta between consecutive samples; the first CPU sample reads 0.
pub struct HostResources {
    cpu: Mutex<System>,
    mem: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
}

impl HostResources {
    pub fn new() -> Self {
        let cpu = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
        );
        let mem = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            cpu: Mutex::new(cpu),
            mem: Mutex::new(mem),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }
}

impl Default for HostResources {
    fn default() -> Self {
        Self::new()
    }
}

// sysinfo refreshes have been seen to panic on odd /proc contents; keep that local.
fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> Result<T> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|e| {
        warn!("sysinfo {what} refresh panicked: {e:?}");
        Error::Unavailable(what.to_string())
    })
}

impl ResourceProbe for HostResources {
    fn cpu_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async move {
            let mut sys = self.cpu.lock().await;
            guarded("cpu", || {
                sys.refresh_cpu_usage();
                sys.global_cpu_usage()
            })
        }
        .boxed()
    }

    fn memory_percent(&self) -> BoxFuture<'_, Result<f32>> {
        async move {
            let mut sys = self.mem.lock().await;
            let (total, available) = guarded("memory", || {
                sys.refresh_memory();
                (sys.total_memory(), sys.available_memory())
            })?;
            if total == 0 {
                return Err(Error::Unavailable("memory".into()));
            }
            let used = total.saturating_sub(available);
            Ok((used as f64 / total as f64 * 100.0) as f32)
        }
        .boxed()
    }

    fn disk_percent<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<f32>> {
        async move {
            let mut disks = self.disks.lock().await;
            guarded("disk", || disks.refresh(true))?;
            let disk = disks
                .iter()
                .filter(|d| path.starts_with(d.mount_point()))
                .max_by_key(|d| d.mount_point().as_os_str().len())
                .ok_or_else(|| Error::Unavailable(format!("disk for {}", path.display())))?;
            let total = disk.total_space();
            if total == 0 {
                return Err(Error::Unavailable(format!("disk for {}", path.display())));
            }
            let used = total.saturating_sub(disk.available_space());
            Ok((used as f64 / total as f64 * 100.0) as f32)
        }
        .boxed()
    }

    fn network_io(&self) -> BoxFuture<'_, Result<NetworkIo>> {
        async move {
            let mut nets = self.networks.lock().await;
            guarded("network", || nets.refresh(true))?;
            Ok(nets.iter().fold(NetworkIo::default(), |acc, (_, data)| NetworkIo {
                rx_bytes: acc.rx_bytes.saturating_add(data.total_received()),
                tx_bytes: acc.tx_bytes.saturating_add(data.total_transmitted()),
            }))
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
struct ServiceMatcher {
    name: String,
    needle: String,
}

/// Samples collector service state and host resources for one data root.
#[derive(Clone)]
pub struct ProcessInspector {
    runner: Arc<dyn CommandRunner>,
    resources: Arc<dyn ResourceProbe>,
    services: Vec<ServiceMatcher>,
    data_dir: PathBuf,
}

impl ProcessInspector {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resources: Arc<dyn ResourceProbe>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            resources,
            services: SERVICES
                .iter()
                .map(|(name, needle)| ServiceMatcher {
                    name: name.to_string(),
                    needle: needle.to_string(),
                })
                .collect(),
            data_dir: data_dir.into(),
        }
    }

    /// Every configured service reported as not running.
    pub fn all_down(&self) -> Services {
        self.services.iter().map(|s| (s.name.clone(), false)).collect()
    }

    /// Running state of each configured service from `ps aux`. If `ps` itself fails the
    /// services read as down: inspection failure and service failure look the same here.
    pub async fn sample_services(&self) -> Services {
        match self.runner.run("ps", &["aux"]).await {
            Ok(table) => self.match_process_table(&table),
            Err(e) => {
                debug!("process inspection failed, reporting services down: {e}");
                self.all_down()
            }
        }
    }

    fn match_process_table(&self, table: &str) -> Services {
        self.services
            .iter()
            .map(|s| {
                let running = table.lines().any(|line| line.contains(&s.needle));
                (s.name.clone(), running)
            })
            .collect()
    }

    /// CPU, memory, disk and network figures sampled concurrently; each one that fails
    /// reads as 0 without affecting the others.
    pub async fn sample_resource_metrics(&self) -> ResourceMetrics {
        let (cpu, mem, disk, net) = tokio::join!(
            self.resources.cpu_percent(),
            self.resources.memory_percent(),
            self.resources.disk_percent(&self.data_dir),
            self.resources.network_io(),
        );
        ResourceMetrics {
            cpu_usage_percent: percent_or_zero("cpu", cpu),
            memory_usage_percent: percent_or_zero("memory", mem),
            disk_usage_percent: percent_or_zero("disk", disk),
            network_io: net.unwrap_or_else(|e| {
                debug!("network sample failed: {e}");
                NetworkIo::default()
            }),
        }
    }
}

fn percent_or_zero(what: &str, sample: Result<f32>) -> f32 {
    match sample {
        Ok(v) if v.is_finite() => v.clamp(0.0, 100.0),
        Ok(v) => {
            debug!("{what} sample was not finite: {v}");
            0.0
        }
        Err(e) => {
            debug!("{what} sample failed: {e}");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingRunner, FixedResources, ScriptedRunner};

    const PS: &str = "\
USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND
root 10 0.0 0.1 1 1 ? Ss 10:00 0:00 nginx: master process /usr/sbin/nginx
www  11 0.0 0.1 1 1 ? S  10:00 0:00 nginx: worker process
root 12 1.0 2.0 1 1 ? Sl 10:00 0:10 /usr/bin/goflow2 -listen netflow://:2055
root 13 0.5 1.0 1 1 ? Sl 10:00 0:03 /opt/fluent-bit/bin/fluent-bit -c /etc/fluent-bit.conf
";

    fn inspector(runner: Arc<dyn CommandRunner>, res: FixedResources) -> ProcessInspector {
        ProcessInspector::new(runner, Arc::new(res), "/data")
    }

    #[tokio::test]
    async fn services_are_matched_from_process_table() {
        let insp = inspector(
            Arc::new(ScriptedRunner::new().with("ps", PS)),
            FixedResources::default(),
        );
        let s = insp.sample_services().await;
        assert_eq!(s.len(), SERVICES.len());
        assert!(s["nginx"]);
        assert!(s["goflow2"]);
        assert!(s["fluent-bit"]);
        assert!(!s["vector"]);
        assert!(!s["telegraf"]);
    }

    #[tokio::test]
    async fn nginx_workers_alone_do_not_count() {
        let insp = inspector(
            Arc::new(ScriptedRunner::new().with("ps", "www 11 nginx: worker process\n")),
            FixedResources::default(),
        );
        assert!(!insp.sample_services().await["nginx"]);
    }

    #[tokio::test]
    async fn failed_inspection_reports_every_service_down() {
        let insp = inspector(Arc::new(FailingRunner), FixedResources::default());
        let s = insp.sample_services().await;
        let names: Vec<&str> = SERVICES.iter().map(|(n, _)| *n).collect();
        assert_eq!(s.keys().map(String::as_str).collect::<Vec<_>>().len(), names.len());
        for n in names {
            assert_eq!(s.get(n), Some(&false), "{n}");
        }
    }

    #[tokio::test]
    async fn one_failed_metric_does_not_zero_the_others() {
        let res = FixedResources {
            cpu: Ok(12.5),
            memory: Err(()),
            disk: Ok(140.0),
            network: Ok(NetworkIo {
                rx_bytes: 10,
                tx_bytes: 20,
            }),
        };
        let m = inspector(Arc::new(FailingRunner), res)
            .sample_resource_metrics()
            .await;
        assert_eq!(m.cpu_usage_percent, 12.5);
        assert_eq!(m.memory_usage_percent, 0.0);
        assert_eq!(m.disk_usage_percent, 100.0, "clamped");
        assert_eq!(m.network_io.tx_bytes, 20);
    }

    #[tokio::test]
    async fn shell_runner_reports_missing_binary() {
        let r = ShellRunner::new(Duration::from_secs(2));
        let err = r
            .run("raven-definitely-not-a-command", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_times_out() {
        let r = ShellRunner::new(Duration::from_millis(100));
        let err = r.run("sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_runner_captures_stdout_and_exit_status() {
        let r = ShellRunner::new(Duration::from_secs(2));
        assert_eq!(r.run("echo", &["hello"]).await.unwrap().trim(), "hello");
        assert!(matches!(
            r.run("false", &[]).await,
            Err(Error::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn host_resources_stay_in_range() {
        let host = HostResources::new();
        let insp = ProcessInspector::new(Arc::new(FailingRunner), Arc::new(host), "/");
        let m = insp.sample_resource_metrics().await;
        for v in [m.cpu_usage_percent, m.memory_usage_percent, m.disk_usage_percent] {
            assert!((0.0..=100.0).contains(&v), "{v}");
        }
    }
}
