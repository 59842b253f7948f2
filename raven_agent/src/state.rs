//! Shared agent state handed to every HTTP and WebSocket handler.

use crate::aggregator::StatusAggregator;
use crate::broadcast::Broadcaster;
use crate::config::AgentConfig;
use crate::probe::{CommandRunner, HostResources, ProcessInspector, ResourceProbe, ShellRunner};
use crate::sampler::TelemetrySampler;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<StatusAggregator>,
    pub broadcaster: Broadcaster,
    pub config: Arc<AgentConfig>,
    // process start; health uptime is measured from here
    pub started: Instant,
}

impl AppState {
    /// Wire the inspection stack over the given seams and start the broadcaster.
    /// The returned handle completes after `broadcaster.shutdown()`.
    pub fn new(
        config: AgentConfig,
        runner: Arc<dyn CommandRunner>,
        resources: Arc<dyn ResourceProbe>,
    ) -> (Self, JoinHandle<()>) {
        let started = Instant::now();
        let inspector = ProcessInspector::new(runner.clone(), resources, config.data_dir.clone());
        let sampler = TelemetrySampler::new(config.data_dir.clone(), runner);
        let aggregator = Arc::new(StatusAggregator::new(inspector, sampler, started));
        let (broadcaster, task) = Broadcaster::spawn(aggregator.clone(), config.broadcast_interval);
        (
            Self {
                aggregator,
                broadcaster,
                config: Arc::new(config),
                started,
            },
            task,
        )
    }

    /// Real host: shell commands with the configured timeout and sysinfo-backed resources.
    pub fn for_host(config: AgentConfig) -> (Self, JoinHandle<()>) {
        let runner = Arc::new(ShellRunner::new(config.command_timeout));
        Self::new(config, runner, Arc::new(HostResources::new()))
    }
}
