//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Container health probe and activation adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use warden_common::ProbeConfig;

use crate::command::{CommandRunner, CommandSpec, TokioCommandRunner};

/// Slack added on top of `timeout × attempts` for process start-up.
const PROBE_GRACE: Duration = Duration::from_secs(5);

/// Answers whether traffic currently flows through the tunnel.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Whether `target` answers within `timeout` per attempt.
    ///
    /// Any failure to run the probe counts as unreachable.
    async fn is_reachable(&self, target: &str, timeout: Duration, attempts: u32) -> bool;
}

/// Pings a target from inside the tunnel container.
pub struct ContainerPingProbe {
    runtime: String,
    container: String,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for ContainerPingProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerPingProbe")
            .field("runtime", &self.runtime)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl ContainerPingProbe {
    /// Probe using the configured runtime and container.
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioCommandRunner))
    }

    /// Probe with a custom command runner.
    pub fn with_runner(config: &ProbeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runtime: config.runtime.clone(),
            container: config.container.clone(),
            runner,
        }
    }

    fn command(&self, target: &str, timeout: Duration, attempts: u32) -> CommandSpec {
        CommandSpec::new(&self.runtime)
            .args(["exec", "-i"])
            .arg(&self.container)
            .args(["ping", "-c"])
            .arg(attempts.to_string())
            .arg("-W")
            .arg(timeout.as_secs().max(1).to_string())
            .arg(target)
    }
}

#[async_trait]
impl HealthProbe for ContainerPingProbe {
    async fn is_reachable(&self, target: &str, timeout: Duration, attempts: u32) -> bool {
        let spec = self.command(target, timeout, attempts);
        let budget = timeout.saturating_mul(attempts.max(1)) + PROBE_GRACE;
        match self.runner.run(&spec, budget).await {
            Ok(_) => true,
            Err(err) => {
                debug!(target_host = target, error = %err, "reachability probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;

    #[tokio::test]
    async fn pings_inside_container_with_bounded_budget() {
        let runner = RecordingRunner::scripted([true]);
        let probe = ContainerPingProbe::with_runner(&ProbeConfig::default(), Arc::new(runner.clone()));

        assert!(probe.is_reachable("8.8.8.8", Duration::from_secs(2), 3).await);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let (spec, budget) = &calls[0];
        assert_eq!(
            spec.to_string(),
            "docker exec -i gluetun ping -c 3 -W 2 8.8.8.8"
        );
        assert_eq!(*budget, Duration::from_secs(11));
    }

    #[tokio::test]
    async fn failed_command_reads_as_unreachable() {
        let runner = RecordingRunner::scripted([false]);
        let probe = ContainerPingProbe::with_runner(&ProbeConfig::default(), Arc::new(runner));
        assert!(!probe.is_reachable("8.8.8.8", Duration::from_secs(2), 3).await);
    }
}
