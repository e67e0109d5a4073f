//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Container health probe and activation adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use warden_common::ActivationConfig;

use crate::command::{CommandError, CommandRunner, CommandSpec, TokioCommandRunner};

/// Failure to make a newly written endpoint live.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    /// The activation command failed.
    #[error("activation command failed: {0}")]
    Command(#[from] CommandError),
}

/// Applies the persisted endpoint configuration to the running tunnel.
#[async_trait]
pub trait ActivationTrigger: Send + Sync {
    /// Primary activation, expected to pick up the new configuration.
    async fn activate(&self) -> Result<(), ActivationError>;

    /// Cruder fallback used once when [`ActivationTrigger::activate`] fails.
    async fn activate_fallback(&self) -> Result<(), ActivationError>;
}

/// Recreates the tunnel service through compose, falling back to a plain restart.
pub struct DockerActivation {
    compose_bin: String,
    compose_file: Option<PathBuf>,
    service: String,
    runtime: String,
    container: String,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for DockerActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerActivation")
            .field("compose_bin", &self.compose_bin)
            .field("compose_file", &self.compose_file)
            .field("service", &self.service)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl DockerActivation {
    /// Activation using the configured commands.
    pub fn from_config(config: &ActivationConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioCommandRunner))
    }

    /// Activation with a custom command runner.
    pub fn with_runner(config: &ActivationConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            compose_bin: config.compose_bin.clone(),
            compose_file: config.compose_file.clone(),
            service: config.service.clone(),
            runtime: config.runtime.clone(),
            container: config.container.clone(),
            timeout: config.timeout,
            runner,
        }
    }

    /// Compose invocation; `-f` is passed only when the file exists.
    fn recreate_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.compose_bin);
        if let Some(file) = self.compose_file.as_ref().filter(|file| file.exists()) {
            spec = spec.arg("-f").arg(file.display().to_string());
        }
        spec.args(["up", "-d", "--force-recreate"]).arg(&self.service)
    }

    fn restart_command(&self) -> CommandSpec {
        CommandSpec::new(&self.runtime)
            .arg("restart")
            .arg(&self.container)
    }
}

#[async_trait]
impl ActivationTrigger for DockerActivation {
    async fn activate(&self) -> Result<(), ActivationError> {
        info!(service = %self.service, "recreating tunnel service");
        self.runner
            .run(&self.recreate_command(), self.timeout)
            .await?;
        Ok(())
    }

    async fn activate_fallback(&self) -> Result<(), ActivationError> {
        info!(container = %self.container, "restarting tunnel container");
        self.runner
            .run(&self.restart_command(), self.timeout)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingRunner;

    fn config(compose_file: Option<PathBuf>) -> ActivationConfig {
        ActivationConfig {
            compose_file,
            ..ActivationConfig::default()
        }
    }

    #[tokio::test]
    async fn compose_file_is_used_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("docker-compose.yml");
        std::fs::write(&present, "services: {}\n").unwrap();

        let runner = RecordingRunner::default();
        let with_file = DockerActivation::with_runner(&config(Some(present.clone())), Arc::new(runner.clone()));
        with_file.activate().await.unwrap();

        let without = DockerActivation::with_runner(
            &config(Some(dir.path().join("absent.yml"))),
            Arc::new(runner.clone()),
        );
        without.activate().await.unwrap();

        let calls = runner.calls();
        assert_eq!(
            calls[0].0.to_string(),
            format!(
                "docker-compose -f {} up -d --force-recreate gluetun",
                present.display()
            )
        );
        assert_eq!(calls[1].0.to_string(), "docker-compose up -d --force-recreate gluetun");
        assert_eq!(calls[1].1, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn fallback_restarts_container() {
        let runner = RecordingRunner::scripted([false]);
        let activation = DockerActivation::with_runner(&config(None), Arc::new(runner.clone()));

        let err = activation.activate_fallback().await.unwrap_err();
        assert!(matches!(err, ActivationError::Command(CommandError::Failed { .. })));
        assert_eq!(runner.calls()[0].0.to_string(), "docker restart gluetun");
    }
}
