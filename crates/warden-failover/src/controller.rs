//! ---
//! warden_section: "07-resilience-fault-tolerance"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Endpoint selection and failover control loop."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Dual-interval monitoring loop.
//!
//! Each pass is a transition `step(ControllerState) -> ControllerState`. The
//! health timer runs on a short period; the load timer runs on a long period
//! or immediately after an unhealthy probe. A switch writes the endpoint
//! store, activates the tunnel, waits for it to settle, and restarts both
//! timers.
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};
use warden_adapters::{ActivationTrigger, HealthProbe};
use warden_common::time::is_due;
use warden_common::{AppConfig, Clock, ProbeConfig, TimingConfig};
use warden_directory::{DirectorySession, Endpoint};
use warden_envstore::EnvStore;
use warden_logging::{log_system_event, LogContext, SystemEventOutcome};
use warden_metrics::FailoverMetrics;

use crate::policy::{decide, SwitchReason};
use crate::selector::{select_candidates, LocalityFilter};

/// Timers owned by the controller. `None` means never run, which is always due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub last_health_check: Option<Instant>,
    pub last_load_check: Option<Instant>,
}

impl ControllerState {
    /// Both timers restarted at `now`.
    pub fn settled_at(now: Instant) -> Self {
        Self {
            last_health_check: Some(now),
            last_load_check: Some(now),
        }
    }
}

/// How the tunnel was activated after a store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Primary,
    Fallback,
    Failed,
}

impl ActivationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationOutcome::Primary => "primary",
            ActivationOutcome::Fallback => "fallback",
            ActivationOutcome::Failed => "failed",
        }
    }
}

/// What a load cycle ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No switch was warranted.
    Held,
    /// A switch was wanted or possible but no candidate passed the filter.
    NoCandidate,
    /// The store write failed; nothing was activated.
    WriteFailed,
    /// The store was updated and activation attempted.
    Switched(ActivationOutcome),
}

/// Summary of the most recent load cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub healthy: bool,
    pub current: Option<String>,
    pub current_load: u8,
    pub best: Option<String>,
    pub best_load: u8,
    pub should_switch: bool,
    pub target: Option<String>,
    pub reason: SwitchReason,
    pub outcome: CycleOutcome,
}

/// Self-healing endpoint controller.
pub struct FailoverController {
    session: DirectorySession,
    probe: Box<dyn HealthProbe>,
    activation: Box<dyn ActivationTrigger>,
    store: EnvStore,
    clock: Arc<dyn Clock>,
    filter: LocalityFilter,
    timing: TimingConfig,
    probe_settings: ProbeConfig,
    metrics: Option<FailoverMetrics>,
    cycle: u64,
    last_report: Option<CycleReport>,
}

impl std::fmt::Debug for FailoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverController")
            .field("store", &self.store)
            .field("filter", &self.filter)
            .field("timing", &self.timing)
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

impl FailoverController {
    pub fn new(
        config: &AppConfig,
        session: DirectorySession,
        probe: Box<dyn HealthProbe>,
        activation: Box<dyn ActivationTrigger>,
        store: EnvStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            probe,
            activation,
            store,
            clock,
            filter: LocalityFilter::from_config(&config.locality),
            timing: config.timing.clone(),
            probe_settings: config.probe.clone(),
            metrics: None,
            cycle: 0,
            last_report: None,
        }
    }

    pub fn with_metrics(mut self, metrics: FailoverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Report of the most recent load cycle, if one ran.
    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    fn metrics(&self, record: impl FnOnce(&FailoverMetrics)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }

    /// Run one pass of the loop.
    ///
    /// Returns early when healthy and the load timer is not yet due. The
    /// caller sleeps a tick between passes.
    pub async fn step(&mut self, state: ControllerState) -> Result<ControllerState> {
        let now = self.clock.now();
        let mut state = state;

        if is_due(state.last_health_check, now, self.timing.health_interval) {
            state.last_health_check = Some(now);
            if self.probe_health().await {
                if !is_due(state.last_load_check, now, self.timing.load_interval) {
                    return Ok(state);
                }
            } else {
                warn!("unhealthy connection detected; initiating immediate failover");
                state.last_load_check = None;
            }
        }

        if is_due(state.last_load_check, now, self.timing.load_interval) {
            state.last_load_check = Some(now);
            let span = info_span!("load_cycle", cycle = self.cycle + 1);
            if let CycleOutcome::Switched(_) = self.load_cycle().instrument(span).await? {
                state = ControllerState::settled_at(self.clock.now());
            }
        }

        Ok(state)
    }

    async fn probe_health(&self) -> bool {
        let healthy = self
            .probe
            .is_reachable(
                &self.probe_settings.target,
                self.probe_settings.timeout,
                self.probe_settings.attempts,
            )
            .await;
        debug!(healthy, probe_target = %self.probe_settings.target, "health probe finished");
        self.metrics(|m| m.record_health(healthy));
        healthy
    }

    async fn load_cycle(&mut self) -> Result<CycleOutcome> {
        self.cycle += 1;
        let cycle = self.cycle;

        let endpoints = self.session.fetch_endpoints().await;
        self.metrics(|m| m.record_poll(endpoints.len()));
        let current = self
            .store
            .current_endpoint()
            .with_context(|| format!("failed to read {}", self.store.path().display()))?;
        let healthy = self.probe_health().await;

        let selection = select_candidates(&endpoints, &self.filter, current.as_deref());
        let best = selection.best();
        info!(
            cycle,
            health = if healthy { "OK" } else { "BAD" },
            current = current.as_deref().unwrap_or("none"),
            current_load = selection.current_load,
            best = best.map_or("none", |e| e.name.as_str()),
            best_load = selection.best_load(),
            candidates = selection.candidates.len(),
            "endpoint status"
        );
        self.metrics(|m| m.set_current_load(selection.current_load));

        let decision = decide(healthy, &selection, current.as_deref());
        if best.is_none() {
            warn!(
                cycle,
                cities = %self.filter.cities().join(", "),
                country = self.filter.country().unwrap_or("any"),
                "no active servers found"
            );
        }

        let outcome = match decision.target.filter(|_| decision.should_switch) {
            Some(target) => self.switch_to(cycle, current.as_deref(), target, decision.reason).await,
            None if best.is_none() => CycleOutcome::NoCandidate,
            None => CycleOutcome::Held,
        };

        self.last_report = Some(CycleReport {
            cycle,
            healthy,
            current: current.clone(),
            current_load: selection.current_load,
            best: best.map(|e| e.name.clone()),
            best_load: selection.best_load(),
            should_switch: decision.should_switch,
            target: decision.target.map(|e| e.name.clone()),
            reason: decision.reason,
            outcome,
        });
        Ok(outcome)
    }

    async fn switch_to(
        &self,
        cycle: u64,
        current: Option<&str>,
        target: &Endpoint,
        reason: SwitchReason,
    ) -> CycleOutcome {
        let mut ctx = LogContext::new()
            .with_cycle(cycle)
            .with_target(&target.name)
            .with_reason(reason.as_str());
        if let Some(current) = current {
            ctx = ctx.with_current(current);
        }
        if let SwitchReason::LoadOptimization { current_load, best_load } = reason {
            info!(cycle, current_load, best_load, "live endpoint exceeds load margin");
        }
        log_system_event(Some(&ctx), "switch.start", "initiating switch", SystemEventOutcome::Success);
        self.metrics(|m| m.record_switch(reason.as_str()));

        if let Err(err) = self.store.write_endpoint(target) {
            self.metrics(|m| m.record_store_failure());
            log_system_event(
                Some(&ctx),
                "switch.write",
                &format!("endpoint store update failed: {err}"),
                SystemEventOutcome::Fault,
            );
            return CycleOutcome::WriteFailed;
        }

        let activation = self.activate(&ctx).await;
        self.metrics(|m| m.record_activation(activation.as_str()));

        info!(
            cycle,
            pause_secs = self.timing.stabilization.as_secs(),
            "waiting for tunnel to settle"
        );
        self.clock.sleep(self.timing.stabilization).await;
        CycleOutcome::Switched(activation)
    }

    async fn activate(&self, ctx: &LogContext<'_>) -> ActivationOutcome {
        let primary = match self.activation.activate().await {
            Ok(()) => {
                log_system_event(Some(ctx), "switch.activate", "tunnel recreated", SystemEventOutcome::Success);
                return ActivationOutcome::Primary;
            }
            Err(err) => err,
        };
        log_system_event(
            Some(ctx),
            "switch.activate",
            &format!("primary activation failed: {primary}"),
            SystemEventOutcome::Degraded,
        );

        match self.activation.activate_fallback().await {
            Ok(()) => {
                log_system_event(
                    Some(ctx),
                    "switch.fallback",
                    "tunnel restarted without recreation",
                    SystemEventOutcome::Degraded,
                );
                ActivationOutcome::Fallback
            }
            Err(err) => {
                log_system_event(
                    Some(ctx),
                    "switch.fallback",
                    &format!("fallback activation failed: {err}"),
                    SystemEventOutcome::Fault,
                );
                ActivationOutcome::Failed
            }
        }
    }

    /// Drive the loop until `shutdown` fires.
    ///
    /// Errors escaping a pass are logged, followed by the backoff pause and
    /// a restart with fresh timers. Shutdown is observed between passes only.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            health_interval_secs = self.timing.health_interval.as_secs(),
            load_interval_secs = self.timing.load_interval.as_secs(),
            cities = %self.filter.cities().join(", "),
            "failover controller started"
        );
        let mut state = ControllerState::default();
        loop {
            let pause = match self.step(state).await {
                Ok(next) => {
                    state = next;
                    self.timing.tick
                }
                Err(err) => {
                    error!(error = ?err, "controller pass failed");
                    self.metrics(|m| m.record_loop_error());
                    state = ControllerState::default();
                    self.timing.error_backoff
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("shutdown requested; stopping failover controller");
                    return Ok(());
                }
                _ = self.clock.sleep(pause) => {}
            }
        }
    }
}
