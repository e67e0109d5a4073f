//! ---
//! warden_section: "03-persistence-logging"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Structured logging adapters and sinks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Lifecycle event helpers for the failover controller.

/// Structured logging context attached to lifecycle events.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Endpoint currently configured as live.
    pub current: Option<&'a str>,
    /// Endpoint the controller is moving to.
    pub target: Option<&'a str>,
    /// Decision cycle sequence number.
    pub cycle: Option<u64>,
    /// Reason attached to the decision.
    pub reason: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the live endpoint name.
    pub fn with_current(mut self, current: &'a str) -> Self {
        self.current = Some(current);
        self
    }

    /// Attach the target endpoint name.
    pub fn with_target(mut self, target: &'a str) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach a cycle number.
    pub fn with_cycle(mut self, cycle: u64) -> Self {
        self.cycle = Some(cycle);
        self
    }

    /// Attach a decision reason.
    pub fn with_reason(mut self, reason: &'a str) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed but the controller carries on.
    Degraded,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    /// Stable label for the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Degraded => "degraded",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with an outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    let current = ctx.current.unwrap_or("");
    let target = ctx.target.unwrap_or("");
    let cycle = ctx.cycle.unwrap_or_default();
    let reason = ctx.reason.unwrap_or("");
    let outcome_label = outcome.as_str();
    // `tracing::event!` needs a constant level, hence the dispatch.
    match outcome {
        SystemEventOutcome::Fault => tracing::error!(
            event,
            outcome = outcome_label,
            current_endpoint = current,
            target_endpoint = target,
            cycle,
            reason,
            message = %message
        ),
        SystemEventOutcome::Degraded => tracing::warn!(
            event,
            outcome = outcome_label,
            current_endpoint = current,
            target_endpoint = target,
            cycle,
            reason,
            message = %message
        ),
        SystemEventOutcome::Success => tracing::info!(
            event,
            outcome = outcome_label,
            current_endpoint = current,
            target_endpoint = target,
            cycle,
            reason,
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic() {
        init();
        init();
    }

    #[test]
    fn context_builder_sets_fields() {
        let ctx = LogContext::new()
            .with_current("US-CA#1")
            .with_target("US-CA#7")
            .with_cycle(3)
            .with_reason("unhealthy");
        assert_eq!(ctx.current, Some("US-CA#1"));
        assert_eq!(ctx.target, Some("US-CA#7"));
        assert_eq!(ctx.cycle, Some(3));
        assert_eq!(ctx.reason, Some("unhealthy"));
    }

    #[test]
    fn system_event_helper_emits() {
        init();
        let ctx = LogContext::new().with_target("US-CA#7");
        log_system_event(
            Some(&ctx),
            "switch.activate",
            "endpoint activated",
            SystemEventOutcome::Success,
        );
        log_system_event(
            None,
            "switch.activate",
            "fallback activation failed",
            SystemEventOutcome::Fault,
        );
        assert_eq!(SystemEventOutcome::Degraded.as_str(), "degraded");
    }
}
