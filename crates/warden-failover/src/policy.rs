//! ---
//! warden_section: "07-resilience-fault-tolerance"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Endpoint selection and failover control loop."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;
use warden_directory::Endpoint;

use crate::selector::Selection;

/// Load advantage, in percentage points, a candidate needs before a
/// load-triggered switch happens.
pub const LOAD_HYSTERESIS: u8 = 20;

/// Why a switch was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    None,
    Unhealthy,
    LoadOptimization { current_load: u8, best_load: u8 },
}

impl SwitchReason {
    /// Stable label, also used as metrics label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchReason::None => "none",
            SwitchReason::Unhealthy => "unhealthy",
            SwitchReason::LoadOptimization { .. } => "load optimization",
        }
    }
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchDecision<'a> {
    pub should_switch: bool,
    /// Absent when no candidate exists, even if a switch is wanted.
    pub target: Option<&'a Endpoint>,
    pub reason: SwitchReason,
}

impl<'a> SwitchDecision<'a> {
    fn hold() -> Self {
        Self {
            should_switch: false,
            target: None,
            reason: SwitchReason::None,
        }
    }
}

/// Decide whether to move away from `current`.
///
/// Rules, first match wins:
/// 1. unhealthy: switch to the best candidate, if there is one;
/// 2. the live endpoint is known and more than [`LOAD_HYSTERESIS`] points
///    above the best candidate: switch to it;
/// 3. otherwise stay.
///
/// A decision never targets the live endpoint itself.
pub fn decide<'a>(
    healthy: bool,
    selection: &Selection<'a>,
    current: Option<&str>,
) -> SwitchDecision<'a> {
    let best = selection.best();
    let decision = if !healthy {
        SwitchDecision {
            should_switch: true,
            target: best,
            reason: SwitchReason::Unhealthy,
        }
    } else {
        match (best, current) {
            (Some(best), Some(_))
                if u16::from(selection.current_load)
                    > u16::from(best.load) + u16::from(LOAD_HYSTERESIS) =>
            {
                SwitchDecision {
                    should_switch: true,
                    target: Some(best),
                    reason: SwitchReason::LoadOptimization {
                        current_load: selection.current_load,
                        best_load: best.load,
                    },
                }
            }
            _ => SwitchDecision::hold(),
        }
    };

    match (decision.target, current) {
        (Some(target), Some(current)) if target.name == current => SwitchDecision::hold(),
        _ => decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{select_candidates, LocalityFilter};

    fn endpoints(current_load: u8, best_load: u8) -> Vec<Endpoint> {
        vec![
            Endpoint::new("live", "US", "San Jose", current_load),
            Endpoint::new("other", "US", "San Jose", best_load),
        ]
    }

    fn decide_loads(healthy: bool, current_load: u8, best_load: u8) -> (bool, SwitchReason) {
        let list = endpoints(current_load, best_load);
        let filter = LocalityFilter::new(["San Jose"], None);
        let selection = select_candidates(&list, &filter, Some("live"));
        let decision = decide(healthy, &selection, Some("live"));
        (decision.should_switch, decision.reason)
    }

    #[test]
    fn load_switch_requires_margin_above_hysteresis() {
        assert_eq!(
            decide_loads(true, 70, 40),
            (
                true,
                SwitchReason::LoadOptimization {
                    current_load: 70,
                    best_load: 40
                }
            )
        );
        assert!(!decide_loads(true, 55, 40).0);
        assert!(!decide_loads(true, 50, 40).0);
        assert!(!decide_loads(true, 60, 40).0);
        assert!(decide_loads(true, 61, 40).0);
    }

    #[test]
    fn unhealthy_always_switches_to_a_candidate() {
        assert_eq!(decide_loads(false, 95, 90), (true, SwitchReason::Unhealthy));
        assert!(!decide_loads(true, 95, 90).0);
    }

    #[test]
    fn never_targets_the_live_endpoint() {
        // The live endpoint is itself the best candidate.
        assert_eq!(decide_loads(false, 10, 90), (false, SwitchReason::None));
        assert_eq!(decide_loads(true, 10, 90), (false, SwitchReason::None));
    }

    #[test]
    fn unknown_current_never_load_switches() {
        let list = endpoints(90, 10);
        let filter = LocalityFilter::new(["San Jose"], None);
        let selection = select_candidates(&list, &filter, None);
        assert!(!decide(true, &selection, None).should_switch);
    }

    #[test]
    fn unhealthy_without_candidate_has_no_target() {
        let filter = LocalityFilter::new(["Nowhere"], None);
        let list = endpoints(10, 10);
        let selection = select_candidates(&list, &filter, Some("live"));
        let decision = decide(false, &selection, Some("live"));
        assert!(decision.should_switch);
        assert!(decision.target.is_none());
        assert_eq!(decision.reason.to_string(), "unhealthy");
    }
}
