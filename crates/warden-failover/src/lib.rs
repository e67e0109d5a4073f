//! ---
//! warden_section: "07-resilience-fault-tolerance"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Endpoint selection and failover control loop."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Self-healing endpoint selection: candidate ranking, the switch policy,
//! and the controller loop that acts on them.

pub mod controller;
pub mod policy;
pub mod report;
pub mod selector;

pub use controller::{
    ActivationOutcome, ControllerState, CycleOutcome, CycleReport, FailoverController,
};
pub use policy::{decide, SwitchDecision, SwitchReason, LOAD_HYSTERESIS};
pub use report::{locality_table, render_locality_table, CheckReport, LocalityRow};
pub use selector::{select_candidates, LocalityFilter, Selection, WORST_LOAD};
