//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Container health probe and activation adapters."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Adapters that touch the tunnel container: a reachability probe run inside
//! it and the restart primitives that make a new endpoint live.

pub mod activation;
pub mod command;
pub mod probe;

pub use activation::{ActivationError, ActivationTrigger, DockerActivation};
pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
pub use probe::{ContainerPingProbe, HealthProbe};
