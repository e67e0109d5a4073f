//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives and utilities for the core runtime."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Core shared primitives for the Warden workspace.
//! This crate exposes configuration loading, logging, clocks, and
//! version metadata utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;
pub mod version;

pub use config::{
    ActivationConfig, AppConfig, DirectoryConfig, IdentityConfig, LocalityConfig, LoggingConfig,
    MetricsConfig, PathsConfig, ProbeConfig, StoreConfig, StoreKeys, TimingConfig,
};
pub use logging::{init_tracing, LogFormat, LogMode};
pub use time::{Clock, ManualClock, TokioClock};
pub use version::VersionInfo;
