//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives and utilities for the core runtime."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "WARDEN_LOG";

/// Filter used when neither `WARDEN_LOG` nor `RUST_LOG` is set. The HTTP
/// stack logs every directory poll at `info`, so it is held to `warn`.
const DEFAULT_DIRECTIVE: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// How the process is going to use its output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Long-running controller: configured format on stdout plus a daily file.
    Daemon,
    /// `check` and `localities`: stdout carries the report, so logs go to
    /// stderr in human-readable form and no file is opened.
    OneShot,
}

/// Build the event filter from an explicit directive, falling back to
/// `RUST_LOG` and then [`DEFAULT_DIRECTIVE`].
fn build_filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

/// Install the global subscriber for `service_name`.
///
/// `WARDEN_LOG` overrides the filter (e.g. `debug,warden_failover=trace`).
/// Only the first call in a process takes effect.
pub fn init_tracing(service_name: &str, config: &LoggingConfig, mode: LogMode) -> Result<()> {
    let directive = std::env::var(LOG_ENV).ok();
    let filter = build_filter(directive.as_deref());

    if mode == LogMode::OneShot {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
        return Ok(());
    }

    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());
    let file_appender = daily(&config.directory, format!("{prefix}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_current_span(true)
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    // The file keeps targets so post-mortems can tell controller, store and
    // directory events apart.
    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_current_span(true)
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        log_file_prefix = %prefix,
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> LoggingConfig {
        LoggingConfig {
            directory: dir.join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("warden-test".into()),
        }
    }

    #[test]
    fn daemon_mode_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        init_tracing("wardend", &config, LogMode::Daemon).unwrap();
        assert!(config.directory.is_dir());
    }

    #[test]
    fn one_shot_mode_opens_no_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        init_tracing("wardend", &config, LogMode::OneShot).unwrap();
        assert!(!config.directory.exists());
    }

    #[test]
    fn default_filter_quiets_http_stack() {
        let rendered = build_filter(Some(DEFAULT_DIRECTIVE)).to_string();
        assert!(rendered.contains("reqwest=warn"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    fn invalid_directive_falls_back_to_default() {
        let rendered = build_filter(Some("warden=notalevel")).to_string();
        assert!(rendered.contains("reqwest=warn"), "{rendered}");
    }

    #[test]
    fn log_format_uses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"structured-json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::StructuredJson);
    }
}
