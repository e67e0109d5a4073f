//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "binary"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Binary entrypoint for the Warden daemon."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{info, warn};
use warden_adapters::{ContainerPingProbe, DockerActivation};
use warden_common::config::{AppConfig, LocalityConfig};
use warden_common::logging::{init_tracing, LogMode};
use warden_common::version::VersionInfo;
use warden_common::TokioClock;
use warden_directory::{DirectorySession, HttpDirectoryClient};
use warden_envstore::EnvStore;
use warden_failover::{
    locality_table, render_locality_table, CheckReport, FailoverController, LocalityFilter,
};
use warden_metrics::{new_registry, spawn_http_server, DaemonMetrics, FailoverMetrics, SharedRegistry};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Warden endpoint failover daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        env = "TARGET_CITIES",
        value_name = "LIST",
        help = "Comma separated list of acceptable cities"
    )]
    cities: Option<String>,

    #[arg(long, env = "TARGET_COUNTRY", value_name = "CODE", help = "Restrict candidates to one country")]
    country: Option<String>,

    #[arg(long, env = "HEALTH_CHECK_INTERVAL", value_name = "SECONDS")]
    health_interval: Option<u64>,

    #[arg(long, env = "LOAD_CHECK_INTERVAL", value_name = "SECONDS")]
    load_interval: Option<u64>,

    #[arg(long, env = "SESSION_FILE", value_name = "FILE")]
    session_file: Option<PathBuf>,

    #[arg(long, env = "ENV_FILE_PATH", value_name = "FILE", help = "Endpoint store to rewrite on switch")]
    env_file: Option<PathBuf>,

    #[arg(long, env = "LOG_DIR", value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "CACHE_DIR", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the failover controller")]
    Run,
    #[command(about = "Compare the live endpoint with the best candidate and exit")]
    Check {
        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
    #[command(about = "List cities with active endpoints and exit")]
    Localities {
        #[arg(long, value_name = "CODE", help = "Only list this country")]
        country: Option<String>,
        #[arg(long, help = "Print the table as JSON")]
        json: bool,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(cities) = &self.cities {
            config.locality.cities = LocalityConfig::parse_cities(cities);
        }
        if let Some(country) = &self.country {
            config.locality.country = Some(country.clone()).filter(|c| !c.trim().is_empty());
        }
        if let Some(secs) = self.health_interval {
            config.timing.health_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.load_interval {
            config.timing.load_interval = Duration::from_secs(secs);
        }
        if let Some(path) = &self.session_file {
            config.identity.session_file = path.clone();
        }
        if let Some(path) = &self.env_file {
            config.store.path = path.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.paths.log_dir = dir.clone();
            config.logging.directory = dir.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.paths.cache_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.extended());
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("/etc/warden/warden.toml"));
    candidates.push(PathBuf::from("warden.toml"));

    let load_started = Instant::now();
    let loaded_config = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded_config.config;
    cli.apply_overrides(&mut config);
    config.validate()?;
    let load_duration = load_started.elapsed();

    let command = cli.command.unwrap_or(Commands::Run);
    let log_mode = match command {
        Commands::Run => LogMode::Daemon,
        Commands::Check { .. } | Commands::Localities { .. } => LogMode::OneShot,
    };
    init_tracing("wardend", &config.logging, log_mode)?;
    match &loaded_config.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults and overrides"),
    }

    let metrics_registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(&version.semver, &version.target, &version.debug);

    ensure_dirs(&config)?;
    let client = HttpDirectoryClient::from_config(
        &config.directory,
        &config.identity,
        config.store.endpoint_port,
    )
    .context("identity credentials are unavailable; run the login step first")?;
    let session = DirectorySession::new(Box::new(client));

    match command {
        Commands::Run => run_daemon(config, session, metrics_registry, &version).await,
        Commands::Check { json } => run_check(&config, session, json).await,
        Commands::Localities { country, json } => {
            run_localities(session, country.as_deref(), json).await
        }
    }
}

/// Create working directories and restrict the session directory to its owner.
fn ensure_dirs(config: &AppConfig) -> Result<()> {
    for dir in [&config.paths.log_dir, &config.paths.cache_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    if let Some(session_dir) = config
        .identity
        .session_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(session_dir)
            .with_context(|| format!("failed to create {}", session_dir.display()))?;
        secure_dir(session_dir);
    }
    Ok(())
}

#[cfg(unix)]
fn secure_dir(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
        warn!(dir = %dir.display(), error = %err, "failed to secure session directory permissions");
    }
}

#[cfg(not(unix))]
fn secure_dir(_dir: &Path) {}

async fn run_daemon(
    config: AppConfig,
    session: DirectorySession,
    metrics_registry: SharedRegistry,
    version: &VersionInfo,
) -> Result<()> {
    info!(version = %version.banner(), "starting failover daemon");
    let metrics_server = if config.metrics.enabled {
        Some(spawn_http_server(metrics_registry.clone(), config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let failover_metrics = FailoverMetrics::new(metrics_registry)?;
    let mut controller = FailoverController::new(
        &config,
        session,
        Box::new(ContainerPingProbe::from_config(&config.probe)),
        Box::new(DockerActivation::from_config(&config.activation)),
        EnvStore::from_config(&config.store),
        Arc::new(TokioClock),
    )
    .with_metrics(failover_metrics);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let controller_task = tokio::spawn(async move { controller.run(shutdown_rx).await });

    shutdown_signal().await?;
    info!("termination signal received; shutting down");
    let _ = shutdown_tx.send(());
    controller_task
        .await
        .context("failover controller task panicked")??;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

async fn run_check(config: &AppConfig, mut session: DirectorySession, json: bool) -> Result<()> {
    info!("fetching endpoint listing");
    let endpoints = session.fetch_endpoints().await;
    if endpoints.is_empty() {
        bail!("no endpoints retrieved from the directory");
    }
    let store = EnvStore::from_config(&config.store);
    let current = store
        .current_endpoint()
        .with_context(|| format!("failed to read {}", store.path().display()))?;
    let filter = LocalityFilter::from_config(&config.locality);
    let report = CheckReport::build(&endpoints, &filter, current.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

async fn run_localities(
    mut session: DirectorySession,
    country: Option<&str>,
    json: bool,
) -> Result<()> {
    info!("fetching full endpoint listing");
    let endpoints = session.fetch_endpoints().await;
    if endpoints.is_empty() {
        bail!("no endpoints retrieved from the directory");
    }
    let rows = locality_table(&endpoints, country);
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render_locality_table(&rows));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_precedence_over_file() {
        let cli = Cli::parse_from([
            "wardend",
            "--cities",
            "Zurich, Geneva",
            "--country",
            "CH",
            "--health-interval",
            "15",
            "--env-file",
            "/tmp/tunnel.env",
            "check",
        ]);
        let mut config: AppConfig = "[timing]\nhealth_interval = 90\n".parse().unwrap();
        cli.apply_overrides(&mut config);

        assert_eq!(config.locality.cities, vec!["Zurich", "Geneva"]);
        assert_eq!(config.locality.country.as_deref(), Some("CH"));
        assert_eq!(config.timing.health_interval, Duration::from_secs(15));
        assert_eq!(config.timing.load_interval, Duration::from_secs(900));
        assert_eq!(config.store.path, PathBuf::from("/tmp/tunnel.env"));
        assert!(matches!(cli.command, Some(Commands::Check { json: false })));
    }

    #[test]
    fn localities_accepts_its_own_country_filter() {
        let cli = Cli::parse_from(["wardend", "localities", "--country", "us"]);
        match cli.command {
            Some(Commands::Localities { country, json }) => {
                assert_eq!(country.as_deref(), Some("us"));
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ensure_dirs_creates_private_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.paths.log_dir = dir.path().join("logs");
        config.paths.cache_dir = dir.path().join("cache");
        config.identity.session_file = dir.path().join("session").join("session.json");

        ensure_dirs(&config).unwrap();
        assert!(config.paths.log_dir.is_dir());
        assert!(config.paths.cache_dir.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("session"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
