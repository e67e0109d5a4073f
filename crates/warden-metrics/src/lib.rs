//! ---
//! warden_section: "03-persistence-logging"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Metrics collection and export utilities."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder, TEXT_FORMAT,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Address the exporter is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "wardend_starts_total",
            "Total number of times the Warden daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "wardend_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "wardend_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "target", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, target: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, target, profile])
            .set(1.0);
    }
}

/// Counters describing the failover controller loop.
#[derive(Clone, Debug)]
pub struct FailoverMetrics {
    health_checks: IntCounterVec,
    directory_polls: IntCounterVec,
    switches: IntCounterVec,
    store_write_failures: IntCounter,
    activations: IntCounterVec,
    loop_errors: IntCounter,
    current_load: IntGauge,
}

impl FailoverMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let health_checks = IntCounterVec::new(
            Opts::new(
                "warden_health_checks_total",
                "Reachability probes by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(health_checks.clone()))?;

        let directory_polls = IntCounterVec::new(
            Opts::new(
                "warden_directory_polls_total",
                "Directory polls by outcome (listed or empty)",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(directory_polls.clone()))?;

        let switches = IntCounterVec::new(
            Opts::new(
                "warden_switches_total",
                "Endpoint switches initiated, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(switches.clone()))?;

        let store_write_failures = IntCounter::with_opts(Opts::new(
            "warden_store_write_failures_total",
            "Endpoint store writes that failed and aborted a switch",
        ))?;
        registry.register(Box::new(store_write_failures.clone()))?;

        let activations = IntCounterVec::new(
            Opts::new(
                "warden_activations_total",
                "Activation attempts by outcome (primary, fallback, failed)",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(activations.clone()))?;

        let loop_errors = IntCounter::with_opts(Opts::new(
            "warden_loop_errors_total",
            "Errors that escaped a controller pass",
        ))?;
        registry.register(Box::new(loop_errors.clone()))?;

        let current_load = IntGauge::with_opts(Opts::new(
            "warden_current_endpoint_load",
            "Load of the live endpoint as of the last directory poll",
        ))?;
        registry.register(Box::new(current_load.clone()))?;

        Ok(Self {
            health_checks,
            directory_polls,
            switches,
            store_write_failures,
            activations,
            loop_errors,
            current_load,
        })
    }

    pub fn record_health(&self, healthy: bool) {
        let outcome = if healthy { "healthy" } else { "unhealthy" };
        self.health_checks.with_label_values(&[outcome]).inc();
    }

    pub fn record_poll(&self, listed: usize) {
        let outcome = if listed == 0 { "empty" } else { "listed" };
        self.directory_polls.with_label_values(&[outcome]).inc();
    }

    pub fn record_switch(&self, reason: &str) {
        self.switches.with_label_values(&[reason]).inc();
    }

    pub fn record_store_failure(&self) {
        self.store_write_failures.inc();
    }

    pub fn record_activation(&self, outcome: &str) {
        self.activations.with_label_values(&[outcome]).inc();
    }

    pub fn record_loop_error(&self) {
        self.loop_errors.inc();
    }

    pub fn set_current_load(&self, load: u8) {
        self.current_load.set(i64::from(load));
    }

    /// Switches recorded for `reason` so far.
    pub fn switches(&self, reason: &str) -> u64 {
        self.switches.with_label_values(&[reason]).get()
    }

    /// Activation attempts recorded for `outcome` so far.
    pub fn activations(&self, outcome: &str) -> u64 {
        self.activations.with_label_values(&[outcome]).get()
    }

    pub fn loop_errors(&self) -> u64 {
        self.loop_errors.get()
    }
}

pub use prometheus;
