//! Tracing subscriber and Prometheus recorder setup for the follower binary.

use std::{net::SocketAddr, sync::OnceLock, thread, time::Duration};

use anyhow::{Context, Result, anyhow};
use frame_source::spawn_thread;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::debug;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, prelude::*};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<thread::JoinHandle<()>> = OnceLock::new();

/// Keeps the subscriber installed for the lifetime of the run.
pub(crate) struct TelemetryGuard {
    _default_guard: tracing::subscriber::DefaultGuard,
}

/// Install the fmt subscriber. `RUST_LOG` wins over `verbose`.
pub(crate) fn enter_runtime(verbose: bool) -> TelemetryGuard {
    let fallback = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let default_guard = tracing::subscriber::set_default(
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(fmt::time::uptime())
                    .with_filter(env_filter),
            )
            .with(tracing_error::ErrorLayer::default()),
    );

    TelemetryGuard {
        _default_guard: default_guard,
    }
}

/// Install the global metrics recorder.
///
/// With an address the exporter serves `/metrics` itself; otherwise the
/// recorder is kept in-process and rendered into the log on exit.
pub(crate) fn init_metrics_recorder(listen: Option<SocketAddr>) -> Result<()> {
    if let Some(addr) = listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
        debug!("serving metrics on http://{addr}/metrics");
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|err| anyhow!("metrics recorder already installed: {err}"))?;

    let upkeep_handle = handle.clone();
    let upkeep = spawn_thread("prometheus-upkeep", move || {
        loop {
            thread::sleep(Duration::from_secs(5));
            upkeep_handle.run_upkeep();
        }
    })
    .context("failed to spawn prometheus upkeep thread")?;
    let _ = PROM_UPKEEP_THREAD.set(upkeep);
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

/// Log the in-process metrics snapshot, if one is being kept.
pub(crate) fn log_metrics_snapshot() {
    if let Some(handle) = PROM_HANDLE.get() {
        debug!("final metrics:\n{}", handle.render());
    }
}
