//! Installer + composition root for the default observability stack.
//! Grounded on the teacher's `spark_otel::install` (`OnceLock`-guarded,
//! `AlreadyInstalled`/`SubscriberAlreadySet` error split, `EnvFilter`
//! defaulting to `"info"`), minus the OpenTelemetry tracer/span plumbing
//! this workspace has no exporter for.

use std::sync::{Arc, OnceLock};

use tracing::dispatcher;
use tracing_subscriber::EnvFilter;

use aegis_core::observability::DefaultObservabilityFacade;

use crate::events::ChannelOpsEventBus;
use crate::logging::TracingLogger;
use crate::metrics::InMemoryMetricsProvider;

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug)]
pub enum Error {
    /// [`install_tracing_subscriber`] was already called once.
    AlreadyInstalled,
    /// Something other than this crate set the global `tracing`
    /// subscriber first.
    SubscriberAlreadySet,
    SetGlobalSubscriber(tracing::dispatcher::SetGlobalDefaultError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AlreadyInstalled => write!(f, "tracing subscriber already installed by aegis-otel"),
            Error::SubscriberAlreadySet => write!(f, "a global tracing subscriber was already set"),
            Error::SetGlobalSubscriber(err) => write!(f, "failed to set global tracing subscriber: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// Installs a `fmt` + `EnvFilter` tracing subscriber (`RUST_LOG`,
/// defaulting to `"info"`). Idempotent guard only covers calls through
/// this function; an external subscriber set before this call is still
/// detected and rejected.
pub fn install_tracing_subscriber() -> Result<(), Error> {
    if INSTALLED.get().is_some() {
        return Err(Error::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(Error::SubscriberAlreadySet);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).map_err(Error::SetGlobalSubscriber)?;

    INSTALLED.set(()).map_err(|_| Error::AlreadyInstalled)
}

/// Composes the three reference adapters into one
/// [`DefaultObservabilityFacade`]. Does not install a tracing
/// subscriber; call [`install_tracing_subscriber`] separately if the
/// host process hasn't set one up already.
pub fn default_facade() -> Arc<DefaultObservabilityFacade> {
    Arc::new(DefaultObservabilityFacade::new(
        Arc::new(TracingLogger::new()),
        Arc::new(InMemoryMetricsProvider::new()),
        Arc::new(ChannelOpsEventBus::new()),
    ))
}
