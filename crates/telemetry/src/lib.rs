//! Tracing subscriber bootstrap for Livros binaries.

use anyhow::Context;
use livros_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::EnvFilter;

/// Build the event filter. `RUST_LOG` wins over the configured directives.
pub fn env_filter(settings: &TelemetrySettings) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.filter)
            .with_context(|| format!("invalid telemetry filter '{}'", settings.filter)),
    }
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed, which happens
/// when tests or an embedding binary set one up first.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<bool> {
    let filter = env_filter(settings)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match settings.log_format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    match installed {
        Ok(()) => {
            tracing::info!(
                target: "livros-telemetry",
                format = ?settings.log_format,
                "telemetry initialized"
            );
            Ok(true)
        }
        Err(err) => {
            tracing::debug!(
                target: "livros-telemetry",
                error = %err,
                "subscriber already installed"
            );
            Ok(false)
        }
    }
}
