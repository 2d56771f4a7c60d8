//! Structured logging bootstrap.
//!
//! Thin wrappers over `tracing-subscriber` so embedding binaries and tests
//! initialize logging the same way. Compilation stages and the reload
//! coordinator emit spans and events through `tracing`; nothing in this
//! crate logs through anything else.

use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default
/// `info`).
pub fn init_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true),
        )
        .init();

    tracing::info!("pingclair structured logging initialized");
    Ok(())
}

/// Initialize console-friendly logging for development.
pub fn init_console_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
        .init();

    Ok(())
}

/// Initialize logging with an explicit filter directive and format choice.
pub fn init_tracing_with_config(level: &str, json_format: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level: {level}"))?;

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(false).with_span_list(true))
            .init();
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .init();
    }

    Ok(())
}

/// Span wrapping one full compile cycle, for correlating stage events.
pub fn compile_cycle_span(trigger: &str) -> tracing::Span {
    tracing::info_span!("compile_cycle", trigger = trigger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_cycle_span_is_named() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || {
            let span = compile_cycle_span("reload");
            assert_eq!(span.metadata().unwrap().name(), "compile_cycle");
        });
    }

    #[test]
    fn invalid_filter_directive_is_an_error() {
        let result = init_tracing_with_config("not a filter!!", false);
        assert!(result.is_err());
    }
}
