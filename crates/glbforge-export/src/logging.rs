//! Logging and tracing utilities for glbforge
//!
//! Structured logging through the `tracing` crate. Recoverable export
//! problems (missing textures, dropped animation channels, unresolved
//! attachments) are reported here as `warn` events rather than errors.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Whether tracing has been initialized
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the default tracing subscriber
///
/// This should be called once at application startup. Multiple calls are safe
/// and will be ignored.
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Initialize tracing with a custom configuration
///
/// `RUST_LOG` takes precedence over `config.default_level`.
pub fn init_with_config(config: TracingConfig) {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    // Another subscriber may already be installed (tests, embedding apps)
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init();
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default log level filter (e.g., "info", "debug", "warn")
    pub default_level: String,
    /// Show the target (module path) in log output
    pub show_target: bool,
    /// Show thread IDs in log output
    pub show_thread_ids: bool,
    /// Show source file in log output
    pub show_file: bool,
    /// Show line number in log output
    pub show_line_number: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: "warn,glbforge=info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
        }
    }
}

impl TracingConfig {
    /// Config whose default filter is a single level for everything
    pub fn with_level(level: tracing::Level) -> Self {
        Self {
            default_level: level.to_string().to_lowercase(),
            ..Self::default()
        }
    }
}

/// Span wrapping one exporter invocation
pub fn export_span(models: usize, meshes: usize) -> tracing::Span {
    tracing::info_span!("export", models = models, meshes = meshes)
}

/// Run `f` inside an export span, logging its duration
pub fn instrument_export<T, F>(models: usize, meshes: usize, f: F) -> T
where
    F: FnOnce() -> T,
{
    let span = export_span(models, meshes);
    let _guard = span.enter();

    let start = std::time::Instant::now();
    let result = f();
    let duration = start.elapsed();

    tracing::debug!(duration_ms = %duration.as_millis(), "Export pass complete");

    result
}
