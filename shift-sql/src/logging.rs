//! Logging setup for schemashift.
//!
//! The crates log through `tracing`. Nothing is printed unless the
//! application installs a subscriber, either its own or the one [`init`]
//! installs (requires the `tracing-subscriber` feature).
//!
//! # Environment Variables
//!
//! - `SHIFT_DEBUG=true|1|yes` - enable debug logging
//! - `SHIFT_LOG_LEVEL=trace|debug|info|warn|error` - set the level explicitly
//! - `SHIFT_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! use shift_sql::logging;
//!
//! logging::init();
//! ```
//!
//! Rendered SQL is logged at `trace`, step execution at `debug`, state
//! transitions at `info`.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "SHIFT_DEBUG";
const LEVEL_VAR: &str = "SHIFT_LOG_LEVEL";
const FORMAT_VAR: &str = "SHIFT_LOG_FORMAT";

/// Output format of the built-in subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line, human-oriented.
    Pretty,
    /// Single-line, human-oriented.
    Compact,
}

/// Whether `SHIFT_DEBUG` asks for debug output.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The configured level. `SHIFT_LOG_LEVEL` wins; otherwise `debug` when
/// `SHIFT_DEBUG` is on, else `warn`.
pub fn log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var(LEVEL_VAR) {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The configured output format.
pub fn log_format() -> LogFormat {
    match env::var(FORMAT_VAR).map(|f| f.to_lowercase()) {
        Ok(f) if f == "pretty" => LogFormat::Pretty,
        Ok(f) if f == "compact" => LogFormat::Compact,
        _ => LogFormat::Json,
    }
}

/// Install a global subscriber for the schemashift crates.
///
/// Does nothing unless `SHIFT_DEBUG` or `SHIFT_LOG_LEVEL` is set, or when
/// called a second time.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = log_level();
            let filter = EnvFilter::try_new(format!(
                "schemashift={level},shift_sql={level},shift_migrate={level},shift_sqlite={level}"
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let format = log_format();
            let registry = tracing_subscriber::registry().with(filter);
            let installed = match format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level = level, format = ?format, "schemashift logging initialized");
            }
        }
    });
}

/// Set `SHIFT_LOG_LEVEL` and call [`init`].
///
/// # Safety
///
/// Modifies the process environment. Call it at startup, before other
/// threads exist.
pub fn init_with_level(level: &str) {
    // SAFETY: documented as startup-only.
    unsafe {
        env::set_var(LEVEL_VAR, level);
    }
    init();
}
