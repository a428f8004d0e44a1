//! Logging infrastructure - structured tracing for the marshaling layer
//!
//! Design: `tracing` events with a stable `event` field on every record:
//! - Configurable level and output through `GU_LOG_*` variables
//! - Zero-cost when disabled
//! - Optional JSON output and file appender
//! - Span-based timing for calls

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global logging state (holds the file writer guard when file output is on)
static LOGGER_INITIALIZED: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // GU_LOG_LEVEL: trace, debug, info, warn, error
        if let Some(level) = var("GU_LOG_LEVEL") {
            config.level = parse_level(&level);
        }

        // GU_LOG_FILE: path to log file
        if let Some(path) = var("GU_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = var("GU_LOG_JSON").is_some();
        config.show_spans = var("GU_LOG_SPANS").is_some();

        config
    }

    /// Errors only
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Everything, with spans, to `gu_interop.log`
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("gu_interop.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(s: &str) -> Level {
    match s.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration (first call wins)
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let level = config.level.as_str().to_lowercase();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("gu_interop={level},gu_runtime={level}"))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let console = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone())
                .boxed()
        } else {
            fmt::layer()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone())
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        let (file, guard) = match config.log_path.as_deref().filter(|_| config.file_output) {
            Some(path) => {
                let path = Path::new(path);
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
                let name = path.file_name().map_or_else(
                    || "gu_interop.log".into(),
                    |n| n.to_string_lossy().into_owned(),
                );
                let appender = tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_span_events(span_events)
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        // Another subscriber may already be installed by the embedding application.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(file)
            .try_init();

        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Marshaling-layer events
// ============================================================================

/// Log a native call about to be issued
#[inline]
pub fn log_ffi_call(fn_name: &str, arg_count: usize) {
    tracing::debug!(event = "ffi_call", function = fn_name, args = arg_count);
}

/// Log a native call that returned
#[inline]
pub fn log_ffi_return(fn_name: &str) {
    tracing::trace!(event = "ffi_return", function = fn_name);
}

/// Log a host closure failure contained at a trampoline
pub fn log_callback_failure(bridge: &str, error: &str) {
    tracing::error!(
        event = "callback_failure",
        bridge = bridge,
        error = error,
        "host callback failed; returning default result"
    );
}

/// Log an exception raised by the native library
pub fn log_native_exception(type_name: &str, frame: &str) {
    tracing::debug!(event = "native_exception", ty = type_name, frame = frame);
}

/// Log synthesis of a host type from a descriptor
pub fn log_type_synthesized(name: &str, shape: &str) {
    tracing::debug!(event = "type_synthesized", name = name, shape = shape);
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::trace;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            trace!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_presets() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.file_output);

        assert_eq!(LogConfig::performance().level, Level::ERROR);
        assert_eq!(LogConfig::debug().level, Level::TRACE);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("GU_LOG_LEVEL", "Debug"),
            ("GU_LOG_FILE", "/tmp/gu.log"),
            ("GU_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();

        let config = LogConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.file_output);
        assert_eq!(config.log_path.as_deref(), Some("/tmp/gu.log"));
        assert!(config.json_format);
        assert!(!config.show_spans);
    }

    #[test]
    fn test_unknown_level_defaults_to_info() {
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_init_idempotent() {
        init_with_config(LogConfig::performance());
        init();
        assert!(is_initialized());
    }
}
