//! Logging infrastructure - structured tracing for the binding layer
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log level through the environment
//! - Zero-cost when disabled
//! - Console output, optionally JSON, plus an optional log file

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn, Level};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; console only when `None`
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show thread ids and line numbers
    pub verbose_fields: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            verbose_fields: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // YDBVP_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("YDBVP_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // YDBVP_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("YDBVP_LOG_FILE") {
            config.log_path = Some(path);
        }

        // YDBVP_LOG_JSON: enable JSON format
        config.json_format = std::env::var("YDBVP_LOG_JSON").is_ok();

        config
    }

    /// Verbose config for chasing plist layout problems
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            verbose_fields: true,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
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

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber; later calls are no-ops.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "ydb_varargs={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let console = (!config.json_format).then(|| {
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_thread_ids(config.verbose_fields)
                .with_line_number(config.verbose_fields)
        });

        let json = config
            .json_format
            .then(|| fmt::layer().json().with_writer(io::stderr));

        let file = config.log_path.as_deref().map(|path| {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "ydb_varargs.log".into());
            fmt::layer()
                .with_ansi(false)
                .with_writer(tracing_appender::rolling::never(dir, name))
        });

        // Another subscriber may already be installed by the host application
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(json)
            .with(file)
            .try_init();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Log native memory allocation
#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    trace!(
        target: "ydb_varargs::alloc",
        size,
        ptr = ?ptr,
        "allocated native memory"
    );
}

/// Log native memory release
#[inline]
pub fn log_deallocation(ptr: *const u8) {
    trace!(
        target: "ydb_varargs::alloc",
        ptr = ?ptr,
        "released native memory"
    );
}

/// Log a variadic call about to cross into native code
#[inline]
pub fn log_ffi_call(routine: &str, args_count: usize) {
    debug!(
        target: "ydb_varargs::ffi",
        routine,
        args_count,
        "variadic call"
    );
}

/// Log the status returned by a variadic call
#[inline]
pub fn log_ffi_return(routine: &str, status: i32) {
    trace!(
        target: "ydb_varargs::ffi",
        routine,
        status,
        "variadic return"
    );
}

/// Log a call rejected before reaching native code
#[inline]
pub fn log_ffi_error(routine: &str, error: &str) {
    warn!(
        target: "ydb_varargs::ffi",
        routine,
        error,
        "variadic call rejected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.log_path.is_none());

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_init_idempotent() {
        init();
        init();
        assert!(is_initialized());
    }

    #[test]
    fn test_logging_functions() {
        log_allocation(1024, std::ptr::null());
        log_deallocation(std::ptr::null());
        log_ffi_call("ydbvp_plist_test", 4);
        log_ffi_return("ydbvp_plist_test", 0);
        log_ffi_error("ydbvp_plist_test", "count mismatch");
    }
}
