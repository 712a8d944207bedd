//! # Structured Logging Module
//!
//! Environment-aware structured console logging for the task store, the lock
//! manager and worker helpers. Set `QUERY_STORAGE_LOG_FORMAT=json` for
//! machine-readable output; `RUST_LOG` overrides the environment's level.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = wants_json(std::env::var("QUERY_STORAGE_LOG_FORMAT").ok().as_deref());

        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.clone()))
        };

        let console = (!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter())
        });
        let structured = json.then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
        });

        // Use try_init so a subscriber installed by the host application wins
        if tracing_subscriber::registry()
            .with(console)
            .with(structured)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("QUERY_STORAGE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn wants_json(format: Option<&str>) -> bool {
    matches!(format, Some(value) if value.eq_ignore_ascii_case("json"))
}

/// Log structured data for task operations
pub fn log_task_operation(
    operation: &str,
    task_key: &str,
    action: Option<&str>,
    state: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_key = %task_key,
        action = action,
        state = %state,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for lock operations
pub fn log_lock_operation(
    operation: &str,
    lock_key: &str,
    holder_id: &str,
    status: &str,
    lease_ms: Option<u64>,
) {
    tracing::info!(
        operation = %operation,
        lock_key = %lock_key,
        holder_id = %holder_id,
        status = %status,
        lease_ms = lease_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "🔒 LOCK_OPERATION"
    );
}

/// Log structured data for query operations
pub fn log_query_operation(
    operation: &str,
    query_id: Uuid,
    query_pool: Option<&str>,
    lifecycle: &str,
    task_count: Option<usize>,
) {
    tracing::info!(
        operation = %operation,
        query_id = %query_id,
        query_pool = query_pool,
        lifecycle = %lifecycle,
        task_count = task_count,
        timestamp = %Utc::now().to_rfc3339(),
        "🗂️ QUERY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
