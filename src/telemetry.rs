//! Telemetry utilities: global subscriber setup and request-scoped trace IDs.
//!
//! App Engine forwards a `X-Cloud-Trace-Context: TRACE_ID/SPAN_ID;o=OPTIONS`
//! header on every request; its trace ID is reused so log lines correlate
//! with Cloud Trace. Requests without it get a generated ID.

use std::any::type_name_of_val;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing::Instrument;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

/// Header App Engine uses to propagate Cloud Trace context.
pub const CLOUD_TRACE_HEADER: &str = "x-cloud-trace-context";

/// Trace context containing request correlation ID.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize global tracing/logging exactly once, wiring `log::` macros into the tracing pipeline.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        // Another LogTracer (tests, embedding application) is fine.
        let logger_type = type_name_of_val(log::logger());
        if !logger_type.contains("LogTracer") {
            eprintln!(
                "Warning: Failed to install log tracer bridge: {}. `log::` macros will not emit tracing events.",
                err
            );
        }
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!(
            "Warning: Failed to set global tracing subscriber: {}. Default subscriber remains in effect.",
            err
        );
    }

    Ok(())
}

/// Execute `future` within the provided trace context, making it available through task-local
/// storage for the duration of the request.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// Get the currently active trace ID, if one has been set for the running task.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}

/// Extract the trace ID from an `X-Cloud-Trace-Context` header value.
pub fn parse_cloud_trace_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CLOUD_TRACE_HEADER)?.to_str().ok()?;
    let trace_id = value.split('/').next()?.trim();
    if trace_id.is_empty() || !trace_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trace_id.to_string())
}

/// Middleware establishing a [`TraceContext`] for the request.
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = parse_cloud_trace_id(request.headers())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let context = TraceContext { trace_id };
    request.extensions_mut().insert(context.clone());

    let span = tracing::info_span!("request", trace_id = %context.trace_id);

    with_trace_context(context, next.run(request))
        .instrument(span)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_cloud_trace_id() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CLOUD_TRACE_HEADER,
            HeaderValue::from_static("105445aa7843bc8bf206b12000100000/1;o=1"),
        );
        assert_eq!(
            parse_cloud_trace_id(&headers).as_deref(),
            Some("105445aa7843bc8bf206b12000100000")
        );
    }

    #[test]
    fn test_parse_cloud_trace_id_rejects_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_cloud_trace_id(&headers), None);

        headers.insert(CLOUD_TRACE_HEADER, HeaderValue::from_static("not-hex/1"));
        assert_eq!(parse_cloud_trace_id(&headers), None);
    }

    #[tokio::test]
    async fn test_trace_id_visible_inside_scope() {
        assert_eq!(current_trace_id(), None);

        let context = TraceContext {
            trace_id: "abc123".to_string(),
        };
        let seen = with_trace_context(context, async { current_trace_id() }).await;
        assert_eq!(seen.as_deref(), Some("abc123"));
    }
}
