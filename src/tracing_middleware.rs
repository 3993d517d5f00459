//! Logging setup and HTTP request tracing
//!
//! - Subscriber initialization with JSON, pretty or compact output
//! - A `tower-http` trace layer whose span carries the negotiated view
//!
//! ```text
//! Request ──> TraceLayer ──> MobileViewLayer ──> Handler
//!                 │                 │
//!                 ▼                 ▼
//!           http_request       records view_format
//!              span             on the same span
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::Router;
//! use mobile_view::config::MobileViewConfig;
//! use mobile_view::layer::MobileViewLayer;
//! use mobile_view::tracing_middleware::{init_tracing, request_tracing_layer};
//!
//! init_tracing();
//!
//! let app: Router = Router::new()
//!     .layer(MobileViewLayer::in_memory(MobileViewConfig::default()))
//!     .layer(request_tracing_layer());
//! ```

use std::str::FromStr;
use std::time::Duration;

use axum::http::{Request, Response};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{MakeSpan, OnRequest, OnResponse, TraceLayer},
};
use tracing::{info_span, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::device::{REQUESTED_WITH_HEADER, XHR_MARKER};

/// Environment variable selecting the log format
pub const LOG_FORMAT_ENV: &str = "MOBILE_VIEW_LOG_FORMAT";

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,mobile_view=debug,tower_http=info";

// ============================================================================
// Span Maker
// ============================================================================

/// Span maker for HTTP requests
///
/// `view_format` starts empty and is filled in by
/// [`MobileViewLayer`](crate::layer::MobileViewLayer) once negotiated.
#[derive(Clone, Debug, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let xhr = request
            .headers()
            .get(REQUESTED_WITH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case(XHR_MARKER))
            .unwrap_or(false);

        info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
            xhr,
            view_format = tracing::field::Empty,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        )
    }
}

/// Logs incoming requests
#[derive(Clone, Debug, Default)]
pub struct OnRequestLog;

impl<B> OnRequest<B> for OnRequestLog {
    fn on_request(&mut self, request: &Request<B>, _span: &Span) {
        tracing::debug!(
            target: "http::request",
            method = %request.method(),
            uri = %request.uri(),
            "incoming request"
        );
    }
}

/// Logs completed responses with latency
#[derive(Clone, Debug, Default)]
pub struct OnResponseLog;

impl<B> OnResponse<B> for OnResponseLog {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();
        let duration_ms = latency.as_secs_f64() * 1000.0;

        span.record("status", status);
        span.record("duration_ms", duration_ms);

        if status >= 500 {
            tracing::error!(target: "http::response", status, duration_ms, "server error response");
        } else if status >= 400 {
            tracing::warn!(target: "http::response", status, duration_ms, "client error response");
        } else {
            tracing::info!(target: "http::response", status, duration_ms, "response completed");
        }
    }
}

/// HTTP trace layer with view-aware spans
pub fn request_tracing_layer(
) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan, OnRequestLog, OnResponseLog>
{
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_request(OnRequestLog)
        .on_response(OnResponseLog)
}

// ============================================================================
// Subscriber Initialization
// ============================================================================

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON, one object per line
    Json,
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl LogFormat {
    /// Read from `MOBILE_VIEW_LOG_FORMAT`; JSON in release builds otherwise
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if cfg!(debug_assertions) {
                LogFormat::Pretty
            } else {
                LogFormat::Json
            })
    }
}

/// Initialize tracing using `RUST_LOG` and `MOBILE_VIEW_LOG_FORMAT`
pub fn init_tracing() {
    init_tracing_with(LogFormat::from_env(), None);
}

/// Initialize tracing with an explicit format and optional filter override
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing_with(format: LogFormat, filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("Tracing already initialized: {}", e);
    }
}
