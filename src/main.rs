//! Mobile View demo server
//!
//! Serves a page that renders differently in mobile and standard view, plus
//! the view override endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use mobile_view::session::CLEANUP_INTERVAL;
use mobile_view::{
    asset_selector, in_mobile_view, init_tracing, request_tracing_layer, view_router,
    AssetSelector, DetectLayer, Format, FormatRegistry, InMemorySessionStore, MobileViewConfig,
    MobileViewLayer, MobileViewState, ViewContext,
};
use serde::Deserialize;
use tracing::info;

/// Mobile View demo server
#[derive(Parser, Debug)]
#[command(name = "mobile-view-demo")]
#[command(version)]
#[command(about = "Demo server for mobile/standard view negotiation")]
#[command(long_about = r#"Demo server for mobile/standard view negotiation

Every request is classified from the x-mobile-device header (or client hints
when --detect is set), then negotiated against the session's stored view
preference. Visit /view/standard or /view/mobile (POST) to override, or
add ?format=mobile / ?format=standard to render one page explicitly.

EXAMPLES:
  # Start on the default port
  mobile-view-demo

  # Never serve the mobile view to iPads
  mobile-view-demo --exclude ipad

  # Detect devices from Sec-CH-UA-Mobile, link device stylesheets
  mobile-view-demo --detect --stylesheets ./public/stylesheets
"#)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Device tokens that force the standard view (repeatable)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Always serve the mobile view to non-XHR requests
    #[arg(long)]
    force_mobile: bool,

    /// Only classify devices; never negotiate or write sessions
    #[arg(long)]
    no_request_format: bool,

    /// Detect devices from client hints when no upstream header is present
    #[arg(long)]
    detect: bool,

    /// Directory searched for device-specific stylesheet variants
    #[arg(long)]
    stylesheets: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

struct Page {
    assets: Box<dyn AssetSelector>,
    formats: FormatRegistry,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    format: Option<String>,
}

async fn index(page: Arc<Page>, view: ViewContext, query: PageQuery) -> Response {
    // An explicit format wins over the negotiated one for this response only
    let explicit = query.format.as_deref().map(Format::from_name);
    let format = explicit.as_ref().or(view.format());

    if let Some(format) = format {
        if !page.formats.is_registered(format.as_str()) {
            return (StatusCode::NOT_ACCEPTABLE, format!("Unknown format: {}", format))
                .into_response();
        }
    }

    let links: String = page
        .assets
        .stylesheets(&["application.css"], &view)
        .iter()
        .map(|href| format!("<link rel=\"stylesheet\" href=\"/stylesheets/{}\">", href))
        .collect();

    let body = if in_mobile_view(format) {
        "<h1>Mobile</h1><form method=\"post\" action=\"/view/standard\"><button>Standard site</button></form>"
    } else {
        "<h1>Standard</h1><form method=\"post\" action=\"/view/mobile\"><button>Mobile site</button></form>"
    };

    let content_type = format
        .and_then(|f| page.formats.content_type(f))
        .unwrap_or(mobile_view::format::HTML_CONTENT_TYPE)
        .to_string();

    (
        [(header::CONTENT_TYPE, content_type)],
        Html(format!("<html><head>{}</head><body>{}</body></html>", links, body)),
    )
        .into_response()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        mobile_view::tracing_middleware::init_tracing_with(
            mobile_view::LogFormat::from_env(),
            Some("debug"),
        );
    } else {
        init_tracing();
    }

    let mut config = MobileViewConfig::from_env()?;
    if !args.exclude.is_empty() {
        config = config.with_exclusions(args.exclude.iter().flat_map(|e| e.split(',')));
    }
    if args.force_mobile {
        config = config.force_mobile();
    }
    if args.no_request_format {
        config = config.without_request_format();
    }
    config.validate()?;

    let store = Arc::new(InMemorySessionStore::with_ttl(config.session_ttl));
    store.clone().start_cleanup_task(CLEANUP_INTERVAL);
    let state = Arc::new(MobileViewState::new(config, store));
    let device_header = state.device_header().clone();

    let page = Arc::new(Page {
        assets: asset_selector(args.stylesheets.clone()),
        formats: FormatRegistry::default(),
    });

    let app = Router::new()
        .route(
            "/",
            get(move |view: ViewContext, Query(query): Query<PageQuery>| {
                index(page.clone(), view, query)
            }),
        )
        .merge(view_router(state.clone()))
        .layer(MobileViewLayer::new(state));

    let app = if args.detect {
        app.layer(DetectLayer::client_hints().with_header_name(device_header))
    } else {
        app
    };
    let app = app.layer(request_tracing_layer());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mobile view demo listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
