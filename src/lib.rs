//! Mobile View - per-request mobile/standard view negotiation
//!
//! Decides, for every incoming request, whether the response should use the
//! mobile or the standard presentation, and keeps that choice sticky for the
//! rest of the browsing session so users can override device detection.
//!
//! # Features
//!
//! - **Device Signal Reader**: reads the upstream device flag and applies a
//!   case-insensitive exclusion list to the user agent
//! - **View Negotiator**: pure precedence rules over XHR, force-mobile, device
//!   and the stored session preference
//! - **Session Store**: async trait with an in-memory implementation
//! - **Tower Middleware**: runs the pipeline and hands a [`ViewContext`] to
//!   handlers
//! - **Override Endpoints**: explicit mobile/standard choice per session
//! - **Asset Selection**: device-specific stylesheet variants in mobile view
//!
//! # Architecture
//!
//! ```text
//! Request ──▶ DetectLayer ──▶ MobileViewLayer ──▶ Handler (ViewContext)
//!               (optional)        │       │
//!                                 ▼       ▼
//!                         classify   negotiate ◀──▶ SessionStore
//!                        (device +   (rules 1-4)
//!                        exclusions)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use mobile_view::{MobileViewConfig, MobileViewLayer, ViewContext};
//!
//! async fn index(view: ViewContext) -> &'static str {
//!     if view.in_mobile_view() { "mobile page" } else { "standard page" }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MobileViewConfig::new().with_exclusions(["ipad"]);
//!     let app = Router::new()
//!         .route("/", get(index))
//!         .layer(MobileViewLayer::in_memory(config));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Negotiation Without the Layer
//!
//! ```rust
//! use mobile_view::device::{is_mobile_device, DeviceSignal, ExclusionSet};
//! use mobile_view::negotiate::{negotiate, NegotiationOptions};
//! use mobile_view::session::ViewPreference;
//!
//! let signal = DeviceSignal::new().with_user_agent("Android").with_device_flag(true);
//! let mobile = is_mobile_device(&signal, &ExclusionSet::new());
//!
//! let outcome = negotiate(signal.is_xhr(), mobile, ViewPreference::StandardView, &NegotiationOptions::default());
//! assert!(!outcome.in_mobile_view());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod assets;
pub mod config;
pub mod context;
pub mod detect;
pub mod device;
pub mod error;
pub mod format;
pub mod handlers;
pub mod layer;
pub mod negotiate;
pub mod session;
pub mod tracing_middleware;

// Re-exports for convenience
pub use assets::{asset_selector, AssetSelector, MobileAwareAssets, StandardAssets};
pub use config::MobileViewConfig;
pub use context::ViewContext;
pub use detect::{ClientHintsDetector, DetectLayer, DeviceDetector};
pub use device::{is_device, is_mobile_device, DeviceSignal, ExclusionSet};
pub use error::{MobileViewError, Result};
pub use format::{in_mobile_view, Format, FormatRegistry};
pub use handlers::view::{view_router, ViewStatus};
pub use layer::{MobileViewLayer, MobileViewService, MobileViewState};
pub use negotiate::{negotiate, Negotiation, NegotiationOptions};
pub use session::{InMemorySessionStore, SessionId, SessionStore, ViewPreference};
pub use tracing_middleware::{init_tracing, request_tracing_layer, LogFormat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
