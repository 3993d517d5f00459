//! Mobile view middleware
//!
//! Runs the two-step pipeline for every request:
//!
//! ```text
//! Request ──▶ classify ──▶ negotiate ──▶ Handler
//!                │             │
//!                ▼             ▼
//!          DeviceSignal   SessionStore
//!          + exclusions   (read, maybe write)
//!                 \          /
//!                  ViewContext (request extension)
//! ```
//!
//! Both steps are also exposed as plain methods on [`MobileViewState`] for
//! hosts that drive them without the tower layer.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use mobile_view::config::MobileViewConfig;
//! use mobile_view::context::ViewContext;
//! use mobile_view::layer::MobileViewLayer;
//!
//! let config = MobileViewConfig::new().with_exclusions(["ipad"]);
//! let app: Router = Router::new()
//!     .route("/", get(|view: ViewContext| async move { view.in_mobile_view().to_string() }))
//!     .layer(MobileViewLayer::in_memory(config));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::{debug, warn, Span};

use crate::config::MobileViewConfig;
use crate::context::ViewContext;
use crate::device::{is_mobile_device, DeviceSignal, MOBILE_DEVICE_HEADER};
use crate::negotiate::{negotiate, Negotiation};
use crate::session::{
    InMemorySessionStore, SessionId, SessionStore, ViewPreference, CLEANUP_INTERVAL,
};

/// Response header echoing the negotiated format
pub const VIEW_FORMAT_HEADER: &str = "x-view-format";

// ============================================================================
// Shared State
// ============================================================================

/// Configuration and session store shared by the layer and the view endpoints
pub struct MobileViewState {
    config: MobileViewConfig,
    device_header: HeaderName,
    store: Arc<dyn SessionStore>,
}

/// Result of running the pipeline on one request
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Context handed to handlers
    pub context: ViewContext,
    /// Negotiation outcome; `None` when format setting is disabled
    pub negotiation: Option<Negotiation>,
    /// Session id newly issued for this request (needs a cookie)
    pub issued_session: Option<SessionId>,
}

impl MobileViewState {
    /// Create state over a custom session store
    pub fn new(config: MobileViewConfig, store: Arc<dyn SessionStore>) -> Self {
        let device_header = HeaderName::from_bytes(config.device_header.as_bytes())
            .unwrap_or_else(|_| {
                warn!(
                    header = %config.device_header,
                    "Invalid device header name, falling back to default"
                );
                HeaderName::from_static(MOBILE_DEVICE_HEADER)
            });

        debug!(
            exclusions = config.exclusions.len(),
            force_mobile = config.force_mobile,
            set_request_format = config.set_request_format,
            "Mobile view state created"
        );

        Self {
            config,
            device_header,
            store,
        }
    }

    /// Create state over an [`InMemorySessionStore`] using the configured TTL
    ///
    /// Inside a Tokio runtime this also starts the store's cleanup task.
    /// Elsewhere expired sessions are still swept as new ones are written.
    pub fn in_memory(config: MobileViewConfig) -> Self {
        let store = Arc::new(InMemorySessionStore::with_ttl(config.session_ttl));
        if tokio::runtime::Handle::try_current().is_ok() {
            let interval = config
                .session_ttl
                .clamp(Duration::from_secs(1), CLEANUP_INTERVAL);
            store.clone().start_cleanup_task(interval);
        }
        Self::new(config, store)
    }

    /// Configuration in effect
    pub fn config(&self) -> &MobileViewConfig {
        &self.config
    }

    /// Session store in use
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Header the device label is read from
    pub fn device_header(&self) -> &HeaderName {
        &self.device_header
    }

    /// Step 1: read the device signal and apply exclusions
    pub fn classify(&self, headers: &HeaderMap) -> (DeviceSignal, bool) {
        let signal = DeviceSignal::from_headers_with(headers, &self.device_header);
        let device_is_mobile = is_mobile_device(&signal, &self.config.exclusions);
        (signal, device_is_mobile)
    }

    /// Session id carried by the request's cookie
    pub fn session_id(&self, headers: &HeaderMap) -> Option<SessionId> {
        read_cookie(headers, &self.config.session_cookie).and_then(|v| SessionId::parse(&v))
    }

    /// Build the `Set-Cookie` value for a session id
    pub fn session_cookie(&self, session: &SessionId) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.config.session_cookie, session
        ))
        .ok()
    }

    /// Stored preference for a session; `Unset` when absent or unreadable
    async fn stored_preference(&self, session: Option<&SessionId>) -> Option<ViewPreference> {
        match session {
            Some(id) => match self.store.get(id).await {
                Ok(preference) => Some(preference),
                Err(e) => {
                    warn!(error = %e, code = e.error_code(), "Failed to read view preference");
                    None
                }
            },
            None => Some(ViewPreference::Unset),
        }
    }

    /// Step 2: negotiate against the stored preference and write it back
    ///
    /// Store failures never abort: a failed read negotiates from `Unset`
    /// and suppresses the write, a failed write is logged and dropped.
    ///
    /// A write only ever moves an unset preference, so it always goes under
    /// a freshly issued id. Ids the store does not know are never written.
    pub async fn negotiate(
        &self,
        signal: &DeviceSignal,
        device_is_mobile: bool,
        session: Option<SessionId>,
    ) -> (Negotiation, Option<SessionId>) {
        let read = self.stored_preference(session.as_ref()).await;
        let writable = read.is_some();

        let outcome = negotiate(
            signal.is_xhr(),
            device_is_mobile,
            read.unwrap_or_default(),
            &self.config.negotiation_options(),
        );

        let mut issued = None;
        if outcome.preference_changed() && writable {
            let id = SessionId::generate();
            match self.store.set(&id, outcome.preference).await {
                Ok(()) => issued = Some(id),
                Err(e) => {
                    warn!(error = %e, code = e.error_code(), "Failed to store view preference")
                }
            }
        }

        (outcome, issued)
    }

    /// Run both steps for a request
    pub async fn resolve(&self, headers: &HeaderMap) -> Resolution {
        let (signal, device_is_mobile) = self.classify(headers);
        let session = self.session_id(headers);

        if !self.config.set_request_format {
            let preference = self
                .stored_preference(session.as_ref())
                .await
                .unwrap_or_default();
            let context = ViewContext::new(signal, device_is_mobile)
                .with_preference(preference)
                .with_session(session);
            return Resolution {
                context,
                negotiation: None,
                issued_session: None,
            };
        }

        let (outcome, issued) = self
            .negotiate(&signal, device_is_mobile, session.clone())
            .await;

        debug!(
            rule = outcome.rule.as_str(),
            device_is_mobile,
            xhr = signal.is_xhr(),
            previous = %outcome.previous,
            preference = %outcome.preference,
            format = outcome.format.as_ref().map(|f| f.as_str()).unwrap_or("default"),
            "View negotiated"
        );

        let context = ViewContext::new(signal, device_is_mobile)
            .with_negotiation(&outcome)
            .with_session(issued.clone().or(session));

        Resolution {
            context,
            negotiation: Some(outcome),
            issued_session: issued,
        }
    }
}

/// Find a cookie value by name across all `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

// ============================================================================
// Tower Layer Implementation
// ============================================================================

/// Tower layer attaching a [`ViewContext`] to every request
#[derive(Clone)]
pub struct MobileViewLayer {
    state: Arc<MobileViewState>,
}

impl MobileViewLayer {
    /// Create a layer over shared state
    pub fn new(state: Arc<MobileViewState>) -> Self {
        Self { state }
    }

    /// Create a layer with an in-memory session store
    pub fn in_memory(config: MobileViewConfig) -> Self {
        Self::new(Arc::new(MobileViewState::in_memory(config)))
    }

    /// Shared state, for mounting the view endpoints on the same store
    pub fn state(&self) -> Arc<MobileViewState> {
        self.state.clone()
    }
}

impl<S> Layer<S> for MobileViewLayer {
    type Service = MobileViewService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MobileViewService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Tower service running the view pipeline
#[derive(Clone)]
pub struct MobileViewService<S> {
    inner: S,
    state: Arc<MobileViewState>,
}

impl<S> Service<Request<Body>> for MobileViewService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let clone = self.inner.clone();
        // Use the service that was driven to readiness
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let resolution = state.resolve(req.headers()).await;

            let format = resolution.context.format().map(|f| f.as_str().to_string());
            if let Some(format) = &format {
                Span::current().record("view_format", format.as_str());
            }

            req.extensions_mut().insert(resolution.context);
            let mut response = inner.call(req).await?;

            if let Some(format) = format.and_then(|f| HeaderValue::from_str(&f).ok()) {
                response.headers_mut().insert(VIEW_FORMAT_HEADER, format);
            }

            if let Some(cookie) = resolution
                .issued_session
                .as_ref()
                .and_then(|id| state.session_cookie(id))
            {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::REQUESTED_WITH_HEADER;
    use crate::format::Format;
    use crate::session::UnavailableSessionStore;

    fn mobile_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (iPhone)"));
        headers.insert(MOBILE_DEVICE_HEADER, HeaderValue::from_static("iPhone"));
        headers
    }

    fn with_cookie(mut headers: HeaderMap, cookie: &str) -> HeaderMap {
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; mobile_view_session=abc"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));

        assert_eq!(read_cookie(&headers, "mobile_view_session"), Some("abc".to_string()));
        assert_eq!(read_cookie(&headers, "b"), Some("2".to_string()));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_classify_applies_exclusions() {
        let state = MobileViewState::in_memory(MobileViewConfig::new().with_exclusions(["iphone"]));
        let (signal, mobile) = state.classify(&mobile_headers());
        assert!(signal.device_flag());
        assert!(!mobile);
    }

    #[tokio::test]
    async fn test_first_visit_issues_session() {
        let state = MobileViewState::in_memory(MobileViewConfig::default());
        let resolution = state.resolve(&mobile_headers()).await;

        assert!(resolution.context.in_mobile_view());
        let issued = resolution.issued_session.expect("session issued");
        assert_eq!(
            state.store().get(&issued).await.unwrap(),
            ViewPreference::MobileView
        );
        assert_eq!(resolution.context.session(), Some(&issued));
    }

    #[tokio::test]
    async fn test_desktop_visit_issues_nothing() {
        let state = MobileViewState::in_memory(MobileViewConfig::default());
        let resolution = state.resolve(&HeaderMap::new()).await;

        assert_eq!(resolution.context.format(), Some(&Format::Standard));
        assert!(resolution.issued_session.is_none());
    }

    #[tokio::test]
    async fn test_existing_standard_choice_respected() {
        let state = MobileViewState::in_memory(MobileViewConfig::default());
        let id = SessionId::parse("session-1").unwrap();
        state
            .store()
            .set(&id, ViewPreference::StandardView)
            .await
            .unwrap();

        let headers = with_cookie(mobile_headers(), "mobile_view_session=session-1");
        let resolution = state.resolve(&headers).await;

        assert!(!resolution.context.in_mobile_view());
        assert!(resolution.context.is_mobile_device());
        assert!(resolution.issued_session.is_none());
        assert_eq!(
            state.store().get(&id).await.unwrap(),
            ViewPreference::StandardView
        );
    }

    #[tokio::test]
    async fn test_xhr_skips_negotiation() {
        let state = MobileViewState::in_memory(MobileViewConfig::default());
        let mut headers = mobile_headers();
        headers.insert(REQUESTED_WITH_HEADER, HeaderValue::from_static("XMLHttpRequest"));

        let resolution = state.resolve(&headers).await;
        assert_eq!(resolution.context.format(), None);
        assert!(resolution.issued_session.is_none());
    }

    #[tokio::test]
    async fn test_set_request_format_disabled() {
        let state =
            MobileViewState::in_memory(MobileViewConfig::new().without_request_format());
        let resolution = state.resolve(&mobile_headers()).await;

        assert!(resolution.negotiation.is_none());
        assert!(resolution.context.is_mobile_device());
        assert!(!resolution.context.in_mobile_view());
        assert!(resolution.issued_session.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_degrades() {
        let state = MobileViewState::new(
            MobileViewConfig::default(),
            Arc::new(UnavailableSessionStore),
        );
        let headers = with_cookie(mobile_headers(), "mobile_view_session=s");

        let resolution = state.resolve(&headers).await;
        assert!(resolution.context.in_mobile_view());
        assert!(resolution.issued_session.is_none());

        // No session cookie: write is attempted and fails, no cookie issued
        let resolution = state.resolve(&mobile_headers()).await;
        assert!(resolution.context.in_mobile_view());
        assert!(resolution.issued_session.is_none());
    }

    #[tokio::test]
    async fn test_unknown_cookie_id_is_replaced() {
        let state = MobileViewState::in_memory(MobileViewConfig::default());
        let forged = SessionId::parse("never-issued").unwrap();
        let headers = with_cookie(mobile_headers(), "mobile_view_session=never-issued");

        let resolution = state.resolve(&headers).await;
        let issued = resolution.issued_session.expect("fresh session issued");

        assert_ne!(issued, forged);
        assert_eq!(resolution.context.session(), Some(&issued));
        assert_eq!(state.store().get(&forged).await.unwrap(), ViewPreference::Unset);
        assert_eq!(
            state.store().get(&issued).await.unwrap(),
            ViewPreference::MobileView
        );
    }

    #[tokio::test]
    async fn test_store_stays_bounded_under_cookieless_traffic() {
        let store = Arc::new(InMemorySessionStore::with_ttl(Duration::from_millis(1)));
        let state = MobileViewState::new(MobileViewConfig::default(), store.clone());

        for i in 0..500 {
            state.resolve(&mobile_headers()).await;
            let forged = format!("mobile_view_session=forged-{}", i);
            state.resolve(&with_cookie(mobile_headers(), &forged)).await;
        }
        assert!(!store.is_empty().await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        state.resolve(&mobile_headers()).await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_set_request_format_disabled_reports_stored_preference() {
        let state =
            MobileViewState::in_memory(MobileViewConfig::new().without_request_format());
        let id = SessionId::parse("session-1").unwrap();
        state
            .store()
            .set(&id, ViewPreference::StandardView)
            .await
            .unwrap();

        let headers = with_cookie(mobile_headers(), "mobile_view_session=session-1");
        let resolution = state.resolve(&headers).await;

        assert_eq!(resolution.context.format(), None);
        assert_eq!(resolution.context.preference(), ViewPreference::StandardView);
        assert_eq!(resolution.context.session(), Some(&id));
    }

    #[test]
    fn test_custom_device_header() {
        let state =
            MobileViewState::in_memory(MobileViewConfig::new().with_device_header("x-device"));
        assert_eq!(state.device_header().as_str(), "x-device");

        let mut headers = HeaderMap::new();
        headers.insert("x-device", HeaderValue::from_static("Android"));
        let (signal, mobile) = state.classify(&headers);
        assert_eq!(signal.mobile_device(), Some("Android"));
        assert!(mobile);
    }

    #[test]
    fn test_session_cookie_value() {
        let state = MobileViewState::in_memory(MobileViewConfig::default());
        let cookie = state
            .session_cookie(&SessionId::parse("abc").unwrap())
            .unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "mobile_view_session=abc; Path=/; HttpOnly; SameSite=Lax"
        );
    }
}
