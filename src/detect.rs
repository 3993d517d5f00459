//! Upstream device detection
//!
//! The negotiator treats the device header as ground truth and does not care
//! who set it. In deployments without a detecting proxy, [`DetectLayer`] fills
//! the header from header-level signals before [`MobileViewLayer`] runs.
//! User-agent pattern databases are deliberately not part of this crate; plug
//! one in by implementing [`DeviceDetector`].
//!
//! [`MobileViewLayer`]: crate::layer::MobileViewLayer
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::Router;
//! use mobile_view::config::MobileViewConfig;
//! use mobile_view::detect::DetectLayer;
//! use mobile_view::layer::MobileViewLayer;
//!
//! // Layers run outermost-last: detection must wrap the view layer
//! let app: Router = Router::new()
//!     .layer(MobileViewLayer::in_memory(MobileViewConfig::default()))
//!     .layer(DetectLayer::client_hints());
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use tower::{Layer, Service};

use crate::device::MOBILE_DEVICE_HEADER;

/// `Sec-CH-UA-Mobile` client hint
pub const CH_UA_MOBILE: &str = "sec-ch-ua-mobile";

/// `Sec-CH-UA-Model` client hint
pub const CH_UA_MODEL: &str = "sec-ch-ua-model";

/// WAP profile headers sent by older handsets
const WAP_PROFILE_HEADERS: [&str; 2] = ["x-wap-profile", "profile"];

/// Produces a device label from request headers
pub trait DeviceDetector: Send + Sync + 'static {
    /// Device label when the headers indicate a mobile client
    fn detect(&self, headers: &HeaderMap) -> Option<String>;
}

impl<F> DeviceDetector for F
where
    F: Fn(&HeaderMap) -> Option<String> + Send + Sync + 'static,
{
    fn detect(&self, headers: &HeaderMap) -> Option<String> {
        self(headers)
    }
}

/// Detector driven by client hints and WAP headers
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientHintsDetector;

impl DeviceDetector for ClientHintsDetector {
    fn detect(&self, headers: &HeaderMap) -> Option<String> {
        let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        // `?1` means mobile, `?0` explicitly not
        match text(CH_UA_MOBILE).map(str::trim) {
            Some("?1") => {
                let model = text(CH_UA_MODEL)
                    .map(|m| m.trim().trim_matches('"'))
                    .filter(|m| !m.is_empty())
                    .unwrap_or("mobile");
                return Some(model.to_string());
            }
            Some("?0") => return None,
            _ => {}
        }

        if WAP_PROFILE_HEADERS.iter().any(|h| headers.contains_key(*h)) {
            return Some("wap".to_string());
        }

        let accepts_wap = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("vnd.wap"));
        accepts_wap.then(|| "wap".to_string())
    }
}

// ============================================================================
// Tower Layer
// ============================================================================

/// Layer that sets the device header when the request lacks one
#[derive(Clone)]
pub struct DetectLayer<D = ClientHintsDetector> {
    detector: Arc<D>,
    header_name: HeaderName,
}

impl DetectLayer<ClientHintsDetector> {
    /// Layer using [`ClientHintsDetector`] and the default header
    pub fn client_hints() -> Self {
        Self::new(ClientHintsDetector)
    }
}

impl<D: DeviceDetector> DetectLayer<D> {
    /// Layer using a custom detector
    pub fn new(detector: D) -> Self {
        Self {
            detector: Arc::new(detector),
            header_name: HeaderName::from_static(MOBILE_DEVICE_HEADER),
        }
    }

    /// Write the label to a custom header
    pub fn with_header_name(mut self, name: HeaderName) -> Self {
        self.header_name = name;
        self
    }
}

impl<S, D> Layer<S> for DetectLayer<D> {
    type Service = DetectService<S, D>;

    fn layer(&self, inner: S) -> Self::Service {
        DetectService {
            inner,
            detector: self.detector.clone(),
            header_name: self.header_name.clone(),
        }
    }
}

/// Service annotating requests with the device header
#[derive(Clone)]
pub struct DetectService<S, D> {
    inner: S,
    detector: Arc<D>,
    header_name: HeaderName,
}

impl<S, D, ReqBody> Service<Request<ReqBody>> for DetectService<S, D>
where
    S: Service<Request<ReqBody>>,
    D: DeviceDetector,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        // An upstream proxy already decided
        if !request.headers().contains_key(&self.header_name) {
            if let Some(label) = self.detector.detect(request.headers()) {
                match HeaderValue::from_str(&label) {
                    Ok(value) => {
                        tracing::trace!(device = %label, "Device detected from headers");
                        request
                            .headers_mut()
                            .insert(self.header_name.clone(), value);
                    }
                    Err(_) => tracing::debug!("Detected device label is not a valid header value"),
                }
            }
        }

        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_client_hint_mobile() {
        let detector = ClientHintsDetector;
        assert_eq!(
            detector.detect(&headers(&[(CH_UA_MOBILE, "?1"), (CH_UA_MODEL, "\"Pixel 8\"")])),
            Some("Pixel 8".to_string())
        );
        assert_eq!(
            detector.detect(&headers(&[(CH_UA_MOBILE, "?1"), (CH_UA_MODEL, "\"\"")])),
            Some("mobile".to_string())
        );
    }

    #[test]
    fn test_client_hint_not_mobile_wins() {
        let detector = ClientHintsDetector;
        assert_eq!(
            detector.detect(&headers(&[(CH_UA_MOBILE, "?0"), ("x-wap-profile", "x")])),
            None
        );
    }

    #[test]
    fn test_wap_signals() {
        let detector = ClientHintsDetector;
        assert_eq!(
            detector.detect(&headers(&[("x-wap-profile", "http://example.com/uaprof.xml")])),
            Some("wap".to_string())
        );
        assert_eq!(
            detector.detect(&headers(&[("accept", "text/html, application/vnd.wap.xhtml+xml")])),
            Some("wap".to_string())
        );
        assert_eq!(detector.detect(&headers(&[("accept", "text/html")])), None);
    }

    #[test]
    fn test_closure_detector() {
        let detector = |h: &HeaderMap| h.contains_key("x-test").then(|| "test".to_string());
        assert_eq!(
            DeviceDetector::detect(&detector, &headers(&[("x-test", "1")])),
            Some("test".to_string())
        );
    }

    #[tokio::test]
    async fn test_layer_sets_and_preserves_header() {
        use std::convert::Infallible;
        use tower::{service_fn, ServiceExt};

        let svc = DetectLayer::client_hints().layer(service_fn(|req: Request<()>| async move {
            Ok::<_, Infallible>(
                req.headers()
                    .get(MOBILE_DEVICE_HEADER)
                    .map(|v| v.to_str().unwrap().to_string()),
            )
        }));

        let detected = Request::builder()
            .header(CH_UA_MOBILE, "?1")
            .body(())
            .unwrap();
        assert_eq!(
            svc.clone().oneshot(detected).await.unwrap(),
            Some("mobile".to_string())
        );

        let upstream = Request::builder()
            .header(CH_UA_MOBILE, "?1")
            .header(MOBILE_DEVICE_HEADER, "iPhone")
            .body(())
            .unwrap();
        assert_eq!(
            svc.clone().oneshot(upstream).await.unwrap(),
            Some("iPhone".to_string())
        );

        let desktop = Request::builder().body(()).unwrap();
        assert_eq!(svc.oneshot(desktop).await.unwrap(), None);
    }
}
