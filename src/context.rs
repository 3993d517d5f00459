//! Per-request view context
//!
//! [`MobileViewLayer`](crate::layer::MobileViewLayer) inserts a [`ViewContext`]
//! into request extensions. Handlers extract it to branch on the negotiated
//! view. Extraction never fails: a request that bypassed the layer yields the
//! default context, where every query returns false.
//!
//! ```rust,no_run
//! use mobile_view::context::ViewContext;
//!
//! async fn index(view: ViewContext) -> &'static str {
//!     if view.in_mobile_view() {
//!         "mobile"
//!     } else {
//!         "standard"
//!     }
//! }
//! ```

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::device::DeviceSignal;
use crate::format::{in_mobile_view, Format};
use crate::negotiate::Negotiation;
use crate::session::{SessionId, ViewPreference};

/// Outcome of device classification and negotiation for one request
#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    signal: DeviceSignal,
    device_is_mobile: bool,
    format: Option<Format>,
    preference: ViewPreference,
    session: Option<SessionId>,
}

impl ViewContext {
    /// Context holding only the device classification
    pub fn new(signal: DeviceSignal, device_is_mobile: bool) -> Self {
        Self {
            signal,
            device_is_mobile,
            ..Default::default()
        }
    }

    /// Apply a negotiation outcome
    ///
    /// A `None` format (XHR) leaves the current format in place.
    pub fn with_negotiation(mut self, negotiation: &Negotiation) -> Self {
        if let Some(format) = &negotiation.format {
            self.format = Some(format.clone());
        }
        self.preference = negotiation.preference;
        self
    }

    /// Attach the session the preference was read from
    pub fn with_session(mut self, session: Option<SessionId>) -> Self {
        self.session = session;
        self
    }

    /// Attach a preference without negotiating
    pub fn with_preference(mut self, preference: ViewPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Negotiated format, if any
    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Whether the response should use the mobile presentation
    pub fn in_mobile_view(&self) -> bool {
        in_mobile_view(self.format.as_ref())
    }

    /// Device classification after exclusions
    pub fn is_mobile_device(&self) -> bool {
        self.device_is_mobile
    }

    /// Test the user agent for a specific device family
    pub fn is_device(&self, token: &str) -> bool {
        self.signal.is_device(token)
    }

    /// Raw device header value reported upstream
    pub fn mobile_device(&self) -> Option<&str> {
        self.signal.mobile_device()
    }

    /// Whether the request was XHR
    pub fn is_xhr(&self) -> bool {
        self.signal.is_xhr()
    }

    /// User agent string
    pub fn user_agent(&self) -> Option<&str> {
        self.signal.user_agent()
    }

    /// Session preference after negotiation
    pub fn preference(&self) -> ViewPreference {
        self.preference
    }

    /// Session id, when the request carried or was issued one
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ViewContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ViewContext>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiate::{negotiate, NegotiationOptions};
    use axum::http::Request;

    #[test]
    fn test_default_context_is_all_false() {
        let ctx = ViewContext::default();
        assert!(!ctx.in_mobile_view());
        assert!(!ctx.is_mobile_device());
        assert!(!ctx.is_device("iphone"));
        assert_eq!(ctx.mobile_device(), None);
        assert_eq!(ctx.format(), None);
        assert_eq!(ctx.preference(), ViewPreference::Unset);
    }

    #[test]
    fn test_with_negotiation() {
        let signal = DeviceSignal::new()
            .with_user_agent("iPhone")
            .with_mobile_device("iPhone");
        let outcome = negotiate(false, true, ViewPreference::Unset, &NegotiationOptions::default());

        let ctx = ViewContext::new(signal, true).with_negotiation(&outcome);
        assert!(ctx.in_mobile_view());
        assert!(ctx.is_device("iphone"));
        assert_eq!(ctx.mobile_device(), Some("iPhone"));
        assert_eq!(ctx.preference(), ViewPreference::MobileView);
    }

    #[test]
    fn test_xhr_negotiation_keeps_format() {
        let signal = DeviceSignal::new().with_xhr(true).with_device_flag(true);
        let outcome = negotiate(true, true, ViewPreference::Unset, &NegotiationOptions::default());

        let ctx = ViewContext::new(signal, true).with_negotiation(&outcome);
        assert_eq!(ctx.format(), None);
        assert!(!ctx.in_mobile_view());
        assert!(ctx.is_mobile_device());
    }

    #[tokio::test]
    async fn test_extract_missing_context() {
        let (mut parts, _) = Request::new(()).into_parts();
        let ctx = ViewContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(!ctx.in_mobile_view());
    }

    #[tokio::test]
    async fn test_extract_present_context() {
        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(ViewContext::new(DeviceSignal::new().with_device_flag(true), true));
        let (mut parts, _) = request.into_parts();

        let ctx = ViewContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(ctx.is_mobile_device());
    }
}
