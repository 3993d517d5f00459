//! Device signal reader
//!
//! Reads the "is this a mobile device" signal that upstream detection attached
//! to the request and applies the configured exclusion list against the
//! user agent. Everything here is a pure function of its inputs.
//!
//! # Example
//!
//! ```rust
//! use mobile_view::device::{is_mobile_device, DeviceSignal, ExclusionSet};
//!
//! let signal = DeviceSignal::new()
//!     .with_user_agent("MobileExplorer/1.0")
//!     .with_device_flag(true);
//!
//! // Exclusions always win over the raw device flag
//! let exclusions = ExclusionSet::from_tokens(["mobileexplorer"]);
//! assert!(!is_mobile_device(&signal, &exclusions));
//! assert!(is_mobile_device(&signal, &ExclusionSet::new()));
//! ```

use axum::http::{header, HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Header populated by the upstream device detector
pub const MOBILE_DEVICE_HEADER: &str = "x-mobile-device";

/// Header carrying the XHR marker
pub const REQUESTED_WITH_HEADER: &str = "x-requested-with";

/// Value of `X-Requested-With` sent by asynchronous requests
pub const XHR_MARKER: &str = "XMLHttpRequest";

// ============================================================================
// Exclusion Set
// ============================================================================

/// Device-type tokens that force a non-mobile classification
///
/// Tokens are matched case-insensitively as substrings of the user agent.
/// Blank tokens are dropped on insertion, since an empty token would match
/// every user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ExclusionSet {
    tokens: Vec<String>,
}

impl ExclusionSet {
    /// Create an empty exclusion set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an exclusion set from a list of tokens, preserving order
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for token in tokens {
            set.push(token);
        }
        set
    }

    /// Parse a comma-separated token list (`"opera mini, blackberry"`)
    pub fn parse_list(list: &str) -> Self {
        Self::from_tokens(list.split(','))
    }

    /// Append a token
    pub fn push<S: Into<String>>(&mut self, token: S) {
        let token = token.into();
        let token = token.trim();
        if !token.is_empty() {
            self.tokens.push(token.to_string());
        }
    }

    /// Whether no tokens are configured
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of configured tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Iterate over tokens in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Return the first token found in the user agent, if any
    pub fn matching_token(&self, user_agent: Option<&str>) -> Option<&str> {
        self.iter().find(|token| is_device(user_agent, token))
    }

    /// Whether any token matches the user agent
    pub fn matches(&self, user_agent: Option<&str>) -> bool {
        self.matching_token(user_agent).is_some()
    }
}

impl From<Vec<String>> for ExclusionSet {
    fn from(tokens: Vec<String>) -> Self {
        Self::from_tokens(tokens)
    }
}

impl From<ExclusionSet> for Vec<String> {
    fn from(set: ExclusionSet) -> Self {
        set.tokens
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_tokens(iter)
    }
}

// ============================================================================
// Device Signal
// ============================================================================

/// Request-scoped inputs read from the inbound request
///
/// The device flag is derived from the upstream detector's header: present
/// and non-empty means "mobile client". Missing or non-UTF-8 header values
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSignal {
    user_agent: Option<String>,
    is_xhr: bool,
    mobile_device: Option<String>,
}

impl DeviceSignal {
    /// Create an empty signal (no user agent, not XHR, not mobile)
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the signal from request headers using the default device header
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_headers_with(headers, &HeaderName::from_static(MOBILE_DEVICE_HEADER))
    }

    /// Read the signal from request headers using a custom device header
    pub fn from_headers_with(headers: &HeaderMap, device_header: &HeaderName) -> Self {
        let text = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        let is_xhr = headers
            .get(REQUESTED_WITH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case(XHR_MARKER))
            .unwrap_or(false);

        Self {
            user_agent: text(&header::USER_AGENT),
            is_xhr,
            mobile_device: text(device_header),
        }
    }

    /// Set the user agent
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Mark the request as XHR
    pub fn with_xhr(mut self, is_xhr: bool) -> Self {
        self.is_xhr = is_xhr;
        self
    }

    /// Set the raw device header value reported by the upstream detector
    pub fn with_mobile_device<S: Into<String>>(mut self, device: S) -> Self {
        self.mobile_device = Some(device.into());
        self
    }

    /// Set the device flag directly
    pub fn with_device_flag(mut self, flag: bool) -> Self {
        self.mobile_device = flag.then(|| "true".to_string());
        self
    }

    /// User agent string, if the request carried one
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Whether this is an asynchronous/partial request
    pub fn is_xhr(&self) -> bool {
        self.is_xhr
    }

    /// Raw device header value, if the upstream detector set one
    pub fn mobile_device(&self) -> Option<&str> {
        self.mobile_device.as_deref().filter(|v| !v.is_empty())
    }

    /// Device flag: true iff the upstream detector flagged a mobile client
    pub fn device_flag(&self) -> bool {
        self.mobile_device().is_some()
    }

    /// Test the user agent for a specific device family
    pub fn is_device(&self, token: &str) -> bool {
        is_device(self.user_agent(), token)
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// Case-insensitive substring match of `token` against the user agent
///
/// An absent user agent is treated as empty, so it only matches the empty
/// token.
pub fn is_device(user_agent: Option<&str>, token: &str) -> bool {
    user_agent
        .unwrap_or_default()
        .to_lowercase()
        .contains(&token.to_lowercase())
}

/// Classify the client as mobile
///
/// A matching exclusion forces `false` regardless of the device flag.
/// Otherwise the device flag is returned as-is.
pub fn is_mobile_device(signal: &DeviceSignal, exclusions: &ExclusionSet) -> bool {
    if let Some(token) = exclusions.matching_token(signal.user_agent()) {
        tracing::trace!(token, "user agent matched exclusion list");
        return false;
    }
    signal.device_flag()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_device_case_insensitive() {
        assert!(is_device(Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"), "iphone"));
        assert!(is_device(Some("mozilla/5.0 (iphone)"), "IPHONE"));
        assert!(!is_device(Some("Mozilla/5.0 (Windows NT 10.0)"), "iphone"));
    }

    #[test]
    fn test_is_device_absent_user_agent() {
        assert!(!is_device(None, "iphone"));
        assert!(!is_device(Some(""), "android"));
        assert!(is_device(None, ""));
        assert!(is_device(Some(""), ""));
    }

    #[test]
    fn test_exclusion_wins_over_device_flag() {
        let signal = DeviceSignal::new()
            .with_user_agent("MobileExplorer/1.0")
            .with_device_flag(true);
        let exclusions = ExclusionSet::from_tokens(["mobileexplorer"]);

        assert!(!is_mobile_device(&signal, &exclusions));
    }

    #[test]
    fn test_no_exclusions_returns_flag() {
        let mobile = DeviceSignal::new()
            .with_user_agent("Android")
            .with_device_flag(true);
        let desktop = DeviceSignal::new().with_user_agent("Android");

        assert!(is_mobile_device(&mobile, &ExclusionSet::new()));
        assert!(!is_mobile_device(&desktop, &ExclusionSet::new()));
    }

    #[test]
    fn test_non_matching_exclusion_keeps_flag() {
        let signal = DeviceSignal::new()
            .with_user_agent("Mozilla/5.0 (Linux; Android 14)")
            .with_device_flag(true);
        let exclusions = ExclusionSet::from_tokens(["ipad", "kindle"]);

        assert!(is_mobile_device(&signal, &exclusions));
    }

    #[test]
    fn test_exclusion_set_drops_blank_tokens() {
        let set = ExclusionSet::parse_list("ipad, ,  kindle ,");
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["ipad", "kindle"]);

        // A blank token must not exclude everything
        let signal = DeviceSignal::new()
            .with_user_agent("Android")
            .with_device_flag(true);
        assert!(is_mobile_device(&signal, &ExclusionSet::from_tokens(["", "  "])));
    }

    #[test]
    fn test_matching_token_returns_first_in_order() {
        let set = ExclusionSet::from_tokens(["tablet", "ipad"]);
        assert_eq!(
            set.matching_token(Some("Mozilla/5.0 (iPad; Tablet)")),
            Some("tablet")
        );
        assert_eq!(set.matching_token(None), None);
    }

    #[test]
    fn test_signal_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Opera Mini"));
        headers.insert(REQUESTED_WITH_HEADER, HeaderValue::from_static("xmlhttprequest"));
        headers.insert(MOBILE_DEVICE_HEADER, HeaderValue::from_static("OperaMini"));

        let signal = DeviceSignal::from_headers(&headers);
        assert_eq!(signal.user_agent(), Some("Opera Mini"));
        assert!(signal.is_xhr());
        assert!(signal.device_flag());
        assert_eq!(signal.mobile_device(), Some("OperaMini"));
    }

    #[test]
    fn test_signal_from_empty_headers() {
        let signal = DeviceSignal::from_headers(&HeaderMap::new());
        assert_eq!(signal, DeviceSignal::new());
        assert!(!signal.device_flag());
        assert!(!signal.is_xhr());
    }

    #[test]
    fn test_empty_device_header_is_not_mobile() {
        let mut headers = HeaderMap::new();
        headers.insert(MOBILE_DEVICE_HEADER, HeaderValue::from_static(""));

        let signal = DeviceSignal::from_headers(&headers);
        assert!(!signal.device_flag());
        assert_eq!(signal.mobile_device(), None);
    }

    #[test]
    fn test_custom_device_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-device-class", HeaderValue::from_static("phone"));

        let name = HeaderName::from_static("x-device-class");
        assert!(DeviceSignal::from_headers_with(&headers, &name).device_flag());
        assert!(!DeviceSignal::from_headers(&headers).device_flag());
    }

    #[test]
    fn test_exclusion_set_serde() {
        let set: ExclusionSet = serde_json::from_str(r#"["iPad", "Kindle"]"#).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["iPad","Kindle"]"#);
    }
}
