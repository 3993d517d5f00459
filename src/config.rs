//! Mobile view configuration
//!
//! Supplied once at setup and read on every negotiation.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{ExclusionSet, MOBILE_DEVICE_HEADER};
use crate::error::{MobileViewError, Result};
use crate::negotiate::NegotiationOptions;

/// Default name of the session cookie
pub const DEFAULT_SESSION_COOKIE: &str = "mobile_view_session";

/// Default idle lifetime of a stored preference (24 hours)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(86_400);

/// Configuration for the mobile view middleware
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileViewConfig {
    /// Device tokens that force the standard view
    pub exclusions: ExclusionSet,

    /// Serve the mobile format unconditionally (non-XHR requests)
    pub force_mobile: bool,

    /// Negotiate and write the session; when false only the device signal
    /// is published to handlers
    pub set_request_format: bool,

    /// Cookie carrying the session id
    pub session_cookie: String,

    /// Header populated by the upstream device detector
    pub device_header: String,

    /// Idle lifetime of stored preferences
    pub session_ttl: Duration,
}

impl Default for MobileViewConfig {
    fn default() -> Self {
        Self {
            exclusions: ExclusionSet::new(),
            force_mobile: false,
            set_request_format: true,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            device_header: MOBILE_DEVICE_HEADER.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

impl MobileViewConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `MOBILE_VIEW_EXCLUDE` (optional): comma-separated device tokens
    /// - `MOBILE_VIEW_FORCE_MOBILE` (optional): `true`/`false` (default: false)
    /// - `MOBILE_VIEW_SET_REQUEST_FORMAT` (optional): `true`/`false` (default: true)
    /// - `MOBILE_VIEW_COOKIE` (optional): session cookie name
    /// - `MOBILE_VIEW_DEVICE_HEADER` (optional): upstream device header name
    /// - `MOBILE_VIEW_SESSION_TTL` (optional): preference lifetime in seconds
    ///
    /// # Errors
    ///
    /// Returns [`MobileViewError::InvalidConfig`] when a value is present but
    /// cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(list) = lookup("MOBILE_VIEW_EXCLUDE") {
            config.exclusions = ExclusionSet::parse_list(&list);
        }

        if let Some(value) = lookup("MOBILE_VIEW_FORCE_MOBILE") {
            config.force_mobile = parse_bool("MOBILE_VIEW_FORCE_MOBILE", &value)?;
        }

        if let Some(value) = lookup("MOBILE_VIEW_SET_REQUEST_FORMAT") {
            config.set_request_format = parse_bool("MOBILE_VIEW_SET_REQUEST_FORMAT", &value)?;
        }

        if let Some(name) = lookup("MOBILE_VIEW_COOKIE") {
            config.session_cookie = name;
        }

        if let Some(name) = lookup("MOBILE_VIEW_DEVICE_HEADER") {
            config.device_header = name.to_ascii_lowercase();
        }

        if let Some(value) = lookup("MOBILE_VIEW_SESSION_TTL") {
            let secs = value.trim().parse::<u64>().map_err(|_| {
                MobileViewError::invalid_config("MOBILE_VIEW_SESSION_TTL", "expected seconds")
            })?;
            config.session_ttl = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check names that end up in HTTP headers
    pub fn validate(&self) -> Result<()> {
        if self.session_cookie.is_empty()
            || !self
                .session_cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(MobileViewError::invalid_config(
                "session_cookie",
                format!("'{}' is not a valid cookie name", self.session_cookie),
            ));
        }

        if axum::http::HeaderName::from_bytes(self.device_header.as_bytes()).is_err() {
            return Err(MobileViewError::invalid_config(
                "device_header",
                format!("'{}' is not a valid header name", self.device_header),
            ));
        }

        Ok(())
    }

    /// Set the exclusion list
    pub fn with_exclusions<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = ExclusionSet::from_tokens(tokens);
        self
    }

    /// Force the mobile format
    pub fn force_mobile(mut self) -> Self {
        self.force_mobile = true;
        self
    }

    /// Publish the device signal only; never negotiate
    pub fn without_request_format(mut self) -> Self {
        self.set_request_format = false;
        self
    }

    /// Set the session cookie name
    pub fn with_session_cookie<S: Into<String>>(mut self, name: S) -> Self {
        self.session_cookie = name.into();
        self
    }

    /// Set the upstream device header name
    pub fn with_device_header<S: Into<String>>(mut self, name: S) -> Self {
        self.device_header = name.into().to_ascii_lowercase();
        self
    }

    /// Set the preference lifetime
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Negotiation options derived from this configuration
    pub fn negotiation_options(&self) -> NegotiationOptions {
        NegotiationOptions {
            force_mobile: self.force_mobile,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(MobileViewError::invalid_config(
            key,
            format!("expected a boolean, got '{}'", other),
        )),
    }
}
