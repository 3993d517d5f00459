//! View negotiator
//!
//! Combines the device signal, the force-mobile option, the XHR marker and
//! the stored session preference into a final format decision.
//!
//! Rules, first match wins:
//!
//! 1. XHR request: nothing changes.
//! 2. Forced mobile: format is mobile; an unset preference becomes
//!    `MobileView`. A stored `StandardView` is kept.
//! 3. Mobile device without a `StandardView` choice: format is mobile; an
//!    unset preference becomes `MobileView`.
//! 4. Otherwise: format is standard and the preference is not written.
//!
//! # Example
//!
//! ```rust
//! use mobile_view::format::Format;
//! use mobile_view::negotiate::{negotiate, NegotiationOptions};
//! use mobile_view::session::ViewPreference;
//!
//! let outcome = negotiate(false, true, ViewPreference::Unset, &NegotiationOptions::default());
//! assert_eq!(outcome.format, Some(Format::Mobile));
//! assert_eq!(outcome.preference, ViewPreference::MobileView);
//! assert!(outcome.preference_changed());
//! ```

use serde::{Deserialize, Serialize};

use crate::format::Format;
use crate::session::ViewPreference;

/// Per-route negotiation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationOptions {
    /// Unconditionally serve the mobile format (one-shot; not persisted over
    /// an explicit standard choice)
    pub force_mobile: bool,
}

impl NegotiationOptions {
    /// Options with force-mobile enabled
    pub fn forced() -> Self {
        Self { force_mobile: true }
    }
}

/// Which rule produced a [`Negotiation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// XHR request, negotiation skipped
    Xhr,
    /// Force-mobile option applied
    Forced,
    /// Mobile device detected, no standard opt-out
    Detected,
    /// Standard view (not mobile, or opted out)
    Standard,
}

impl Rule {
    /// Name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Xhr => "xhr",
            Rule::Forced => "forced",
            Rule::Detected => "detected",
            Rule::Standard => "standard",
        }
    }
}

/// Result of one negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    /// Format to apply; `None` leaves the request's format untouched
    pub format: Option<Format>,
    /// Preference after negotiation
    pub preference: ViewPreference,
    /// Preference before negotiation
    pub previous: ViewPreference,
    /// Rule that decided the outcome
    pub rule: Rule,
}

impl Negotiation {
    /// Whether the session preference must be written back
    pub fn preference_changed(&self) -> bool {
        self.preference != self.previous
    }

    /// Whether the negotiated format is mobile
    pub fn in_mobile_view(&self) -> bool {
        crate::format::in_mobile_view(self.format.as_ref())
    }
}

/// Decide the response format for one request
///
/// `is_xhr` and `device_is_mobile` come from the device signal reader;
/// `preference` is the current session value. The function never fails and
/// only ever moves the preference from `Unset` to `MobileView`.
pub fn negotiate(
    is_xhr: bool,
    device_is_mobile: bool,
    preference: ViewPreference,
    options: &NegotiationOptions,
) -> Negotiation {
    let (format, rule) = if is_xhr {
        (None, Rule::Xhr)
    } else if options.force_mobile {
        (Some(Format::Mobile), Rule::Forced)
    } else if device_is_mobile && preference != ViewPreference::StandardView {
        (Some(Format::Mobile), Rule::Detected)
    } else {
        (Some(Format::Standard), Rule::Standard)
    };

    let updated = match rule {
        Rule::Forced | Rule::Detected if preference == ViewPreference::Unset => {
            ViewPreference::MobileView
        }
        _ => preference,
    };

    Negotiation {
        format,
        preference: updated,
        previous: preference,
        rule,
    }
}
