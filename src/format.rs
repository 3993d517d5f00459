//! Response format selection
//!
//! The negotiator only sets and reads a symbolic [`Format`]. Mapping a format
//! to a content type is the job of [`FormatRegistry`], which registers
//! `mobile` as an alias of `text/html` so the rendering layer can pick
//! mobile templates while still serving HTML.

use std::collections::HashMap;
use std::fmt;

/// Content type shared by the mobile and standard presentations
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Symbolic response representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    /// Mobile presentation
    Mobile,
    /// Standard (desktop) HTML presentation
    Standard,
    /// Any other representation requested by the client (json, xml, ...)
    Other(String),
}

impl Format {
    /// Resolve a format from its symbolic name
    ///
    /// `html` and `standard` both resolve to [`Format::Standard`].
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "mobile" => Format::Mobile,
            "html" | "standard" => Format::Standard,
            _ => Format::Other(name),
        }
    }

    /// Symbolic name of this format
    pub fn as_str(&self) -> &str {
        match self {
            Format::Mobile => "mobile",
            Format::Standard => "standard",
            Format::Other(name) => name,
        }
    }

    /// Whether this is the mobile format
    pub fn is_mobile(&self) -> bool {
        matches!(self, Format::Mobile)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True iff the format is [`Format::Mobile`]
///
/// A request that was never negotiated has no format and is not in mobile
/// view.
pub fn in_mobile_view(format: Option<&Format>) -> bool {
    format.map(Format::is_mobile).unwrap_or(false)
}

// ============================================================================
// Format Registry
// ============================================================================

/// Maps format names to content types
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    aliases: HashMap<String, String>,
}

impl FormatRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Register `name` as an alias for `content_type`
    pub fn register_alias<N, C>(&mut self, name: N, content_type: C) -> &mut Self
    where
        N: AsRef<str>,
        C: Into<String>,
    {
        self.aliases
            .insert(name.as_ref().to_ascii_lowercase(), content_type.into());
        self
    }

    /// Content type registered for a format
    pub fn content_type(&self, format: &Format) -> Option<&str> {
        self.lookup(format.as_str())
    }

    /// Content type registered under a name
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.aliases
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether a name is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_alias("html", HTML_CONTENT_TYPE)
            .register_alias("standard", HTML_CONTENT_TYPE)
            .register_alias("mobile", HTML_CONTENT_TYPE);
        registry
    }
}
