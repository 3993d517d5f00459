//! Stylesheet selection
//!
//! Rendering code asks an [`AssetSelector`] which stylesheets to link. The
//! standard selector returns the sources unchanged. The mobile-aware selector
//! appends device-specific variants when the request is in mobile view:
//!
//! ```text
//! application.css  ──▶  application.css
//!                       application_mobile.css   (if present)
//!                       application_iphone.css   (if present)
//! ```
//!
//! Which selector is used is decided by configuration, see [`asset_selector`].

use std::path::{Path, PathBuf};

use crate::context::ViewContext;

/// Suffix of the generic mobile stylesheet variant
pub const MOBILE_VARIANT: &str = "mobile";

/// Chooses the stylesheets to link for a request
pub trait AssetSelector: Send + Sync {
    /// Expand stylesheet sources for the given view
    fn stylesheets(&self, sources: &[&str], view: &ViewContext) -> Vec<String>;
}

/// Links exactly the requested stylesheets
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAssets;

impl AssetSelector for StandardAssets {
    fn stylesheets(&self, sources: &[&str], _view: &ViewContext) -> Vec<String> {
        sources.iter().map(|s| s.to_string()).collect()
    }
}

/// Adds `<name>_mobile.css` and `<name>_<device>.css` variants in mobile view
#[derive(Debug, Clone)]
pub struct MobileAwareAssets {
    stylesheets_dir: PathBuf,
}

impl MobileAwareAssets {
    /// Look for variants under `stylesheets_dir`
    pub fn new<P: Into<PathBuf>>(stylesheets_dir: P) -> Self {
        Self {
            stylesheets_dir: stylesheets_dir.into(),
        }
    }

    /// Directory searched for variants
    pub fn stylesheets_dir(&self) -> &Path {
        &self.stylesheets_dir
    }

    fn variant(&self, source: &str, device: &str) -> Option<String> {
        let stem = source.strip_suffix(".css").unwrap_or(source);
        let candidate = format!("{}_{}.css", stem, device);
        self.stylesheets_dir
            .join(&candidate)
            .is_file()
            .then_some(candidate)
    }
}

impl AssetSelector for MobileAwareAssets {
    fn stylesheets(&self, sources: &[&str], view: &ViewContext) -> Vec<String> {
        if !view.in_mobile_view() {
            return StandardAssets.stylesheets(sources, view);
        }

        let device = view
            .mobile_device()
            .map(|d| d.to_lowercase())
            .filter(|d| d != MOBILE_VARIANT);

        let mut linked = Vec::with_capacity(sources.len() * 2);
        for source in sources {
            linked.push(source.to_string());
            for name in std::iter::once(MOBILE_VARIANT).chain(device.as_deref()) {
                if let Some(variant) = self.variant(source, name) {
                    linked.push(variant);
                }
            }
        }
        linked
    }
}

/// Pick the selector: mobile-aware when a stylesheet directory is configured
pub fn asset_selector(stylesheets_dir: Option<PathBuf>) -> Box<dyn AssetSelector> {
    match stylesheets_dir {
        Some(dir) => Box::new(MobileAwareAssets::new(dir)),
        None => Box::new(StandardAssets),
    }
}
