//! Dispatcher configuration.
//!
//! [`DispatchConfig`] bundles the settings that are not per-request: the
//! fallback format delegating coders write through when a destination name
//! says nothing useful, and the [`Limits`] every call is checked against.
//!
//! # Example
//!
//! ```
//! use zendispatch::{DispatchConfig, Limits, Tag};
//!
//! let config = DispatchConfig::default()
//!     .with_fallback_tag(Tag::new("png").unwrap())
//!     .with_limits(Limits::default().with_max_delegation_depth(4));
//! assert_eq!(config.fallback_tag().as_str(), "PNG");
//! ```

use crate::format::Tag;
use crate::limits::Limits;

/// Name of the default fallback format.
pub const DEFAULT_FALLBACK_TAG: &str = "MIFF";

/// Settings shared by every call on a dispatcher.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct DispatchConfig {
    /// Format used by delegating coders when the destination resolves to
    /// nothing, or back to the delegating coder itself.
    pub fallback_tag: Tag,

    /// Depth and frame limits.
    pub limits: Limits,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fallback_tag: Tag::from_static(DEFAULT_FALLBACK_TAG),
            limits: Limits::default(),
        }
    }
}

impl DispatchConfig {
    /// Set the fallback format for delegating coders.
    pub fn with_fallback_tag(mut self, tag: Tag) -> Self {
        self.fallback_tag = tag;
        self
    }

    /// Replace the resource limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Fallback format for delegating coders.
    pub fn fallback_tag(&self) -> &Tag {
        &self.fallback_tag
    }

    /// Resource limits checked on every call.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}
