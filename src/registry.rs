//! Format registry: tag → descriptor.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::format::{CoderFlags, FormatDescriptor, Tag};

/// Explicit-lifecycle format registry.
///
/// Registration takes `&mut self`, so it can only happen while the registry
/// is exclusively owned (init and teardown). Once the registry is wrapped in
/// an `Arc` and handed to a [`Dispatcher`](crate::Dispatcher), any number of
/// threads may look formats up concurrently.
///
/// Registering a tag that already exists replaces the previous descriptor
/// wholesale (last registration wins).
#[derive(Clone, Debug, Default)]
pub struct FormatRegistry {
    formats: BTreeMap<Tag, Arc<FormatDescriptor>>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in coders (CLIP, FD, DEBUG) installed.
    pub fn with_builtin_coders() -> Self {
        let mut registry = Self::new();
        crate::codecs::register_all(&mut registry);
        registry
    }

    /// Publish a descriptor, returning the one it replaced.
    pub fn register(&mut self, descriptor: FormatDescriptor) -> Option<Arc<FormatDescriptor>> {
        let tag = descriptor.tag().clone();
        let replaced = self.formats.insert(tag.clone(), Arc::new(descriptor));
        if replaced.is_some() {
            tracing::debug!(tag = %tag, "format re-registered, previous descriptor replaced");
        } else {
            tracing::debug!(tag = %tag, "format registered");
        }
        replaced
    }

    /// Remove a tag. Removing an absent tag is a no-op returning `false`.
    pub fn unregister(&mut self, tag: &str) -> bool {
        let Ok(tag) = Tag::new(tag) else {
            return false;
        };
        let removed = self.formats.remove(&tag).is_some();
        if removed {
            tracing::debug!(tag = %tag, "format unregistered");
        }
        removed
    }

    /// Remove every format.
    pub fn clear(&mut self) {
        self.formats.clear();
    }

    /// Look a tag up, case-insensitively.
    pub fn lookup(&self, tag: &str) -> Option<&Arc<FormatDescriptor>> {
        let tag = Tag::new(tag).ok()?;
        self.formats.get(&tag)
    }

    /// Look up an already-normalized tag.
    pub fn get(&self, tag: &Tag) -> Option<&Arc<FormatDescriptor>> {
        self.formats.get(tag)
    }

    /// Whether `tag` is registered, stealth formats included.
    pub fn contains(&self, tag: &str) -> bool {
        self.lookup(tag).is_some()
    }

    /// Number of registered formats, stealth formats included.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Discoverable formats in tag order. Stealth formats are omitted.
    pub fn formats(&self) -> impl Iterator<Item = &Arc<FormatDescriptor>> {
        self.formats
            .values()
            .filter(|d| !d.has(CoderFlags::STEALTH))
    }

    /// Every registered format including stealth ones.
    pub fn all_formats(&self) -> impl Iterator<Item = &Arc<FormatDescriptor>> {
        self.formats.values()
    }

    /// Discoverable formats with a decoder.
    pub fn decodable(&self) -> impl Iterator<Item = &Tag> {
        self.formats().filter(|d| d.can_decode()).map(|d| d.tag())
    }

    /// Discoverable formats with an encoder.
    pub fn encodable(&self) -> impl Iterator<Item = &Tag> {
        self.formats().filter(|d| d.can_encode()).map(|d| d.tag())
    }
}
