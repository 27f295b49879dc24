//! Format detection for requests that carry neither a tag nor a prefix.

use crate::format::Tag;
use crate::registry::FormatRegistry;
use crate::request::ImageRequest;

/// Guesses the format of a request from its name or contents.
///
/// Only registered tags should be returned; the dispatcher reports an
/// unregistered guess as `FormatNotSupported`.
pub trait FormatSniffer: Send + Sync {
    /// The tag `request` most likely names, if any.
    fn sniff(&self, request: &ImageRequest, registry: &FormatRegistry) -> Option<Tag>;
}

impl<F> FormatSniffer for F
where
    F: Fn(&ImageRequest, &FormatRegistry) -> Option<Tag> + Send + Sync,
{
    fn sniff(&self, request: &ImageRequest, registry: &FormatRegistry) -> Option<Tag> {
        self(request, registry)
    }
}

/// Matches the target's file extension against registered tags.
///
/// `out.miff` resolves to `MIFF` when `MIFF` is registered. Stealth formats
/// are matched too, since the tag is known to whoever named the file.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtensionSniffer;

impl FormatSniffer for ExtensionSniffer {
    fn sniff(&self, request: &ImageRequest, registry: &FormatRegistry) -> Option<Tag> {
        let ext = request.extension()?;
        let descriptor = registry.lookup(ext)?;
        tracing::trace!(ext, tag = %descriptor.tag(), "format sniffed from extension");
        Some(descriptor.tag().clone())
    }
}

/// Never guesses; only explicit tags and prefixes resolve.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSniffer;

impl FormatSniffer for NoSniffer {
    fn sniff(&self, _request: &ImageRequest, _registry: &FormatRegistry) -> Option<Tag> {
        None
    }
}
