//! Format tags, capability flags, and immutable format descriptors.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::dispatch::{Decoder, Encoder};
use crate::error::RegistryError;

/// Short, case-insensitive format identifier such as `MIFF` or `CLIP`.
///
/// Tags are stored upper-cased, so `Tag::new("miff")` and `Tag::new("MIFF")`
/// compare, hash, and display identically.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Box<str>);

impl Tag {
    /// Validate and normalize a tag.
    ///
    /// Fails on an empty string, or on one containing `:` or whitespace
    /// (those would be ambiguous inside a `tag:target` name).
    pub fn new(tag: &str) -> Result<Self, RegistryError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(RegistryError::EmptyTag);
        }
        if tag.chars().any(|c| c == ':' || c.is_whitespace()) {
            return Err(RegistryError::InvalidTag(tag.into()));
        }
        Ok(Tag(tag.to_ascii_uppercase().into_boxed_str()))
    }

    /// A tag from a compile-time constant known to be valid.
    pub(crate) fn from_static(tag: &'static str) -> Self {
        debug_assert!(Tag::new(tag).is_ok(), "invalid builtin tag {tag:?}");
        Tag(tag.to_ascii_uppercase().into_boxed_str())
    }

    /// The normalized (upper-case) tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against raw text.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

impl FromStr for Tag {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::new(s)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Coder capability flags represented as a bitset.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CoderFlags(u8);

impl CoderFlags {
    /// No capabilities.
    pub const EMPTY: Self = CoderFlags(0);
    /// The coder needs a seekable input or output stream.
    pub const SEEKABLE_STREAM: Self = CoderFlags(1 << 0);
    /// The coder can read or write raw, headerless data.
    pub const RAW_SUPPORT: Self = CoderFlags(1 << 1);
    /// Hidden from discovery listings.
    pub const STEALTH: Self = CoderFlags(1 << 2);
    /// One encoder call may write a whole sequence into one destination.
    pub const MULTIFRAME: Self = CoderFlags(1 << 3);

    const ALL: [(Self, &'static str); 4] = [
        (Self::SEEKABLE_STREAM, "SeekableStream"),
        (Self::RAW_SUPPORT, "RawSupport"),
        (Self::STEALTH, "Stealth"),
        (Self::MULTIFRAME, "Multiframe"),
    ];

    /// Whether every flag in `other` is set. Always false for an empty `other`.
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && (self.0 & other.0) == other.0
    }

    /// Flags set in either operand.
    pub const fn union(self, other: Self) -> Self {
        CoderFlags(self.0 | other.0)
    }

    /// No flags set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Individual flags set in `self`, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .map(|(flag, _)| flag)
            .filter(move |&flag| self.contains(flag))
    }
}

impl core::ops::BitOr for CoderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for CoderFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for CoderFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::ALL {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Registered description of one format: names, handlers, and flags.
///
/// Built with [`FormatDescriptor::builder`] and immutable afterwards.
/// Changing a published descriptor means registering a new one under the
/// same tag.
#[derive(Clone)]
pub struct FormatDescriptor {
    tag: Tag,
    long_tag: String,
    description: String,
    decoder: Option<Arc<dyn Decoder>>,
    encoder: Option<Arc<dyn Encoder>>,
    flags: CoderFlags,
}

impl FormatDescriptor {
    /// Start describing a format. Fails if `tag` is empty or malformed.
    pub fn builder(
        tag: &str,
        long_tag: &str,
        description: &str,
    ) -> Result<DescriptorBuilder, RegistryError> {
        let tag = Tag::new(tag)?;
        let long_tag = if long_tag.trim().is_empty() {
            tag.as_str().to_string()
        } else {
            long_tag.trim().to_string()
        };
        Ok(DescriptorBuilder {
            descriptor: FormatDescriptor {
                tag,
                long_tag,
                description: description.to_string(),
                decoder: None,
                encoder: None,
                flags: CoderFlags::EMPTY,
            },
        })
    }

    /// Builder for a built-in format whose tag is a known-valid constant.
    pub(crate) fn builtin(tag: &'static str, description: &str) -> DescriptorBuilder {
        let tag = Tag::from_static(tag);
        DescriptorBuilder {
            descriptor: FormatDescriptor {
                long_tag: tag.as_str().to_string(),
                tag,
                description: description.to_string(),
                decoder: None,
                encoder: None,
                flags: CoderFlags::EMPTY,
            },
        }
    }

    /// Short registry key.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Display name; the tag itself unless one was given.
    pub fn long_tag(&self) -> &str {
        &self.long_tag
    }

    /// One-line human description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Capability flags.
    pub fn flags(&self) -> CoderFlags {
        self.flags
    }

    /// Whether the descriptor carries every flag in `flag`.
    pub fn has(&self, flag: CoderFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Decode handler, if the format can be read.
    pub fn decoder(&self) -> Option<&Arc<dyn Decoder>> {
        self.decoder.as_ref()
    }

    /// Encode handler, if the format can be written.
    pub fn encoder(&self) -> Option<&Arc<dyn Encoder>> {
        self.encoder.as_ref()
    }

    /// Whether a decoder is attached.
    pub fn can_decode(&self) -> bool {
        self.decoder.is_some()
    }

    /// Whether an encoder is attached.
    pub fn can_encode(&self) -> bool {
        self.encoder.is_some()
    }
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("tag", &self.tag)
            .field("long_tag", &self.long_tag)
            .field("description", &self.description)
            .field("decoder", &self.decoder.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Builder for a [`FormatDescriptor`].
#[must_use]
pub struct DescriptorBuilder {
    descriptor: FormatDescriptor,
}

impl DescriptorBuilder {
    /// Attach the decode handler, replacing any previous one.
    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.descriptor.decoder = Some(Arc::new(decoder));
        self
    }

    /// Attach the encode handler, replacing any previous one.
    pub fn with_encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.descriptor.encoder = Some(Arc::new(encoder));
        self
    }

    /// Attach one shared handler for both directions.
    pub fn with_coder<C>(mut self, coder: C) -> Self
    where
        C: Decoder + Encoder + 'static,
    {
        let coder = Arc::new(coder);
        self.descriptor.decoder = Some(coder.clone());
        self.descriptor.encoder = Some(coder);
        self
    }

    /// OR `flags` into the capability set.
    pub fn with_flags(mut self, flags: CoderFlags) -> Self {
        self.descriptor.flags |= flags;
        self
    }

    /// Finish the descriptor. It cannot be changed afterwards.
    pub fn build(self) -> FormatDescriptor {
        self.descriptor
    }
}
