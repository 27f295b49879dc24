//! FD: read an image from an already-open file descriptor.
//!
//! `fd:3` reads everything behind descriptor 3 and decodes it again with
//! the format left for the sniffer to decide.

use crate::dispatch::{Decoder, DispatchContext};
use crate::error::{Exception, ExceptionKind};
use crate::format::{CoderFlags, FormatDescriptor};
use crate::frame::ImageSequence;
use crate::registry::FormatRegistry;
use crate::request::ImageRequest;

/// Registered tag.
pub const TAG: &str = "FD";

/// Decoder that reads a descriptor and dispatches its contents.
#[derive(Clone, Copy, Debug, Default)]
pub struct FdCoder;

impl Decoder for FdCoder {
    fn decode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
    ) -> Result<ImageSequence, Exception> {
        let name = request.path();
        let Some(fd) = parse_descriptor(name) else {
            let err = std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a file descriptor number",
            );
            return Err(Exception::blob_open(cx.tag(), name, &err));
        };
        let bytes = cx.read_descriptor(fd, name)?;
        tracing::debug!(fd, len = bytes.len(), "read descriptor, re-dispatching");

        let nested = request
            .clone()
            .with_target(name)
            .without_tag()
            .with_blob(bytes);
        let Some(images) = cx.decode(&nested) else {
            let kind = ExceptionKind::UpstreamDecodeFailure;
            return Err(cx.upstream_failure(kind, &nested));
        };
        Ok(images)
    }
}

/// A non-negative descriptor number, surrounding whitespace allowed.
fn parse_descriptor(name: &str) -> Option<i32> {
    let name = name.trim();
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Descriptor for FD: decode-only and stealth.
pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::builtin(TAG, "Read image from a file descriptor")
        .with_decoder(FdCoder)
        .with_flags(CoderFlags::STEALTH)
        .build()
}

/// Register FD, replacing any earlier registration.
pub fn register(registry: &mut FormatRegistry) {
    registry.register(descriptor());
}

/// Remove FD. Returns whether it was registered.
pub fn unregister(registry: &mut FormatRegistry) -> bool {
    registry.unregister(TAG)
}
