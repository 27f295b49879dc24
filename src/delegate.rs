//! Coders implemented on top of another format.
//!
//! A [`DelegatingCoder`] reads by decoding its backing format and keeping
//! only a derived artifact, and writes by extracting that artifact and
//! encoding it under whatever format the destination name resolves to.
//! The artifact itself comes from an [`ArtifactExtractor`].

use crate::dispatch::{Decoder, DispatchContext, Encoder};
use crate::error::{Exception, ExceptionKind};
use crate::format::Tag;
use crate::frame::{Frame, ImageSequence};
use crate::request::ImageRequest;

/// Derives a secondary image (an artifact) from a frame.
///
/// Neither method may modify the source frame.
pub trait ArtifactExtractor: Send + Sync {
    /// Human name used in `ArtifactNotAvailable` messages, e.g. `clip mask`.
    fn name(&self) -> &str;

    /// The artifact if the frame already carries it.
    fn attached(&self, frame: &Frame) -> Option<Frame>;

    /// Compute the artifact from other frame data. Called at most once per
    /// frame, and only when [`attached`](Self::attached) returned `None`.
    fn compute(&self, frame: &Frame) -> Option<Frame>;

    /// The attached artifact, or a computed one.
    fn extract(&self, frame: &Frame) -> Option<Frame> {
        self.attached(frame).or_else(|| self.compute(frame))
    }
}

/// Generic read/write delegation over a backing format.
#[derive(Clone, Debug)]
pub struct DelegatingCoder<A> {
    backing_tag: Tag,
    fallback_tag: Option<Tag>,
    artifact: A,
}

impl<A: ArtifactExtractor> DelegatingCoder<A> {
    /// Reads decode `backing_tag`; writes fall back to the dispatcher's
    /// configured fallback format.
    pub fn new(backing_tag: Tag, artifact: A) -> Self {
        Self {
            backing_tag,
            fallback_tag: None,
            artifact,
        }
    }

    /// Override the fallback format for writes.
    pub fn with_fallback_tag(mut self, tag: Tag) -> Self {
        self.fallback_tag = Some(tag);
        self
    }

    /// Format reads are decoded from.
    pub fn backing_tag(&self) -> &Tag {
        &self.backing_tag
    }

    /// The extractor applied to each frame.
    pub fn artifact(&self) -> &A {
        &self.artifact
    }

    fn fallback_tag<'c>(&'c self, cx: &'c DispatchContext<'_>) -> &'c Tag {
        self.fallback_tag
            .as_ref()
            .unwrap_or_else(|| cx.config().fallback_tag())
    }

    /// The tag writes go to: the destination's own format, unless that is
    /// unknown or this coder again.
    fn write_tag(&self, cx: &DispatchContext<'_>, nested: &ImageRequest) -> Tag {
        match cx.resolve_tag(nested) {
            Some(tag) if tag != *cx.tag() => tag,
            resolved => {
                let fallback = self.fallback_tag(cx).clone();
                tracing::debug!(
                    tag = %cx.tag(),
                    resolved = resolved.as_ref().map(Tag::as_str),
                    fallback = %fallback,
                    target = nested.target(),
                    "destination did not name another format, using fallback"
                );
                fallback
            }
        }
    }
}

impl<A: ArtifactExtractor> Decoder for DelegatingCoder<A> {
    fn decode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
    ) -> Result<ImageSequence, Exception> {
        let nested = request
            .clone()
            .with_target(request.path())
            .with_tag(self.backing_tag.clone())
            .without_blob();
        let Some(primary) = cx.decode(&nested) else {
            let failure = cx.upstream_failure(ExceptionKind::UpstreamDecodeFailure, &nested);
            return Err(failure);
        };

        let artifact = self.artifact.extract(primary.first());
        drop(primary);
        match artifact {
            Some(frame) => Ok(ImageSequence::single(frame)),
            None => Err(Exception::artifact_not_available(
                cx.tag(),
                self.artifact.name(),
            )),
        }
    }
}

impl<A: ArtifactExtractor> Encoder for DelegatingCoder<A> {
    fn encode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
        frames: &[Frame],
    ) -> Result<(), Exception> {
        let mut artifacts = Vec::with_capacity(frames.len());
        for frame in frames {
            let Some(artifact) = self.artifact.extract(frame) else {
                return Err(Exception::artifact_not_available(
                    cx.tag(),
                    self.artifact.name(),
                ));
            };
            artifacts.push(artifact);
        }
        let Some(artifacts) = ImageSequence::new(artifacts) else {
            return Err(Exception::new(
                ExceptionKind::CoderFailure,
                Some(cx.tag()),
                "no frames to encode",
            ));
        };

        let nested = request.clone().without_tag().with_target(request.path());
        let tag = self.write_tag(cx, &nested);
        let nested = nested.with_tag(tag);
        if !cx.encode(&nested, &artifacts) {
            let failure = cx.upstream_failure(ExceptionKind::UpstreamEncodeFailure, &nested);
            return Err(failure);
        }
        Ok(())
    }
}
