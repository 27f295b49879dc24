//! Encode dispatch, including the per-frame path for single-frame destinations.

use crate::dispatch::{DispatchContext, DispatchState, Dispatcher};
use crate::error::{Exception, ExceptionKind, ExceptionRecord};
use crate::format::CoderFlags;
use crate::frame::{Frame, ImageSequence};
use crate::request::ImageRequest;
use crate::sequence::{Progress, ProgressMonitor};

impl Dispatcher {
    /// Encode `images` to `request`.
    ///
    /// Coders flagged [`CoderFlags::MULTIFRAME`] are invoked once for the
    /// whole sequence when `request.adjoin()` is set. Otherwise the encoder
    /// runs once per frame with adjoin cleared and, for more than one frame,
    /// a per-frame destination name from [`ImageRequest::frame_target`].
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(target = request.target(), frames = images.len())
    )]
    pub fn encode(
        &self,
        request: &ImageRequest,
        images: &ImageSequence,
        exceptions: &mut ExceptionRecord,
    ) -> bool {
        self.encode_nested(request, images, exceptions, &enough::Unstoppable, 0)
    }

    /// Encode, reporting per-frame progress to `monitor`.
    ///
    /// The monitor is checked between frames only; returning a stop reason
    /// ends the write with `UserCancelled`.
    pub fn encode_monitored(
        &self,
        request: &ImageRequest,
        images: &ImageSequence,
        monitor: &dyn ProgressMonitor,
        exceptions: &mut ExceptionRecord,
    ) -> bool {
        self.encode_nested(request, images, exceptions, monitor, 0)
    }

    pub(crate) fn encode_nested(
        &self,
        request: &ImageRequest,
        images: &ImageSequence,
        exceptions: &mut ExceptionRecord,
        monitor: &dyn ProgressMonitor,
        depth: usize,
    ) -> bool {
        if !self.check_depth(request, depth, exceptions) {
            return false;
        }
        let mut state = DispatchState::Unresolved;
        let Some(descriptor) = self.resolve_descriptor(request, exceptions, &mut state) else {
            return false;
        };
        let Some(encoder) = descriptor.encoder().cloned() else {
            state.advance(DispatchState::Failed, Some(descriptor.tag()));
            exceptions.push(Exception::format_not_supported(
                Some(descriptor.tag()),
                "no encode delegate for this image format",
            ));
            return false;
        };
        if let Err(limit) = self.config().limits().check_frames(images.len()) {
            state.advance(DispatchState::Failed, Some(descriptor.tag()));
            exceptions.push(Exception::new(
                ExceptionKind::CoderFailure,
                Some(descriptor.tag()),
                format!("{} frames exceed the limit of {limit}", images.len()),
            ));
            return false;
        }

        let tag = descriptor.tag().clone();
        state.advance(DispatchState::Resolved, Some(&tag));
        state.advance(DispatchState::Active, Some(&tag));
        let whole_sequence = descriptor.has(CoderFlags::MULTIFRAME) && request.adjoin();
        let mut cx = DispatchContext {
            dispatcher: self,
            exceptions,
            monitor,
            descriptor,
            depth,
        };

        let result = if whole_sequence {
            tracing::debug!(tag = %tag, depth, "invoking encoder for whole sequence");
            encoder.encode(&mut cx, request, images.frames())
        } else {
            encode_each_frame(&mut cx, encoder.as_ref(), request, images.frames())
        };

        match result {
            Ok(()) => {
                state.advance(DispatchState::Done, Some(&tag));
                true
            }
            Err(exception) => {
                state.advance(DispatchState::Failed, Some(&tag));
                cx.exceptions.push(exception);
                false
            }
        }
    }
}

/// One encoder call per frame, each to its own destination.
fn encode_each_frame(
    cx: &mut DispatchContext<'_>,
    encoder: &dyn crate::dispatch::Encoder,
    request: &ImageRequest,
    frames: &[Frame],
) -> Result<(), Exception> {
    let total = frames.len();
    for (index, frame) in frames.iter().enumerate() {
        let mut frame_request = request.clone().with_adjoin(false);
        if total > 1 {
            frame_request = frame_request.with_target(request.frame_target(index));
        }
        tracing::debug!(
            tag = %cx.tag(),
            index,
            total,
            target = frame_request.target(),
            "invoking encoder for frame"
        );
        encoder.encode(cx, &frame_request, core::slice::from_ref(frame))?;

        let progress = Progress::new(cx.tag(), index, total);
        if let Err(reason) = cx.monitor().report(&progress) {
            return Err(Exception::cancelled(cx.tag(), reason));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobs;
    use crate::config::DispatchConfig;
    use crate::format::{FormatDescriptor, Tag};
    use crate::frame::{ImgVec, Rgba};
    use crate::limits::Limits;
    use crate::registry::FormatRegistry;
    use std::io::Write;

    /// Writes one byte per frame it is handed.
    struct CountingEncoder;

    impl crate::dispatch::Encoder for CountingEncoder {
        fn encode(
            &self,
            cx: &mut DispatchContext<'_>,
            request: &ImageRequest,
            frames: &[Frame],
        ) -> Result<(), Exception> {
            let mut sink = cx.open_sink(request)?;
            let count = if request.adjoin() { frames.len() } else { 1 };
            sink.write_all(&vec![b'f'; count])
                .and_then(|()| sink.close())
                .map_err(|e| Exception::blob_write(cx.tag(), &e))
        }
    }

    fn frames(n: usize) -> ImageSequence {
        let frame = Frame::new(ImgVec::new(vec![Rgba::new(0.0, 0.0, 0.0, 0.0)], 1, 1));
        ImageSequence::new(vec![frame; n]).unwrap()
    }

    fn setup(flags: CoderFlags) -> (Dispatcher, MemoryBlobs) {
        let mut registry = FormatRegistry::new();
        registry.register(
            FormatDescriptor::builder("CNT", "CNT", "frame counter")
                .unwrap()
                .with_encoder(CountingEncoder)
                .with_flags(flags)
                .build(),
        );
        registry.register(
            FormatDescriptor::builder("RONLY", "RONLY", "decode only")
                .unwrap()
                .build(),
        );
        let blobs = MemoryBlobs::new();
        let dispatcher = Dispatcher::new(registry).with_blobs(blobs.clone());
        (dispatcher, blobs)
    }

    #[test]
    fn multiframe_adjoin_writes_one_destination() {
        let (dispatcher, blobs) = setup(CoderFlags::MULTIFRAME);
        let request = ImageRequest::new("cnt:all.cnt");
        dispatcher.write(&request, &frames(3)).unwrap();
        assert_eq!(blobs.names(), vec!["all.cnt"]);
        assert_eq!(blobs.get("all.cnt").unwrap(), b"fff");
    }

    #[test]
    fn single_frame_coder_writes_indexed_destinations() {
        let (dispatcher, blobs) = setup(CoderFlags::EMPTY);
        let request = ImageRequest::new("cnt:out.ext");
        dispatcher.write(&request, &frames(12)).unwrap();
        let names = blobs.names();
        assert_eq!(names.len(), 12);
        for i in 0..12 {
            assert_eq!(blobs.get(&format!("out-{i}.ext")).unwrap(), b"f");
        }
    }

    #[test]
    fn no_adjoin_on_multiframe_coder_splits_frames() {
        let (dispatcher, blobs) = setup(CoderFlags::MULTIFRAME);
        let request = ImageRequest::new("cnt:out.ext").with_adjoin(false);
        dispatcher.write(&request, &frames(2)).unwrap();
        assert_eq!(blobs.names(), vec!["out-0.ext", "out-1.ext"]);
    }

    #[test]
    fn single_frame_keeps_its_name() {
        let (dispatcher, blobs) = setup(CoderFlags::EMPTY);
        dispatcher
            .write(&ImageRequest::new("cnt:one.ext"), &frames(1))
            .unwrap();
        assert_eq!(blobs.names(), vec!["one.ext"]);
    }

    #[test]
    fn decode_only_format_cannot_encode() {
        let (dispatcher, _) = setup(CoderFlags::EMPTY);
        let mut exceptions = ExceptionRecord::new();
        let request = ImageRequest::new("x").with_tag(Tag::new("ronly").unwrap());
        assert!(!dispatcher.encode(&request, &frames(1), &mut exceptions));
        assert_eq!(exceptions.kinds(), vec![ExceptionKind::FormatNotSupported]);
    }

    #[test]
    fn per_frame_cancellation_stops_writing() {
        let (dispatcher, blobs) = setup(CoderFlags::EMPTY);
        let monitor = |p: &Progress| {
            if p.index() == 0 {
                Err(enough::StopReason::Cancelled)
            } else {
                Ok(())
            }
        };
        let mut exceptions = ExceptionRecord::new();
        let ok = dispatcher.encode_monitored(
            &ImageRequest::new("cnt:out.ext"),
            &frames(3),
            &monitor,
            &mut exceptions,
        );
        assert!(!ok);
        assert_eq!(blobs.names(), vec!["out-0.ext"]);
        assert_eq!(exceptions.kinds(), vec![ExceptionKind::UserCancelled]);
    }

    #[test]
    fn frame_limit_is_enforced() {
        let (dispatcher, _) = setup(CoderFlags::MULTIFRAME);
        let limits = Limits::default().with_max_frames(2);
        let dispatcher = dispatcher.with_config(DispatchConfig::default().with_limits(limits));
        let err = dispatcher
            .write(&ImageRequest::new("cnt:all.cnt"), &frames(3))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ExceptionKind::CoderFailure));
    }
}
