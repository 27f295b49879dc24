//! CLIP: a frame's clip mask, stored in another container format.
//!
//! Reading `clip:mask.miff` decodes the MIFF file and returns the first
//! frame's write mask as a grayscale frame. Writing stores each frame's mask
//! under the format the destination name resolves to, or MIFF when the
//! name says nothing (or says CLIP again).

use std::sync::Arc;

use crate::delegate::{ArtifactExtractor, DelegatingCoder};
use crate::format::{FormatDescriptor, Tag};
use crate::frame::{Frame, ImgVec};
use crate::registry::FormatRegistry;

/// Registered tag.
pub const TAG: &str = "CLIP";
const BACKING_TAG: &str = "MIFF";

/// Turns a clip path into a write-mask plane.
///
/// Path rendering is outside this crate; callers that want masks computed
/// from clip paths plug a rasterizer in here.
pub trait MaskRasterizer: Send + Sync {
    /// A mask with the frame's dimensions, or `None` if the path cannot be
    /// rendered.
    fn rasterize(&self, frame: &Frame, clip_path: &str) -> Option<ImgVec<f64>>;
}

impl<F> MaskRasterizer for F
where
    F: Fn(&Frame, &str) -> Option<ImgVec<f64>> + Send + Sync,
{
    fn rasterize(&self, frame: &Frame, clip_path: &str) -> Option<ImgVec<f64>> {
        self(frame, clip_path)
    }
}

/// Extracts a frame's write mask, rendering its clip path when no mask is
/// attached.
#[derive(Clone, Default)]
pub struct ClipMask {
    rasterizer: Option<Arc<dyn MaskRasterizer>>,
}

impl ClipMask {
    /// An extractor that only uses attached masks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Render clip paths with `rasterizer` when no mask is attached.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn MaskRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }
}

impl core::fmt::Debug for ClipMask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClipMask")
            .field("rasterizer", &self.rasterizer.is_some())
            .finish()
    }
}

impl ArtifactExtractor for ClipMask {
    fn name(&self) -> &str {
        "clip mask"
    }

    fn attached(&self, frame: &Frame) -> Option<Frame> {
        let mask = frame.write_mask()?;
        Some(Frame::gray(mask, frame.depth()))
    }

    fn compute(&self, frame: &Frame) -> Option<Frame> {
        let clip_path = frame.clip_path()?;
        let rasterizer = self.rasterizer.as_ref()?;
        let mask = rasterizer.rasterize(frame, clip_path)?;
        if (mask.width(), mask.height()) != (frame.width(), frame.height()) {
            tracing::debug!(
                mask_width = mask.width(),
                mask_height = mask.height(),
                width = frame.width(),
                height = frame.height(),
                "rasterized clip mask has the wrong size"
            );
            return None;
        }
        Some(Frame::gray(mask.as_ref(), frame.depth()))
    }
}

/// The CLIP coder.
pub type ClipCoder = DelegatingCoder<ClipMask>;

/// A CLIP coder backed by MIFF.
pub fn coder(mask: ClipMask) -> ClipCoder {
    DelegatingCoder::new(Tag::from_static(BACKING_TAG), mask)
        .with_fallback_tag(Tag::from_static(BACKING_TAG))
}

/// Descriptor for CLIP, with both directions and no flags.
pub fn descriptor(mask: ClipMask) -> FormatDescriptor {
    FormatDescriptor::builtin(TAG, "Image Clip Mask")
        .with_coder(coder(mask))
        .build()
}

/// Register CLIP, computing masks from clip paths with `rasterizer` if given.
pub fn register(registry: &mut FormatRegistry, rasterizer: Option<Arc<dyn MaskRasterizer>>) {
    registry.register(descriptor(ClipMask { rasterizer }));
}

/// Remove CLIP. Returns whether it was registered.
pub fn unregister(registry: &mut FormatRegistry) -> bool {
    registry.unregister(TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobs;
    use crate::dispatch::{Decoder, DispatchContext, Dispatcher, Encoder};
    use crate::error::{Exception, ExceptionKind, ExceptionRecord};
    use crate::frame::{ImageSequence, Rgba};
    use crate::request::ImageRequest;
    use std::sync::Mutex;

    fn plain(width: usize, height: usize) -> Frame {
        Frame::new(ImgVec::new(
            vec![Rgba::new(1.0, 2.0, 3.0, 0.0); width * height],
            width,
            height,
        ))
    }

    /// MIFF stand-in that stores and returns frames in memory.
    #[derive(Clone, Default)]
    struct MemoryMiff(Arc<Mutex<Vec<Frame>>>);

    impl Decoder for MemoryMiff {
        fn decode(
            &self,
            cx: &mut DispatchContext<'_>,
            _request: &ImageRequest,
        ) -> Result<ImageSequence, Exception> {
            let frames = self.0.lock().unwrap().clone();
            let kind = ExceptionKind::CoderFailure;
            ImageSequence::new(frames).ok_or_else(|| Exception::new(kind, Some(cx.tag()), "empty"))
        }
    }

    impl Encoder for MemoryMiff {
        fn encode(
            &self,
            _cx: &mut DispatchContext<'_>,
            _request: &ImageRequest,
            frames: &[Frame],
        ) -> Result<(), Exception> {
            self.0.lock().unwrap().extend_from_slice(frames);
            Ok(())
        }
    }

    fn dispatcher(
        rasterizer: Option<Arc<dyn MaskRasterizer>>,
    ) -> (Dispatcher, Arc<Mutex<Vec<Frame>>>) {
        let miff = MemoryMiff::default();
        let mut registry = FormatRegistry::new();
        register(&mut registry, rasterizer);
        let container = FormatDescriptor::builder("MIFF", "", "test container")
            .unwrap()
            .with_decoder(miff.clone())
            .with_encoder(miff.clone())
            .build();
        registry.register(container);
        let dispatcher = Dispatcher::new(registry).with_blobs(MemoryBlobs::new());
        (dispatcher, miff.0)
    }

    #[test]
    fn registered_with_both_directions() {
        let mut registry = FormatRegistry::new();
        register(&mut registry, None);
        let clip = registry.lookup("clip").unwrap();
        assert_eq!(clip.description(), "Image Clip Mask");
        assert!(clip.can_decode() && clip.can_encode());
        assert!(clip.flags().is_empty());
        assert!(unregister(&mut registry));
        assert!(!unregister(&mut registry));
    }

    #[test]
    fn read_returns_attached_mask() {
        let (dispatcher, stored) = dispatcher(None);
        let mask = ImgVec::new(vec![0.0, 65535.0], 2, 1);
        let masked = plain(2, 1).with_write_mask(mask);
        stored.lock().unwrap().push(masked);
        stored.lock().unwrap().push(plain(2, 1));

        let images = dispatcher.read(&ImageRequest::new("clip:in.miff")).unwrap();
        assert_eq!(images.len(), 1);
        let frame = images.first();
        assert_eq!(frame.colorspace(), crate::Colorspace::Gray);
        assert_eq!(frame.pixels().buf()[1].r, 65535.0);
    }

    #[test]
    fn read_without_mask_fails() {
        let (dispatcher, stored) = dispatcher(None);
        let unmasked = plain(1, 1).with_clip_path("M0 0");
        stored.lock().unwrap().push(unmasked);
        let mut exceptions = ExceptionRecord::new();
        let request = ImageRequest::new("clip:in.miff");
        assert!(dispatcher.decode(&request, &mut exceptions).is_none());
        let kinds = exceptions.kinds();
        assert_eq!(kinds, vec![ExceptionKind::ArtifactNotAvailable]);
        assert_eq!(
            exceptions.entries()[0].message(),
            "image does not have a clip mask"
        );
    }

    #[test]
    fn write_renders_clip_path_once() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let rasterizer = move |frame: &Frame, path: &str| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            assert_eq!(path, "M0 0 L1 0");
            let (width, height) = (frame.width(), frame.height());
            Some(ImgVec::new(vec![7.0; width * height], width, height))
        };
        let (dispatcher, stored) = dispatcher(Some(Arc::new(rasterizer)));
        let source = ImageSequence::single(plain(2, 2).with_clip_path("M0 0 L1 0"));

        dispatcher
            .write(&ImageRequest::new("clip:mask"), &source)
            .unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        let written = stored.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].pixels().buf()[0].r, 7.0);
        assert!(source.first().write_mask().is_none());
    }

    #[test]
    fn wrong_size_raster_is_rejected() {
        let rasterizer = |_: &Frame, _: &str| Some(ImgVec::new(vec![0.0], 1, 1));
        let mask = ClipMask::new().with_rasterizer(Arc::new(rasterizer));
        assert!(mask.extract(&plain(2, 2).with_clip_path("x")).is_none());
    }
}
