//! Frames and owned image sequences.
//!
//! Pixel storage uses `imgref::ImgVec` with typed pixels from the `rgb`
//! crate. Samples are `f64` in the range `0..=max_value()`; the core never
//! does arithmetic on them, it only moves them between coders.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use imgref::{ImgRef, ImgVec};
pub use rgb::Rgba;

/// Colour model of a frame's samples.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Colorspace {
    #[default]
    Undefined,
    Srgb,
    Rgb,
    Gray,
    LinearGray,
    Cmy,
    Cmyk,
    Hsl,
    Lab,
    YCbCr,
}

impl Colorspace {
    /// Conventional mnemonic, e.g. `sRGB` or `CMYK`.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Colorspace::Undefined => "Undefined",
            Colorspace::Srgb => "sRGB",
            Colorspace::Rgb => "RGB",
            Colorspace::Gray => "Gray",
            Colorspace::LinearGray => "LinearGray",
            Colorspace::Cmy => "CMY",
            Colorspace::Cmyk => "CMYK",
            Colorspace::Hsl => "HSL",
            Colorspace::Lab => "Lab",
            Colorspace::YCbCr => "YCbCr",
        }
    }

    /// Case-insensitive lookup by mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        const ALL: [Colorspace; 10] = [
            Colorspace::Undefined,
            Colorspace::Srgb,
            Colorspace::Rgb,
            Colorspace::Gray,
            Colorspace::LinearGray,
            Colorspace::Cmy,
            Colorspace::Cmyk,
            Colorspace::Hsl,
            Colorspace::Lab,
            Colorspace::YCbCr,
        ];
        ALL.into_iter()
            .find(|c| c.mnemonic().eq_ignore_ascii_case(name))
    }

    /// Whether samples carry a separate black channel.
    pub fn has_black(self) -> bool {
        self == Colorspace::Cmyk
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One image: samples plus the attributes coders need.
#[derive(Clone)]
pub struct Frame {
    pixels: ImgVec<Rgba<f64>>,
    black: Option<ImgVec<f64>>,
    colorspace: Colorspace,
    depth: u32,
    has_alpha: bool,
    write_mask: Option<ImgVec<f64>>,
    clip_path: Option<String>,
    attachment: Option<Arc<dyn Any + Send + Sync>>,
}

impl Frame {
    /// A frame over `pixels`, sRGB, 16 bits per sample, no alpha.
    pub fn new(pixels: ImgVec<Rgba<f64>>) -> Self {
        Self {
            pixels,
            black: None,
            colorspace: Colorspace::Srgb,
            depth: 16,
            has_alpha: false,
            write_mask: None,
            clip_path: None,
            attachment: None,
        }
    }

    /// A single-channel grayscale frame; each sample fills r, g, and b.
    pub fn gray(samples: ImgRef<'_, f64>, depth: u32) -> Self {
        let buf = samples.pixels().map(|v| Rgba::new(v, v, v, 0.0)).collect();
        let pixels = ImgVec::new(buf, samples.width(), samples.height());
        Self::new(pixels)
            .with_colorspace(Colorspace::Gray)
            .with_depth(depth)
    }

    /// Set the colour model samples are expressed in.
    pub fn with_colorspace(mut self, colorspace: Colorspace) -> Self {
        self.colorspace = colorspace;
        self
    }

    /// Set bits per sample. Zero is treated as one.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth.max(1);
        self
    }

    /// Mark whether the alpha samples are meaningful.
    pub fn with_alpha(mut self, has_alpha: bool) -> Self {
        self.has_alpha = has_alpha;
        self
    }

    /// Black plane for CMYK frames.
    ///
    /// Coders that read the plane reject it unless its dimensions match the
    /// frame; see [`has_valid_black`](Self::has_valid_black).
    pub fn with_black(mut self, black: ImgVec<f64>) -> Self {
        self.black = Some(black);
        self
    }

    /// Attach a write (clip) mask. Dimensions must match the frame.
    pub fn with_write_mask(mut self, mask: ImgVec<f64>) -> Self {
        debug_assert_eq!((mask.width(), mask.height()), (self.width(), self.height()));
        self.write_mask = Some(mask);
        self
    }

    /// Clip path text the mask can be computed from.
    pub fn with_clip_path(mut self, path: impl Into<String>) -> Self {
        self.clip_path = Some(path.into());
        self
    }

    /// Opaque caller data carried along with the frame.
    pub fn with_attachment(mut self, attachment: Arc<dyn Any + Send + Sync>) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    /// Colour and alpha samples.
    pub fn pixels(&self) -> ImgRef<'_, Rgba<f64>> {
        self.pixels.as_ref()
    }

    /// Black plane, if one was attached.
    pub fn black(&self) -> Option<ImgRef<'_, f64>> {
        self.black.as_ref().map(|b| b.as_ref())
    }

    /// Whether the black plane, if any, covers exactly the frame.
    pub fn has_valid_black(&self) -> bool {
        self.black
            .as_ref()
            .is_none_or(|b| b.width() == self.width() && b.height() == self.height())
    }

    /// Colour model of the samples.
    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    /// Bits per sample as stored.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Storage depth rounded up to 8, 16, 32, or 64 bits.
    pub fn quantum_depth(&self) -> u32 {
        match self.depth {
            0..=8 => 8,
            9..=16 => 16,
            17..=32 => 32,
            _ => 64,
        }
    }

    /// Largest sample value at [`quantum_depth`](Self::quantum_depth).
    pub fn max_value(&self) -> u64 {
        match self.quantum_depth() {
            64 => u64::MAX,
            depth => (1u64 << depth) - 1,
        }
    }

    /// Whether alpha samples are meaningful.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Attached write (clip) mask.
    pub fn write_mask(&self) -> Option<ImgRef<'_, f64>> {
        self.write_mask.as_ref().map(|m| m.as_ref())
    }

    /// Clip path text, if any.
    pub fn clip_path(&self) -> Option<&str> {
        self.clip_path.as_deref()
    }

    /// Caller data attached with [`with_attachment`](Self::with_attachment).
    pub fn attachment(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.attachment.as_ref()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("colorspace", &self.colorspace)
            .field("depth", &self.depth)
            .field("has_alpha", &self.has_alpha)
            .field("black", &self.black.is_some())
            .field("write_mask", &self.write_mask.is_some())
            .field("clip_path", &self.clip_path.is_some())
            .finish()
    }
}

/// Ordered, non-empty list of frames with a single owner.
///
/// Sequences are not `Clone`: whoever holds one owns every frame in it, and
/// handing it back from a coder transfers that ownership.
#[derive(Debug)]
pub struct ImageSequence {
    frames: Vec<Frame>,
}

impl ImageSequence {
    /// Returns `None` for an empty list.
    pub fn new(frames: Vec<Frame>) -> Option<Self> {
        if frames.is_empty() {
            None
        } else {
            Some(Self { frames })
        }
    }

    /// A one-frame sequence.
    pub fn single(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    /// The first frame, which always exists.
    pub fn first(&self) -> &Frame {
        &self.frames[0]
    }

    /// Append a frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Frames in order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Keep the first frame, dropping the rest.
    pub fn into_first(self) -> Frame {
        let mut frames = self.frames;
        frames.truncate(1);
        frames.swap_remove(0)
    }

    /// Give up the sequence, keeping every frame.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl core::ops::Deref for ImageSequence {
    type Target = [Frame];

    fn deref(&self) -> &[Frame] {
        &self.frames
    }
}

impl IntoIterator for ImageSequence {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a ImageSequence {
    type Item = &'a Frame;
    type IntoIter = core::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, value: f64) -> Frame {
        Frame::new(ImgVec::new(
            vec![Rgba::new(value, value, value, 0.0); width * height],
            width,
            height,
        ))
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(ImageSequence::new(Vec::new()).is_none());
        let seq = ImageSequence::new(vec![solid(1, 1, 0.0), solid(1, 1, 1.0)]).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.first().pixels().buf()[0].r, 0.0);
    }

    #[test]
    fn into_first_releases_the_rest() {
        let token = Arc::new(());
        let tail = solid(1, 1, 2.0).with_attachment(token.clone());
        let seq = ImageSequence::new(vec![solid(1, 1, 1.0), tail]).unwrap();
        assert_eq!(Arc::strong_count(&token), 2);
        let first = seq.into_first();
        assert_eq!(first.pixels().buf()[0].r, 1.0);
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn into_frames_keeps_order() {
        let mut seq = ImageSequence::single(solid(1, 1, 1.0));
        seq.push(solid(2, 1, 2.0));
        let frames = seq.into_frames();
        let widths: Vec<_> = frames.iter().map(Frame::width).collect();
        assert_eq!(widths, vec![1, 2]);
    }

    #[test]
    fn black_plane_must_cover_the_frame() {
        let frame = solid(2, 2, 0.0).with_colorspace(Colorspace::Cmyk);
        assert!(frame.has_valid_black());
        let short = frame.clone().with_black(ImgVec::new(vec![1.0], 1, 1));
        assert!(!short.has_valid_black());
        let full = frame.with_black(ImgVec::new(vec![1.0; 4], 2, 2));
        assert!(full.has_valid_black());
    }

    #[test]
    fn quantum_depth_rounds_up() {
        let frame = solid(1, 1, 0.0).with_depth(12);
        assert_eq!(frame.quantum_depth(), 16);
        assert_eq!(frame.max_value(), 65535);
        assert_eq!(frame.clone().with_depth(8).max_value(), 255);
        assert_eq!(frame.clone().with_depth(33).max_value(), u64::MAX);
    }

    #[test]
    fn gray_frame_copies_samples() {
        let samples = ImgVec::new(vec![0.0, 65535.0], 2, 1);
        let frame = Frame::gray(samples.as_ref(), 16);
        assert_eq!(frame.colorspace(), Colorspace::Gray);
        assert_eq!(
            frame.pixels().buf()[1],
            Rgba::new(65535.0, 65535.0, 65535.0, 0.0)
        );
    }

    #[test]
    fn colorspace_mnemonics() {
        assert_eq!(Colorspace::Srgb.mnemonic(), "sRGB");
        assert_eq!(Colorspace::from_mnemonic("srgb"), Some(Colorspace::Srgb));
        assert_eq!(Colorspace::from_mnemonic("nope"), None);
        assert!(Colorspace::Cmyk.has_black());
    }
}
