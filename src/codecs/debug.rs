//! DEBUG: a plain-text dump of every pixel value, for debugging.
//!
//! ```text
//! # zendispatch pixel debugging: 2,1,65535,srgb
//! 0,0: 10,20,30 
//! 1,0: 40,50,60 
//! ```
//!
//! Each frame starts with a header of columns, rows, maximum sample value,
//! and the lower-cased colorspace (suffixed `a` when the frame has alpha).
//! Pixel lines follow in row-major order with red, green, and blue, then
//! `,black ` for CMYK frames and `,alpha ` when alpha is present. Samples
//! are printed with twenty significant digits in the style of C's `%.20g`,
//! which always reads back to the same `f64`.

use std::io::{self, Write};

use crate::dispatch::{DispatchContext, Encoder};
use crate::error::{Exception, ExceptionKind};
use crate::format::{CoderFlags, FormatDescriptor};
use crate::frame::Frame;
use crate::registry::FormatRegistry;
use crate::request::ImageRequest;
use crate::sequence::SequenceWriter;

/// Registered tag.
pub const TAG: &str = "DEBUG";

/// Tool name written into dump headers by default.
pub const DEFAULT_TOOL_NAME: &str = "zendispatch";

const BLACK_MISMATCH: &str = "black plane does not cover the frame";

/// Encoder for the pixel dump.
#[derive(Clone, Debug)]
pub struct DebugCoder {
    tool_name: String,
}

impl Default for DebugCoder {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_NAME)
    }
}

impl DebugCoder {
    /// A coder that names `tool_name` in every header.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
        }
    }

    /// Name written into headers.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Write the dump of one frame.
    ///
    /// A CMYK frame whose black plane differs in size fails with
    /// [`io::ErrorKind::InvalidInput`] before anything is written.
    pub fn write_frame<W: Write + ?Sized>(&self, out: &mut W, frame: &Frame) -> io::Result<()> {
        if !frame.has_valid_black() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, BLACK_MISMATCH));
        }
        let mut colorspace = frame.colorspace().mnemonic().to_ascii_lowercase();
        if frame.has_alpha() {
            colorspace.push('a');
        }
        writeln!(
            out,
            "# {} pixel debugging: {},{},{},{}",
            self.tool_name,
            frame.width(),
            frame.height(),
            frame.max_value(),
            colorspace
        )?;

        let pixels = frame.pixels();
        let black = frame.black().filter(|_| frame.colorspace().has_black());
        let mut black_rows = black.as_ref().map(|b| b.rows());
        for (y, row) in pixels.rows().enumerate() {
            let black_row = black_rows.as_mut().and_then(Iterator::next);
            for (x, px) in row.iter().enumerate() {
                let (r, g, b) = (sample_text(px.r), sample_text(px.g), sample_text(px.b));
                write!(out, "{x},{y}: {r},{g},{b} ")?;
                if let Some(&k) = black_row.and_then(|samples| samples.get(x)) {
                    write!(out, ",{} ", sample_text(k))?;
                }
                if frame.has_alpha() {
                    write!(out, ",{} ", sample_text(px.a))?;
                }
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

impl Encoder for DebugCoder {
    fn encode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
        frames: &[Frame],
    ) -> Result<(), Exception> {
        let sink = cx.open_sink(request)?;
        let tag = cx.tag().clone();
        let writer = SequenceWriter::new(&tag, request.adjoin(), cx.monitor());
        writer.write(sink, frames, |sink, _, frame| {
            if !frame.has_valid_black() {
                let kind = ExceptionKind::CoderFailure;
                return Err(Exception::new(kind, Some(&tag), BLACK_MISMATCH));
            }
            self.write_frame(sink, frame)
                .map_err(|e| Exception::blob_write(&tag, &e))
        })
    }
}

/// Format a sample like C's `%.20g`: twenty significant digits, trailing
/// zeros dropped, exponent form outside `1e-4..1e20`.
fn sample_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        return text.to_owned();
    }
    let scientific = format!("{value:.19e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };
    if (-4..20).contains(&exponent) {
        let precision = (19 - exponent) as usize;
        trim_fraction(&format!("{value:.precision$}")).to_owned()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        let digits = exponent.unsigned_abs();
        format!("{}e{sign}{digits:02}", trim_fraction(mantissa))
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Descriptor for DEBUG: encode-only, stealth, raw and multi-frame.
pub fn descriptor(coder: DebugCoder) -> FormatDescriptor {
    let flags = CoderFlags::RAW_SUPPORT | CoderFlags::STEALTH | CoderFlags::MULTIFRAME;
    FormatDescriptor::builtin(TAG, "Image pixel values for debugging")
        .with_encoder(coder)
        .with_flags(flags)
        .build()
}

/// Register DEBUG, replacing any earlier registration.
pub fn register(registry: &mut FormatRegistry, coder: DebugCoder) {
    registry.register(descriptor(coder));
}

/// Remove DEBUG. Returns whether it was registered.
pub fn unregister(registry: &mut FormatRegistry) -> bool {
    registry.unregister(TAG)
}
