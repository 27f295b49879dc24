//! # zendispatch
//!
//! Pluggable image format registry with recursive coder delegation.
//!
//! Formats are registered under short tags (`MIFF`, `CLIP`, …) with an
//! optional decoder, an optional encoder, and capability flags. A
//! [`Dispatcher`] resolves the tag for a request, invokes the right handler,
//! and collects every warning and error into one [`ExceptionRecord`] per
//! top-level call. Handlers may call back into the dispatcher under another
//! tag, which is how [`DelegatingCoder`] implements one format on top of
//! another.
//!
//! ## Usage
//!
//! ```rust
//! use zendispatch::{
//!     Dispatcher, FormatRegistry, Frame, ImageRequest, ImageSequence, ImgVec, MemoryBlobs, Rgba,
//! };
//!
//! let blobs = MemoryBlobs::new();
//! let registry = FormatRegistry::with_builtin_coders();
//! let dispatcher = Dispatcher::new(registry).with_blobs(blobs.clone());
//!
//! let pixels = ImgVec::new(vec![Rgba::new(10.0, 20.0, 30.0, 0.0)], 1, 1);
//! let images = ImageSequence::single(Frame::new(pixels));
//! dispatcher.write(&ImageRequest::new("debug:pixels.txt"), &images)?;
//!
//! let text = String::from_utf8(blobs.get("pixels.txt").unwrap()).unwrap();
//! assert!(text.starts_with("# zendispatch pixel debugging: 1,1,65535,srgb\n"));
//! # Ok::<(), zendispatch::DispatchError>(())
//! ```

#![forbid(unsafe_code)]

mod blob;
pub mod codecs;
mod config;
mod decode;
mod delegate;
mod dispatch;
mod encode;
mod error;
mod format;
mod frame;
mod limits;
mod registry;
mod request;
mod sequence;
mod sniff;

pub use blob::{BlobSink, BlobStore, FileBlobs, MemoryBlobs};
pub use config::{DEFAULT_FALLBACK_TAG, DispatchConfig};
pub use delegate::{ArtifactExtractor, DelegatingCoder};
pub use dispatch::{Decoder, DispatchContext, DispatchState, Dispatcher, Encoder};
pub use error::{DispatchError, Exception, ExceptionKind, ExceptionRecord, RegistryError, Severity};
pub use format::{CoderFlags, DescriptorBuilder, FormatDescriptor, Tag};
pub use frame::{Colorspace, Frame, ImageSequence, ImgRef, ImgVec, Rgba};
pub use limits::{DEFAULT_MAX_DELEGATION_DEPTH, Limits};
pub use registry::FormatRegistry;
pub use request::ImageRequest;
pub use sequence::{Progress, ProgressMonitor, SequenceWriter, StopMonitor};
pub use sniff::{ExtensionSniffer, FormatSniffer, NoSniffer};

pub use enough::{Stop, StopReason, Unstoppable};
