//! The codec dispatcher, handler traits, and the per-call dispatch context.

use std::sync::Arc;

use crate::blob::{BlobSink, BlobStore, FileBlobs};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, Exception, ExceptionKind, ExceptionRecord};
use crate::format::{FormatDescriptor, Tag};
use crate::frame::{Frame, ImageSequence};
use crate::registry::FormatRegistry;
use crate::request::ImageRequest;
use crate::sequence::ProgressMonitor;
use crate::sniff::{ExtensionSniffer, FormatSniffer};

/// Decode handler for one format.
///
/// Implementations return the decoded sequence or the exception that made
/// decoding fail. Warnings, and the entries of any nested call made through
/// `cx`, are already in the record by the time the handler returns.
pub trait Decoder: Send + Sync {
    /// Decode `request`, nesting further calls through `cx` as needed.
    fn decode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
    ) -> Result<ImageSequence, Exception>;
}

/// Encode handler for one format.
///
/// `frames` is never empty. A handler registered without
/// [`CoderFlags::MULTIFRAME`](crate::CoderFlags::MULTIFRAME) is handed one
/// frame at a time.
pub trait Encoder: Send + Sync {
    /// Encode `frames` to the destination named by `request`.
    fn encode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
        frames: &[Frame],
    ) -> Result<(), Exception>;
}

impl<F> Decoder for F
where
    F: Fn(&mut DispatchContext<'_>, &ImageRequest) -> Result<ImageSequence, Exception>
        + Send
        + Sync,
{
    fn decode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
    ) -> Result<ImageSequence, Exception> {
        self(cx, request)
    }
}

impl<F> Encoder for F
where
    F: Fn(&mut DispatchContext<'_>, &ImageRequest, &[Frame]) -> Result<(), Exception>
        + Send
        + Sync,
{
    fn encode(
        &self,
        cx: &mut DispatchContext<'_>,
        request: &ImageRequest,
        frames: &[Frame],
    ) -> Result<(), Exception> {
        self(cx, request, frames)
    }
}

/// Progress of a single dispatch call.
///
/// `Unresolved → Resolved → Active → Done`, with `Failed` reachable from
/// `Unresolved` (no usable descriptor) and from `Active` (handler error).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Unresolved,
    Resolved,
    Active,
    Done,
    Failed,
}

impl DispatchState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance(self, next: DispatchState) -> bool {
        use DispatchState::*;
        match self {
            Unresolved => matches!(next, Resolved | Failed),
            Resolved => next == Active,
            Active => matches!(next, Done | Failed),
            Done | Failed => false,
        }
    }

    pub(crate) fn advance(&mut self, next: DispatchState, tag: Option<&Tag>) {
        debug_assert!(
            self.can_advance(next),
            "illegal dispatch transition {self:?} -> {next:?}"
        );
        tracing::trace!(from = ?*self, to = ?next, tag = tag.map(Tag::as_str), "dispatch state");
        *self = next;
    }
}

/// Resolves tags, looks up descriptors, and invokes coders.
///
/// The dispatcher itself is immutable and `Sync`; every call gets its own
/// [`ExceptionRecord`] and [`DispatchContext`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<FormatRegistry>,
    sniffer: Arc<dyn FormatSniffer>,
    blobs: Arc<dyn BlobStore>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// A dispatcher over `registry` using extension sniffing, filesystem
    /// blobs, and the default configuration.
    pub fn new(registry: impl Into<Arc<FormatRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            sniffer: Arc::new(ExtensionSniffer),
            blobs: Arc::new(FileBlobs),
            config: DispatchConfig::default(),
        }
    }

    /// Replace the sniffer consulted when a request names no format.
    pub fn with_sniffer(mut self, sniffer: impl FormatSniffer + 'static) -> Self {
        self.sniffer = Arc::new(sniffer);
        self
    }

    /// Replace the blob store coders read from and write to.
    pub fn with_blobs(mut self, blobs: impl BlobStore + 'static) -> Self {
        self.blobs = Arc::new(blobs);
        self
    }

    /// Use a blob store that is already shared with other owners.
    pub fn with_shared_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Formats this dispatcher resolves against.
    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Settings applied to every call.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Store that request targets resolve against.
    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    /// Resolve the tag a request refers to.
    ///
    /// An explicit tag wins, then a registered `tag:` prefix on the target,
    /// then the sniffer.
    pub fn resolve_tag(&self, request: &ImageRequest) -> Option<Tag> {
        if let Some(tag) = request.tag() {
            return Some(tag.clone());
        }
        if let Some(prefix) = request.prefix() {
            if let Some(descriptor) = self.registry.lookup(prefix) {
                return Some(descriptor.tag().clone());
            }
        }
        self.sniffer.sniff(request, &self.registry)
    }

    /// Resolve and look up, recording `FormatNotSupported` on failure.
    ///
    /// On success `state` is left `Unresolved`; the caller advances it once
    /// it has checked the descriptor has a handler for its direction.
    pub(crate) fn resolve_descriptor(
        &self,
        request: &ImageRequest,
        exceptions: &mut ExceptionRecord,
        state: &mut DispatchState,
    ) -> Option<Arc<FormatDescriptor>> {
        let Some(tag) = self.resolve_tag(request) else {
            state.advance(DispatchState::Failed, None);
            exceptions.push(Exception::format_not_supported(
                None,
                format!("no format tag for `{}`", request.target()),
            ));
            return None;
        };
        match self.registry.get(&tag) {
            Some(descriptor) => {
                tracing::debug!(tag = %tag, target = request.target(), "tag resolved");
                Some(descriptor.clone())
            }
            None => {
                state.advance(DispatchState::Failed, Some(&tag));
                exceptions.push(Exception::format_not_supported(
                    Some(&tag),
                    format!("no coder registered for `{}`", request.target()),
                ));
                None
            }
        }
    }

    /// Record `DelegationTooDeep` if `depth` exceeds the configured limit.
    pub(crate) fn check_depth(
        &self,
        request: &ImageRequest,
        depth: usize,
        exceptions: &mut ExceptionRecord,
    ) -> bool {
        match self.config.limits().check_delegation_depth(depth) {
            Ok(()) => true,
            Err(limit) => {
                exceptions.push(Exception::new(
                    ExceptionKind::DelegationTooDeep,
                    request.tag(),
                    format!(
                        "`{}` nested {depth} levels deep (limit {limit})",
                        request.target()
                    ),
                ));
                false
            }
        }
    }

    /// Decode, returning the sequence or the full exception record.
    ///
    /// Warnings recorded during a successful decode are logged and dropped.
    pub fn read(&self, request: &ImageRequest) -> Result<ImageSequence, DispatchError> {
        let mut exceptions = ExceptionRecord::new();
        match self.decode(request, &mut exceptions) {
            Some(images) => {
                log_warnings(&exceptions);
                Ok(images)
            }
            None => Err(DispatchError::new(exceptions)),
        }
    }

    /// Encode, returning the full exception record on failure.
    pub fn write(
        &self,
        request: &ImageRequest,
        images: &ImageSequence,
    ) -> Result<(), DispatchError> {
        let mut exceptions = ExceptionRecord::new();
        if self.encode(request, images, &mut exceptions) {
            log_warnings(&exceptions);
            Ok(())
        } else {
            Err(DispatchError::new(exceptions))
        }
    }
}

fn log_warnings(exceptions: &ExceptionRecord) {
    for warning in exceptions.iter().filter(|e| !e.is_error()) {
        tracing::warn!(%warning, "coder warning");
    }
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("formats", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

/// State shared by one handler invocation and the calls it nests.
///
/// Handlers use the context to recurse into the dispatcher under another
/// tag, to append warnings, and to reach the blob store and progress monitor.
pub struct DispatchContext<'a> {
    pub(crate) dispatcher: &'a Dispatcher,
    pub(crate) exceptions: &'a mut ExceptionRecord,
    pub(crate) monitor: &'a dyn ProgressMonitor,
    pub(crate) descriptor: Arc<FormatDescriptor>,
    pub(crate) depth: usize,
}

impl<'a> DispatchContext<'a> {
    /// Tag of the coder being invoked.
    pub fn tag(&self) -> &Tag {
        self.descriptor.tag()
    }

    /// Descriptor of the coder being invoked.
    pub fn descriptor(&self) -> &FormatDescriptor {
        &self.descriptor
    }

    /// The dispatcher that made this call.
    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher
    }

    /// The dispatcher's configuration.
    pub fn config(&self) -> &DispatchConfig {
        self.dispatcher.config()
    }

    /// Nesting level; top-level calls run at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Monitor of the top-level call; nested calls share it.
    pub fn monitor(&self) -> &dyn ProgressMonitor {
        self.monitor
    }

    /// Entries recorded so far, including those of earlier nested calls.
    pub fn exceptions(&self) -> &ExceptionRecord {
        self.exceptions
    }

    /// Append a non-decisive exception attributed to this coder.
    pub fn warn(&mut self, kind: ExceptionKind, message: impl Into<String>) {
        let warning = Exception::warning(kind, Some(self.descriptor.tag()), message);
        self.exceptions.push(warning);
    }

    /// Append an exception as-is. Errors recorded here are decisive even if
    /// the handler goes on to succeed.
    pub fn record(&mut self, exception: Exception) {
        self.exceptions.push(exception);
    }

    /// Resolve a tag the way the dispatcher would for a nested call.
    pub fn resolve_tag(&self, request: &ImageRequest) -> Option<Tag> {
        self.dispatcher.resolve_tag(request)
    }

    /// Decode through the dispatcher one level deeper.
    pub fn decode(&mut self, request: &ImageRequest) -> Option<ImageSequence> {
        self.dispatcher
            .decode_nested(request, self.exceptions, self.monitor, self.depth + 1)
    }

    /// Encode through the dispatcher one level deeper.
    pub fn encode(&mut self, request: &ImageRequest, images: &ImageSequence) -> bool {
        self.dispatcher.encode_nested(
            request,
            images,
            self.exceptions,
            self.monitor,
            self.depth + 1,
        )
    }

    /// An upstream-failure exception for a nested call that just failed,
    /// carrying the nested call's last decisive message.
    pub fn upstream_failure(&self, kind: ExceptionKind, request: &ImageRequest) -> Exception {
        let cause = self
            .exceptions
            .last_error()
            .map_or_else(|| "no data returned".to_string(), ToString::to_string);
        Exception::new(
            kind,
            Some(self.descriptor.tag()),
            format!("`{}`: {cause}", request.target()),
        )
    }

    /// Request bytes: the embedded blob, or the target path via the blob store.
    pub fn read_blob(&self, request: &ImageRequest) -> Result<Arc<[u8]>, Exception> {
        if let Some(blob) = request.blob() {
            return Ok(blob.clone());
        }
        self.dispatcher
            .blobs()
            .read(request.path())
            .map(Arc::from)
            .map_err(|e| Exception::blob_open(self.tag(), request.path(), &e))
    }

    /// Open the destination stream for `request`.
    pub fn open_sink(&self, request: &ImageRequest) -> Result<Box<dyn BlobSink>, Exception> {
        self.dispatcher
            .blobs()
            .create(request.path())
            .map_err(|e| Exception::blob_open(self.tag(), request.path(), &e))
    }

    /// Bytes behind an already-open file descriptor.
    pub fn read_descriptor(&self, fd: i32, name: &str) -> Result<Vec<u8>, Exception> {
        self.dispatcher
            .blobs()
            .read_descriptor(fd)
            .map_err(|e| Exception::blob_open(self.tag(), name, &e))
    }
}
