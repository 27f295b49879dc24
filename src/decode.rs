//! Decode dispatch.

use crate::dispatch::{DispatchContext, DispatchState, Dispatcher};
use crate::error::{Exception, ExceptionRecord};
use crate::frame::ImageSequence;
use crate::request::ImageRequest;
use crate::sequence::ProgressMonitor;

impl Dispatcher {
    /// Decode `request`.
    ///
    /// Returns `None` with at least one error recorded in `exceptions`, or a
    /// non-empty sequence. Entries already in `exceptions` are kept; new ones
    /// are appended.
    #[tracing::instrument(level = "debug", skip_all, fields(target = request.target()))]
    pub fn decode(
        &self,
        request: &ImageRequest,
        exceptions: &mut ExceptionRecord,
    ) -> Option<ImageSequence> {
        self.decode_nested(request, exceptions, &enough::Unstoppable, 0)
    }

    /// Decode with a progress monitor visible to coders.
    pub fn decode_monitored(
        &self,
        request: &ImageRequest,
        monitor: &dyn ProgressMonitor,
        exceptions: &mut ExceptionRecord,
    ) -> Option<ImageSequence> {
        self.decode_nested(request, exceptions, monitor, 0)
    }

    pub(crate) fn decode_nested(
        &self,
        request: &ImageRequest,
        exceptions: &mut ExceptionRecord,
        monitor: &dyn ProgressMonitor,
        depth: usize,
    ) -> Option<ImageSequence> {
        if !self.check_depth(request, depth, exceptions) {
            return None;
        }
        let mut state = DispatchState::Unresolved;
        let descriptor = self.resolve_descriptor(request, exceptions, &mut state)?;
        let Some(decoder) = descriptor.decoder().cloned() else {
            state.advance(DispatchState::Failed, Some(descriptor.tag()));
            exceptions.push(Exception::format_not_supported(
                Some(descriptor.tag()),
                "no decode delegate for this image format",
            ));
            return None;
        };

        state.advance(DispatchState::Resolved, Some(descriptor.tag()));
        state.advance(DispatchState::Active, Some(descriptor.tag()));
        tracing::debug!(tag = %descriptor.tag(), depth, "invoking decoder");
        let tag = descriptor.tag().clone();
        let mut cx = DispatchContext {
            dispatcher: self,
            exceptions,
            monitor,
            descriptor,
            depth,
        };
        match decoder.decode(&mut cx, request) {
            Ok(images) => {
                state.advance(DispatchState::Done, Some(&tag));
                Some(images)
            }
            Err(exception) => {
                state.advance(DispatchState::Failed, Some(&tag));
                cx.exceptions.push(exception);
                None
            }
        }
    }
}
