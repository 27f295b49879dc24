//! Multi-frame write loop with progress reporting and cooperative cancellation.

use enough::{Stop, StopReason, Unstoppable};

use crate::blob::BlobSink;
use crate::error::Exception;
use crate::format::Tag;
use crate::frame::Frame;

/// One progress report: `index` of `total` frames finished for `tag`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    tag: Tag,
    index: usize,
    total: usize,
}

impl Progress {
    /// Report that frame `index` of `total` is done.
    pub fn new(tag: &Tag, index: usize, total: usize) -> Self {
        Self {
            tag: tag.clone(),
            index,
            total,
        }
    }

    /// Tag of the coder doing the work.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Zero-based index of the frame just finished.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of frames in the operation.
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Receives per-frame progress and may ask the writer to stop.
///
/// Returning `Err` cancels the operation at the next frame boundary.
pub trait ProgressMonitor: Send + Sync {
    /// Called once per finished frame.
    fn report(&self, progress: &Progress) -> Result<(), StopReason>;
}

impl ProgressMonitor for Unstoppable {
    fn report(&self, _progress: &Progress) -> Result<(), StopReason> {
        Ok(())
    }
}

impl<F> ProgressMonitor for F
where
    F: Fn(&Progress) -> Result<(), StopReason> + Send + Sync,
{
    fn report(&self, progress: &Progress) -> Result<(), StopReason> {
        self(progress)
    }
}

/// Adapts any [`enough::Stop`] token into a monitor that ignores progress
/// and cancels once the token fires.
#[derive(Clone, Debug)]
pub struct StopMonitor<S>(pub S);

impl<S: Stop> ProgressMonitor for StopMonitor<S> {
    fn report(&self, progress: &Progress) -> Result<(), StopReason> {
        self.0.check().inspect_err(|reason| {
            tracing::debug!(
                tag = %progress.tag(),
                index = progress.index(),
                %reason,
                "stop token fired"
            );
        })
    }
}

/// Drives a whole-sequence encode: one frame body per frame, progress after
/// each, and exactly one sink close on every exit path.
///
/// Frames already written when a frame fails or the monitor cancels stay
/// on the sink; nothing is rolled back.
pub struct SequenceWriter<'a> {
    tag: &'a Tag,
    adjoin: bool,
    monitor: &'a dyn ProgressMonitor,
}

impl<'a> SequenceWriter<'a> {
    /// A writer reporting as `tag`. `adjoin` allows more than one frame.
    pub fn new(tag: &'a Tag, adjoin: bool, monitor: &'a dyn ProgressMonitor) -> Self {
        Self {
            tag,
            adjoin,
            monitor,
        }
    }

    /// Run `body` for each frame, writing into `sink`, then close the sink.
    ///
    /// Without adjoin only the first frame is processed. The first failure
    /// (from `body`, from cancellation, or from closing the sink) is returned.
    pub fn write<F>(
        &self,
        mut sink: Box<dyn BlobSink>,
        frames: &[Frame],
        mut body: F,
    ) -> Result<(), Exception>
    where
        F: FnMut(&mut dyn BlobSink, usize, &Frame) -> Result<(), Exception>,
    {
        let result = self.run(sink.as_mut(), frames, &mut body);
        let closed = sink
            .close()
            .map_err(|e| Exception::blob_write(self.tag, &e));
        result.and(closed)
    }

    fn run<F>(
        &self,
        sink: &mut dyn BlobSink,
        frames: &[Frame],
        body: &mut F,
    ) -> Result<(), Exception>
    where
        F: FnMut(&mut dyn BlobSink, usize, &Frame) -> Result<(), Exception>,
    {
        let total = frames.len();
        for (index, frame) in frames.iter().enumerate() {
            body(sink, index, frame)?;

            let progress = Progress::new(self.tag, index, total);
            tracing::trace!(tag = %self.tag, index, total, "frame written");
            if let Err(reason) = self.monitor.report(&progress) {
                tracing::debug!(tag = %self.tag, index, %reason, "sequence write cancelled");
                return Err(Exception::cancelled(self.tag, reason));
            }
            if !self.adjoin {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExceptionKind;
    use crate::frame::{ImgVec, Rgba};
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Tally {
        written: Arc<Mutex<Vec<u8>>>,
        closes: Arc<AtomicUsize>,
    }

    struct TallySink(Tally);

    impl Write for TallySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl BlobSink for TallySink {
        fn close(&mut self) -> io::Result<()> {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn frames(n: usize) -> Vec<Frame> {
        let frame = Frame::new(ImgVec::new(vec![Rgba::new(0.0, 0.0, 0.0, 0.0)], 1, 1));
        vec![frame; n]
    }

    fn write_index(sink: &mut dyn BlobSink, index: usize, _: &Frame) -> Result<(), Exception> {
        write!(sink, "{index}").map_err(|e| Exception::blob_write(&Tag::new("T").unwrap(), &e))
    }

    #[test]
    fn cancel_after_second_frame() {
        let tag = Tag::new("seq").unwrap();
        let tally = Tally::default();
        let monitor = |p: &Progress| {
            if p.index() == 1 {
                Err(StopReason::Cancelled)
            } else {
                Ok(())
            }
        };
        let writer = SequenceWriter::new(&tag, true, &monitor);
        let sink = Box::new(TallySink(tally.clone()));
        let err = writer.write(sink, &frames(3), write_index).unwrap_err();

        assert_eq!(err.kind(), ExceptionKind::UserCancelled);
        assert_eq!(&*tally.written.lock().unwrap(), b"01");
        assert_eq!(tally.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn without_adjoin_only_first_frame() {
        let tag = Tag::new("seq").unwrap();
        let tally = Tally::default();
        let writer = SequenceWriter::new(&tag, false, &Unstoppable);
        let sink = Box::new(TallySink(tally.clone()));
        writer.write(sink, &frames(5), write_index).unwrap();
        assert_eq!(&*tally.written.lock().unwrap(), b"0");
        assert_eq!(tally.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frame_failure_still_closes() {
        let tag = Tag::new("seq").unwrap();
        let tally = Tally::default();
        let writer = SequenceWriter::new(&tag, true, &Unstoppable);
        let sink = Box::new(TallySink(tally.clone()));
        let err = writer
            .write(sink, &frames(3), |_, index, _| {
                if index == 1 {
                    Err(Exception::new(
                        ExceptionKind::CoderFailure,
                        Some(&tag),
                        "bad frame",
                    ))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::CoderFailure);
        assert_eq!(tally.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reports_every_frame() {
        let tag = Tag::new("seq").unwrap();
        let seen = Mutex::new(Vec::new());
        let monitor = |p: &Progress| -> Result<(), StopReason> {
            seen.lock().unwrap().push((p.index(), p.total()));
            Ok(())
        };
        let writer = SequenceWriter::new(&tag, true, &monitor);
        let sink = Box::new(TallySink(Tally::default()));
        writer.write(sink, &frames(3), write_index).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(0, 3), (1, 3), (2, 3)]);
    }

    #[test]
    fn stop_monitor_follows_token() {
        struct Flag(AtomicBool);
        impl Stop for Flag {
            fn check(&self) -> Result<(), StopReason> {
                if self.0.load(Ordering::SeqCst) {
                    Err(StopReason::Cancelled)
                } else {
                    Ok(())
                }
            }
        }
        let tag = Tag::new("seq").unwrap();
        let monitor = StopMonitor(Flag(AtomicBool::new(false)));
        let progress = Progress::new(&tag, 0, 1);
        assert!(monitor.report(&progress).is_ok());
        monitor.0.0.store(true, Ordering::SeqCst);
        let reason = monitor.report(&progress).unwrap_err();
        assert!(matches!(reason, StopReason::Cancelled));
    }
}
