#![no_main]

use std::sync::atomic::{AtomicUsize, Ordering};

use enough::{Stop, StopReason};
use libfuzzer_sys::fuzz_target;
use zendispatch::{
    Dispatcher, ExceptionKind, ExceptionRecord, FormatRegistry, ImageRequest, MemoryBlobs,
    StopMonitor,
};

/// Lets `n` checks pass, then cancels.
struct StopAfter(AtomicUsize);

impl Stop for StopAfter {
    fn check(&self) -> Result<(), StopReason> {
        self.0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| StopReason::Cancelled)
    }
}

fuzz_target!(|data: &[u8]| {
    let [split, budget, rest @ ..] = data else {
        return;
    };
    let split = usize::from(*split).min(rest.len());
    let (name, payload) = rest.split_at(split);
    let Ok(name) = std::str::from_utf8(name) else {
        return;
    };

    let blobs = MemoryBlobs::new();
    blobs.insert(name.to_string(), payload.to_vec());
    blobs.insert_descriptor(3, payload.to_vec());
    let dispatcher = Dispatcher::new(FormatRegistry::with_builtin_coders()).with_blobs(blobs);

    let mut exceptions = ExceptionRecord::new();
    let result = dispatcher.decode(&ImageRequest::new(name), &mut exceptions);
    // Failure always leaves at least one error behind.
    let Some(images) = result else {
        assert!(exceptions.has_errors());
        return;
    };

    // Re-encode through DEBUG with a stop token that fires partway through.
    let monitor = StopMonitor(StopAfter(AtomicUsize::new(usize::from(*budget))));
    let request = ImageRequest::new("debug:out.txt").with_adjoin(budget % 2 == 0);
    let mut exceptions = ExceptionRecord::new();
    let written = dispatcher.encode_monitored(&request, &images, &monitor, &mut exceptions);
    if !written {
        assert!(exceptions.has_errors());
    }
    if exceptions.contains(ExceptionKind::UserCancelled) {
        assert!(!written);
    }
});
