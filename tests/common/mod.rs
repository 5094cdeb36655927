#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use deffib::pin::{PinMode, ProcessPageHost, TrackedHost};
use deffib::{Backoff, Dispatcher, DispatcherConfig, PageReader};

pub type Host = TrackedHost<ProcessPageHost>;

pub fn tracked_dispatcher(region_size: usize) -> (Arc<Host>, Dispatcher<Host>) {
    let host = Arc::new(TrackedHost::new(
        ProcessPageHost::with_region_size(region_size).pin_mode(PinMode::Reference),
    ));
    let dispatcher = Dispatcher::with_threads(host.clone(), DispatcherConfig::default());
    (host, dispatcher)
}

/// Polls until the page reports completion and the dispatcher has let go of it.
pub fn wait_done(dispatcher: &Dispatcher<Host>, reader: PageReader<'_>, addr: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut backoff = Backoff::new();
    while !reader.is_complete() || dispatcher.is_busy(addr) {
        assert!(Instant::now() < deadline, "worker never finished");
        backoff.snooze();
    }
}
