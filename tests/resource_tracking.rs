#![cfg(target_os = "linux")]

mod common;

use std::io;
use std::sync::{Arc, Mutex};

use deffib::pin::{Fault, PinMode, ProcessPageHost, TrackedHost};
use deffib::worker::{Job, Spawn};
use deffib::{verify_recurrence, AlignedPage, DispatchError, Dispatcher, DispatcherConfig};

use common::{tracked_dispatcher, wait_done};

/// Holds jobs until the test runs them.
#[derive(Default, Clone)]
struct Parked(Arc<Mutex<Vec<Job>>>);

impl Spawn for Parked {
    fn spawn(&self, _name: String, job: Job) -> io::Result<()> {
        self.0.lock().unwrap().push(job);
        Ok(())
    }
}

impl Parked {
    fn run_all(&self) {
        let jobs = std::mem::take(&mut *self.0.lock().unwrap());
        for job in jobs {
            job();
        }
    }
}

#[test]
fn one_pin_and_one_map_per_accepted_dispatch() {
    let (host, dispatcher) = tracked_dispatcher(4096);
    let pages: Vec<_> = (0..4).map(|_| AlignedPage::new(4096).unwrap()).collect();

    for page in &pages {
        unsafe { dispatcher.dispatch(page.addr()) }.unwrap();
    }
    for page in &pages {
        wait_done(&dispatcher, page.reader(), page.addr());
        verify_recurrence(&page.reader().published()).unwrap();
    }

    let c = host.counters();
    assert_eq!(c.slots, 4);
    assert_eq!((c.pins, c.unpins), (4, 4));
    assert_eq!((c.maps, c.unmaps), (4, 4));
    assert_eq!(host.outstanding(), 0);
}

#[test]
fn rejected_dispatches_hold_nothing() {
    let (host, dispatcher) = tracked_dispatcher(4096);
    let page = AlignedPage::new(4096).unwrap();

    let misaligned = unsafe { dispatcher.ioctl(deffib::DISPATCH_CMD, page.addr() + 64) };
    assert_eq!(misaligned, -(libc::EINVAL as i64));
    let unmapped = unsafe { dispatcher.ioctl(deffib::DISPATCH_CMD, 4096) };
    assert_eq!(unmapped, -(libc::EACCES as i64));

    assert_eq!(host.counters().total(), 0);
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(page.reader().progress(), 0);
}

#[test]
fn injected_faults_unwind_in_reverse() {
    let (host, dispatcher) = tracked_dispatcher(4096);
    let page = AlignedPage::new(4096).unwrap();
    let addr = page.addr();

    host.inject(Fault::SlotAlloc);
    let err = unsafe { dispatcher.dispatch(addr) }.unwrap_err();
    assert_eq!(err.errno(), -libc::ENOMEM);
    assert_eq!(host.counters().total(), 0);

    host.inject(Fault::Pin(libc::EPERM));
    let err = unsafe { dispatcher.dispatch(addr) }.unwrap_err();
    assert_eq!(err.errno(), -libc::EPERM);
    let c = host.counters();
    assert_eq!((c.slots, c.pins, c.maps), (1, 0, 0));

    host.inject(Fault::Map);
    let err = unsafe { dispatcher.dispatch(addr) }.unwrap_err();
    assert_eq!(err.errno(), -libc::ENOMEM);
    let c = host.counters();
    assert_eq!((c.pins, c.unpins, c.maps, c.unmaps), (1, 1, 0, 0));

    assert_eq!(host.outstanding(), 0);
    assert!(!dispatcher.is_busy(addr));
    assert_eq!(page.reader().progress(), 0);

    host.clear_fault();
    unsafe { dispatcher.dispatch(addr) }.unwrap();
    wait_done(&dispatcher, page.reader(), addr);
    assert_eq!(host.outstanding(), 0);
}

#[test]
fn busy_region_is_rejected_until_the_worker_finishes() {
    let host = Arc::new(TrackedHost::new(
        ProcessPageHost::with_region_size(4096).pin_mode(PinMode::Reference),
    ));
    let spawner = Parked::default();
    let dispatcher = Dispatcher::new(host.clone(), spawner.clone(), DispatcherConfig::default());
    let page = AlignedPage::new(4096).unwrap();

    unsafe { dispatcher.dispatch(page.addr()) }.unwrap();
    let err = unsafe { dispatcher.dispatch(page.addr()) }.unwrap_err();
    assert!(matches!(err, DispatchError::RegionBusy { addr } if addr == page.addr()));
    assert_eq!(err.errno(), -libc::EBUSY);
    assert_eq!(host.counters().pins, 1);

    spawner.run_all();
    assert!(page.reader().is_complete());
    assert!(!dispatcher.is_busy(page.addr()));
    assert_eq!(host.outstanding(), 0);

    unsafe { dispatcher.dispatch(page.addr()) }.unwrap();
    spawner.run_all();
    assert_eq!(host.counters().pins, 2);
    assert_eq!(host.outstanding(), 0);
}
