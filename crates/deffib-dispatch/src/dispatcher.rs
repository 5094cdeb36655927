use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use deffib_backoff::Backoff;
use deffib_pin::{acquire, PageHost};
use deffib_worker::{spawn_fill, FillWorker, Spawn, ThreadSpawner, WorkerOptions};

use crate::command::DISPATCH_CMD;
use crate::error::DispatchError;

/// Longest a dispatch waits for a completed page's worker to finish releasing it.
const FINISH_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub worker: WorkerOptions,
}

/// Set by the worker before the store that completes the page.
type Finishing = Arc<AtomicBool>;

type InFlight = Arc<Mutex<HashMap<usize, Finishing>>>;

/// Marks a region as owned by a worker until dropped.
struct RegionClaim {
    in_flight: InFlight,
    addr: usize,
    finishing: Finishing,
}

impl RegionClaim {
    /// Claims `addr`, or returns whether the current owner has already completed the page.
    fn take(in_flight: &InFlight, addr: usize) -> Result<Self, bool> {
        let mut regions = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(owner) = regions.get(&addr) {
            return Err(owner.load(Ordering::Acquire));
        }
        let finishing = Finishing::default();
        regions.insert(addr, finishing.clone());
        Ok(Self {
            in_flight: in_flight.clone(),
            addr,
            finishing,
        })
    }
}

impl Drop for RegionClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.addr);
    }
}

/// Validates dispatch requests and starts one worker per accepted page.
///
/// A region stays claimed from a successful dispatch until its worker is done. Dispatching the
/// same address while the worker is still filling it fails with [`DispatchError::RegionBusy`].
/// Once the page shows `progress == capacity` the worker only has its release left, and a new
/// dispatch waits for that instead of failing.
pub struct Dispatcher<H: PageHost, S: Spawn = ThreadSpawner> {
    host: Arc<H>,
    spawner: S,
    config: DispatcherConfig,
    in_flight: InFlight,
    next_id: AtomicU64,
}

impl<H: PageHost> Dispatcher<H> {
    /// Dispatcher that runs each worker on its own thread.
    pub fn with_threads(host: Arc<H>, config: DispatcherConfig) -> Self {
        Self::new(host, ThreadSpawner::new(), config)
    }
}

impl<H: PageHost, S: Spawn> Dispatcher<H, S> {
    pub fn new(host: Arc<H>, spawner: S, config: DispatcherConfig) -> Self {
        Self {
            host,
            spawner,
            config,
            in_flight: Arc::default(),
            next_id: AtomicU64::new(1),
        }
    }

    #[inline]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    #[inline]
    pub fn region_size(&self) -> usize {
        self.host.region_size()
    }

    /// Number of regions with a worker that has not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_busy(&self, addr: usize) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&addr)
    }

    fn claim(&self, addr: usize) -> Result<RegionClaim, DispatchError> {
        let deadline = Instant::now() + FINISH_WAIT;
        let mut backoff = Backoff::new();
        loop {
            match RegionClaim::take(&self.in_flight, addr) {
                Ok(claim) => return Ok(claim),
                Err(true) if Instant::now() < deadline => backoff.snooze(),
                Err(_) => return Err(DispatchError::RegionBusy { addr }),
            }
        }
    }

    /// Acquires the page at `addr` and starts filling it in the background.
    ///
    /// Returns the dispatch id once the worker has been started; all failures are reported
    /// here, before any worker runs.
    ///
    /// # Safety
    ///
    /// The region at `addr` must stay mapped until its progress counter reaches capacity, and
    /// the caller must not write to it in that window. The worker does not read or write the
    /// page after that store; it only unmaps and unpins the range.
    pub unsafe fn dispatch(&self, addr: usize) -> Result<u64, DispatchError> {
        let claim = self.claim(addr)?;
        let buffer = acquire(self.host.clone(), addr)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            dispatch_id = id,
            addr,
            capacity = buffer.capacity(),
            "dispatching worker"
        );

        let finishing = claim.finishing.clone();
        let worker = FillWorker::new(buffer, self.config.worker.clone())
            .before_final_publish(move || finishing.store(true, Ordering::Release));

        spawn_fill(
            &self.spawner,
            worker,
            move |report| {
                drop(claim);
                tracing::debug!(
                    dispatch_id = id,
                    written = report.written,
                    elapsed = ?report.elapsed,
                    "worker finished"
                );
            },
        )
        .map_err(DispatchError::Spawn)?;

        Ok(id)
    }

    /// Command entry point. Returns 0 on success or a negative errno.
    ///
    /// # Safety
    ///
    /// For [`DISPATCH_CMD`], `param` is a page address with the requirements of
    /// [`Dispatcher::dispatch`].
    pub unsafe fn ioctl(&self, request: u32, param: usize) -> i64 {
        if request != DISPATCH_CMD {
            tracing::debug!(request, "unknown command");
            return -(libc::ENOTTY as i64);
        }
        match self.dispatch(param) {
            Ok(_) => 0,
            Err(err) => {
                let errno = err.errno();
                tracing::warn!(addr = param, errno, error = %err, "dispatch rejected");
                errno as i64
            }
        }
    }
}
