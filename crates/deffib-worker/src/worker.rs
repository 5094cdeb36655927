use std::io;
use std::time::{Duration, Instant};

use deffib_pin::{AcquiredBuffer, PageHost};

use crate::spawn::Spawn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Seeding,
    /// Next slot to compute.
    Advancing(usize),
    /// Page released. Terminal.
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Yield the processor after every publish.
    pub yield_between_steps: bool,
    pub thread_name: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            yield_between_steps: true,
            thread_name: "deffib-worker".to_owned(),
        }
    }
}

/// Summary produced when a worker reaches [`WorkerState::Done`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub slot_id: Option<u64>,
    pub addr: usize,
    /// Final published progress.
    pub written: usize,
    pub capacity: usize,
    pub elapsed: Duration,
}

type Hook = Box<dyn FnOnce() + Send + 'static>;

pub struct FillWorker<H: PageHost> {
    buffer: Option<AcquiredBuffer<H>>,
    before_final_publish: Option<Hook>,
    state: WorkerState,
    options: WorkerOptions,
    addr: usize,
    capacity: usize,
    slot_id: Option<u64>,
    written: usize,
    started: Instant,
    elapsed: Duration,
}

impl<H: PageHost> FillWorker<H> {
    pub fn new(buffer: AcquiredBuffer<H>, options: WorkerOptions) -> Self {
        Self {
            addr: buffer.addr(),
            capacity: buffer.capacity(),
            slot_id: buffer.slot_id(),
            buffer: Some(buffer),
            before_final_publish: None,
            state: WorkerState::Starting,
            options,
            written: 0,
            started: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Runs `hook` on the worker's thread right before the store that makes the page complete.
    ///
    /// Anything the hook publishes is visible to a reader that observes `progress == capacity`.
    pub fn before_final_publish(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.before_final_publish = Some(Box::new(hook));
        self
    }

    #[inline]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Performs one transition and returns the new state. A no-op once `Done`.
    pub fn step(&mut self) -> WorkerState {
        self.state = match self.state {
            WorkerState::Starting => self.start(),
            WorkerState::Seeding => self.seed(),
            WorkerState::Advancing(index) => self.advance(index),
            WorkerState::Done => WorkerState::Done,
        };
        self.state
    }

    /// Drives the worker to `Done`.
    pub fn run(mut self) -> WorkerReport {
        while self.step() != WorkerState::Done {}
        self.report()
    }

    pub fn report(&self) -> WorkerReport {
        WorkerReport {
            slot_id: self.slot_id,
            addr: self.addr,
            written: self.written,
            capacity: self.capacity,
            elapsed: self.elapsed,
        }
    }

    fn start(&mut self) -> WorkerState {
        // The worker owns everything it needs now; the request bookkeeping can go.
        if let Some(slot) = self.buffer_mut().take_slot() {
            tracing::trace!(slot = slot.id(), queued_for = ?slot.created().elapsed(), "slot freed");
        }
        self.started = Instant::now();
        tracing::debug!(addr = self.addr, capacity = self.capacity, "worker started");
        WorkerState::Seeding
    }

    fn seed(&mut self) -> WorkerState {
        let seeded = self.capacity.min(2);
        let mut writer = self.buffer_mut().writer();
        for index in 0..seeded {
            writer.write_value(index, 1);
        }
        self.publish(seeded);
        self.next_after(seeded)
    }

    fn advance(&mut self, index: usize) -> WorkerState {
        let mut writer = self.buffer_mut().writer();
        debug_assert_eq!(writer.published(), index, "slots below {index} not yet published");
        let value = writer.value(index - 1).wrapping_add(writer.value(index - 2));
        writer.write_value(index, value);
        self.publish(index + 1);
        self.next_after(index + 1)
    }

    /// Publishes `progress`, yielding afterwards unless the page is now complete.
    fn publish(&mut self, progress: usize) {
        let last = progress == self.capacity;
        if last {
            if let Some(hook) = self.before_final_publish.take() {
                hook();
            }
        }
        self.buffer_mut().writer().publish(progress);
        self.written = progress;
        if !last {
            self.pause();
        }
    }

    fn next_after(&mut self, published: usize) -> WorkerState {
        if published < self.capacity {
            return WorkerState::Advancing(published);
        }
        if let Some(buffer) = self.buffer.take() {
            buffer.release();
        }
        self.elapsed = self.started.elapsed();
        tracing::debug!(
            addr = self.addr,
            written = self.written,
            elapsed = ?self.elapsed,
            "worker done"
        );
        WorkerState::Done
    }

    #[inline]
    fn pause(&self) {
        if self.options.yield_between_steps {
            std::thread::yield_now();
        }
    }

    fn buffer_mut(&mut self) -> &mut AcquiredBuffer<H> {
        match self.buffer.as_mut() {
            Some(buffer) => buffer,
            // Only `next_after` takes the buffer, and it moves the worker to `Done` in the same
            // step.
            None => unreachable!("worker stepped after Done"),
        }
    }
}

/// Starts `buffer`'s worker through `spawner` and returns without waiting for it.
///
/// `on_done` runs on the worker's thread after the page has been released. If the worker
/// unwinds instead, `on_done` is dropped without being called.
pub fn spawn_worker<H, S, F>(
    spawner: &S,
    buffer: AcquiredBuffer<H>,
    options: WorkerOptions,
    on_done: F,
) -> io::Result<()>
where
    H: PageHost,
    S: Spawn + ?Sized,
    F: FnOnce(&WorkerReport) + Send + 'static,
{
    spawn_fill(spawner, FillWorker::new(buffer, options), on_done)
}

/// Like [`spawn_worker`], for a worker that has already been configured.
pub fn spawn_fill<H, S, F>(spawner: &S, worker: FillWorker<H>, on_done: F) -> io::Result<()>
where
    H: PageHost,
    S: Spawn + ?Sized,
    F: FnOnce(&WorkerReport) + Send + 'static,
{
    let name = worker.options.thread_name.clone();
    spawner.spawn(
        name,
        Box::new(move || {
            let report = worker.run();
            on_done(&report);
        }),
    )
}
