//! Adaptive wait for a condition published by another thread or process.
//!
//! Short waits burn a few cycles in a spin loop (no syscall, no context switch); once the spin
//! budget is used up the waiter starts yielding its time slice instead. There is no timeout:
//! callers that need bounded waiting must check the clock themselves between steps.

#![forbid(unsafe_code)]

/// Highest step that still spins instead of yielding.
pub const SPIN_LIMIT: u32 = 6;

/// Step at which [`Backoff::snooze`] saturates.
pub const YIELD_LIMIT: u32 = 10;

/// What the next [`Backoff::snooze`] will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Busy loop for this many `spin_loop` hints.
    Spin { iterations: u32 },
    /// Hand the processor back to the scheduler.
    Yield,
}

/// Per-waiter backoff state. Cheap to create; reuse across waits with [`Backoff::reset`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }

    #[inline]
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Whether the schedule has saturated. Callers may switch to a blocking wait from here.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step >= YIELD_LIMIT
    }

    #[inline]
    pub fn next_strategy(&self) -> Strategy {
        if self.step <= SPIN_LIMIT {
            Strategy::Spin {
                iterations: 1 << self.step.min(SPIN_LIMIT),
            }
        } else {
            Strategy::Yield
        }
    }

    /// Backs off in a lock-free loop that must never deschedule.
    ///
    /// Always spins, at most `2^SPIN_LIMIT` iterations per call.
    #[inline]
    pub fn spin(&mut self) {
        spin_for(1 << self.step.min(SPIN_LIMIT));
        if self.step <= SPIN_LIMIT {
            self.step += 1;
        }
    }

    /// Backs off while waiting for another thread to make progress.
    ///
    /// Spins `2^step` iterations while `step <= SPIN_LIMIT`, yields afterwards. `step` grows by
    /// one per call and stays at [`YIELD_LIMIT`] once it gets there.
    #[inline]
    pub fn snooze(&mut self) {
        match self.next_strategy() {
            Strategy::Spin { iterations } => spin_for(iterations),
            Strategy::Yield => std::thread::yield_now(),
        }
        if self.step < YIELD_LIMIT {
            self.step += 1;
        }
    }

    /// Alias of [`Backoff::snooze`] matching the handoff protocol's naming.
    #[inline]
    pub fn wait_step(&mut self) {
        self.snooze();
    }
}

/// Snoozes until `pending` returns false. Returns how many times it backed off.
pub fn wait_while(backoff: &mut Backoff, mut pending: impl FnMut() -> bool) -> u64 {
    let mut rounds = 0;
    while pending() {
        backoff.snooze();
        rounds += 1;
    }
    rounds
}

#[inline]
fn spin_for(iterations: u32) {
    for _ in 0..iterations {
        core::hint::spin_loop();
    }
}
