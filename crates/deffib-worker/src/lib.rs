//! Background worker that fills an acquired page and publishes its progress.
//!
//! [`FillWorker`] is a run-to-completion state machine:
//!
//! ```text
//! Starting -> Seeding -> Advancing(2) -> ... -> Advancing(capacity - 1) -> Done
//! ```
//!
//! Every transition that writes a slot publishes the new progress with a release store and then
//! yields. Reaching `Done` releases the page. The worker is started through a [`Spawn`]
//! implementation and nobody joins it; the only thing the consumer ever observes is the
//! progress counter.

mod spawn;
mod worker;

pub use spawn::{Job, Spawn, ThreadSpawner};
#[cfg(feature = "tokio")]
pub use spawn::TokioSpawner;
pub use worker::{spawn_fill, spawn_worker, FillWorker, WorkerOptions, WorkerReport, WorkerState};
