use std::io;

/// Unit of work handed to a [`Spawn`] implementation.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Starts a job on an independently scheduled execution context and forgets about it.
pub trait Spawn: Send + Sync {
    /// The job's result is discarded. On error the job is dropped without running.
    fn spawn(&self, name: String, job: Job) -> io::Result<()>;
}

/// Runs each job on its own detached OS thread.
#[derive(Debug, Default, Clone)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Spawn for ThreadSpawner {
    fn spawn(&self, name: String, job: Job) -> io::Result<()> {
        let mut builder = std::thread::Builder::new().name(name);
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        // Dropping the JoinHandle detaches the thread.
        builder.spawn(job).map(drop)
    }
}

/// Runs each job on a Tokio runtime's blocking pool.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(feature = "tokio")]
impl Spawn for TokioSpawner {
    fn spawn(&self, name: String, job: Job) -> io::Result<()> {
        tracing::trace!(%name, "spawning blocking job");
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }
}
