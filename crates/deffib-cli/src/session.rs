use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use deffib_backoff::Backoff;
use deffib_dispatch::{
    DeviceFile, DeviceRegistry, Dispatcher, DispatcherConfig, DEVICE_CLASS, DISPATCH_CMD,
};
use deffib_layout::{verify_recurrence, AlignedPage};
use deffib_pin::ProcessPageHost;
use deffib_worker::WorkerOptions;

use crate::CliConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub capacity: usize,
    /// Backoff steps taken while waiting for the worker.
    pub waits: u64,
    pub elapsed: Duration,
}

/// A dispatcher registered in the process-wide registry, plus an open handle to it.
///
/// Dropping the session unregisters the device.
pub struct Session {
    name: String,
    dispatcher: Arc<Dispatcher<ProcessPageHost>>,
    file: DeviceFile,
}

impl Session {
    pub fn open(config: &CliConfig) -> anyhow::Result<Self> {
        let host = match config.region_size {
            Some(size) => ProcessPageHost::with_region_size(size),
            None => ProcessPageHost::new(),
        }
        .pin_mode(config.pin_mode);

        let dispatcher = Arc::new(Dispatcher::with_threads(
            Arc::new(host),
            DispatcherConfig {
                worker: WorkerOptions {
                    yield_between_steps: config.yield_between_steps,
                    ..WorkerOptions::default()
                },
            },
        ));

        let registry = DeviceRegistry::global();
        registry
            .register(&config.device, DEVICE_CLASS, dispatcher.clone())
            .with_context(|| format!("failed to register device {}", config.device))?;
        let file = match registry.open(&config.device) {
            Ok(file) => file,
            Err(err) => {
                let _ = registry.unregister(&config.device);
                return Err(err)
                    .with_context(|| format!("failed to open device {}", config.device));
            }
        };

        Ok(Self {
            name: config.device.clone(),
            dispatcher,
            file,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region_size(&self) -> usize {
        self.dispatcher.region_size()
    }

    /// Allocates a zeroed page with the region's size and alignment.
    pub fn alloc_page(&self) -> anyhow::Result<AlignedPage> {
        let size = self.region_size();
        match AlignedPage::new(size) {
            Some(page) => Ok(page),
            None => bail!("failed to allocate a {size}-byte aligned page"),
        }
    }

    /// Clears `page`, dispatches a fill into it, waits for the worker and verifies the values.
    pub fn fill_once(&self, page: &mut AlignedPage) -> anyhow::Result<RunOutcome> {
        page.clear();
        let addr = page.addr();
        let started = Instant::now();

        // SAFETY: `page` outlives the worker; the loop below only returns once the dispatcher
        // has dropped its claim on `addr`.
        let rc = unsafe { self.file.ioctl(DISPATCH_CMD, addr) };
        if rc < 0 {
            return Err(io::Error::from_raw_os_error(-rc as i32))
                .with_context(|| format!("dispatch of page {addr:#x} rejected"));
        }

        let reader = page.reader();
        let mut backoff = Backoff::new();
        let mut waits = 0u64;
        loop {
            let complete = reader.is_complete();
            // The claim is dropped after the worker has released the page.
            if !self.dispatcher.is_busy(addr) {
                if complete || reader.is_complete() {
                    break;
                }
                bail!(
                    "worker stopped after {} of {} values",
                    reader.progress(),
                    reader.capacity()
                );
            }
            backoff.snooze();
            waits += 1;
        }
        let elapsed = started.elapsed();

        let values = reader.published();
        if values.len() != reader.capacity() {
            bail!(
                "progress {} does not match capacity {}",
                values.len(),
                reader.capacity()
            );
        }
        verify_recurrence(&values).context("page contents do not follow the recurrence")?;

        Ok(RunOutcome {
            capacity: values.len(),
            waits,
            elapsed,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = DeviceRegistry::global().unregister(&self.name) {
            tracing::warn!(name = %self.name, %err, "failed to unregister device");
        }
    }
}
