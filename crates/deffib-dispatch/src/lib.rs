//! Request handling in front of the deferred worker.
//!
//! [`Dispatcher::dispatch`] validates and acquires the caller's page, starts a worker on it and
//! returns immediately; everything after that is observed through the page's progress counter.
//! [`DeviceRegistry`] is the minimal transport: named devices that callers open and drive with
//! ioctl-style commands ([`DISPATCH_CMD`]).

mod command;
mod dispatcher;
mod error;
mod registry;

pub use command::{ioc, DEVICE_CLASS, DEVICE_NAME, DISPATCH_CMD, IOC_READ, IOC_WRITE};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, RegistryError};
pub use registry::{Device, DeviceFile, DeviceRegistry};
