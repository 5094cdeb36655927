use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use deffib_pin::PageHost;
use deffib_worker::Spawn;

use crate::dispatcher::Dispatcher;
use crate::error::RegistryError;

/// Anything that can be driven through [`DeviceFile::ioctl`].
pub trait Device: Send + Sync {
    /// # Safety
    ///
    /// `param` must satisfy whatever contract `request` defines for it.
    unsafe fn ioctl(&self, request: u32, param: usize) -> i64;
}

impl<H: PageHost, S: Spawn> Device for Dispatcher<H, S> {
    unsafe fn ioctl(&self, request: u32, param: usize) -> i64 {
        Dispatcher::ioctl(self, request, param)
    }
}

struct Entry {
    class: String,
    device: Arc<dyn Device>,
}

/// Named devices callers can open.
///
/// Unregistering a device only removes the name: files already opened keep the device alive
/// until they are dropped.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Entry>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static DeviceRegistry {
        static GLOBAL: OnceLock<DeviceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DeviceRegistry::new)
    }

    pub fn register(
        &self,
        name: &str,
        class: &str,
        device: Arc<dyn Device>,
    ) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        if devices.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_owned()));
        }
        devices.insert(
            name.to_owned(),
            Entry {
                class: class.to_owned(),
                device,
            },
        );
        tracing::info!(name, class, "device registered");
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let removed = self
            .devices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        match removed {
            Some(entry) => {
                tracing::info!(name, class = %entry.class, "device unregistered");
                Ok(())
            }
            None => Err(RegistryError::NotFound(name.to_owned())),
        }
    }

    pub fn open(&self, name: &str) -> Result<DeviceFile, RegistryError> {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        let entry = devices
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;
        Ok(DeviceFile {
            name: name.to_owned(),
            device: entry.device.clone(),
        })
    }

    pub fn class_of(&self, name: &str) -> Option<String> {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        devices.get(name).map(|entry| entry.class.clone())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let devices = self.devices.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = devices.keys().cloned().collect();
        names.sort();
        names
    }
}

/// An open handle on a registered device.
#[derive(Clone)]
pub struct DeviceFile {
    name: String,
    device: Arc<dyn Device>,
}

impl DeviceFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Safety
    ///
    /// See [`Device::ioctl`].
    pub unsafe fn ioctl(&self, request: u32, param: usize) -> i64 {
        self.device.ioctl(request, param)
    }
}

impl std::fmt::Debug for DeviceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFile").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    impl Device for Echo {
        unsafe fn ioctl(&self, request: u32, _param: usize) -> i64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            request as i64
        }
    }

    #[test]
    fn register_open_and_call() {
        let registry = DeviceRegistry::new();
        let echo = Arc::new(Echo::default());
        registry.register("echo", "test", echo.clone()).unwrap();

        let file = registry.open("echo").unwrap();
        assert_eq!(file.name(), "echo");
        assert_eq!(unsafe { file.ioctl(7, 0) }, 7);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.class_of("echo").as_deref(), Some("test"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = DeviceRegistry::new();
        registry
            .register("echo", "test", Arc::new(Echo::default()))
            .unwrap();
        let err = registry
            .register("echo", "test", Arc::new(Echo::default()))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("echo".into()));
        assert_eq!(err.errno(), -libc::EEXIST);
    }

    #[test]
    fn unregister_hides_the_name_but_open_files_keep_working() {
        let registry = DeviceRegistry::new();
        registry
            .register("echo", "test", Arc::new(Echo::default()))
            .unwrap();
        let file = registry.open("echo").unwrap();

        registry.unregister("echo").unwrap();
        assert_eq!(
            registry.open("echo").unwrap_err(),
            RegistryError::NotFound("echo".into())
        );
        assert_eq!(
            registry.unregister("echo").unwrap_err().errno(),
            -libc::ENOENT
        );
        assert_eq!(unsafe { file.ioctl(3, 0) }, 3);
    }

    #[test]
    fn names_are_sorted() {
        let registry = DeviceRegistry::new();
        for name in ["b", "c", "a"] {
            registry
                .register(name, "test", Arc::new(Echo::default()))
                .unwrap();
        }
        assert_eq!(registry.names(), ["a", "b", "c"]);
    }

    #[test]
    fn global_registry_is_shared() {
        let name = "global-registry-test";
        DeviceRegistry::global()
            .register(name, "test", Arc::new(Echo::default()))
            .unwrap();
        assert!(DeviceRegistry::global().names().iter().any(|n| n == name));
        DeviceRegistry::global().unregister(name).unwrap();
    }
}
