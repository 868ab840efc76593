//! Shared registry of live device write handles.
//!
//! Workers publish a handle once a session reaches streaming and remove
//! it during teardown; control sessions look handles up by name to
//! forward raw commands.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::transport::{LinkWriter, TransportError};

/// Cloneable write handle to one connected device.
#[derive(Clone)]
pub struct DeviceHandle {
    writer: Arc<Mutex<Box<dyn LinkWriter>>>,
}

impl DeviceHandle {
    /// Wrap a link's write half.
    pub fn new(writer: Box<dyn LinkWriter>) -> Self {
        DeviceHandle {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Send one command line to the device.
    pub fn send_line(&self, line: &str) -> Result<(), TransportError> {
        self.writer.lock().send_line(line)
    }
}

/// Name → handle map shared between workers and the control server.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<Mutex<HashMap<String, DeviceHandle>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` visible to control sessions, replacing any stale
    /// handle from a previous session.
    pub fn publish(&self, name: &str, handle: DeviceHandle) {
        self.inner.lock().insert(name.to_string(), handle);
    }

    /// Remove `name`; a no-op if it was never published.
    pub fn unpublish(&self, name: &str) {
        self.inner.lock().remove(name);
    }

    /// Handle for `name`, if its device is currently connected.
    pub fn lookup(&self, name: &str) -> Option<DeviceHandle> {
        self.inner.lock().get(name).cloned()
    }

    /// Snapshot of connected device names, sorted for stable output.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SharedWriter;

    #[test]
    fn test_publish_lookup_unpublish() {
        let registry = DeviceRegistry::new();
        assert!(registry.lookup("garden").is_none());

        let (writer, sent) = SharedWriter::new();
        registry.publish("garden", DeviceHandle::new(Box::new(writer)));
        let handle = registry.lookup("garden").unwrap();
        handle.send_line("PING").unwrap();
        assert_eq!(*sent.lock(), vec!["PING".to_string()]);

        registry.unpublish("garden");
        assert!(registry.lookup("garden").is_none());
    }

    #[test]
    fn test_list_names_sorted() {
        let registry = DeviceRegistry::new();
        for name in ["pond", "attic", "garden"] {
            let (writer, _) = SharedWriter::new();
            registry.publish(name, DeviceHandle::new(Box::new(writer)));
        }
        assert_eq!(registry.list_names(), vec!["attic", "garden", "pond"]);
    }

    #[test]
    fn test_concurrent_churn_never_shows_stale_or_duplicate_names() {
        let registry = DeviceRegistry::new();
        let names = ["attic", "garden", "pond", "shed"];

        let workers: Vec<_> = names
            .iter()
            .map(|&name| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let (writer, _) = SharedWriter::new();
                        registry.publish(name, DeviceHandle::new(Box::new(writer)));
                        assert!(registry.lookup(name).is_some());
                        registry.unpublish(name);
                    }
                })
            })
            .collect();

        let observer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let listed = registry.list_names();
                    let mut deduped = listed.clone();
                    deduped.dedup();
                    assert_eq!(listed, deduped, "LIST snapshot contains duplicates");
                    for name in &listed {
                        assert!(names.contains(&name.as_str()));
                    }
                    // A handle observed in a snapshot stays usable even
                    // if its owner unpublishes it concurrently.
                    for name in &listed {
                        if let Some(handle) = registry.lookup(name) {
                            handle.send_line("PING").unwrap();
                        }
                    }
                }
            })
        };

        for worker in workers {
            worker.join().unwrap();
        }
        observer.join().unwrap();
    }

    #[test]
    fn test_republish_replaces_handle() {
        let registry = DeviceRegistry::new();
        let (first, first_sent) = SharedWriter::new();
        let (second, second_sent) = SharedWriter::new();
        registry.publish("garden", DeviceHandle::new(Box::new(first)));
        registry.publish("garden", DeviceHandle::new(Box::new(second)));

        registry.lookup("garden").unwrap().send_line("RESET").unwrap();
        assert!(first_sent.lock().is_empty());
        assert_eq!(*second_sent.lock(), vec!["RESET".to_string()]);
    }
}
