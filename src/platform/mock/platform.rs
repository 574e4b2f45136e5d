//! Directly scriptable `Platform` implementation.

use std::collections::HashMap;

use crate::platform::{
    AdminFlags, Container, Duplex, Platform, PlatformError, SourceHandle,
};

struct MockContainer {
    class: String,
    module: String,
    instance: u32,
    name: String,
    fields: HashMap<String, u64>,
}

impl MockContainer {
    fn handle(&self) -> SourceHandle {
        SourceHandle::new(format!("{}:{}:{}", self.module, self.instance, self.name))
    }
}

/// Scriptable platform for core tests.
///
/// Containers are registered explicitly, so tests can build the overlapping
/// source topologies the resolver has to arbitrate, mutate counters between
/// polls, and advance the topology generation on demand.
#[derive(Default)]
pub struct MockPlatform {
    interfaces: Vec<String>,
    containers: Vec<MockContainer>,
    admin: HashMap<String, AdminFlags>,
    speed_duplex: HashMap<String, (u64, Duplex)>,
    boot_time: f64,
    generation: u64,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_boot_time(&mut self, epoch_secs: f64) {
        self.boot_time = epoch_secs;
    }

    /// Registers an interface name for discovery.
    pub fn add_interface(&mut self, name: &str) {
        if !self.interfaces.iter().any(|n| n == name) {
            self.interfaces.push(name.to_string());
        }
    }

    pub fn remove_interface(&mut self, name: &str) {
        self.interfaces.retain(|n| n != name);
    }

    /// Registers a counter container and returns its handle.
    pub fn add_container(
        &mut self,
        class: &str,
        module: &str,
        instance: u32,
        name: &str,
        fields: &[(&str, u64)],
    ) -> SourceHandle {
        let container = MockContainer {
            class: class.to_string(),
            module: module.to_string(),
            instance,
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        };
        let handle = container.handle();
        self.containers.push(container);
        handle
    }

    /// Updates (or adds) one field of an existing container.
    ///
    /// Panics if the handle is unknown; that is a test bug.
    pub fn set_field(&mut self, handle: &SourceHandle, field: &str, value: u64) {
        let container = self
            .containers
            .iter_mut()
            .find(|c| c.handle() == *handle)
            .expect("set_field: unknown container handle");
        container.fields.insert(field.to_string(), value);
    }

    pub fn set_admin_flags(&mut self, name: &str, up: bool, loopback: bool) {
        self.admin.insert(name.to_string(), AdminFlags { up, loopback });
    }

    pub fn set_speed_duplex(&mut self, name: &str, speed: u64, duplex: Duplex) {
        self.speed_duplex.insert(name.to_string(), (speed, duplex));
    }

    /// Signals that the counter namespace has been rebuilt.
    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }
}

impl Platform for MockPlatform {
    fn interfaces(&self) -> Result<Vec<String>, PlatformError> {
        Ok(self.interfaces.clone())
    }

    fn containers(&self, class: &str) -> Result<Vec<Container>, PlatformError> {
        Ok(self
            .containers
            .iter()
            .filter(|c| c.class == class)
            .map(|c| Container {
                class: c.class.clone(),
                module: c.module.clone(),
                instance: c.instance,
                name: c.name.clone(),
                handle: c.handle(),
            })
            .collect())
    }

    fn read_field(
        &self,
        handle: &SourceHandle,
        field: &str,
    ) -> Result<Option<u64>, PlatformError> {
        Ok(self
            .containers
            .iter()
            .find(|c| c.handle() == *handle)
            .and_then(|c| c.fields.get(field).copied()))
    }

    fn admin_flags(&self, name: &str) -> Result<Option<AdminFlags>, PlatformError> {
        Ok(self.admin.get(name).copied())
    }

    fn boot_time(&self) -> Result<f64, PlatformError> {
        Ok(self.boot_time)
    }

    fn link_speed_duplex(&self, name: &str) -> Result<Option<(u64, Duplex)>, PlatformError> {
        Ok(self.speed_duplex.get(name).copied())
    }

    fn topology_generation(&self) -> u64 {
        self.generation
    }
}
