use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    DeviceHandle, DeviceIdentifier, NotificationBackend, NotificationCallback, NotificationKind,
    RawState,
};

type SharedCallback = Arc<dyn Fn(&dyn DeviceHandle, u32) + Send + Sync>;

/// A device as seen by [`MockBackend`]. Doubles as the handle passed to callbacks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MockDevice {
    pub identifier: DeviceIdentifier,
    pub ecid: Option<DeviceIdentifier>,
    pub raw_state: RawState,
    pub name: Option<String>,
    pub os_version: Option<String>,
    pub architecture: Option<String>,
}

impl MockDevice {
    pub fn new(identifier: impl Into<DeviceIdentifier>, raw_state: RawState) -> Self {
        Self {
            identifier: identifier.into(),
            ecid: None,
            raw_state,
            name: None,
            os_version: None,
            architecture: None,
        }
    }

    pub fn with_ecid(mut self, ecid: impl Into<DeviceIdentifier>) -> Self {
        self.ecid = Some(ecid.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_os_version(mut self, version: impl Into<String>) -> Self {
        self.os_version = Some(version.into());
        self
    }

    pub fn with_architecture(mut self, arch: impl Into<String>) -> Self {
        self.architecture = Some(arch.into());
        self
    }
}

impl DeviceHandle for MockDevice {
    fn raw_state(&self) -> RawState {
        self.raw_state
    }

    fn identifier(&self) -> DeviceIdentifier {
        self.identifier.clone()
    }

    fn ecid(&self) -> Option<DeviceIdentifier> {
        self.ecid.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn os_version(&self) -> Option<String> {
        self.os_version.clone()
    }

    fn architecture(&self) -> Option<String> {
        self.architecture.clone()
    }
}

struct MockState {
    next_id: i64,
    fail_with: Option<i64>,
    callbacks: BTreeMap<i64, SharedCallback>,
    attached: BTreeMap<DeviceIdentifier, MockDevice>,
    unregister_calls: Vec<i64>,
}

/// In-process notification backend. Callbacks run synchronously on the thread that
/// calls [`attach`](Self::attach), [`detach`](Self::detach) or [`emit`](Self::emit).
pub struct MockBackend {
    name: String,
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_registration_id(1)
    }

    /// Registrations are numbered starting at `first_id`.
    pub fn with_registration_id(first_id: i64) -> Self {
        Self {
            name: "mock".to_string(),
            state: Mutex::new(MockState {
                next_id: first_id,
                fail_with: None,
                callbacks: BTreeMap::new(),
                attached: BTreeMap::new(),
                unregister_calls: Vec::new(),
            }),
        }
    }

    /// Every `register` call returns `code` and installs nothing.
    pub fn failing(code: i64) -> Self {
        let backend = Self::new();
        backend.state().fail_with = Some(code);
        backend
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach (or re-attach) a device and notify every subscriber.
    pub fn attach(&self, device: MockDevice) {
        self.state()
            .attached
            .insert(device.identifier.clone(), device.clone());
        self.emit(&device, NotificationKind::CONNECTED_CODE);
    }

    /// Detach a device. Subscribers see its last known state.
    pub fn detach(&self, identifier: &DeviceIdentifier) -> Option<MockDevice> {
        let device = self.state().attached.remove(identifier)?;
        self.emit(&device, NotificationKind::DISCONNECTED_CODE);
        Some(device)
    }

    /// Deliver a raw notification code for `device` to every subscriber.
    pub fn emit(&self, device: &MockDevice, code: u32) {
        let callbacks: Vec<SharedCallback> = self.state().callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(device, code);
        }
    }

    pub fn attached(&self) -> Vec<MockDevice> {
        self.state().attached.values().cloned().collect()
    }

    pub fn active_registrations(&self) -> usize {
        self.state().callbacks.len()
    }

    pub fn unregister_calls(&self) -> Vec<i64> {
        self.state().unregister_calls.clone()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NotificationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, callback: NotificationCallback, _flags: u32) -> i64 {
        let callback: SharedCallback = Arc::from(callback);
        let (id, attached) = {
            let mut state = self.state();
            if let Some(code) = state.fail_with {
                return code;
            }
            let id = state.next_id;
            state.next_id += 1;
            state.callbacks.insert(id, callback.clone());
            (id, state.attached.values().cloned().collect::<Vec<_>>())
        };
        // Devices already attached are reported to the new subscriber before returning.
        for device in &attached {
            callback(device, NotificationKind::CONNECTED_CODE);
        }
        id
    }

    fn unregister(&self, registration: i64) -> i32 {
        let mut state = self.state();
        state.unregister_calls.push(registration);
        match state.callbacks.remove(&registration) {
            Some(_) => 0,
            None => -1,
        }
    }
}
