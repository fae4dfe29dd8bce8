use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    BridgeError, DeviceEvent, DeviceHandle, HandleSnapshot, NotificationBackend,
    NotificationCallback, NotificationKind, RegistrationId, Result, Timestamp,
};

/// Wraps a [`NotificationBackend`] and turns its callbacks into [`DeviceEvent`]s.
#[derive(Clone)]
pub struct NotificationBridge {
    backend: Arc<dyn NotificationBackend>,
}

impl NotificationBridge {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Register with the backend. Every well-formed notification is passed to `deliver`
    /// on the backend's callback thread; `deliver` should only enqueue.
    pub fn register<F>(&self, deliver: F) -> Result<RegistrationId>
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        let backend = self.backend.name().to_string();
        let callback: NotificationCallback = Box::new(move |handle: &dyn DeviceHandle, code: u32| {
            match normalize(handle, code) {
                Ok(event) => deliver(event),
                Err(e) => {
                    warn!(backend = %backend, code, "dropping notification: {e}");
                }
            }
        });
        let raw = self.backend.register(callback, 0);
        match RegistrationId::new(raw) {
            Some(id) => {
                debug!(backend = self.backend.name(), id = id.raw(), "registered");
                Ok(id)
            }
            None => Err(BridgeError::RegistrationFailed(raw)),
        }
    }

    /// Ask the backend to drop `id`. The backend's return code is not trusted, so this
    /// never fails once issued.
    pub fn unregister(&self, id: RegistrationId) {
        let code = self.backend.unregister(id.raw());
        debug!(
            backend = self.backend.name(),
            id = id.raw(),
            code,
            "unregistered (return code ignored)"
        );
    }
}

/// Copy the handle's fields and classify the notification code. Must be called before
/// the callback that received `handle` returns.
pub fn normalize(handle: &dyn DeviceHandle, code: u32) -> Result<DeviceEvent> {
    let kind = NotificationKind::from_code(code)?;
    let snapshot = HandleSnapshot {
        identifier: handle.identifier(),
        ecid: handle.ecid(),
        raw_state: handle.raw_state(),
        name: handle.name(),
        os_version: handle.os_version(),
        architecture: handle.architecture(),
    };
    Ok(DeviceEvent {
        kind,
        handle: snapshot,
        timestamp: Timestamp::now(),
    })
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::{DeviceIdentifier, MockBackend, MockDevice, RawState};
    use std::sync::Mutex;

    #[test]
    fn test_normalize_copies_handle_fields() {
        let device = MockDevice::new("1000", RawState(2))
            .with_name("iPhone")
            .with_os_version("17.4");
        let event = normalize(&device, NotificationKind::CONNECTED_CODE).unwrap();
        assert_eq!(event.kind, NotificationKind::Connected);
        assert_eq!(event.identifier(), &DeviceIdentifier::from("1000"));
        assert_eq!(event.handle.raw_state, RawState(2));
        assert_eq!(event.handle.name.as_deref(), Some("iPhone"));
        assert_eq!(event.handle.os_version.as_deref(), Some("17.4"));
        assert_eq!(event.handle.ecid, None);
        assert_eq!(event.handle.ecid_or_identifier(), &DeviceIdentifier::from("1000"));
    }

    #[test]
    fn test_normalize_copies_ecid() {
        let device = MockDevice::new("00008030-001A", RawState(3)).with_ecid("1234");
        let event = normalize(&device, NotificationKind::CONNECTED_CODE).unwrap();
        assert_eq!(event.identifier(), &DeviceIdentifier::from("00008030-001A"));
        assert_eq!(event.handle.ecid, Some(DeviceIdentifier::from("1234")));
        assert_eq!(event.handle.ecid_or_identifier(), &DeviceIdentifier::from("1234"));
    }

    #[test]
    fn test_normalize_rejects_unknown_code() {
        let device = MockDevice::new("1000", RawState(2));
        let err = normalize(&device, 3).unwrap_err();
        assert_eq!(err, BridgeError::MalformedEvent(3));
    }

    #[test]
    fn test_register_returns_backend_id() -> anyhow::Result<()> {
        let backend = Arc::new(MockBackend::with_registration_id(5));
        let bridge = NotificationBridge::new(backend.clone());
        let id = bridge.register(|_| {})?;
        assert_eq!(id.raw(), 5);
        assert_eq!(backend.active_registrations(), 1);
        Ok(())
    }

    #[test]
    fn test_register_rejects_non_positive_id() {
        for code in [0, -1] {
            let bridge = NotificationBridge::new(Arc::new(MockBackend::failing(code)));
            let err = bridge.register(|_| {}).unwrap_err();
            assert_eq!(err, BridgeError::RegistrationFailed(code));
        }
    }

    #[test]
    fn test_malformed_notifications_are_dropped() {
        let backend = Arc::new(MockBackend::new());
        let bridge = NotificationBridge::new(backend.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bridge
            .register(move |event| sink.lock().unwrap().push(event.kind))
            .unwrap();

        let device = MockDevice::new("1000", RawState(2));
        backend.emit(&device, 99);
        backend.emit(&device, NotificationKind::CONNECTED_CODE);
        backend.emit(&device, NotificationKind::DISCONNECTED_CODE);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![NotificationKind::Connected, NotificationKind::Disconnected]
        );
    }

    #[test]
    fn test_unregister_ignores_return_code() {
        let backend = Arc::new(MockBackend::new());
        let bridge = NotificationBridge::new(backend.clone());
        let id = bridge.register(|_| {}).unwrap();
        bridge.unregister(id);
        assert_eq!(backend.active_registrations(), 0);
        assert_eq!(backend.unregister_calls(), vec![id.raw()]);
    }
}
