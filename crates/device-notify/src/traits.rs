use crate::{DeviceIdentifier, RawState};

/// A backend device reference.
///
/// Implementations are borrowed for the duration of a single callback and must not be
/// retained; read what is needed before the callback returns.
pub trait DeviceHandle {
    /// Current backend-specific state code.
    fn raw_state(&self) -> RawState;

    /// Stable identifier (ECID, serial or UDID) of the device behind the handle.
    fn identifier(&self) -> DeviceIdentifier;

    /// Chip ECID, for backends that key devices by something else.
    fn ecid(&self) -> Option<DeviceIdentifier> {
        None
    }

    fn name(&self) -> Option<String> {
        None
    }

    fn os_version(&self) -> Option<String> {
        None
    }

    fn architecture(&self) -> Option<String> {
        None
    }
}

/// Callback installed with the backend. Receives the handle and the raw notification code.
pub type NotificationCallback = Box<dyn Fn(&dyn DeviceHandle, u32) + Send + Sync>;

/// The OS-level notification facility.
///
/// Both calls are synchronous and may block. They must not be issued from inside a
/// notification callback.
pub trait NotificationBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Subscribe to attach/detach notifications. A positive return value is the
    /// registration id; anything else means the subscription was not established.
    fn register(&self, callback: NotificationCallback, flags: u32) -> i64;

    /// Drop a subscription. The return code is not meaningful on every backend.
    fn unregister(&self, registration: i64) -> i32;
}
