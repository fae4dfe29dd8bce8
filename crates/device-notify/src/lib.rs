//! device-notify: bridge between OS device notifications and typed events
//!
//! Backends deliver attach/detach callbacks on a thread of their choosing, with a
//! device handle that is only valid while the callback runs. This crate copies
//! everything it needs out of that handle, normalizes the raw notification code and
//! hands an owned [`DeviceEvent`] to a caller-supplied sink. The default build enables
//! a `mock` backend so that binaries and tests run on any host.

mod types;
pub use types::{
    DeviceEvent, DeviceIdentifier, HandleSnapshot, NotificationKind, RawState, RegistrationId,
    Timestamp,
};

mod error;
pub use error::{BridgeError, Result};

mod traits;
pub use traits::{DeviceHandle, NotificationBackend, NotificationCallback};

mod bridge;
pub use bridge::{normalize, NotificationBridge};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBackend, MockDevice};
