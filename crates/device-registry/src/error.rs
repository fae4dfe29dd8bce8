use device_notify::{BridgeError, DeviceIdentifier};
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("failed to start listening for device notifications: {0}")]
    RegistrationFailure(#[source] BridgeError),
    #[error("not listening for device notifications")]
    NoActiveSubscription,
    #[error("no device with identifier {0}")]
    NotFound(DeviceIdentifier),
    #[error("device manager is no longer running")]
    ManagerClosed,
    #[error("device manager must be created inside a Tokio runtime")]
    NoRuntime,
}
