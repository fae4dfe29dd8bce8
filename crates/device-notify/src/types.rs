use core::fmt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{BridgeError, Result};

/// Stable name of a logical device across reconnects (ECID, serial or UDID).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentifier(String);

impl DeviceIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceIdentifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceIdentifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for DeviceIdentifier {
    fn from(ecid: u64) -> Self {
        Self(ecid.to_string())
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-specific state code as reported for a device handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawState(pub u32);

impl fmt::Display for RawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Connected,
    Disconnected,
}

impl NotificationKind {
    pub const CONNECTED_CODE: u32 = 1;
    pub const DISCONNECTED_CODE: u32 = 2;

    /// Map a raw backend notification code onto a kind.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            Self::CONNECTED_CODE => Ok(Self::Connected),
            Self::DISCONNECTED_CODE => Ok(Self::Disconnected),
            other => Err(BridgeError::MalformedEvent(other)),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Connected => Self::CONNECTED_CODE,
            Self::Disconnected => Self::DISCONNECTED_CODE,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Id of an active backend subscription. Always positive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RegistrationId(i64);

impl RegistrationId {
    pub fn new(raw: i64) -> Option<Self> {
        if raw > 0 {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }
}

/// Fields copied out of a [`DeviceHandle`](crate::DeviceHandle) while its callback ran.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandleSnapshot {
    pub identifier: DeviceIdentifier,
    /// Chip ECID, when the backend reports one separately from the identifier.
    pub ecid: Option<DeviceIdentifier>,
    pub raw_state: RawState,
    pub name: Option<String>,
    pub os_version: Option<String>,
    pub architecture: Option<String>,
}

/// A normalized attach/detach notification.
#[derive(Clone, Debug)]
pub struct DeviceEvent {
    pub kind: NotificationKind,
    pub handle: HandleSnapshot,
    pub timestamp: Timestamp,
}

impl DeviceEvent {
    pub fn identifier(&self) -> &DeviceIdentifier {
        &self.handle.identifier
    }
}

impl HandleSnapshot {
    /// The reported ECID, falling back to the identifier for devices keyed by ECID.
    pub fn ecid_or_identifier(&self) -> &DeviceIdentifier {
        self.ecid.as_ref().unwrap_or(&self.identifier)
    }
}
