//! The seam between the shared lifecycle engine and per-category device types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use device_notify::{DeviceIdentifier, HandleSnapshot, RawState};
use serde::{Deserialize, Serialize};

use crate::state::{CanonicalState, Classification, StateTable};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Device,
    RestorableDevice,
    Simulator,
}

/// Point-in-time description of a tracked target.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub identifier: DeviceIdentifier,
    pub name: String,
    pub kind: TargetKind,
    pub state: CanonicalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

/// A live device as exposed to the rest of the companion.
pub trait Target: Send + Sync {
    fn info(&self) -> TargetInfo;

    fn identifier(&self) -> DeviceIdentifier {
        self.info().identifier
    }

    fn kind(&self) -> TargetKind {
        self.info().kind
    }

    fn state(&self) -> CanonicalState {
        self.info().state
    }
}

/// Per-category hooks used by [`DeviceManager`](crate::DeviceManager).
///
/// `construct` is called on the first trackable connect for an identifier. Later
/// connects for the same identifier go through `update` with the instance returned
/// by `construct`, so the device must refresh itself in place.
pub trait DeviceCategory: Send + Sync + 'static {
    type Device: Target + 'static;

    fn kind(&self) -> TargetKind;

    fn state_table(&self) -> &'static StateTable;

    fn classify(&self, raw: RawState) -> Classification {
        self.state_table().classify(raw)
    }

    /// Whether devices of this category carry an ECID that an ECID filter can match.
    fn has_ecid(&self) -> bool {
        true
    }

    fn construct(
        &self,
        handle: &HandleSnapshot,
        identifier: &DeviceIdentifier,
        state: CanonicalState,
    ) -> Self::Device;

    fn update(
        &self,
        existing: &Self::Device,
        handle: &HandleSnapshot,
        identifier: &DeviceIdentifier,
        state: CanonicalState,
    );
}

/// Interior-mutable [`TargetInfo`] shared by the built-in device types.
#[derive(Debug)]
pub struct TargetCell {
    info: RwLock<TargetInfo>,
    generation: AtomicU64,
}

impl TargetCell {
    pub fn new(info: TargetInfo) -> Self {
        Self {
            info: RwLock::new(info),
            generation: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> TargetInfo {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn refresh(&self, f: impl FnOnce(&mut TargetInfo)) {
        let mut info = self.info.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut info);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of handles this cell has been built or refreshed from.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

/// Fill `info` from a handle, keeping previous values where the handle has none.
pub(crate) fn apply_handle(info: &mut TargetInfo, handle: &HandleSnapshot, state: CanonicalState) {
    info.state = state;
    if let Some(name) = &handle.name {
        info.name = name.clone();
    }
    if handle.os_version.is_some() {
        info.os_version = handle.os_version.clone();
    }
    if handle.architecture.is_some() {
        info.architecture = handle.architecture.clone();
    }
}
