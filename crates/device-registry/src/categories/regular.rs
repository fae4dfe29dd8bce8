//! Devices that have booted a full OS and are reachable over the usual services.

use device_notify::{DeviceIdentifier, HandleSnapshot};

use crate::category::{apply_handle, DeviceCategory, Target, TargetCell, TargetInfo, TargetKind};
use crate::state::{CanonicalState, StateEntry, StateTable};

pub mod raw {
    pub const UNKNOWN: u32 = 0;
    pub const CONNECTING: u32 = 1;
    pub const BOOTING: u32 = 2;
    pub const BOOTED: u32 = 3;
    pub const RESTORE_MODE: u32 = 4;
}

const ENTRIES: &[StateEntry] = &[
    StateEntry::ignored(raw::UNKNOWN, CanonicalState::Unknown),
    StateEntry::tracked(raw::CONNECTING, CanonicalState::Connecting),
    StateEntry::tracked(raw::BOOTING, CanonicalState::Booting),
    StateEntry::tracked(raw::BOOTED, CanonicalState::Booted),
    // Restore mode is owned by the restorable device manager.
    StateEntry::ignored(raw::RESTORE_MODE, CanonicalState::Recovery),
];

pub static STATES: StateTable = StateTable::new("regular", ENTRIES);

#[derive(Debug)]
pub struct PhysicalDevice {
    udid: DeviceIdentifier,
    cell: TargetCell,
}

impl PhysicalDevice {
    pub fn udid(&self) -> &DeviceIdentifier {
        &self.udid
    }

    pub fn generation(&self) -> u64 {
        self.cell.generation()
    }
}

impl Target for PhysicalDevice {
    fn info(&self) -> TargetInfo {
        self.cell.snapshot()
    }

    fn identifier(&self) -> DeviceIdentifier {
        self.udid.clone()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegularDevices;

impl DeviceCategory for RegularDevices {
    type Device = PhysicalDevice;

    fn kind(&self) -> TargetKind {
        TargetKind::Device
    }

    fn state_table(&self) -> &'static StateTable {
        &STATES
    }

    fn construct(
        &self,
        handle: &HandleSnapshot,
        identifier: &DeviceIdentifier,
        state: CanonicalState,
    ) -> PhysicalDevice {
        let mut info = TargetInfo {
            identifier: identifier.clone(),
            name: identifier.to_string(),
            kind: TargetKind::Device,
            state,
            os_version: None,
            architecture: None,
        };
        apply_handle(&mut info, handle, state);
        PhysicalDevice {
            udid: identifier.clone(),
            cell: TargetCell::new(info),
        }
    }

    fn update(
        &self,
        existing: &PhysicalDevice,
        handle: &HandleSnapshot,
        _identifier: &DeviceIdentifier,
        state: CanonicalState,
    ) {
        existing.cell.refresh(|info| apply_handle(info, handle, state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_notify::RawState;

    fn snapshot(name: Option<&str>, os: Option<&str>) -> HandleSnapshot {
        HandleSnapshot {
            identifier: DeviceIdentifier::from("00008030-001A"),
            ecid: None,
            raw_state: RawState(raw::BOOTED),
            name: name.map(str::to_string),
            os_version: os.map(str::to_string),
            architecture: None,
        }
    }

    #[test]
    fn test_restore_mode_is_not_tracked() {
        let c = RegularDevices.classify(RawState(raw::RESTORE_MODE));
        assert!(!c.trackable);
        assert!(RegularDevices.classify(RawState(raw::BOOTING)).trackable);
    }

    #[test]
    fn test_update_keeps_fields_missing_from_new_handle() {
        let id = DeviceIdentifier::from("00008030-001A");
        let device = RegularDevices.construct(
            &snapshot(Some("Lab iPhone"), Some("17.4")),
            &id,
            CanonicalState::Booting,
        );
        RegularDevices.update(&device, &snapshot(None, None), &id, CanonicalState::Booted);

        let info = device.info();
        assert_eq!(info.name, "Lab iPhone");
        assert_eq!(info.os_version.as_deref(), Some("17.4"));
        assert_eq!(info.state, CanonicalState::Booted);
        assert_eq!(device.generation(), 2);
    }
}
