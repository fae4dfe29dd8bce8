//! Devices in DFU, recovery or restore mode.
//!
//! A restorable device that has finished booting its OS belongs to the regular device
//! manager, so `BootedOS` is classified but never tracked here.

use device_notify::{DeviceIdentifier, HandleSnapshot};

use crate::category::{apply_handle, DeviceCategory, Target, TargetCell, TargetInfo, TargetKind};
use crate::state::{CanonicalState, StateEntry, StateTable};

pub mod raw {
    pub const DFU: u32 = 0;
    pub const RECOVERY: u32 = 1;
    pub const RESTORE_OS: u32 = 2;
    pub const BOOTED_OS: u32 = 4;
    pub const UNKNOWN: u32 = 5;
}

const ENTRIES: &[StateEntry] = &[
    StateEntry::tracked(raw::DFU, CanonicalState::Dfu),
    StateEntry::tracked(raw::RECOVERY, CanonicalState::Recovery),
    StateEntry::tracked(raw::RESTORE_OS, CanonicalState::RestoreOs),
    StateEntry::ignored(raw::BOOTED_OS, CanonicalState::BootedOs),
    StateEntry::ignored(raw::UNKNOWN, CanonicalState::Unknown),
];

pub static STATES: StateTable = StateTable::new("restorable", ENTRIES);

#[derive(Debug)]
pub struct RestorableDevice {
    ecid: DeviceIdentifier,
    cell: TargetCell,
}

impl RestorableDevice {
    pub fn ecid(&self) -> &DeviceIdentifier {
        &self.ecid
    }

    pub fn generation(&self) -> u64 {
        self.cell.generation()
    }
}

impl Target for RestorableDevice {
    fn info(&self) -> TargetInfo {
        self.cell.snapshot()
    }

    fn identifier(&self) -> DeviceIdentifier {
        self.ecid.clone()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RestorableDevices;

impl DeviceCategory for RestorableDevices {
    type Device = RestorableDevice;

    fn kind(&self) -> TargetKind {
        TargetKind::RestorableDevice
    }

    fn state_table(&self) -> &'static StateTable {
        &STATES
    }

    fn construct(
        &self,
        handle: &HandleSnapshot,
        identifier: &DeviceIdentifier,
        state: CanonicalState,
    ) -> RestorableDevice {
        let mut info = TargetInfo {
            identifier: identifier.clone(),
            name: format!("Restorable Device {identifier}"),
            kind: TargetKind::RestorableDevice,
            state,
            os_version: None,
            architecture: None,
        };
        apply_handle(&mut info, handle, state);
        RestorableDevice {
            ecid: identifier.clone(),
            cell: TargetCell::new(info),
        }
    }

    fn update(
        &self,
        existing: &RestorableDevice,
        handle: &HandleSnapshot,
        _identifier: &DeviceIdentifier,
        state: CanonicalState,
    ) {
        existing.cell.refresh(|info| apply_handle(info, handle, state));
    }
}
