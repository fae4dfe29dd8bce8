//! Simulators reported by the simulator service. Every known simulator state is
//! tracked; only unknown codes are ignored.

use device_notify::{DeviceIdentifier, HandleSnapshot};
use tracing::warn;
use uuid::Uuid;

use crate::category::{apply_handle, DeviceCategory, Target, TargetCell, TargetInfo, TargetKind};
use crate::state::{CanonicalState, StateEntry, StateTable};

pub mod raw {
    pub const CREATING: u32 = 0;
    pub const SHUTDOWN: u32 = 1;
    pub const BOOTING: u32 = 2;
    pub const BOOTED: u32 = 3;
    pub const SHUTTING_DOWN: u32 = 4;
}

const ENTRIES: &[StateEntry] = &[
    StateEntry::tracked(raw::CREATING, CanonicalState::Creating),
    StateEntry::tracked(raw::SHUTDOWN, CanonicalState::Shutdown),
    StateEntry::tracked(raw::BOOTING, CanonicalState::Booting),
    StateEntry::tracked(raw::BOOTED, CanonicalState::Booted),
    StateEntry::tracked(raw::SHUTTING_DOWN, CanonicalState::ShuttingDown),
];

pub static STATES: StateTable = StateTable::new("simulator", ENTRIES);

#[derive(Debug)]
pub struct Simulator {
    udid: DeviceIdentifier,
    uuid: Option<Uuid>,
    cell: TargetCell,
}

impl Simulator {
    /// The UDID parsed as a UUID, when it is one.
    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn generation(&self) -> u64 {
        self.cell.generation()
    }
}

impl Target for Simulator {
    fn info(&self) -> TargetInfo {
        self.cell.snapshot()
    }

    fn identifier(&self) -> DeviceIdentifier {
        self.udid.clone()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Simulators;

impl DeviceCategory for Simulators {
    type Device = Simulator;

    fn kind(&self) -> TargetKind {
        TargetKind::Simulator
    }

    fn state_table(&self) -> &'static StateTable {
        &STATES
    }

    fn has_ecid(&self) -> bool {
        false
    }

    fn construct(
        &self,
        handle: &HandleSnapshot,
        identifier: &DeviceIdentifier,
        state: CanonicalState,
    ) -> Simulator {
        let uuid = Uuid::parse_str(identifier.as_str()).ok();
        if uuid.is_none() {
            warn!(udid = %identifier, "simulator udid is not a uuid");
        }
        let mut info = TargetInfo {
            identifier: identifier.clone(),
            name: "Simulator".to_string(),
            kind: TargetKind::Simulator,
            state,
            os_version: None,
            architecture: None,
        };
        apply_handle(&mut info, handle, state);
        Simulator {
            udid: identifier.clone(),
            uuid,
            cell: TargetCell::new(info),
        }
    }

    fn update(
        &self,
        existing: &Simulator,
        handle: &HandleSnapshot,
        _identifier: &DeviceIdentifier,
        state: CanonicalState,
    ) {
        existing.cell.refresh(|info| apply_handle(info, handle, state));
    }
}
