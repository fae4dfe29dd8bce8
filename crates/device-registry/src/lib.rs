//! device-registry: live catalog of devices built from attach/detach notifications
//!
//! [`DeviceManager`] is the engine: it owns a backend registration, classifies each
//! notification through its category's [`StateTable`], and keeps one record per
//! identifier. Device categories plug in through [`DeviceCategory`]. Consumers resolve
//! identifiers with [`TargetProvider`] or follow changes with [`Subscription`].

mod error;
pub use error::{RegistryError, Result};

pub mod state;
pub use state::{classify, CanonicalState, Classification, StateEntry, StateTable};

mod category;
pub use category::{DeviceCategory, Target, TargetCell, TargetInfo, TargetKind};

pub mod categories;
pub use categories::{
    PhysicalDevice, RegularDevices, RestorableDevice, RestorableDevices, Simulator, Simulators,
};

mod manager;
pub use manager::{DeviceManager, DeviceRecord, ManagerConfig, RegistrationHandle};

mod provider;
pub use provider::{ChangeEvent, ChangeKind, Subscription, TargetProvider, TargetSet};

mod notifier;
pub use notifier::{format_change, NotifySink, StateChangeNotifier};

mod loader;
pub use loader::{
    load_config_file, load_script_file, CategoryKind, CompanionConfig, NotifyConfig, ReplayStep,
};

mod metrics;
pub use metrics::{MetricsHub, RegistryMetrics};

pub use device_notify::{DeviceIdentifier, RawState};
