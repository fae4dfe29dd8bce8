//! Built-in device categories. Each one supplies a state table and the
//! construct/update hooks for its public device type.

pub mod regular;
pub mod restorable;
pub mod simulator;

pub use regular::{PhysicalDevice, RegularDevices};
pub use restorable::{RestorableDevice, RestorableDevices};
pub use simulator::{Simulator, Simulators};
