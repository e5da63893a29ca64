pub mod editor;
pub mod list;
pub mod registry;

pub use editor::{MoveDirection, PriorityListEditor};
pub use list::{DeviceList, ensure_unique_priorities};
pub use registry::{DeviceRegistry, RefreshOutcome};
