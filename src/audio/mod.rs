#[cfg(target_os = "macos")]
pub mod coreaudio;
pub mod device;

#[cfg(target_os = "macos")]
pub use coreaudio::CoreAudioSystem;
pub use device::{Device, DeviceKey, DeviceSnapshot, Direction, KeyboardShortcut, Modifier};
