//! Seams to the outside world: audio hardware, byte storage, time and files.

pub mod adapters;
pub mod traits;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

pub use adapters::*;
pub use traits::*;

#[cfg(any(test, feature = "test-mocks"))]
pub use mocks::*;
