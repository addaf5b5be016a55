//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`] and of the `embedded-hal` traits the
//! drivers consume.
//!
//! # Available Implementations
//!
//! - `mock`: Simulated sensors, pins and time for tests and `--simulate`
//! - `host`: Real clock and blocking delay for a desktop/Linux host
//! - `rpi`: Raspberry Pi SPI bus and GPIO (requires `rpi` feature)

pub mod host;
pub mod mock;

#[cfg(feature = "rpi")]
pub mod rpi;

pub use host::*;
pub use mock::*;

#[cfg(feature = "rpi")]
pub use rpi::*;
