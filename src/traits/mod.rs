//! Trait definitions for the hardware and collaborator seams.
//!
//! # Submodules
//!
//! - `hardware`: actuator output and clock
//! - `plot`: live plot consumer
//!
//! Sensor access goes through `embedded_hal::spi::SpiDevice` and inter-poll
//! waits through `embedded_hal::delay::DelayNs`, so any `embedded-hal` 1.0
//! platform plugs in without extra traits.

pub mod hardware;
pub mod plot;

pub use hardware::*;
pub use plot::*;
