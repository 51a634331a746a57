#![no_std]

#[macro_use]
mod log;

mod error;

pub mod bus;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod fifo;
pub mod interface;
pub mod kernel;
pub mod params;
pub mod platform;
pub mod registers;
pub mod signal;
mod variant;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::device::Accelerometer;
pub use crate::error::{BusError, Error, Phase, Result};
