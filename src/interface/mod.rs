//! Bus interface abstraction for the accelerometer driver.

use crate::bus::ErrorCounts;

pub mod i2c;
pub mod spi;

/// Abstraction over the register access required by the driver.
pub trait AccelInterface {
    /// Error type produced by the concrete bus implementation.
    type Error;

    /// Reads consecutive registers starting at `register` into `buf`.
    ///
    /// `auto_increment` requests the address auto-increment flag in the command byte.
    fn read_registers(
        &mut self,
        register: u8,
        auto_increment: bool,
        buf: &mut [u8],
    ) -> core::result::Result<(), Self::Error>;

    /// Writes `data` to consecutive registers starting at `register`.
    fn write_registers(
        &mut self,
        register: u8,
        auto_increment: bool,
        data: &[u8],
    ) -> core::result::Result<(), Self::Error>;

    /// Number of bus addresses the part may answer on.
    fn probe_candidates(&self) -> usize {
        1
    }

    /// Points later transfers at candidate `index`.
    fn select_candidate(&mut self, index: usize) {
        let _ = index;
    }

    /// Failure statistics of the underlying bus, where it keeps any.
    fn bus_error_counts(&self) -> Option<ErrorCounts> {
        None
    }
}
