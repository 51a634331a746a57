//! I2C interface implementation routed through the shared bus arbiter.

use crate::bus::{Address, BusArbiter, DeviceClient, ErrorCounts, I2cPeripheral};
use crate::error::BusError;
use crate::kernel::Kernel;

use super::AccelInterface;

/// Addresses the supported parts answer on, tried in this order.
pub const CANDIDATE_ADDRESSES: [u8; 4] = [0b001_1000, 0b001_1001, 0b001_1110, 0b001_1101];

/// Default wait for the bus lock per transfer.
pub const DEFAULT_LOCK_TIMEOUT_MS: u32 = 25;

const AUTO_INCREMENT_FLAG: u8 = 0x80;

/// I2C-based interface implementation for the accelerometer driver.
pub struct I2cInterface<'a, H, K: Kernel> {
    client: DeviceClient<'a, H, K>,
    lock_timeout_ms: u32,
}

impl<'a, H: I2cPeripheral, K: Kernel> I2cInterface<'a, H, K> {
    /// Creates an interface on `bus` aimed at the first candidate address.
    pub fn new(bus: &'a BusArbiter<H, K>) -> Self {
        Self {
            client: DeviceClient::new(bus, CANDIDATE_ADDRESSES[0]),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Overrides the bus lock wait.
    pub fn with_lock_timeout(mut self, ms: u32) -> Self {
        self.lock_timeout_ms = ms;
        self
    }

    /// Address transfers currently go to.
    pub fn address(&self) -> Address {
        self.client.address()
    }

    fn command_byte(register: u8, auto_increment: bool) -> u8 {
        if auto_increment {
            register | AUTO_INCREMENT_FLAG
        } else {
            register
        }
    }
}

impl<H: I2cPeripheral, K: Kernel> AccelInterface for I2cInterface<'_, H, K> {
    type Error = BusError;

    fn read_registers(
        &mut self,
        register: u8,
        auto_increment: bool,
        buf: &mut [u8],
    ) -> core::result::Result<(), Self::Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let command = Self::command_byte(register, auto_increment);
        self.client.transfer(Some(command), &[], buf, self.lock_timeout_ms)
    }

    fn write_registers(
        &mut self,
        register: u8,
        auto_increment: bool,
        data: &[u8],
    ) -> core::result::Result<(), Self::Error> {
        if data.is_empty() {
            return Ok(());
        }
        let command = Self::command_byte(register, auto_increment);
        self.client.transfer(Some(command), data, &mut [], self.lock_timeout_ms)
    }

    fn probe_candidates(&self) -> usize {
        CANDIDATE_ADDRESSES.len()
    }

    fn select_candidate(&mut self, index: usize) {
        if let Some(&address) = CANDIDATE_ADDRESSES.get(index) {
            self.client.set_address(address);
        }
    }

    fn bus_error_counts(&self) -> Option<ErrorCounts> {
        Some(self.client.bus().error_counts(false))
    }
}
