//! Per-device handle onto a shared bus.

use crate::bus::arbiter::{BusArbiter, Transaction};
use crate::bus::{Address, I2cPeripheral};
use crate::error::BusError;
use crate::kernel::Kernel;

/// A device address bound to the arbiter of the bus it sits on.
///
/// Each transfer takes the bus lock, runs one transaction and releases the lock.
pub struct DeviceClient<'a, H, K: Kernel> {
    bus: &'a BusArbiter<H, K>,
    address: Address,
}

impl<'a, H: I2cPeripheral, K: Kernel> DeviceClient<'a, H, K> {
    /// Binds `address` to `bus`.
    pub fn new(bus: &'a BusArbiter<H, K>, address: impl Into<Address>) -> Self {
        Self {
            bus,
            address: address.into(),
        }
    }

    /// Current target address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Retargets later transfers, used while probing candidate addresses.
    pub fn set_address(&mut self, address: impl Into<Address>) {
        self.address = address.into();
    }

    /// Arbiter this client talks through.
    pub fn bus(&self) -> &'a BusArbiter<H, K> {
        self.bus
    }

    /// Sends `first_byte` and `write`, then fills `read`, under the bus lock.
    ///
    /// Fails with [`BusError::LockTimeout`] when the lock is not obtained within `timeout_ms`.
    pub fn transfer(
        &mut self,
        first_byte: Option<u8>,
        write: &[u8],
        read: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), BusError> {
        let mut guard = self.bus.acquire(timeout_ms).ok_or(BusError::LockTimeout)?;
        let result = guard.execute(Transaction {
            address: self.address,
            first_byte,
            write,
            read,
        });
        guard.release();
        result
    }
}
