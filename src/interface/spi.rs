//! SPI interface implementation built on top of `embedded-hal` `SpiDevice`.

use embedded_hal::spi::{Operation, SpiDevice};

use super::AccelInterface;

const READ_FLAG: u8 = 0x80;
const AUTO_INCREMENT_FLAG: u8 = 0x40;

/// SPI-based interface implementation for the accelerometer driver.
pub struct SpiInterface<SPI> {
    spi: SPI,
}

impl<SPI> SpiInterface<SPI> {
    /// Creates a new interface from the provided SPI device abstraction.
    pub const fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Builds the command byte: read flag in bit 7, auto-increment in bit 6.
    fn command_byte(register: u8, is_read: bool, auto_increment: bool) -> u8 {
        let mut command = register & 0x7F;
        if is_read {
            command |= READ_FLAG;
        }
        if auto_increment {
            command |= AUTO_INCREMENT_FLAG;
        }
        command
    }

    /// Provides mutable access to the wrapped SPI device.
    pub fn spi_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }

    /// Consumes the interface and returns the owned SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> AccelInterface for SpiInterface<SPI>
where
    SPI: SpiDevice,
{
    type Error = SPI::Error;

    fn read_registers(
        &mut self,
        register: u8,
        auto_increment: bool,
        buf: &mut [u8],
    ) -> core::result::Result<(), Self::Error> {
        if buf.is_empty() {
            return Ok(());
        }

        let command = [Self::command_byte(register, true, auto_increment)];
        let mut operations = [Operation::Write(&command), Operation::Read(buf)];
        self.spi.transaction(&mut operations)
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

        let command = [Self::command_byte(register, false, auto_increment)];
        let mut operations = [Operation::Write(&command), Operation::Write(data)];
        self.spi.transaction(&mut operations)
    }
}
