//! Shared serial register bus: hardware contract, arbiter and per-device client.

#![allow(unused_parens)]

use modular_bitfield::prelude::*;

pub mod arbiter;
pub mod client;

pub use arbiter::{ArbiterConfig, ArbiterState, BusArbiter, ErrorCounts, Transaction};
pub use client::DeviceClient;

/// Target address on an addressed packet bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// Standard 7-bit address.
    SevenBit(u8),
    /// Extended 10-bit address.
    TenBit(u16),
}

impl Address {
    /// Returns `true` for 10-bit addresses.
    pub const fn is_ten_bit(self) -> bool {
        matches!(self, Self::TenBit(_))
    }

    /// Address field with the direction bit in bit 0.
    pub const fn field(self, read: bool) -> u16 {
        let raw = match self {
            Self::SevenBit(addr) => (addr & 0x7F) as u16,
            Self::TenBit(addr) => addr & 0x03FF,
        };
        (raw << 1) | read as u16
    }

    /// Repeated-start header that turns a 10-bit write addressing into a read.
    pub const fn ten_bit_read_header(self) -> u16 {
        match self {
            Self::SevenBit(addr) => ((addr & 0x7F) as u16) << 1 | 1,
            Self::TenBit(addr) => 0xF0 | ((addr >> 7) & 0x06) | 1,
        }
    }
}

impl From<u8> for Address {
    fn from(value: u8) -> Self {
        Self::SevenBit(value)
    }
}

/// Bus ownership state reported by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Specifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bits = 2]
pub enum BusState {
    /// State not yet determined after enable or reset.
    Unknown = 0b00,
    /// No transfer on the wire.
    Idle = 0b01,
    /// This controller owns the bus.
    Owner = 0b10,
    /// Another controller owns the bus.
    Busy = 0b11,
}

/// Snapshot of the peripheral interrupt flags and bus state.
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStatus {
    // Address or data byte sent, acknowledge received (bit 0).
    pub master_on_bus: bool,
    // Data byte received (bit 1).
    pub slave_on_bus: bool,
    // Last byte was not acknowledged (bit 2).
    pub rx_nack: bool,
    // Misplaced start/stop detected (bit 3).
    pub bus_error: bool,
    // Arbitration lost to another controller (bit 4).
    pub arbitration_lost: bool,
    // Bus ownership state (bits 6:5).
    pub bus_state: BusState,
    // SCL held low beyond the hardware limit (bit 7).
    pub low_timeout: bool,
}

impl From<u8> for BusStatus {
    fn from(value: u8) -> Self {
        Self::from_bytes([value])
    }
}

impl From<BusStatus> for u8 {
    fn from(value: BusStatus) -> Self {
        value.into_bytes()[0]
    }
}

impl BusStatus {
    /// Returns `true` when the peripheral flagged a condition no transfer can continue from.
    pub fn is_fault(self) -> bool {
        self.bus_error() || self.arbitration_lost() || self.low_timeout()
    }
}

/// Register-level contract of one addressed packet bus peripheral.
///
/// Every call returns immediately; progress is reported through the
/// peripheral interrupt, which must end up in [`BusArbiter::on_interrupt`].
pub trait I2cPeripheral {
    /// Issues a start (or repeated start) followed by an address field whose bit 0 is the direction.
    fn send_address(&mut self, field: u16, ten_bit: bool);

    /// Sends one data byte.
    fn write_data(&mut self, byte: u8);

    /// Takes the received byte, acknowledging it unless `last`, in which case a stop follows.
    fn read_data(&mut self, last: bool) -> u8;

    /// Issues a stop condition.
    fn stop(&mut self);

    /// Returns the current interrupt flags and bus state.
    fn status(&mut self) -> BusStatus;

    /// Enables or disables the transfer interrupts.
    fn set_interrupts(&mut self, enabled: bool);

    /// Resets the peripheral and forces the bus state back to idle.
    fn reset(&mut self);

    /// Programs the SCL frequency.
    fn set_clock_frequency(&mut self, hz: u32);
}
