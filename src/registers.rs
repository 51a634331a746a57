//! Register map shared by the LIS3DH, LIS3DSH and LIS2DW accelerometers.
//!
//! The three parts agree on the addresses used here but not always on what the
//! bits mean; each layout below names the part it applies to.
#![allow(unused_parens)]

use modular_bitfield::prelude::*;

use crate::params::{FifoMode, LegacyFifoMode};

/// Register address of `WHO_AM_I`.
pub const REG_WHO_AM_I: u8 = 0x0F;
/// First writable register; everything below holds factory calibration.
pub const REG_FIRST_WRITABLE: u8 = 0x1E;
/// Register address of the first control register: `CTRL_REG1` (LIS3DH, LIS2DW) or `CTRL_REG4` (LIS3DSH).
pub const REG_CTRL_BLOCK: u8 = 0x20;
/// Register address of `CTRL2` (LIS2DW).
pub const REG_LIS2DW_CTRL2: u8 = 0x21;
/// Register address of `CTRL_REG6` (LIS3DSH).
pub const REG_LIS3DSH_CTRL6: u8 = 0x25;
/// Register address of `STATUS`.
pub const REG_STATUS: u8 = 0x27;
/// Register address of `OUT_X_L`, the head of the six output bytes.
pub const REG_OUT_X_L: u8 = 0x28;
/// Register address of `FIFO_CTRL`.
pub const REG_FIFO_CTRL: u8 = 0x2E;
/// Register address of `FIFO_SRC` (LIS3DH, LIS3DSH) or `FIFO_SAMPLES` (LIS2DW).
pub const REG_FIFO_SRC: u8 = 0x2F;

/// Number of consecutive control registers written by `configure`.
pub const CTRL_BLOCK_LEN: usize = 6;
/// Hardware FIFO depth in samples.
pub const FIFO_DEPTH: usize = 32;
/// Bytes per sample: X, Y and Z, low byte first.
pub const SAMPLE_BYTES: usize = 6;
/// FIFO level at which the data-ready line is raised.
pub const FIFO_WATERMARK: u8 = 24;

/// Returns `true` for addresses the driver refuses to write.
pub const fn is_protected(register: u8) -> bool {
    register < REG_FIRST_WRITABLE
}

/// Access permissions encoded for each register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAccess {
    /// Read-only register.
    ReadOnly,
    /// Read/write register.
    ReadWrite,
}

/// Minimal metadata exposed by every register value type.
pub trait Register {
    /// Raw storage backing the register payload.
    type Raw: Copy;
    /// Register address as documented in the datasheet.
    const ADDRESS: u8;
    /// Access permission classification.
    const ACCESS: RegisterAccess;
}

/// `CTRL_REG1` of the LIS3DH (address `0x20`).
///
/// The LIS3DSH `CTRL_REG4` shares the layout with bit 3 meaning block data update.
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControl {
    // X, Y, Z enable flags (bits 2:0).
    pub axes: B3,
    // Low-power mode (bit 3).
    pub low_power: bool,
    // Output data rate code (bits 7:4).
    pub odr: B4,
}

/// `CTRL1` of the LIS2DW (address `0x20`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lis2dwRateControl {
    // Low-power mode selection (bits 1:0).
    pub lp_mode: B2,
    // Operating mode, 0b01 is high performance (bits 3:2).
    pub mode: B2,
    // Output data rate code (bits 7:4).
    pub odr: B4,
}

/// `CTRL_REG4` of the LIS3DH (address `0x23`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lis3dhCtrl4 {
    // SPI 3-wire mode (bit 0).
    pub sim: bool,
    // Self-test selection (bits 2:1).
    pub self_test: B2,
    // High-resolution output (bit 3).
    pub high_resolution: bool,
    // Full-scale selection (bits 5:4).
    pub full_scale: B2,
    // Big-endian data selection (bit 6).
    pub big_endian: bool,
    // Block data update (bit 7).
    pub block_data_update: bool,
}

/// `FIFO_CTRL_REG` of the LIS3DH (address `0x2E`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyFifoControl {
    // Watermark threshold (bits 4:0).
    pub threshold: B5,
    // Trigger routed to INT2 (bit 5).
    pub trigger: bool,
    // FIFO mode (bits 7:6).
    pub mode: LegacyFifoMode,
}

/// `FIFO_CTRL` of the LIS3DSH and LIS2DW (address `0x2E`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoControl {
    // Watermark threshold (bits 4:0).
    pub threshold: B5,
    // FIFO mode (bits 7:5).
    pub mode: FifoMode,
}

/// `FIFO_SRC` of the LIS3DH and LIS3DSH (address `0x2F`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoSource {
    // Stored samples; reads zero when full (bits 4:0).
    pub stored: B5,
    // FIFO empty (bit 5).
    pub empty: bool,
    // FIFO overrun (bit 6).
    pub overrun: bool,
    // Watermark reached (bit 7).
    pub watermark: bool,
}

/// `FIFO_SAMPLES` of the LIS2DW (address `0x2F`).
#[allow(unused_parens)]
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoSamples {
    // Stored samples (bits 5:0).
    pub stored: B6,
    // FIFO overrun (bit 6).
    pub overrun: bool,
    // Threshold reached (bit 7).
    pub threshold: bool,
}

macro_rules! byte_register {
    ($($ty:ident => $address:expr, $access:ident;)+) => {
        $(
            impl From<u8> for $ty {
                fn from(value: u8) -> Self {
                    Self::from_bytes([value])
                }
            }

            impl From<$ty> for u8 {
                fn from(value: $ty) -> Self {
                    value.into_bytes()[0]
                }
            }

            impl Register for $ty {
                type Raw = u8;
                const ADDRESS: u8 = $address;
                const ACCESS: RegisterAccess = RegisterAccess::$access;
            }
        )+
    };
}

byte_register! {
    RateControl => REG_CTRL_BLOCK, ReadWrite;
    Lis2dwRateControl => REG_CTRL_BLOCK, ReadWrite;
    Lis3dhCtrl4 => REG_CTRL_BLOCK + 3, ReadWrite;
    LegacyFifoControl => REG_FIFO_CTRL, ReadWrite;
    FifoControl => REG_FIFO_CTRL, ReadWrite;
    FifoSource => REG_FIFO_SRC, ReadOnly;
    FifoSamples => REG_FIFO_SRC, ReadOnly;
}
