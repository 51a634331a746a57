//! Strongly typed parameters shared by the driver and the register map.
//!
//! [`DeviceVariant`] names the supported parts, [`AxisMask`] selects the axes
//! sampled while collecting, and the FIFO mode enums map directly to the
//! datasheet field encodings used by [`registers`](crate::registers).
//!
//! # Examples
//!
//! ```rust
//! use lis_accel::params::{AxisMask, DeviceVariant};
//!
//! let variant = DeviceVariant::from_who_am_i(0x33);
//! assert_eq!(variant, Some(DeviceVariant::Lis3dh));
//! assert!(AxisMask::XYZ.contains(AxisMask::Y));
//! ```

use core::fmt;

use modular_bitfield::prelude::Specifier;

/// Supported accelerometer parts, in identification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceVariant {
    /// LIS3DH, 8/10/12-bit samples.
    Lis3dh,
    /// LIS3DSH, 16-bit samples.
    Lis3dsh,
    /// LIS2DW12, 14-bit samples.
    Lis2dw,
}

impl DeviceVariant {
    /// Every variant in the order identification bytes are matched.
    pub const ALL: [Self; 3] = [Self::Lis3dh, Self::Lis3dsh, Self::Lis2dw];

    /// Value the part reports in `WHO_AM_I`.
    pub const fn who_am_i(self) -> u8 {
        match self {
            Self::Lis3dh => 0x33,
            Self::Lis3dsh => 0x3F,
            Self::Lis2dw => 0x44,
        }
    }

    /// Maps an identification byte to the part reporting it.
    pub fn from_who_am_i(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|variant| variant.who_am_i() == id)
    }

    /// Human-readable part name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lis3dh => "LIS3DH",
            Self::Lis3dsh => "LIS3DSH",
            Self::Lis2dw => "LIS2DW",
        }
    }
}

impl fmt::Display for DeviceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of axes enabled while collecting.
///
/// Only the low three bits are meaningful; the LIS2DW always samples all axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisMask(u8);

impl AxisMask {
    /// No axis.
    pub const NONE: Self = Self(0);
    /// X axis.
    pub const X: Self = Self(0b001);
    /// Y axis.
    pub const Y: Self = Self(0b010);
    /// Z axis.
    pub const Z: Self = Self(0b100);
    /// All three axes.
    pub const XYZ: Self = Self(0b111);

    /// Builds a mask from raw bits, ignoring anything above bit 2.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    /// Raw mask bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when every axis in `other` is enabled.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of both masks.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for AxisMask {
    fn default() -> Self {
        Self::XYZ
    }
}

impl fmt::Display for AxisMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("-");
        }
        for (bit, name) in [(Self::X, "X"), (Self::Y, "Y"), (Self::Z, "Z")] {
            if self.contains(bit) {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

/// Two-bit FIFO mode of the LIS3DH (`FIFO_CTRL_REG.FM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Specifier)]
#[repr(u8)]
#[bits = 2]
pub enum LegacyFifoMode {
    /// FIFO disabled.
    Bypass = 0b00,
    /// Stops collecting when full.
    Fifo = 0b01,
    /// Discards the oldest sample when full.
    Stream = 0b10,
    /// Stream until trigger, then FIFO.
    StreamToFifo = 0b11,
}

/// Three-bit FIFO mode of the LIS3DSH and LIS2DW (`FIFO_CTRL.FMODE`).
///
/// The LIS3DSH calls the overwrite mode "stream", the LIS2DW "continuous";
/// each part only accepts its own name for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Specifier)]
#[repr(u8)]
#[bits = 3]
pub enum FifoMode {
    /// FIFO disabled.
    Bypass = 0b000,
    /// Stops collecting when full.
    Fifo = 0b001,
    /// LIS3DSH overwrite mode.
    Stream = 0b010,
    /// Stream until trigger, then FIFO.
    StreamToFifo = 0b011,
    /// Bypass until trigger, then stream.
    BypassToStream = 0b100,
    /// LIS2DW overwrite mode.
    Continuous = 0b110,
}
