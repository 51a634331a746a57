//! Human-readable driver and bus status.

use core::fmt;

use crate::bus::ErrorCounts;
use crate::config::Settings;
use crate::fifo::StreamState;
use crate::params::{AxisMask, DeviceVariant};

/// Collection progress of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CollectPhase {
    /// Not collecting.
    Idle,
    /// Collection started, no batch read yet.
    Armed,
    /// At least one batch read.
    Streaming,
}

/// Condition that permanently disables the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// No supported part answered.
    NotPresent,
    /// The data-ready line was high before collection was enabled.
    InterruptLineStuck,
}

/// Snapshot returned by `Accelerometer::diagnostics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// Identified part.
    pub variant: Option<DeviceVariant>,
    /// Programmed rate and resolution.
    pub settings: Option<Settings>,
    /// Axes enabled by the last start.
    pub axes: AxisMask,
    /// Collection progress.
    pub phase: CollectPhase,
    /// Latched fault.
    pub fault: Option<Fault>,
    /// Current collection run.
    pub stream: StreamState,
    /// Statistics of the underlying bus.
    pub bus: Option<ErrorCounts>,
}

impl fmt::Display for CollectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Streaming => "streaming",
        })
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotPresent => "not present",
            Self::InterruptLineStuck => "interrupt line stuck",
        })
    }
}

impl fmt::Display for ErrorCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "naks {}, send timeouts {}, receive timeouts {}, finish timeouts {}, resets {}, other {}",
            self.naks,
            self.send_timeouts,
            self.recv_timeouts,
            self.finish_timeouts,
            self.resets,
            self.other_errors
        )
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Some(variant) => write!(f, "{variant}")?,
            None => f.write_str("unknown")?,
        }
        match self.settings {
            Some(settings) => write!(f, " {}Hz {}-bit", settings.sampling_rate, settings.resolution)?,
            None => f.write_str(" unconfigured")?,
        }
        write!(f, ", {}", self.phase)?;
        if self.phase != CollectPhase::Idle {
            write!(f, " axes {}", self.axes)?;
        }
        write!(f, ", {} samples read", self.stream.total_read)?;
        if self.stream.overflowed {
            f.write_str(", overflowed")?;
        }
        if let Some(fault) = self.fault {
            write!(f, ", fault: {fault}")?;
        }
        if let Some(bus) = self.bus {
            write!(f, "; bus: {bus}")?;
        }
        Ok(())
    }
}
