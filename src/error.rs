//! Error handling primitives for the bus arbiter and the accelerometer driver.

use core::fmt;

/// Crate-wide result type alias.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error variants produced by the accelerometer driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Any error reported by the underlying bus interface.
    Interface(E),
    /// No candidate address answered with a known identification byte.
    NotPresent,
    /// A write targeted the factory calibration register range.
    ConfigRejected,
    /// The data-ready line was already asserted before sampling was enabled.
    InterruptLineStuck,
    /// The data-ready pin could not be configured, read or attached.
    Pin,
    /// The operation needs a successful `configure` first.
    NotConfigured,
    /// Data collection has not been started.
    NotCollecting,
    /// The FIFO still reported samples after a full depth of reads.
    FifoNotDrained,
    /// The data-ready slot already holds a waiting task.
    Busy,
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Interface(err)
    }
}

/// Phase of a bus transaction in which a timeout was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Addressing for write or sending payload bytes.
    Send,
    /// Addressing for read or receiving payload bytes.
    Receive,
    /// Waiting for the bus to return to idle after the stop condition.
    Finish,
}

/// Failures reported by the shared bus arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The exclusive lock could not be taken within the timeout.
    LockTimeout,
    /// The target did not acknowledge its address.
    Nak,
    /// The hardware did not reach the expected state in time.
    Timeout(Phase),
    /// The hardware reported an unexpected status.
    Protocol,
    /// The transfer does not fit the arbiter transfer buffer.
    TooLong,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockTimeout => f.write_str("bus lock timeout"),
            Self::Nak => f.write_str("address not acknowledged"),
            Self::Timeout(Phase::Send) => f.write_str("send timeout"),
            Self::Timeout(Phase::Receive) => f.write_str("receive timeout"),
            Self::Timeout(Phase::Finish) => f.write_str("finish timeout"),
            Self::Protocol => f.write_str("unexpected bus status"),
            Self::TooLong => f.write_str("transfer too long"),
        }
    }
}
