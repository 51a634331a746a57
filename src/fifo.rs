//! FIFO bookkeeping and the batches handed out by `collect_data`.

use crate::registers::SAMPLE_BYTES;

/// Decoded FIFO status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoLevel {
    /// Samples waiting in the FIFO.
    pub count: u8,
    /// The FIFO holds no sample.
    pub empty: bool,
    /// Samples were overwritten before being read.
    pub overrun: bool,
}

/// Progress of the current collection run.
///
/// `first_tick` and `last_tick` are written by the data-ready interrupt,
/// `total_read` and `overflowed` by the collecting task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamState {
    /// Samples handed out since collection started.
    pub total_read: u32,
    /// Tick of the first data-ready edge after collection started.
    pub first_tick: u32,
    /// Tick of the latest data-ready edge.
    pub last_tick: u32,
    /// An overrun was seen since collection started.
    pub overflowed: bool,
}

impl StreamState {
    /// Observed samples per second between the first and latest edge.
    ///
    /// Zero until a first batch has been read or when no ticks have elapsed.
    pub fn data_rate(&self, ticks_per_second: u32) -> u16 {
        let elapsed = self.last_tick.wrapping_sub(self.first_tick);
        if self.total_read == 0 || elapsed == 0 {
            return 0;
        }
        let rate = u64::from(self.total_read) * u64::from(ticks_per_second) / u64::from(elapsed);
        u16::try_from(rate).unwrap_or(u16::MAX)
    }
}

/// One sample: X, Y and Z in raw left-justified counts.
pub type Sample = [i16; 3];

/// Samples returned by one `collect_data` call.
///
/// Borrows the driver buffer; the next call overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoBatch<'a> {
    data: &'a [u8],
    /// Observed samples per second, zero for the first batch of a run.
    pub data_rate: u16,
    /// The FIFO overran before this batch was read.
    pub overflowed: bool,
}

impl<'a> FifoBatch<'a> {
    pub(crate) const fn new(data: &'a [u8], data_rate: u16, overflowed: bool) -> Self {
        Self {
            data,
            data_rate,
            overflowed,
        }
    }

    pub(crate) const fn empty(overflowed: bool) -> Self {
        Self::new(&[], 0, overflowed)
    }

    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.data.len() / SAMPLE_BYTES
    }

    /// Returns `true` when the batch holds no sample.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw output bytes: X, Y, Z per sample, low byte first.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Iterates over the decoded samples.
    pub fn samples(&self) -> impl Iterator<Item = Sample> + 'a {
        self.data.chunks_exact(SAMPLE_BYTES).map(|raw| {
            [
                i16::from_le_bytes([raw[0], raw[1]]),
                i16::from_le_bytes([raw[2], raw[3]]),
                i16::from_le_bytes([raw[4], raw[5]]),
            ]
        })
    }
}
