//! Per-part behaviour: rate ladders, control register images and FIFO status decoding.

use crate::config::Settings;
use crate::fifo::FifoLevel;
use crate::params::{AxisMask, DeviceVariant, FifoMode, LegacyFifoMode};
use crate::registers::{
    CTRL_BLOCK_LEN, FIFO_WATERMARK, FifoControl, FifoSamples, FifoSource, LegacyFifoControl,
    Lis2dwRateControl, Lis3dhCtrl4, REG_LIS2DW_CTRL2, REG_LIS3DSH_CTRL6, RateControl,
};

/// One selectable output data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rung {
    /// Smallest request served by this rung.
    min_request: u16,
    /// Rate delivered, in samples per second.
    hz: u16,
    /// `ODR` field code.
    odr: u8,
}

const fn rung(min_request: u16, hz: u16, odr: u8) -> Rung {
    Rung { min_request, hz, odr }
}

// Ladders list the fastest rung first and end with a rung accepting any request.
const LIS3DH_LOW_POWER: [Rung; 3] = [rung(5_000, 5_376, 0x9), rung(1_000, 1_600, 0x8), rung(0, 400, 0x7)];
const LIS3DH_NORMAL: [Rung; 2] = [rung(1_000, 1_344, 0x9), rung(0, 400, 0x7)];
const HIGH_RATE: [Rung; 3] = [rung(1_200, 1_600, 0x9), rung(600, 800, 0x8), rung(0, 400, 0x7)];

fn select(ladder: &[Rung], request: u16) -> Rung {
    let slowest = ladder[ladder.len() - 1];
    if request == 0 {
        return ladder[0];
    }
    ladder
        .iter()
        .copied()
        .find(|rung| request >= rung.min_request)
        .unwrap_or(slowest)
}

/// Register images produced by `configure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ControlPlan {
    /// Rate and resolution the images select.
    pub settings: Settings,
    /// Single register written ahead of the control block.
    pub prelude: Option<(u8, u8)>,
    /// Control block starting at `REG_CTRL_BLOCK`, data rate left powered down.
    pub block: [u8; CTRL_BLOCK_LEN],
    /// Rate control value written when collection starts, before axis bits.
    pub run_ctrl: u8,
    /// `FIFO_CTRL` value.
    pub fifo_ctrl: u8,
}

/// Behaviour that differs between the supported parts.
pub(crate) trait ChipFamily: Sync {
    /// Register images for the closest supported rate and resolution.
    fn plan(&self, sampling_rate: u16, resolution: u8) -> ControlPlan;

    /// Decodes the FIFO status register.
    fn fifo_level(&self, status: u8) -> FifoLevel;

    /// Rate control value with the requested axes applied.
    fn run_value(&self, run_ctrl: u8, axes: AxisMask) -> u8;

    /// Multi-byte transfers must set the address auto-increment flag.
    fn needs_auto_increment_flag(&self) -> bool;
}

struct Lis3dh;
struct Lis3dsh;
struct Lis2dw;

impl ChipFamily for Lis3dh {
    fn plan(&self, sampling_rate: u16, resolution: u8) -> ControlPlan {
        let (resolution, low_power, high_resolution) = match resolution {
            r if r >= 12 => (12, false, true),
            r if r < 10 => (8, true, false),
            _ => (10, false, false),
        };
        let ladder: &[Rung] = if low_power { &LIS3DH_LOW_POWER } else { &LIS3DH_NORMAL };
        let rung = select(ladder, sampling_rate);

        let run_ctrl = RateControl::new().with_low_power(low_power).with_odr(rung.odr);
        let ctrl4 = Lis3dhCtrl4::new()
            .with_block_data_update(true)
            .with_high_resolution(high_resolution);
        let fifo_ctrl = LegacyFifoControl::new()
            .with_threshold(FIFO_WATERMARK - 1)
            .with_mode(LegacyFifoMode::Stream);

        ControlPlan {
            settings: Settings {
                sampling_rate: rung.hz,
                resolution,
            },
            prelude: None,
            // CTRL_REG3 routes the watermark to INT1, CTRL_REG5 enables the FIFO.
            block: [0, 0, 1 << 2, ctrl4.into(), 1 << 6, 0],
            run_ctrl: run_ctrl.into(),
            fifo_ctrl: fifo_ctrl.into(),
        }
    }

    fn fifo_level(&self, status: u8) -> FifoLevel {
        fifo_source_level(status)
    }

    fn run_value(&self, run_ctrl: u8, axes: AxisMask) -> u8 {
        run_ctrl | axes.bits()
    }

    fn needs_auto_increment_flag(&self) -> bool {
        true
    }
}

impl ChipFamily for Lis3dsh {
    fn plan(&self, sampling_rate: u16, _resolution: u8) -> ControlPlan {
        let rung = select(&HIGH_RATE, sampling_rate);
        let fifo_ctrl = FifoControl::new()
            .with_threshold(FIFO_WATERMARK - 1)
            .with_mode(FifoMode::Stream);

        ControlPlan {
            settings: Settings {
                sampling_rate: rung.hz,
                resolution: 16,
            },
            // CTRL_REG6: register address auto-increment.
            prelude: Some((REG_LIS3DSH_CTRL6, 1 << 4)),
            // CTRL_REG3: INT1 enabled, active high, pulsed. CTRL_REG6 again: FIFO, watermark interrupt.
            block: [0, 0, 0, (1 << 3) | (1 << 6) | (1 << 5), 0, (1 << 2) | (1 << 4) | (1 << 6)],
            run_ctrl: RateControl::new().with_odr(rung.odr).into(),
            fifo_ctrl: fifo_ctrl.into(),
        }
    }

    fn fifo_level(&self, status: u8) -> FifoLevel {
        fifo_source_level(status)
    }

    fn run_value(&self, run_ctrl: u8, axes: AxisMask) -> u8 {
        run_ctrl | axes.bits()
    }

    fn needs_auto_increment_flag(&self) -> bool {
        false
    }
}

impl ChipFamily for Lis2dw {
    fn plan(&self, sampling_rate: u16, _resolution: u8) -> ControlPlan {
        let rung = select(&HIGH_RATE, sampling_rate);
        let run_ctrl = Lis2dwRateControl::new().with_mode(0b01).with_odr(rung.odr);
        let fifo_ctrl = FifoControl::new()
            .with_threshold(FIFO_WATERMARK - 1)
            .with_mode(FifoMode::Continuous);

        ControlPlan {
            settings: Settings {
                sampling_rate: rung.hz,
                resolution: 14,
            },
            // CTRL2: register address auto-increment.
            prelude: Some((REG_LIS2DW_CTRL2, 1 << 2)),
            // CTRL2 boot and auto-increment, CTRL4 FIFO threshold on INT1, CTRL6 low noise at +-2 g.
            block: [0, (1 << 7) | (1 << 2), 0, 1 << 1, 0, 1 << 2],
            run_ctrl: run_ctrl.into(),
            fifo_ctrl: fifo_ctrl.into(),
        }
    }

    fn fifo_level(&self, status: u8) -> FifoLevel {
        let samples = FifoSamples::from(status);
        FifoLevel {
            count: samples.stored(),
            empty: samples.stored() == 0,
            overrun: samples.overrun(),
        }
    }

    // Axis selection is not available on this part.
    fn run_value(&self, run_ctrl: u8, _axes: AxisMask) -> u8 {
        run_ctrl
    }

    fn needs_auto_increment_flag(&self) -> bool {
        false
    }
}

fn fifo_source_level(status: u8) -> FifoLevel {
    let src = FifoSource::from(status);
    let count = if src.stored() == 0 && !src.empty() {
        crate::registers::FIFO_DEPTH as u8
    } else {
        src.stored()
    };
    FifoLevel {
        count,
        empty: src.empty(),
        overrun: src.overrun(),
    }
}

impl DeviceVariant {
    pub(crate) fn family(self) -> &'static dyn ChipFamily {
        match self {
            Self::Lis3dh => &Lis3dh,
            Self::Lis3dsh => &Lis3dsh,
            Self::Lis2dw => &Lis2dw,
        }
    }
}
