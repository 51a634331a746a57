//! High-level accelerometer driver for the LIS3DH, LIS3DSH and LIS2DW.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use crate::config::{Config, Settings};
use crate::diagnostics::{CollectPhase, Diagnostics, Fault};
use crate::error::{Error, Result};
use crate::fifo::FifoBatch;
use crate::interface::AccelInterface;
use crate::interface::spi::SpiInterface;
use crate::kernel::Kernel;
use crate::params::{AxisMask, DeviceVariant};
use crate::platform::{Edge, InterruptPin, TickClock};
use crate::registers::{
    self, FIFO_DEPTH, REG_CTRL_BLOCK, REG_FIFO_CTRL, REG_FIFO_SRC, REG_OUT_X_L, REG_STATUS,
    REG_WHO_AM_I, SAMPLE_BYTES,
};
use crate::signal::DataReady;
use crate::variant::ChipFamily;

// Settling time of the pull-up before the data-ready line is sampled (microseconds).
const LINE_SETTLE_US: u32 = 5;
// Wakeups with the data-ready line still low tolerated per `collect_data` call.
const MAX_SPURIOUS_WAKEUPS: u32 = 4;
// Value reported by `read_status` when the register cannot be read.
const STATUS_UNAVAILABLE: u8 = 0xFF;

/// Interrupt-driven FIFO driver for one accelerometer.
///
/// The data-ready line is wired to `signal`, which must outlive the driver
/// because the pin interrupt keeps a reference to it.
pub struct Accelerometer<IFACE, PIN, K: Kernel + 'static, C: 'static> {
    interface: IFACE,
    int_pin: PIN,
    signal: &'static DataReady<K, C>,
    config: Config,
    variant: Option<DeviceVariant>,
    settings: Option<Settings>,
    run_ctrl: u8,
    axes: AxisMask,
    phase: CollectPhase,
    fault: Option<Fault>,
    buffer: [u8; FIFO_DEPTH * SAMPLE_BYTES],
}

impl<IFACE, PIN, K: Kernel + 'static, C: 'static> Accelerometer<IFACE, PIN, K, C> {
    // ==================================================================
    // == Driver Construction & Ownership ===============================
    // ==================================================================
    /// Creates a new driver instance from the bus interface and data-ready pin.
    pub fn new(interface: IFACE, int_pin: PIN, signal: &'static DataReady<K, C>, config: Config) -> Self {
        Self {
            interface,
            int_pin,
            signal,
            config,
            variant: None,
            settings: None,
            run_ctrl: 0,
            axes: AxisMask::XYZ,
            phase: CollectPhase::Idle,
            fault: None,
            buffer: [0; FIFO_DEPTH * SAMPLE_BYTES],
        }
    }

    /// Consumes the driver and returns the owned interface and pin.
    pub fn release(self) -> (IFACE, PIN) {
        (self.interface, self.int_pin)
    }

    /// Provides mutable access to the underlying interface.
    pub fn interface_mut(&mut self) -> &mut IFACE {
        &mut self.interface
    }

    /// Returns a shared reference to the requested configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Part identified by [`check_present`](Self::check_present).
    pub fn variant(&self) -> Option<DeviceVariant> {
        self.variant
    }

    /// Rate and resolution programmed by the last successful `configure`.
    pub fn settings(&self) -> Option<Settings> {
        self.settings
    }

    /// Name of the identified part, or `"unknown"`.
    pub fn type_name(&self) -> &'static str {
        self.variant.map_or("unknown", DeviceVariant::name)
    }
}

impl<SPI, PIN, K: Kernel + 'static, C: 'static> Accelerometer<SpiInterface<SPI>, PIN, K, C>
where
    SPI: SpiDevice,
{
    // ==================================================================
    // == SPI Convenience Constructors ==================================
    // ==================================================================
    /// Convenience constructor for SPI transports.
    pub fn new_spi(spi: SPI, int_pin: PIN, signal: &'static DataReady<K, C>, config: Config) -> Self {
        Self::new(SpiInterface::new(spi), int_pin, signal, config)
    }
}

impl<IFACE, PIN, K, C, CommE> Accelerometer<IFACE, PIN, K, C>
where
    IFACE: AccelInterface<Error = CommE>,
    PIN: InterruptPin,
    K: Kernel + Sync + 'static,
    C: TickClock + Sync + 'static,
{
    // ==================================================================
    // == Identification & Status =======================================
    // ==================================================================
    /// Probes every candidate address for a supported part.
    ///
    /// The first positive identification is kept for the lifetime of the
    /// driver. When nothing answers, the driver is disabled. A disabled
    /// driver reports its latched fault here too.
    pub fn check_present(&mut self) -> Result<DeviceVariant, CommE> {
        self.ensure_enabled()?;
        if let Some(variant) = self.variant {
            return Ok(variant);
        }

        for index in 0..self.interface.probe_candidates() {
            self.interface.select_candidate(index);
            let mut id = [0u8; 1];
            if self.interface.read_registers(REG_WHO_AM_I, false, &mut id).is_err() {
                continue;
            }
            match DeviceVariant::from_who_am_i(id[0]) {
                Some(variant) => {
                    info!("accel: found {}", variant.name());
                    self.variant = Some(variant);
                    return Ok(variant);
                }
                None => debug!("accel: unknown id {=u8:#x}", id[0]),
            }
        }

        self.interface.select_candidate(0);
        self.fault = Some(Fault::NotPresent);
        warn!("accel: no supported device answered");
        Err(Error::NotPresent)
    }

    /// Reads the `STATUS` register, or `0xFF` when it cannot be read.
    pub fn read_status(&mut self) -> u8 {
        self.read_register(REG_STATUS).unwrap_or(STATUS_UNAVAILABLE)
    }

    /// Snapshot of the driver state and the bus statistics.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            variant: self.variant,
            settings: self.settings,
            axes: self.axes,
            phase: self.phase,
            fault: self.fault,
            stream: self.signal.stream(),
            bus: self.interface.bus_error_counts(),
        }
    }

    // ==================================================================
    // == Register Access ===============================================
    // ==================================================================
    /// Reads consecutive registers starting at `register`.
    pub fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), CommE> {
        self.ensure_enabled()?;
        let auto_increment = buf.len() > 1 && self.needs_auto_increment_flag();
        self.interface
            .read_registers(register, auto_increment, buf)
            .map_err(Error::from)
    }

    /// Writes consecutive registers starting at `register`.
    ///
    /// Addresses below `0x1E` hold factory calibration and are refused
    /// before any bus traffic.
    pub fn write_registers(&mut self, register: u8, data: &[u8]) -> Result<(), CommE> {
        if registers::is_protected(register) {
            warn!("accel: refused write to register {=u8:#x}", register);
            return Err(Error::ConfigRejected);
        }
        self.ensure_enabled()?;
        let auto_increment = data.len() > 1 && self.needs_auto_increment_flag();
        self.interface
            .write_registers(register, auto_increment, data)
            .map_err(Error::from)
    }

    fn read_register(&mut self, register: u8) -> Result<u8, CommE> {
        let mut value = [0u8; 1];
        self.read_registers(register, &mut value)?;
        Ok(value[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), CommE> {
        self.write_registers(register, core::slice::from_ref(&value))
    }

    // ==================================================================
    // == Configuration =================================================
    // ==================================================================
    /// Programs the closest supported rate and resolution, leaving the part powered down.
    ///
    /// Returns the values actually selected.
    pub fn configure(&mut self, config: Config) -> Result<Settings, CommE> {
        let variant = self.identified()?;
        let plan = variant.family().plan(config.sampling_rate, config.resolution);

        self.settings = None;
        self.phase = CollectPhase::Idle;
        if let Some((register, value)) = plan.prelude {
            self.write_register(register, value)?;
        }
        self.write_registers(REG_CTRL_BLOCK, &plan.block)?;
        self.write_register(REG_FIFO_CTRL, plan.fifo_ctrl)?;

        self.config = config;
        self.run_ctrl = plan.run_ctrl;
        self.settings = Some(plan.settings);
        info!(
            "accel: {} at {} Hz, {} bit",
            variant.name(),
            plan.settings.sampling_rate,
            plan.settings.resolution
        );
        Ok(plan.settings)
    }

    // ==================================================================
    // == Data Acquisition & FIFO =======================================
    // ==================================================================
    /// Empties the FIFO, checks the data-ready line and starts sampling `axes`.
    ///
    /// A line that is already high before sampling starts latches a fault
    /// that disables the driver.
    pub fn start_collecting(&mut self, axes: AxisMask, delay: &mut impl DelayNs) -> Result<(), CommE> {
        let variant = self.identified()?;
        if self.settings.is_none() {
            return Err(Error::NotConfigured);
        }
        let family = variant.family();

        self.drain_fifo(family)?;
        self.int_pin.set_input_pull_up().map_err(|_| Error::Pin)?;
        self.signal.reset_stream();
        delay.delay_us(LINE_SETTLE_US);
        if self.int_pin.is_high().map_err(|_| Error::Pin)? {
            error!("accel: data-ready line high before start");
            self.fault = Some(Fault::InterruptLineStuck);
            return Err(Error::InterruptLineStuck);
        }

        self.write_register(REG_CTRL_BLOCK, family.run_value(self.run_ctrl, axes))?;
        self.int_pin
            .attach(Edge::Rising, self.signal)
            .map_err(|_| Error::Pin)?;
        self.axes = axes;
        self.phase = CollectPhase::Armed;
        debug!("accel: collecting");
        Ok(())
    }

    /// Waits for the data-ready line, then reads every sample the FIFO holds.
    ///
    /// A wait that times out or a FIFO that cannot be read yields an empty
    /// batch rather than an error. The batch borrows the driver buffer.
    pub fn collect_data(&mut self) -> Result<FifoBatch<'_>, CommE> {
        let variant = self.identified()?;
        if self.phase == CollectPhase::Idle {
            return Err(Error::NotCollecting);
        }
        let family = variant.family();

        if !self.wait_data_ready()? {
            debug!("accel: data-ready wait timed out");
            return Ok(FifoBatch::empty(false));
        }

        let Ok(status) = self.read_register(REG_FIFO_SRC) else {
            warn!("accel: FIFO status read failed");
            return Ok(FifoBatch::empty(false));
        };
        let level = family.fifo_level(status);
        if level.overrun {
            warn!("accel: FIFO overrun");
        }

        let count = usize::from(level.count).min(FIFO_DEPTH);
        if count == 0 {
            return Ok(FifoBatch::empty(level.overrun));
        }
        if self.read_samples(count).is_err() {
            warn!("accel: FIFO read failed");
            return Ok(FifoBatch::empty(level.overrun));
        }

        let signal = self.signal;
        let data_rate = signal.stream().data_rate(signal.clock().ticks_per_second());
        signal.record_batch(count as u32, level.overrun);
        self.phase = CollectPhase::Streaming;
        trace!("accel: read {} samples", count);

        Ok(FifoBatch::new(
            &self.buffer[..count * SAMPLE_BYTES],
            data_rate,
            level.overrun,
        ))
    }

    /// Powers the sampling down; the FIFO keeps its contents.
    pub fn stop_collecting(&mut self) -> Result<(), CommE> {
        self.identified()?;
        self.write_register(REG_CTRL_BLOCK, 0)?;
        self.phase = CollectPhase::Idle;
        debug!("accel: stopped");
        Ok(())
    }

    // ==================================================================
    // == Internal Helpers ==============================================
    // ==================================================================
    fn ensure_enabled(&self) -> Result<(), CommE> {
        match self.fault {
            None => Ok(()),
            Some(Fault::NotPresent) => Err(Error::NotPresent),
            Some(Fault::InterruptLineStuck) => Err(Error::InterruptLineStuck),
        }
    }

    fn identified(&self) -> Result<DeviceVariant, CommE> {
        self.ensure_enabled()?;
        self.variant.ok_or(Error::NotPresent)
    }

    fn needs_auto_increment_flag(&self) -> bool {
        self.variant
            .is_some_and(|variant| variant.family().needs_auto_increment_flag())
    }

    // Reads `count` samples from the output registers into the buffer head.
    fn read_samples(&mut self, count: usize) -> Result<(), CommE> {
        let auto_increment = self.needs_auto_increment_flag();
        let len = count * SAMPLE_BYTES;
        self.interface
            .read_registers(REG_OUT_X_L, auto_increment, &mut self.buffer[..len])
            .map_err(Error::from)
    }

    fn drain_fifo(&mut self, family: &dyn ChipFamily) -> Result<(), CommE> {
        for _ in 0..=FIFO_DEPTH {
            let level = family.fifo_level(self.read_register(REG_FIFO_SRC)?);
            if level.empty {
                return Ok(());
            }
            self.read_samples(1)?;
        }
        warn!("accel: FIFO did not drain");
        Err(Error::FifoNotDrained)
    }

    // Returns `false` when the line stayed low for the whole data timeout.
    // Wakeups with the line low only wait out what is left of it.
    fn wait_data_ready(&mut self) -> Result<bool, CommE> {
        let signal = self.signal;
        let kernel = signal.kernel();
        let clock = signal.clock();
        let task = kernel.current_task();
        if !signal.register(task) {
            return Err(Error::Busy);
        }

        let started = clock.now_ticks();
        let mut wakeups = 0;
        let ready = loop {
            match self.int_pin.is_high() {
                Ok(true) => break Ok(true),
                Ok(false) => {}
                Err(_) => break Err(Error::Pin),
            }
            let remaining_ms = self
                .config
                .data_timeout_ms
                .saturating_sub(clock.elapsed_ms(started));
            if wakeups == MAX_SPURIOUS_WAKEUPS
                || remaining_ms == 0
                || !kernel.wait_notification(remaining_ms)
            {
                break Ok(false);
            }
            wakeups += 1;
            // The interrupt side clears the slot when it wakes us.
            let _ = signal.register(task);
        };

        signal.deregister();
        ready
    }
}
