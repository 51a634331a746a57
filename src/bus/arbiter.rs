//! Interrupt-driven arbiter executing one transaction at a time on a shared bus.
//!
//! The calling task sets up a transaction and sleeps; every peripheral
//! interrupt advances the state machine by one micro-step and wakes the task,
//! which then checks for completion, failure or a stalled step.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::bus::{Address, BusState, BusStatus, I2cPeripheral};
use crate::error::{BusError, Phase};
use crate::kernel::{BusLock, Kernel, WaitSlot};

/// Capacity of the arbiter transfer buffer, large enough for a full FIFO burst plus the register byte.
pub const MAX_TRANSFER: usize = 256;

// Extra wakeups tolerated per transaction beyond one per expected micro-step.
const SPURIOUS_WAKEUP_LIMIT: usize = 4;

/// Position of the bus state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArbiterState {
    /// No transaction in flight.
    Idle,
    /// Address with write direction sent, waiting for the acknowledge.
    AddressingForWrite,
    /// Sending payload bytes.
    Writing,
    /// Full 10-bit address sent ahead of the read header.
    AddressingForRead10Bit,
    /// Address (or 10-bit read header) with read direction sent.
    AddressingForRead,
    /// Receiving payload bytes.
    Reading,
    /// A step timed out; the peripheral is being reset.
    BusError,
    /// The target rejected its address.
    NakError,
    /// The peripheral reported an unexpected status.
    OtherError,
}

impl ArbiterState {
    /// Returns `true` while the hardware is expected to raise another interrupt.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::AddressingForWrite
                | Self::Writing
                | Self::AddressingForRead10Bit
                | Self::AddressingForRead
                | Self::Reading
        )
    }

    const fn phase(self) -> Phase {
        match self {
            Self::AddressingForWrite | Self::Writing => Phase::Send,
            Self::AddressingForRead10Bit | Self::AddressingForRead | Self::Reading => {
                Phase::Receive
            }
            _ => Phase::Finish,
        }
    }
}

/// Failure statistics of one bus, incremented once per failure event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorCounts {
    /// Addresses not acknowledged.
    pub naks: u32,
    /// Timeouts while addressing for write or sending.
    pub send_timeouts: u32,
    /// Timeouts while addressing for read or receiving.
    pub recv_timeouts: u32,
    /// Timeouts waiting for the bus to go idle after stop.
    pub finish_timeouts: u32,
    /// Peripheral resets issued during recovery.
    pub resets: u32,
    /// Unexpected peripheral status.
    pub other_errors: u32,
}

impl ErrorCounts {
    /// All counters at zero.
    pub const fn new() -> Self {
        Self {
            naks: 0,
            send_timeouts: 0,
            recv_timeouts: 0,
            finish_timeouts: 0,
            resets: 0,
            other_errors: 0,
        }
    }

    /// Resets every counter to zero.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Timing limits applied by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArbiterConfig {
    /// Maximum wait for the interrupt that completes one micro-step.
    pub step_timeout_ms: u32,
    /// Maximum wait for the bus to return to idle after the stop condition.
    pub finish_timeout_us: u32,
}

impl ArbiterConfig {
    /// Default limits for a 100-400 kHz bus.
    pub const fn new() -> Self {
        Self {
            step_timeout_ms: 10,
            finish_timeout_us: 500,
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One bus transaction: optional write phase followed by optional read phase.
#[derive(Debug)]
pub struct Transaction<'a> {
    /// Target address.
    pub address: Address,
    /// Register selector sent ahead of `write`.
    pub first_byte: Option<u8>,
    /// Payload of the write phase.
    pub write: &'a [u8],
    /// Destination of the read phase; its length is the read count.
    pub read: &'a mut [u8],
}

impl<'a> Transaction<'a> {
    /// Write-only transaction.
    pub fn write(address: Address, first_byte: Option<u8>, write: &'a [u8]) -> Self {
        Self {
            address,
            first_byte,
            write,
            read: &mut [],
        }
    }

    /// Register-addressed read: writes `register`, then reads into `read`.
    pub fn read_register(address: Address, register: u8, read: &'a mut [u8]) -> Self {
        Self {
            address,
            first_byte: Some(register),
            write: &[],
            read,
        }
    }

    fn write_len(&self) -> usize {
        usize::from(self.first_byte.is_some()) + self.write.len()
    }
}

struct Inner<H> {
    hw: H,
    state: ArbiterState,
    address: Address,
    buffer: [u8; MAX_TRANSFER],
    write_len: usize,
    write_pos: usize,
    read_len: usize,
    read_pos: usize,
    steps: u32,
    counts: ErrorCounts,
}

impl<H: I2cPeripheral> Inner<H> {
    fn begin(&mut self, txn: &Transaction<'_>) {
        let mut len = 0;
        if let Some(byte) = txn.first_byte {
            self.buffer[0] = byte;
            len = 1;
        }
        self.buffer[len..len + txn.write.len()].copy_from_slice(txn.write);

        self.address = txn.address;
        self.write_len = txn.write_len();
        self.write_pos = 0;
        self.read_len = txn.read.len();
        self.read_pos = 0;
        self.steps = 0;

        self.hw.set_interrupts(true);
        if self.write_len > 0 || self.read_len == 0 {
            self.hw.send_address(self.address.field(false), self.address.is_ten_bit());
            self.state = ArbiterState::AddressingForWrite;
        } else {
            self.begin_read();
        }
    }

    fn begin_read(&mut self) {
        if self.address.is_ten_bit() {
            self.hw.send_address(self.address.field(false), true);
            self.state = ArbiterState::AddressingForRead10Bit;
        } else {
            self.hw.send_address(self.address.field(true), false);
            self.state = ArbiterState::AddressingForRead;
        }
    }

    // One interrupt, one micro-step.
    fn advance(&mut self, status: BusStatus) {
        use ArbiterState::*;

        if !self.state.is_active() {
            return;
        }
        self.steps = self.steps.wrapping_add(1);

        if status.is_fault() {
            self.state = OtherError;
            return;
        }

        match self.state {
            AddressingForWrite | Writing | AddressingForRead10Bit => {
                if !status.master_on_bus() {
                    self.state = OtherError;
                } else if status.rx_nack() {
                    self.hw.stop();
                    self.state = NakError;
                } else if self.state == AddressingForRead10Bit {
                    self.hw.send_address(self.address.ten_bit_read_header(), false);
                    self.state = AddressingForRead;
                } else if self.write_pos < self.write_len {
                    self.hw.write_data(self.buffer[self.write_pos]);
                    self.write_pos += 1;
                    self.state = Writing;
                } else if self.read_len > 0 {
                    self.begin_read();
                } else {
                    self.hw.stop();
                    self.state = Idle;
                }
            }
            AddressingForRead | Reading => {
                if status.slave_on_bus() {
                    let last = self.read_pos + 1 == self.read_len;
                    self.buffer[self.read_pos] = self.hw.read_data(last);
                    self.read_pos += 1;
                    self.state = if last { Idle } else { Reading };
                } else if status.master_on_bus() && status.rx_nack() && self.state == AddressingForRead {
                    self.hw.stop();
                    self.state = NakError;
                } else {
                    self.state = OtherError;
                }
            }
            _ => {}
        }
    }
}

/// Serializes transactions on one physical bus and drives its state machine.
///
/// One instance exists per bus for the lifetime of the firmware. The board
/// support code routes the peripheral interrupt to [`on_interrupt`](Self::on_interrupt).
pub struct BusArbiter<H, K: Kernel> {
    inner: Mutex<RefCell<Inner<H>>>,
    lock: BusLock,
    waiter: WaitSlot<K::Task>,
    kernel: K,
    config: ArbiterConfig,
}

impl<H, K: Kernel> BusArbiter<H, K> {
    /// Creates an idle arbiter owning the bus peripheral.
    pub const fn new(hw: H, kernel: K, config: ArbiterConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                hw,
                state: ArbiterState::Idle,
                address: Address::SevenBit(0),
                buffer: [0; MAX_TRANSFER],
                write_len: 0,
                write_pos: 0,
                read_len: 0,
                read_pos: 0,
                steps: 0,
                counts: ErrorCounts::new(),
            })),
            lock: BusLock::new(),
            waiter: WaitSlot::new(),
            kernel,
            config,
        }
    }

    /// Kernel services used by this bus.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<H: I2cPeripheral, K: Kernel> BusArbiter<H, K> {
    /// Waits up to `timeout_ms` for exclusive ownership of the bus.
    ///
    /// Returns `None` on timeout without side effects. Ownership ends when the
    /// guard is released or dropped.
    pub fn acquire(&self, timeout_ms: u32) -> Option<BusGuard<'_, H, K>> {
        if self.lock.acquire(&self.kernel, timeout_ms) {
            Some(BusGuard { arbiter: self })
        } else {
            None
        }
    }

    /// Current state machine position.
    pub fn state(&self) -> ArbiterState {
        critical_section::with(|cs| self.inner.borrow_ref(cs).state)
    }

    /// Returns the error statistics, clearing them afterwards when `clear` is set.
    pub fn error_counts(&self, clear: bool) -> ErrorCounts {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let counts = inner.counts;
            if clear {
                inner.counts.clear();
            }
            counts
        })
    }

    /// Programs the bus clock.
    pub fn set_clock_frequency(&self, hz: u32) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).hw.set_clock_frequency(hz));
    }

    /// Peripheral interrupt entry point.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let status = inner.hw.status();
            inner.advance(status);
            if !inner.state.is_active() {
                inner.hw.set_interrupts(false);
            }
            if let Some(task) = self.waiter.take_in(cs) {
                self.kernel.notify(task);
            }
        });
    }

    fn execute_locked(&self, txn: Transaction<'_>) -> Result<(), BusError> {
        let write_len = txn.write_len();
        let read_len = txn.read.len();
        if write_len > MAX_TRANSFER || read_len > MAX_TRANSFER {
            return Err(BusError::TooLong);
        }

        let task = self.kernel.current_task();
        critical_section::with(|cs| {
            let _ = self.waiter.take_in(cs);
            self.waiter.register_in(cs, task);
            self.inner.borrow_ref_mut(cs).begin(&txn);
        });

        let wake_budget = write_len + read_len + 3 + SPURIOUS_WAKEUP_LIMIT;
        let mut wakes = 0;
        let mut seen_steps = 0;
        loop {
            let notified = self.kernel.wait_notification(self.config.step_timeout_ms);
            let (state, steps) = critical_section::with(|cs| {
                let inner = self.inner.borrow_ref(cs);
                if inner.state.is_active() {
                    let _ = self.waiter.take_in(cs);
                    self.waiter.register_in(cs, task);
                }
                (inner.state, inner.steps)
            });

            match state {
                ArbiterState::Idle => break,
                ArbiterState::NakError => return Err(self.recover_nak(txn.address)),
                ArbiterState::OtherError => {
                    return Err(self.recover(ArbiterState::OtherError, BusError::Protocol));
                }
                // `BusError` is only held inside `recover`.
                active => {
                    let progressed = steps != seen_steps;
                    seen_steps = steps;
                    wakes += 1;
                    if (!notified && !progressed) || wakes > wake_budget {
                        return Err(self.recover(
                            ArbiterState::BusError,
                            BusError::Timeout(active.phase()),
                        ));
                    }
                }
            }
        }

        self.wait_for_idle()?;

        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            txn.read.copy_from_slice(&inner.buffer[..read_len]);
        });
        Ok(())
    }

    fn wait_for_idle(&self) -> Result<(), BusError> {
        for _ in 0..=self.config.finish_timeout_us {
            let state = critical_section::with(|cs| self.inner.borrow_ref_mut(cs).hw.status().bus_state());
            if state == BusState::Idle {
                return Ok(());
            }
            self.kernel.delay_us(1);
        }
        Err(self.recover(ArbiterState::BusError, BusError::Timeout(Phase::Finish)))
    }

    fn recover_nak(&self, address: Address) -> BusError {
        critical_section::with(|cs| {
            let _ = self.waiter.take_in(cs);
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.hw.set_interrupts(false);
            inner.counts.naks += 1;
            inner.state = ArbiterState::Idle;
        });
        debug!("bus: address {} not acknowledged", address.field(false) >> 1);
        BusError::Nak
    }

    // Counts the failure, resets the peripheral and leaves the machine idle.
    fn recover(&self, failed: ArbiterState, err: BusError) -> BusError {
        critical_section::with(|cs| {
            let _ = self.waiter.take_in(cs);
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.hw.set_interrupts(false);
            inner.state = failed;
            match err {
                BusError::Timeout(Phase::Send) => inner.counts.send_timeouts += 1,
                BusError::Timeout(Phase::Receive) => inner.counts.recv_timeouts += 1,
                BusError::Timeout(Phase::Finish) => inner.counts.finish_timeouts += 1,
                _ => inner.counts.other_errors += 1,
            }
            inner.hw.reset();
            inner.counts.resets += 1;
            inner.state = ArbiterState::Idle;
        });
        warn!("bus: {}, peripheral reset", err);
        err
    }
}

/// Exclusive ownership of a bus, released on drop.
pub struct BusGuard<'a, H: I2cPeripheral, K: Kernel> {
    arbiter: &'a BusArbiter<H, K>,
}

impl<H: I2cPeripheral, K: Kernel> BusGuard<'_, H, K> {
    /// Runs one transaction to completion or failure.
    ///
    /// No retry is attempted. The bus is idle again when this returns.
    pub fn execute(&mut self, txn: Transaction<'_>) -> Result<(), BusError> {
        self.arbiter.execute_locked(txn)
    }

    /// Gives up ownership of the bus.
    pub fn release(self) {}
}

impl<H: I2cPeripheral, K: Kernel> Drop for BusGuard<'_, H, K> {
    fn drop(&mut self) {
        self.arbiter.lock.release();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::testing::{SimBus, TestKernel, leak_arbiter};
    use std::vec;

    const TARGET: u8 = 0x18;

    #[test]
    fn register_read_walks_write_then_read_states() {
        let (bus, sim) = leak_arbiter(SimBus::with_target(TARGET, &[(0x0F, 0x33), (0x10, 0x5A)]));

        let mut out = [0u8; 2];
        let mut guard = bus.acquire(25).unwrap();
        guard
            .execute(Transaction::read_register(TARGET.into(), 0x0F, &mut out))
            .unwrap();
        guard.release();

        assert_eq!(out, [0x33, 0x5A]);
        assert_eq!(bus.state(), ArbiterState::Idle);
        assert_eq!(
            sim.trace(),
            vec![
                ArbiterState::AddressingForWrite,
                ArbiterState::Writing,
                ArbiterState::AddressingForRead,
                ArbiterState::Reading,
                ArbiterState::Idle,
            ]
        );
        assert_eq!(bus.error_counts(false), ErrorCounts::new());
    }

    #[test]
    fn write_payload_reaches_target_registers() {
        let (bus, sim) = leak_arbiter(SimBus::with_target(TARGET, &[]));

        let mut guard = bus.acquire(25).unwrap();
        guard
            .execute(Transaction::write(TARGET.into(), Some(0xA0), &[0x11, 0x22]))
            .unwrap();
        drop(guard);

        assert_eq!(sim.register(0x20), 0x11);
        assert_eq!(sim.register(0x21), 0x22);
        assert!(!bus.lock.is_locked());
    }

    #[test]
    fn nak_is_counted_once_and_bus_stays_usable() {
        let (bus, _sim) = leak_arbiter(SimBus::with_target(TARGET, &[(0x0F, 0x44)]));

        let mut out = [0u8; 1];
        let mut guard = bus.acquire(25).unwrap();
        let err = guard
            .execute(Transaction::read_register(0x1E.into(), 0x0F, &mut out))
            .unwrap_err();
        assert_eq!(err, BusError::Nak);
        assert_eq!(bus.state(), ArbiterState::Idle);

        guard
            .execute(Transaction::read_register(TARGET.into(), 0x0F, &mut out))
            .unwrap();
        assert_eq!(out, [0x44]);

        let counts = bus.error_counts(true);
        assert_eq!(counts.naks, 1);
        assert_eq!(counts.resets, 0);
        assert_eq!(bus.error_counts(false), ErrorCounts::new());
    }

    #[test]
    fn stalled_read_times_out_and_resets() {
        let (bus, sim) = leak_arbiter(SimBus::with_target(TARGET, &[(0x0F, 0x33)]));
        sim.stall_after(3);

        let mut out = [0u8; 2];
        let mut guard = bus.acquire(25).unwrap();
        let err = guard
            .execute(Transaction::read_register(TARGET.into(), 0x0F, &mut out))
            .unwrap_err();
        assert_eq!(err, BusError::Timeout(Phase::Receive));
        assert_eq!(bus.state(), ArbiterState::Idle);
        assert_eq!(sim.resets(), 1);

        let counts = bus.error_counts(false);
        assert_eq!(counts.recv_timeouts, 1);
        assert_eq!(counts.resets, 1);
        assert_eq!(counts.send_timeouts, 0);

        sim.stall_after(usize::MAX);
        guard
            .execute(Transaction::read_register(TARGET.into(), 0x0F, &mut out[..1]))
            .unwrap();
    }

    #[test]
    fn stalled_write_counts_send_timeout() {
        let (bus, sim) = leak_arbiter(SimBus::with_target(TARGET, &[]));
        sim.stall_after(0);

        let mut guard = bus.acquire(25).unwrap();
        let err = guard
            .execute(Transaction::write(TARGET.into(), Some(0x20), &[0x00]))
            .unwrap_err();
        assert_eq!(err, BusError::Timeout(Phase::Send));
        assert_eq!(bus.error_counts(false).send_timeouts, 1);
        assert_eq!(bus.state(), ArbiterState::Idle);
        assert!(!sim.trace().contains(&ArbiterState::BusError));
    }

    #[test]
    fn bus_that_never_idles_counts_finish_timeout() {
        let (bus, sim) = leak_arbiter(SimBus::with_target(TARGET, &[]));
        sim.hold_bus_after_stop(true);

        let mut guard = bus.acquire(25).unwrap();
        let err = guard
            .execute(Transaction::write(TARGET.into(), Some(0x20), &[0x00]))
            .unwrap_err();
        assert_eq!(err, BusError::Timeout(Phase::Finish));

        let counts = bus.error_counts(false);
        assert_eq!(counts.finish_timeouts, 1);
        assert_eq!(counts.resets, 1);
        assert_eq!(bus.state(), ArbiterState::Idle);
    }

    #[test]
    fn arbitration_loss_is_a_protocol_error() {
        let (bus, sim) = leak_arbiter(SimBus::with_target(TARGET, &[]));
        sim.lose_arbitration(true);

        let mut guard = bus.acquire(25).unwrap();
        let err = guard
            .execute(Transaction::write(TARGET.into(), Some(0x20), &[0x00]))
            .unwrap_err();
        assert_eq!(err, BusError::Protocol);
        assert_eq!(bus.state(), ArbiterState::Idle);

        let counts = bus.error_counts(false);
        assert_eq!(counts.other_errors, 1);
        assert_eq!(counts.resets, 1);
    }

    #[test]
    fn second_acquire_times_out_while_guard_is_held() {
        let (bus, _sim) = leak_arbiter(SimBus::with_target(TARGET, &[]));

        let guard = bus.acquire(25).unwrap();
        assert!(bus.acquire(2).is_none());
        guard.release();
        assert!(bus.acquire(2).is_some());
    }

    #[test]
    fn oversized_transfer_is_rejected_without_bus_activity() {
        let (bus, sim) = leak_arbiter(SimBus::with_target(TARGET, &[]));

        let mut out = [0u8; MAX_TRANSFER + 1];
        let mut guard = bus.acquire(25).unwrap();
        let err = guard
            .execute(Transaction::read_register(TARGET.into(), 0x28, &mut out))
            .unwrap_err();
        assert_eq!(err, BusError::TooLong);
        assert!(sim.trace().is_empty());
    }

    #[test]
    fn ten_bit_read_sends_header_after_full_address() {
        let (bus, sim) = leak_arbiter(SimBus::with_ten_bit_target(0x2A5, &[(0x0F, 0x3F)]));

        let mut out = [0u8; 2];
        let mut guard = bus.acquire(25).unwrap();
        guard
            .execute(Transaction::read_register(Address::TenBit(0x2A5), 0x0F, &mut out))
            .unwrap();

        assert_eq!(out, [0x3F, 0x00]);
        assert_eq!(
            sim.trace(),
            vec![
                ArbiterState::AddressingForWrite,
                ArbiterState::Writing,
                ArbiterState::AddressingForRead10Bit,
                ArbiterState::AddressingForRead,
                ArbiterState::Reading,
                ArbiterState::Idle,
            ]
        );
    }

    #[test]
    fn clock_frequency_reaches_peripheral() {
        let kernel = TestKernel::leak();
        let sim = SimBus::with_target(TARGET, &[]);
        let bus = BusArbiter::new(sim.clone(), kernel, ArbiterConfig::default());
        bus.set_clock_frequency(400_000);
        assert_eq!(sim.clock_hz(), 400_000);
    }
}
