//! Host-side doubles for the kernel, the bus peripheral, the data-ready line and the tick clock.

extern crate std;

use core::convert::Infallible;
use std::boxed::Box;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use portable_atomic::{AtomicU32, Ordering};

use crate::bus::arbiter::{ArbiterConfig, ArbiterState, BusArbiter};
use crate::bus::{Address, BusState, BusStatus, I2cPeripheral};
use crate::kernel::Kernel;
use crate::platform::{Edge, EdgeHandler, InterruptPin, TickClock};
use crate::signal::DataReady;

type Hook = Box<dyn FnMut() -> bool + Send>;

/// Kernel whose suspension points run the registered interrupt sources.
///
/// A wait with no pending notification gives each hook a chance to raise one,
/// in registration order; if none does, the wait times out immediately.
pub(crate) struct TestKernel {
    pending: Mutex<u32>,
    hooks: Mutex<Vec<Hook>>,
    timeouts: Mutex<Vec<u32>>,
    waits: AtomicU32,
    slept_ms: AtomicU32,
}

impl TestKernel {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(0),
            hooks: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            waits: AtomicU32::new(0),
            slept_ms: AtomicU32::new(0),
        }
    }

    pub(crate) fn leak() -> &'static Self {
        Box::leak(Box::new(Self::new()))
    }

    pub(crate) fn add_hook(&self, hook: impl FnMut() -> bool + Send + 'static) {
        self.hooks.lock().unwrap().push(Box::new(hook));
    }

    pub(crate) fn waits(&self) -> u32 {
        self.waits.load(Ordering::Relaxed)
    }

    /// Timeout passed to each wait so far, in order.
    pub(crate) fn timeouts(&self) -> Vec<u32> {
        self.timeouts.lock().unwrap().clone()
    }

    pub(crate) fn slept_ms(&self) -> u32 {
        self.slept_ms.load(Ordering::Relaxed)
    }

    fn consume(&self) -> bool {
        let mut pending = self.pending.lock().unwrap();
        if *pending > 0 {
            *pending -= 1;
            true
        } else {
            false
        }
    }
}

impl Kernel for TestKernel {
    type Task = u8;

    fn current_task(&self) -> Self::Task {
        1
    }

    fn wait_notification(&self, timeout_ms: u32) -> bool {
        self.waits.fetch_add(1, Ordering::Relaxed);
        self.timeouts.lock().unwrap().push(timeout_ms);
        if self.consume() {
            return true;
        }

        let mut hooks = self.hooks.lock().unwrap();
        for hook in hooks.iter_mut() {
            if hook() {
                break;
            }
        }
        drop(hooks);

        self.consume()
    }

    fn notify(&self, _task: Self::Task) {
        *self.pending.lock().unwrap() += 1;
    }

    fn delay_us(&self, _us: u32) {}

    fn sleep_ms(&self, ms: u32) {
        self.slept_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

struct SimTarget {
    address: Address,
    present: bool,
    regs: [u8; 128],
    pointer: u8,
    awaiting_pointer: bool,
    fifo: VecDeque<u8>,
}

struct SimState {
    targets: Vec<SimTarget>,
    active: Option<usize>,
    status: BusStatus,
    bus_state: BusState,
    irq_enabled: bool,
    irq_pending: bool,
    raised: usize,
    stall_after: usize,
    hold_bus: bool,
    lose_arbitration: bool,
    resets: u32,
    clock_hz: u32,
    trace: Vec<ArbiterState>,
    pointer_bytes: Vec<u8>,
}

impl SimState {
    fn raise(&mut self, status: BusStatus) {
        let status = status.with_arbitration_lost(self.lose_arbitration);
        self.status = status;
        if self.raised < self.stall_after {
            self.irq_pending = true;
        }
        self.raised = self.raised.saturating_add(1);
    }

    fn release_bus(&mut self) {
        self.active = None;
        self.bus_state = if self.hold_bus {
            BusState::Owner
        } else {
            BusState::Idle
        };
    }

    fn find(&self, address: Address) -> Option<usize> {
        self.targets
            .iter()
            .position(|target| target.present && target.address == address)
    }
}

/// Simulated bus peripheral with register-file targets that auto-increment on every access.
#[derive(Clone)]
pub(crate) struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl SimBus {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                targets: Vec::new(),
                active: None,
                status: BusStatus::new(),
                bus_state: BusState::Idle,
                irq_enabled: false,
                irq_pending: false,
                raised: 0,
                stall_after: usize::MAX,
                hold_bus: false,
                lose_arbitration: false,
                resets: 0,
                clock_hz: 100_000,
                trace: Vec::new(),
                pointer_bytes: Vec::new(),
            })),
        }
    }

    pub(crate) fn with_target(address: u8, regs: &[(u8, u8)]) -> Self {
        let sim = Self::new();
        sim.add_target(Address::SevenBit(address), regs);
        sim
    }

    pub(crate) fn with_ten_bit_target(address: u16, regs: &[(u8, u8)]) -> Self {
        let sim = Self::new();
        sim.add_target(Address::TenBit(address), regs);
        sim
    }

    pub(crate) fn add_target(&self, address: Address, regs: &[(u8, u8)]) {
        let mut target = SimTarget {
            address,
            present: true,
            regs: [0; 128],
            pointer: 0,
            awaiting_pointer: false,
            fifo: VecDeque::new(),
        };
        for &(reg, value) in regs {
            target.regs[reg as usize] = value;
        }
        self.state.lock().unwrap().targets.push(target);
    }

    fn with_target_mut<R>(&self, f: impl FnOnce(&mut SimTarget) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state.targets[0])
    }

    pub(crate) fn register(&self, reg: u8) -> u8 {
        self.with_target_mut(|target| target.regs[reg as usize])
    }

    pub(crate) fn set_register(&self, reg: u8, value: u8) {
        self.with_target_mut(|target| target.regs[reg as usize] = value);
    }

    pub(crate) fn push_fifo(&self, bytes: &[u8]) {
        self.with_target_mut(|target| target.fifo.extend(bytes.iter().copied()));
    }

    pub(crate) fn set_present(&self, present: bool) {
        self.with_target_mut(|target| target.present = present);
    }

    pub(crate) fn stall_after(&self, interrupts: usize) {
        let mut state = self.state.lock().unwrap();
        state.raised = 0;
        state.stall_after = interrupts;
    }

    pub(crate) fn hold_bus_after_stop(&self, hold: bool) {
        self.state.lock().unwrap().hold_bus = hold;
    }

    pub(crate) fn lose_arbitration(&self, lose: bool) {
        self.state.lock().unwrap().lose_arbitration = lose;
    }

    pub(crate) fn resets(&self) -> u32 {
        self.state.lock().unwrap().resets
    }

    pub(crate) fn clock_hz(&self) -> u32 {
        self.state.lock().unwrap().clock_hz
    }

    pub(crate) fn trace(&self) -> Vec<ArbiterState> {
        self.state.lock().unwrap().trace.clone()
    }

    /// Register selector bytes as sent on the wire, auto-increment flag included.
    pub(crate) fn pointer_bytes(&self) -> Vec<u8> {
        self.state.lock().unwrap().pointer_bytes.clone()
    }

    fn take_irq(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.irq_pending && state.irq_enabled {
            state.irq_pending = false;
            true
        } else {
            false
        }
    }

    fn record(&self, arbiter_state: ArbiterState) {
        let mut state = self.state.lock().unwrap();
        if state.trace.last() != Some(&arbiter_state) {
            state.trace.push(arbiter_state);
        }
    }
}

impl I2cPeripheral for SimBus {
    fn send_address(&mut self, field: u16, ten_bit: bool) {
        let mut state = self.state.lock().unwrap();
        state.bus_state = BusState::Owner;
        let read = field & 1 == 1;

        let header_target = state.active.filter(|&index| {
            let target = &state.targets[index];
            !ten_bit && read && field & 0xF8 == 0xF0 && target.address.ten_bit_read_header() == field
        });

        let index = if let Some(index) = header_target {
            Some(index)
        } else if ten_bit {
            state.find(Address::TenBit(field >> 1))
        } else {
            state.find(Address::SevenBit((field >> 1) as u8))
        };

        match index {
            Some(index) if read => {
                state.active = Some(index);
                state.targets[index].awaiting_pointer = false;
                state.raise(BusStatus::new().with_slave_on_bus(true));
            }
            Some(index) => {
                state.active = Some(index);
                state.targets[index].awaiting_pointer = true;
                state.raise(BusStatus::new().with_master_on_bus(true));
            }
            None => {
                state.active = None;
                state.raise(BusStatus::new().with_master_on_bus(true).with_rx_nack(true));
            }
        }
    }

    fn write_data(&mut self, byte: u8) {
        let mut state = self.state.lock().unwrap();
        if let Some(index) = state.active {
            let target = &mut state.targets[index];
            if target.awaiting_pointer {
                target.pointer = byte & 0x7F;
                target.awaiting_pointer = false;
                state.pointer_bytes.push(byte);
            } else {
                let pointer = target.pointer as usize;
                target.regs[pointer] = byte;
                target.pointer = target.pointer.wrapping_add(1) & 0x7F;
            }
        }
        state.raise(BusStatus::new().with_master_on_bus(true));
    }

    fn read_data(&mut self, last: bool) -> u8 {
        let mut state = self.state.lock().unwrap();
        let value = match state.active {
            Some(index) => {
                let target = &mut state.targets[index];
                let pointer = target.pointer;
                if (0x28..=0x2D).contains(&pointer) && !target.fifo.is_empty() {
                    target.pointer = if pointer == 0x2D { 0x28 } else { pointer + 1 };
                    target.fifo.pop_front().unwrap_or(0)
                } else {
                    target.pointer = pointer.wrapping_add(1) & 0x7F;
                    target.regs[pointer as usize]
                }
            }
            None => 0xFF,
        };

        if last {
            state.release_bus();
        } else {
            state.raise(BusStatus::new().with_slave_on_bus(true));
        }
        value
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().release_bus();
    }

    fn status(&mut self) -> BusStatus {
        let state = self.state.lock().unwrap();
        state.status.with_bus_state(state.bus_state)
    }

    fn set_interrupts(&mut self, enabled: bool) {
        self.state.lock().unwrap().irq_enabled = enabled;
    }

    fn reset(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.resets += 1;
        state.active = None;
        state.irq_pending = false;
        state.status = BusStatus::new();
        state.bus_state = BusState::Idle;
    }

    fn set_clock_frequency(&mut self, hz: u32) {
        self.state.lock().unwrap().clock_hz = hz;
    }
}

pub(crate) type SimArbiter = BusArbiter<SimBus, &'static TestKernel>;

/// Builds a `'static` arbiter over `sim` whose kernel pumps the simulated interrupt.
pub(crate) fn leak_arbiter(sim: SimBus) -> (&'static SimArbiter, SimBus) {
    let kernel = TestKernel::leak();
    let bus: &'static SimArbiter = Box::leak(Box::new(BusArbiter::new(
        sim.clone(),
        kernel,
        ArbiterConfig::default(),
    )));

    let pump = sim.clone();
    kernel.add_hook(move || {
        if !pump.take_irq() {
            return false;
        }
        pump.record(bus.state());
        bus.on_interrupt();
        pump.record(bus.state());
        true
    });

    (bus, sim)
}

/// Tick counter advanced explicitly by the test.
#[derive(Clone)]
pub(crate) struct TestClock {
    ticks: Arc<AtomicU32>,
}

impl TestClock {
    pub(crate) const TICKS_PER_SECOND: u32 = 750_000;

    pub(crate) fn new() -> Self {
        Self {
            ticks: Arc::new(AtomicU32::new(0)),
        }
    }

    pub(crate) fn set(&self, ticks: u32) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }
}

impl TickClock for TestClock {
    fn now_ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn ticks_per_second(&self) -> u32 {
        Self::TICKS_PER_SECOND
    }
}

struct LineState {
    high: bool,
    pull_up: bool,
    attached: Option<Edge>,
    handler: Option<&'static dyn EdgeHandler>,
    edges: VecDeque<u32>,
}

/// Data-ready line whose rising edges are queued by the test and fired from a kernel hook.
#[derive(Clone)]
pub(crate) struct TestLine {
    state: Arc<Mutex<LineState>>,
    clock: TestClock,
}

impl TestLine {
    pub(crate) fn new(clock: TestClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(LineState {
                high: false,
                pull_up: false,
                attached: None,
                handler: None,
                edges: VecDeque::new(),
            })),
            clock,
        }
    }

    pub(crate) fn set_high(&self, high: bool) {
        self.state.lock().unwrap().high = high;
    }

    pub(crate) fn queue_edge(&self, ticks: u32) {
        self.state.lock().unwrap().edges.push_back(ticks);
    }

    pub(crate) fn pull_up(&self) -> bool {
        self.state.lock().unwrap().pull_up
    }

    pub(crate) fn attached(&self) -> Option<Edge> {
        self.state.lock().unwrap().attached
    }

    /// Fires the next queued edge, if any, the way the pin interrupt would.
    pub(crate) fn fire_next(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(ticks) = state.edges.pop_front() else {
            return false;
        };
        state.high = true;
        let handler = state.handler;
        drop(state);

        self.clock.set(ticks);
        if let Some(handler) = handler {
            handler.on_edge();
        }
        true
    }
}

impl embedded_hal::digital::ErrorType for TestLine {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for TestLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.state.lock().unwrap().high)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.state.lock().unwrap().high)
    }
}

impl InterruptPin for TestLine {
    fn set_input_pull_up(&mut self) -> Result<(), Self::Error> {
        self.state.lock().unwrap().pull_up = true;
        Ok(())
    }

    fn attach(&mut self, edge: Edge, handler: &'static dyn EdgeHandler) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.attached = Some(edge);
        state.handler = Some(handler);
        Ok(())
    }
}

pub(crate) type TestSignal = DataReady<&'static TestKernel, TestClock>;

/// Data-ready handoff wired to `kernel`, plus the line that drives it.
pub(crate) fn leak_signal(kernel: &'static TestKernel) -> (&'static TestSignal, TestLine, TestClock) {
    let clock = TestClock::new();
    let signal: &'static TestSignal = Box::leak(Box::new(DataReady::new(kernel, clock.clone())));
    let line = TestLine::new(clock.clone());

    let edges = line.clone();
    kernel.add_hook(move || edges.fire_next());

    (signal, line, clock)
}
