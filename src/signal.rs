//! Handoff between the data-ready interrupt and the collecting task.

use core::cell::Cell;

use critical_section::Mutex;

use crate::fifo::StreamState;
use crate::kernel::{Kernel, WaitSlot};
use crate::platform::{EdgeHandler, TickClock};

/// Timestamps data-ready edges and wakes the task waiting for them.
///
/// Lives in a `static` so the pin interrupt can reach it; one instance per sensor.
pub struct DataReady<K: Kernel, C> {
    stream: Mutex<Cell<StreamState>>,
    waiter: WaitSlot<K::Task>,
    kernel: K,
    clock: C,
}

impl<K: Kernel, C: TickClock> DataReady<K, C> {
    /// Creates the handoff with no waiter and an empty stream.
    pub const fn new(kernel: K, clock: C) -> Self {
        Self {
            stream: Mutex::new(Cell::new(StreamState {
                total_read: 0,
                first_tick: 0,
                last_tick: 0,
                overflowed: false,
            })),
            waiter: WaitSlot::new(),
            kernel,
            clock,
        }
    }

    /// Kernel services used for waiting.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Clock used for edge timestamps.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Snapshot of the current run.
    pub fn stream(&self) -> StreamState {
        critical_section::with(|cs| self.stream.borrow(cs).get())
    }

    /// Data-ready interrupt entry point.
    pub fn on_edge(&self) {
        let now = self.clock.now_ticks();
        critical_section::with(|cs| {
            let cell = self.stream.borrow(cs);
            let mut stream = cell.get();
            if stream.total_read == 0 {
                stream.first_tick = now;
            }
            stream.last_tick = now;
            cell.set(stream);

            if let Some(task) = self.waiter.take_in(cs) {
                self.kernel.notify(task);
            }
        });
    }

    pub(crate) fn reset_stream(&self) {
        critical_section::with(|cs| self.stream.borrow(cs).set(StreamState::default()));
    }

    pub(crate) fn record_batch(&self, samples: u32, overflowed: bool) {
        critical_section::with(|cs| {
            let cell = self.stream.borrow(cs);
            let mut stream = cell.get();
            stream.total_read = stream.total_read.wrapping_add(samples);
            stream.overflowed |= overflowed;
            cell.set(stream);
        });
    }

    pub(crate) fn register(&self, task: K::Task) -> bool {
        self.waiter.register(task)
    }

    pub(crate) fn deregister(&self) {
        let _ = self.waiter.take();
    }
}

impl<K, C> EdgeHandler for DataReady<K, C>
where
    K: Kernel + Sync,
    C: TickClock + Sync,
{
    fn on_edge(&self) {
        DataReady::on_edge(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestClock, TestKernel};

    #[test]
    fn first_edge_of_a_run_fixes_the_start_tick() {
        let kernel = TestKernel::new();
        let clock = TestClock::new();
        let signal = DataReady::new(&kernel, clock.clone());

        clock.set(100);
        signal.on_edge();
        clock.set(250);
        signal.on_edge();
        let stream = signal.stream();
        assert_eq!((stream.first_tick, stream.last_tick), (250, 250));

        signal.record_batch(24, false);
        clock.set(400);
        signal.on_edge();
        let stream = signal.stream();
        assert_eq!((stream.first_tick, stream.last_tick, stream.total_read), (250, 400, 24));

        signal.reset_stream();
        assert_eq!(signal.stream(), StreamState::default());
    }

    #[test]
    fn edge_wakes_the_registered_task_once() {
        let kernel = TestKernel::new();
        let signal = DataReady::new(&kernel, TestClock::new());

        assert!(signal.register(1));
        assert!(!signal.register(1));
        signal.on_edge();
        assert!(kernel.wait_notification(10));

        signal.on_edge();
        assert!(!kernel.wait_notification(10));
        assert!(signal.register(1));
        signal.deregister();
    }
}
