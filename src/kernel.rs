//! Scheduler primitives consumed from the RTOS, and the two synchronisation
//! objects built on them: a single-waiter slot and the exclusive bus lock.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};
use portable_atomic::{AtomicBool, Ordering};

/// Task notification and timing services supplied by the RTOS.
///
/// The notification behaves like a binary semaphore owned by each task: a
/// notification sent before the task waits is not lost, and waiting consumes it.
pub trait Kernel {
    /// Identity of a task that can be woken.
    type Task: Copy + Send;

    /// Returns the identity of the calling task.
    fn current_task(&self) -> Self::Task;

    /// Suspends the calling task until it is notified or `timeout_ms` elapses.
    ///
    /// Returns `true` when a notification was consumed.
    fn wait_notification(&self, timeout_ms: u32) -> bool;

    /// Wakes `task`. Must be callable from interrupt context.
    fn notify(&self, task: Self::Task);

    /// Timer-based short delay.
    fn delay_us(&self, us: u32);

    /// Yields the processor to other tasks for about `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}

impl<K: Kernel + ?Sized> Kernel for &K {
    type Task = K::Task;

    fn current_task(&self) -> Self::Task {
        (**self).current_task()
    }

    fn wait_notification(&self, timeout_ms: u32) -> bool {
        (**self).wait_notification(timeout_ms)
    }

    fn notify(&self, task: Self::Task) {
        (**self).notify(task)
    }

    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }

    fn sleep_ms(&self, ms: u32) {
        (**self).sleep_ms(ms)
    }
}

/// Holds the identity of at most one task waiting for an interrupt.
///
/// The interrupt side takes the waiter out of the slot, so each registration
/// is woken at most once.
pub struct WaitSlot<T> {
    waiter: Mutex<Cell<Option<T>>>,
}

impl<T: Copy> WaitSlot<T> {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            waiter: Mutex::new(Cell::new(None)),
        }
    }

    /// Registers `task` unless another task is already waiting.
    pub fn register(&self, task: T) -> bool {
        critical_section::with(|cs| self.register_in(cs, task))
    }

    /// Same as [`register`](Self::register) inside an existing critical section.
    pub fn register_in(&self, cs: CriticalSection<'_>, task: T) -> bool {
        let slot = self.waiter.borrow(cs);
        if slot.get().is_some() {
            return false;
        }
        slot.set(Some(task));
        true
    }

    /// Removes and returns the registered waiter.
    pub fn take(&self) -> Option<T> {
        critical_section::with(|cs| self.take_in(cs))
    }

    /// Same as [`take`](Self::take) inside an existing critical section.
    pub fn take_in(&self, cs: CriticalSection<'_>) -> Option<T> {
        self.waiter.borrow(cs).take()
    }

    /// Returns `true` while a task is registered.
    pub fn is_occupied(&self) -> bool {
        critical_section::with(|cs| self.waiter.borrow(cs).get().is_some())
    }
}

impl<T: Copy> Default for WaitSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary ownership token over one physical bus.
///
/// Waiting is bounded by a timeout and gives no fairness guarantee.
pub struct BusLock {
    locked: AtomicBool,
}

impl BusLock {
    /// Creates an unlocked token.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Takes the lock if it is free.
    pub fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Takes the lock, yielding in one millisecond steps for at most `timeout_ms`.
    pub fn acquire<K: Kernel>(&self, kernel: &K, timeout_ms: u32) -> bool {
        if self.try_acquire() {
            return true;
        }

        for _ in 0..timeout_ms {
            kernel.sleep_ms(1);
            if self.try_acquire() {
                return true;
            }
        }

        false
    }

    /// Clears ownership unconditionally.
    pub fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Returns `true` while some task owns the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Default for BusLock {
    fn default() -> Self {
        Self::new()
    }
}
