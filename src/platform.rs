//! Board services the accelerometer driver consumes beyond the bus.

use embedded_hal::digital::InputPin;

/// Free-running tick counter used to timestamp data-ready edges.
pub trait TickClock {
    /// Current tick count; wraps around.
    fn now_ticks(&self) -> u32;

    /// Tick frequency.
    fn ticks_per_second(&self) -> u32;

    /// Milliseconds since `since`, saturating at `u32::MAX`.
    fn elapsed_ms(&self, since: u32) -> u32 {
        let ticks = u64::from(self.now_ticks().wrapping_sub(since));
        let per_second = u64::from(self.ticks_per_second().max(1));
        u32::try_from(ticks * 1000 / per_second).unwrap_or(u32::MAX)
    }
}

impl<C: TickClock + ?Sized> TickClock for &C {
    fn now_ticks(&self) -> u32 {
        (**self).now_ticks()
    }

    fn ticks_per_second(&self) -> u32 {
        (**self).ticks_per_second()
    }
}

/// Pin edge that triggers an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Low to high transition.
    Rising,
    /// High to low transition.
    Falling,
}

/// Receives pin interrupts. Runs in interrupt context.
pub trait EdgeHandler: Sync {
    /// Called once per detected edge.
    fn on_edge(&self);
}

/// Data-ready input that can be pulled up and attached to an interrupt handler.
pub trait InterruptPin: InputPin {
    /// Configures the pin as an input with the internal pull-up enabled.
    fn set_input_pull_up(&mut self) -> Result<(), Self::Error>;

    /// Routes `edge` interrupts on this pin to `handler`.
    fn attach(&mut self, edge: Edge, handler: &'static dyn EdgeHandler) -> Result<(), Self::Error>;
}
