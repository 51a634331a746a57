//! Configuration primitives for the accelerometer driver.

/// Default wait for the data-ready line before `collect_data` gives up.
pub const DEFAULT_DATA_TIMEOUT_MS: u32 = 1_000;

/// Requested sampling behaviour of the accelerometer.
///
/// The part picks the closest supported rate and resolution; the values it
/// actually programs are reported as [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Requested samples per second; zero selects the fastest rate.
    pub sampling_rate: u16,
    /// Requested bits per sample.
    pub resolution: u8,
    /// Maximum wait for the data-ready line inside `collect_data`.
    pub data_timeout_ms: u32,
}

impl Config {
    /// Begins building a [`Config`] using the builder pattern.
    pub fn new() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for [`Config`] allowing piecemeal construction.
#[derive(Debug, Clone, Copy)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder seeded with [`Config::default()`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Overrides the requested sampling rate.
    pub fn sampling_rate(mut self, hz: u16) -> Self {
        self.config.sampling_rate = hz;
        self
    }

    /// Overrides the requested resolution.
    pub fn resolution(mut self, bits: u8) -> Self {
        self.config.resolution = bits;
        self
    }

    /// Overrides the data-ready wait.
    pub fn data_timeout_ms(mut self, ms: u32) -> Self {
        self.config.data_timeout_ms = ms;
        self
    }

    /// Finalizes the builder and returns the [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling_rate: 0,
            resolution: 16,
            data_timeout_ms: DEFAULT_DATA_TIMEOUT_MS,
        }
    }
}

/// Rate and resolution actually programmed into the part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// Samples per second.
    pub sampling_rate: u16,
    /// Bits per sample.
    pub resolution: u8,
}
