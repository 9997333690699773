//! Sizing parameters for [`CuckooMap`](crate::CuckooMap).

use crate::error::ConfigError;

/// Per-table slot count used by [`CuckooMap::new`](crate::CuckooMap::new).
pub const DEFAULT_SIZE: usize = 10;

/// Fraction of the combined two-table capacity that may be occupied.
pub const DEFAULT_LOAD_FACTOR: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuckooConfig {
    /// Slots per table at construction. Only `floor(log2(size))` index bits
    /// are used, so sizes that are not powers of two leave the tail unused.
    pub initial_size: usize,
    /// Growth is triggered before an insert would push
    /// `len / (2 * capacity)` above this value.
    pub max_load_factor: f64,
}

impl Default for CuckooConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_SIZE,
            max_load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl CuckooConfig {
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    pub fn with_max_load_factor(mut self, max_load_factor: f64) -> Self {
        self.max_load_factor = max_load_factor;
        self
    }

    /// Two tables cannot hold a load of one half or more with any useful
    /// probability, so the threshold must stay strictly below 0.5.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let lf = self.max_load_factor;
        if !(lf > 0.0 && lf < 0.5) {
            return Err(ConfigError::InvalidLoadFactor(lf));
        }
        Ok(())
    }
}
