//! Construction errors.

/// Rejected [`CuckooConfig`](crate::CuckooConfig) values.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("initial table size must be positive")]
    ZeroCapacity,

    #[error("load factor threshold {0} must lie in (0.0, 0.5)")]
    InvalidLoadFactor(f64),
}
