//! Error type for the styling core.
//!
//! I/O-facing modules (`fetch`, `storage`, `viz`, `github`) use `anyhow`; the pure
//! classification and styling code reports these typed errors instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StyleError {
    /// The numeric series had no usable values.
    #[error("insufficient data: no numeric values to classify")]
    InsufficientData,

    #[error("invalid class count {0}: at least one class is required")]
    InvalidClassCount(usize),

    #[error("unknown indicator '{0}'")]
    UnknownIndicator(String),

    #[error("unknown aggregation level '{0}'")]
    UnknownAggregation(String),

    #[error("unknown bound level '{0}'")]
    UnknownBoundLevel(String),

    #[error("unknown per-capita basis '{0}'")]
    UnknownPerCapita(String),

    #[error("invalid color '{0}': expected #rgb or #rrggbb")]
    InvalidColor(String),

    /// A color ramp must have at least two stops.
    #[error("color ramp needs at least two colors, got {0}")]
    ShortRamp(usize),

    #[error("date index {index} out of range ({len} dates configured)")]
    DateOutOfRange { index: usize, len: usize },

    #[error("this map's property keys need a date, but no dates are configured")]
    NoDates,
}

pub type Result<T> = std::result::Result<T, StyleError>;
