use thiserror::Error;

/// Failures of the pure signal stages. I/O layers wrap these in `anyhow`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("insufficient price history: need {required} points, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("no sentiment data available")]
    NoData,

    #[error("window must be at least {min} (got {window})")]
    InvalidWindow { window: usize, min: usize },

    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
