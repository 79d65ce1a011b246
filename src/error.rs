use thiserror::Error;

/// Errors raised while configuring stages, loading history, or projecting.
///
/// Every variant names the stage, column, or year at fault so the caller can
/// show it to the user and let them retry with corrected input.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("No historical data to average for {from} -> {to}")]
    NoHistoricalData { from: String, to: String },

    #[error("Conversion rate for {from} -> {to} is zero; required volume is unbounded")]
    ZeroConversionRate { from: String, to: String },

    #[error("Required volume for {from} -> {to} exceeds the representable range")]
    VolumeOverflow { from: String, to: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn data_format(message: impl Into<String>) -> Self {
        Self::DataFormat(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
