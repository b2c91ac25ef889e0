use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid price data: {ticker} has price {value} at row {row}")]
    InvalidPriceData {
        ticker: String,
        row: usize,
        value: f64,
    },

    #[error("Division by zero risk in {context}: portfolio volatility is zero")]
    DivisionByZeroRisk { context: String },

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AllocError {
    fn from(e: serde_json::Error) -> Self {
        AllocError::SerializationError(e.to_string())
    }
}
