pub mod allocation;
pub mod config;
pub mod error;
pub mod market_data;
pub mod model;
pub mod report;
pub mod solver;
pub mod statistics;
pub mod types;

pub use error::AllocError;
pub use types::*;

/// Standard result type for all allocation operations
pub type AllocResult<T> = Result<T, AllocError>;
