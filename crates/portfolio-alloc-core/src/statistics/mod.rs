pub mod estimator;

pub use estimator::{estimate_statistics, period_returns, AnnualizedStatistics, TRADING_DAYS_PER_YEAR};
