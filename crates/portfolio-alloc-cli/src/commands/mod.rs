pub mod allocate;
pub mod solve;
pub mod stats;

use portfolio_alloc_core::config::AllocationConfig;

use crate::input;

/// Universe used when `--tickers` is not given.
pub const DEFAULT_TICKERS: &str = "AAPL,MSFT,GOOGL,TSLA";

/// Split a comma-separated ticker list, dropping blanks.
pub fn parse_tickers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Base configuration: the `--config` file if given, defaults otherwise.
pub fn load_config(path: Option<&str>) -> Result<AllocationConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => input::file::read_json::<AllocationConfig>(p)?,
        None => AllocationConfig::default(),
    };
    Ok(config)
}
