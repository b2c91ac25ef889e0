pub mod csv_prices;
pub mod file;
pub mod params;
pub mod stdin;
