pub mod prices;

pub use prices::{PriceHistory, PriceRow};
