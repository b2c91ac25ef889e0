pub mod portfolio;

pub use portfolio::{AllocationProblem, PortfolioModel, RiskConstraint};
