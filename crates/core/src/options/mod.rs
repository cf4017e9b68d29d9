//! Options strategy legs and payoff profiles for a recommendation.
//!
//! No options chain is fetched; premiums are Black-Scholes estimates from
//! realized volatility.

mod builder;
mod pricing;

pub use builder::{LegSide, OptionLeg, OptionsSetup, StrategyBuilder};
pub use pricing::{intrinsic, BlackScholes, OptionType};
