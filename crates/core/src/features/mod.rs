mod extractor;
pub mod indicators;

pub use extractor::{
    extract, MarketSignal, PriceAction, RegimeThresholds, TechnicalSnapshot, VolatilityRegime,
    VolumeTrend, MIN_WINDOW,
};
