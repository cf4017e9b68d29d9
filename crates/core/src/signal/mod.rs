mod alignment;
mod composer;

pub use alignment::{alignment_confidence, AnalystRating};
pub use composer::{select_strategy, SignalComposer, SignalWeights};
