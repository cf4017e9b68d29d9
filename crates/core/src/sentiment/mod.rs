mod aggregator;
mod lexicon;

pub use aggregator::SentimentAggregator;
pub use lexicon::{FinancialLexicon, PolarityScorer};
