use crate::domain::recommendation::Direction;
use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};

const MAX_LIST_LEN: usize = 5;

/// Raw narrative as emitted by the LLM, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStrategyInsight {
    pub strategy: String,
    pub reasons: Vec<String>,
    pub risks: Vec<String>,
    pub position_size: String,
    pub entry_points: Vec<String>,
    pub exit_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInsight {
    pub strategy: Direction,
    pub reasons: Vec<String>,
    pub risks: Vec<String>,
    pub position_size: String,
    pub entry_points: Vec<String>,
    pub exit_points: Vec<String>,
}

impl LlmStrategyInsight {
    pub fn validate_and_into_insight(self) -> anyhow::Result<StrategyInsight> {
        let strategy = parse_direction(&self.strategy)?;

        let reasons = clean_list("reasons", self.reasons)?;
        let risks = clean_list("risks", self.risks)?;
        let entry_points = clean_list("entry_points", self.entry_points)?;
        let exit_points = clean_list("exit_points", self.exit_points)?;

        let position_size = self.position_size.trim().to_string();
        ensure!(!position_size.is_empty(), "position_size must be non-empty");

        Ok(StrategyInsight {
            strategy,
            reasons,
            risks,
            position_size,
            entry_points,
            exit_points,
        })
    }
}

fn parse_direction(raw: &str) -> anyhow::Result<Direction> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "bullish" => Ok(Direction::Bullish),
        "bearish" => Ok(Direction::Bearish),
        "neutral" => Ok(Direction::Neutral),
        other => bail!("strategy must be Bullish, Bearish or Neutral (got {other:?})"),
    }
}

fn clean_list(field: &str, items: Vec<String>) -> anyhow::Result<Vec<String>> {
    ensure!(
        (1..=MAX_LIST_LEN).contains(&items.len()),
        "{field} must have 1..={MAX_LIST_LEN} entries (got {})",
        items.len()
    );

    let out: Vec<String> = items.into_iter().map(|s| s.trim().to_string()).collect();
    ensure!(
        out.iter().all(|s| !s.is_empty()),
        "{field} entries must be non-empty"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LlmStrategyInsight {
        LlmStrategyInsight {
            strategy: " bullish ".to_string(),
            reasons: vec!["MACD crossed above signal".to_string()],
            risks: vec!["Rate decision next week".to_string()],
            position_size: "2% of capital".to_string(),
            entry_points: vec!["Pullback to 20-day MA".to_string()],
            exit_points: vec!["Close below 50-day MA".to_string()],
        }
    }

    #[test]
    fn accepts_case_insensitive_strategy() {
        let insight = valid().validate_and_into_insight().unwrap();
        assert_eq!(insight.strategy, Direction::Bullish);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let mut raw = valid();
        raw.strategy = "Sideways".to_string();
        assert!(raw.validate_and_into_insight().is_err());
    }

    #[test]
    fn rejects_blank_and_oversized_lists() {
        let mut raw = valid();
        raw.reasons = vec!["  ".to_string()];
        assert!(raw.validate_and_into_insight().is_err());

        let mut raw = valid();
        raw.risks = (0..6).map(|i| format!("risk {i}")).collect();
        assert!(raw.validate_and_into_insight().is_err());

        let mut raw = valid();
        raw.exit_points.clear();
        assert!(raw.validate_and_into_insight().is_err());
    }

    #[test]
    fn rejects_empty_position_size() {
        let mut raw = valid();
        raw.position_size = String::new();
        assert!(raw.validate_and_into_insight().is_err());
    }
}
