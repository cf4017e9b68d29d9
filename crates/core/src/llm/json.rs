use crate::domain::contract::{LlmStrategyInsight, StrategyInsight};
use anyhow::Context;

/// Pulls the JSON object out of a model reply that may be fenced or wrapped in prose.
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Some(after_fence) = trimmed.strip_prefix("```") {
        // Skip the language tag, if any; the body may start on the same line.
        let mut inner = after_fence.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_insight(text: &str) -> anyhow::Result<StrategyInsight> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmStrategyInsight>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for strategy schema: {json_str}"))?;
    parsed.validate_and_into_insight()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::Direction;
    use serde_json::json;

    fn valid_insight_json() -> String {
        json!({
            "strategy": "Bearish",
            "reasons": ["RSI above 70", "Price below 50-day MA"],
            "risks": ["Short squeeze on dovish Fed"],
            "position_size": "1-2% of portfolio",
            "entry_points": ["Bounce to 20-day MA"],
            "exit_points": ["Close above 50-day MA", "Target prior swing low"],
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_handles_single_line_fences() {
        assert_eq!(extract_json("```{\"a\":1}```"), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("```json {\"a\":1}```"), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_insight_accepts_one_line_fenced_reply() {
        let text = format!("```json{}```", valid_insight_json());
        assert_eq!(parse_insight(&text).unwrap().strategy, Direction::Bearish);
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "Here is my analysis: {\"a\":1} Hope it helps.";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn parse_insight_accepts_prose_wrapped_json() {
        let text = format!("Sure.\n{}\n", valid_insight_json());
        let insight = parse_insight(&text).unwrap();
        assert_eq!(insight.strategy, Direction::Bearish);
        assert_eq!(insight.exit_points.len(), 2);
    }

    #[test]
    fn parse_insight_rejects_missing_keys() {
        let text = json!({"strategy": "Bullish", "reasons": ["x"]}).to_string();
        assert!(parse_insight(&text).is_err());
    }
}
