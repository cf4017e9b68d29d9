use crate::config::Settings;
use crate::domain::contract::{LlmStrategyInsight, StrategyInsight};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{Provider, StrategyInput, StrategyNarrator};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const REPAIR_ATTEMPTS: u32 = 2;

const TOOL_NAME_EMIT_STRATEGY: &str = "emit_strategy";

const SCHEMA_EXAMPLE: &str = r#"{
  "strategy": "Bullish",
  "reasons": ["reason 1", "reason 2"],
  "risks": ["risk 1"],
  "position_size": "2-3% of portfolio",
  "entry_points": ["entry 1"],
  "exit_points": ["exit 1"]
}"#;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, max_tokens: u32, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        }
    }

    fn tools() -> Vec<Tool> {
        let list = |max: u32| {
            serde_json::json!({
                "type": "array",
                "minItems": 1,
                "maxItems": max,
                "items": {"type": "string"}
            })
        };

        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["strategy", "reasons", "risks", "position_size", "entry_points", "exit_points"],
            "properties": {
                "strategy": {"type": "string", "enum": ["Bullish", "Bearish", "Neutral"]},
                "reasons": list(5),
                "risks": list(5),
                "position_size": {"type": "string"},
                "entry_points": list(5),
                "exit_points": list(5)
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_STRATEGY,
            description: "Emit the trading strategy recommendation as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_STRATEGY,
        }
    }

    fn system_prompt() -> String {
        [
            "You are an expert options and equity strategist covering US small-cap ETFs.",
            "Weigh technical indicators, news sentiment and the quantitative recommendation you are given.",
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
            "Output schema:",
            SCHEMA_EXAMPLE,
            "Rules:",
            "- strategy must be exactly one of Bullish, Bearish, Neutral",
            "- reasons, risks, entry_points and exit_points each have 1 to 5 short lines",
            "- position_size is a short sizing suggestion relative to the portfolio",
            "- Use only the numbers provided; do not invent prices",
        ]
        .join("\n")
    }

    fn user_prompt(input: &StrategyInput) -> String {
        format!(
            "Task: Propose a short-term trading strategy for {} as of {}.\n\nMarket data JSON:\n{}",
            input.symbol,
            input.as_of_date,
            input.market_json_pretty()
        )
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object that exactly matches the schema and rules.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Do NOT include trailing commas, comments, or semicolons.\n\
- strategy MUST be one of Bullish, Bearish, Neutral.\n\
- Each list MUST have between 1 and 5 non-empty strings.\n\n\
SCHEMA:\n{SCHEMA_EXAMPLE}\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_insight(res: &CreateMessageResponse) -> anyhow::Result<Option<LlmStrategyInsight>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input } = block {
                if name == TOOL_NAME_EMIT_STRATEGY {
                    let parsed = serde_json::from_value::<LlmStrategyInsight>(input.clone())
                        .context("failed to decode tool_use.input into LlmStrategyInsight")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn try_parse_with_repairs(
        &self,
        input: &StrategyInput,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<StrategyInsight> {
        let first_err = match json::parse_insight(&initial_text) {
            Ok(insight) => return Ok(insight),
            Err(err) => err,
        };

        let mut last_err = first_err;
        let mut last_text = initial_text;
        let mut last_raw_json = initial_raw_json;

        for attempt in 1..=REPAIR_ATTEMPTS {
            let req = self.request(self.max_tokens, Self::repair_prompt(&last_text));
            let (repair_raw_json, repair_res) = self.create_message(req).await?;

            let parsed = match Self::response_tool_insight(&repair_res)? {
                Some(tool_insight) => tool_insight.validate_and_into_insight(),
                None => json::parse_insight(&Self::response_text(&repair_res)),
            };

            match parsed {
                Ok(insight) => return Ok(insight),
                Err(err) => {
                    last_err = err;
                    last_text = Self::response_text(&repair_res);
                    last_raw_json = repair_raw_json;
                    tracing::warn!(
                        attempt,
                        symbol = %input.symbol,
                        %input.as_of_date,
                        error = %last_err,
                        "strategy output still invalid after repair attempt"
                    );
                }
            }
        }

        Err(LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage: "parse_after_repair",
            detail: format!("final_error={last_err}"),
            raw_output: Some(last_text),
            raw_response_json: Some(last_raw_json),
        }
        .into())
    }
}

#[async_trait::async_trait]
impl StrategyNarrator for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_strategy(&self, input: StrategyInput) -> anyhow::Result<StrategyInsight> {
        let (mut raw_json, mut res) = self
            .create_message(self.request(self.max_tokens, Self::user_prompt(&input)))
            .await?;

        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(2048);
            tracing::warn!(
                symbol = %input.symbol,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self
                .create_message(self.request(bumped, Self::user_prompt(&input)))
                .await?;
            raw_json = rj;
            res = r;
        }

        if let Some(tool_insight) = Self::response_tool_insight(&res)? {
            return tool_insight.validate_and_into_insight();
        }

        let text = Self::response_text(&res);
        self.try_parse_with_repairs(&input, text, raw_json).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::Direction;
    use serde_json::json;

    #[test]
    fn parses_tool_use_strategy_input() {
        let raw = json!({
            "content": [
                {"type": "thinking", "thinking": "...", "signature": "x"},
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": TOOL_NAME_EMIT_STRATEGY,
                    "input": {
                        "strategy": "Neutral",
                        "reasons": ["Mixed signals"],
                        "risks": ["Breakout either way"],
                        "position_size": "1% of portfolio",
                        "entry_points": ["Near 20-day MA"],
                        "exit_points": ["Break of recent range"]
                    }
                }
            ],
            "stop_reason": "tool_use"
        });

        let res: CreateMessageResponse = serde_json::from_value(raw).unwrap();
        let parsed = AnthropicClient::response_tool_insight(&res).unwrap().unwrap();
        let insight = parsed.validate_and_into_insight().unwrap();
        assert_eq!(insight.strategy, Direction::Neutral);
        assert_eq!(insight.position_size, "1% of portfolio");
    }

    #[test]
    fn text_blocks_are_joined_and_others_ignored() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "{\"strategy\":"},
                {"type": "redacted_thinking", "data": "abc"},
                {"type": "text", "text": "\"Bullish\"}"}
            ]
        });
        let res: CreateMessageResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(
            AnthropicClient::response_text(&res),
            "{\"strategy\":\n\"Bullish\"}"
        );
        assert!(AnthropicClient::response_tool_insight(&res).unwrap().is_none());
    }

    #[test]
    fn tool_schema_requires_every_field() {
        let tools = AnthropicClient::tools();
        let required = tools[0].input_schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 6);
        assert_eq!(tools[0].name, TOOL_NAME_EMIT_STRATEGY);
    }
}
