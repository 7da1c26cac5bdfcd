//! Backend-backed stage executor.
//!
//! Maps pipeline stage types onto correlated broker calls: Evaluate stages
//! go through intent analysis, all other stage types through prompt
//! optimization. The per-stage timeout comes from the stage's own settings.

use async_trait::async_trait;
use opal_core::error::{OpalError, Result};
use opal_core::pipeline::{Stage, StageExecutor, StageOutput, StageType, TokenUsage};
use opal_transport::{RequestBroker, events};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Executes stages against the live backend through the request broker.
pub struct BrokerStageExecutor {
    broker: Arc<RequestBroker>,
}

impl BrokerStageExecutor {
    pub fn new(broker: Arc<RequestBroker>) -> Self {
        Self { broker }
    }
}

fn event_for(stage_type: StageType) -> &'static str {
    match stage_type {
        StageType::Evaluate => events::ANALYZE_INTENT,
        StageType::Expand | StageType::Constrain | StageType::Compare => events::OPTIMIZE_PROMPT,
    }
}

fn mode_for(stage_type: StageType) -> &'static str {
    match stage_type {
        StageType::Expand => "expand",
        StageType::Constrain => "constrain",
        StageType::Evaluate => "evaluate",
        StageType::Compare => "compare",
    }
}

/// Extracts the stage output from a response payload.
///
/// The optimize path answers with `optimized_prompt`, the intent path with
/// `analysis`; a plain `output` field is accepted from either.
pub(crate) fn parse_stage_output(stage: &Stage, payload: &Value) -> Result<StageOutput> {
    let output = ["optimized_prompt", "analysis", "output"]
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_str))
        .ok_or_else(|| {
            OpalError::stage(&stage.name, "response payload carried no output text")
        })?
        .to_string();

    let cost = payload.get("cost").and_then(Value::as_f64).unwrap_or(0.0);
    let token_usage = payload
        .get("token_usage")
        .cloned()
        .map(serde_json::from_value::<TokenUsage>)
        .transpose()?
        .unwrap_or_default();

    Ok(StageOutput {
        output,
        cost,
        token_usage,
    })
}

#[async_trait]
impl StageExecutor for BrokerStageExecutor {
    async fn execute(&self, stage: &Stage, input: &str) -> Result<StageOutput> {
        let event = event_for(stage.stage_type);
        let payload = json!({
            "prompt": input,
            "mode": mode_for(stage.stage_type),
            "model": stage.settings.model,
            "temperature": stage.settings.temperature,
            "max_tokens": stage.settings.max_tokens,
        });
        let timeout = Duration::from_secs(u64::from(stage.settings.timeout_seconds));

        let response = self.broker.call(event, payload, timeout).await?;
        parse_stage_output(stage, &response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_mapping() {
        assert_eq!(event_for(StageType::Expand), events::OPTIMIZE_PROMPT);
        assert_eq!(event_for(StageType::Constrain), events::OPTIMIZE_PROMPT);
        assert_eq!(event_for(StageType::Compare), events::OPTIMIZE_PROMPT);
        assert_eq!(event_for(StageType::Evaluate), events::ANALYZE_INTENT);
    }

    #[test]
    fn test_parse_optimize_payload() {
        let stage = Stage::new("expand", StageType::Expand, 1);
        let payload = json!({
            "optimized_prompt": "better prompt",
            "cost": 0.02,
            "token_usage": { "input_tokens": 12, "output_tokens": 34 }
        });

        let output = parse_stage_output(&stage, &payload).unwrap();
        assert_eq!(output.output, "better prompt");
        assert_eq!(output.cost, 0.02);
        assert_eq!(output.token_usage.total(), 46);
    }

    #[test]
    fn test_parse_analysis_payload_with_defaults() {
        let stage = Stage::new("evaluate", StageType::Evaluate, 1);
        let payload = json!({ "analysis": "the prompt is vague" });

        let output = parse_stage_output(&stage, &payload).unwrap();
        assert_eq!(output.output, "the prompt is vague");
        assert_eq!(output.cost, 0.0);
        assert_eq!(output.token_usage, TokenUsage::default());
    }

    #[test]
    fn test_parse_rejects_missing_output() {
        let stage = Stage::new("expand", StageType::Expand, 1);
        let err = parse_stage_output(&stage, &json!({ "cost": 0.1 })).unwrap_err();
        assert!(err.is_stage());
    }
}
