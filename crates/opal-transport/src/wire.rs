//! Wire frame model for the named-event protocol.
//!
//! Every message on the socket is one JSON frame: an event name, an optional
//! correlation id, and an arbitrary payload. Requests carry a
//! caller-generated correlation id; the backend echoes it on the matching
//! success or error event so responses are matched strictly by id, never by
//! "next event of this name".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound request event names.
pub mod events {
    /// Optimize a single prompt.
    pub const OPTIMIZE_PROMPT: &str = "optimize_prompt";
    /// Analyze user intent.
    pub const ANALYZE_INTENT: &str = "analyze_intent";
    /// Search the prompt library.
    pub const SEARCH_PROMPTS: &str = "search_prompts";
    /// Fire-and-forget typing notification.
    pub const TYPING: &str = "typing";

    /// Inbound push: someone else is typing.
    pub const TYPING_INDICATOR: &str = "typing_indicator";
    /// Inbound push: live suggestion update.
    pub const SUGGESTION_UPDATE: &str = "suggestion_update";

    pub const PROMPT_OPTIMIZED: &str = "prompt_optimized";
    pub const OPTIMIZATION_ERROR: &str = "optimization_error";
    pub const INTENT_ANALYZED: &str = "intent_analyzed";
    pub const INTENT_ANALYSIS_ERROR: &str = "intent_analysis_error";
    pub const SEARCH_RESULTS: &str = "search_results";
    pub const SEARCH_ERROR: &str = "search_error";
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Correlation id linking a response to its request. Absent on push
    /// events and fire-and-forget notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    /// Creates a frame without a correlation id.
    pub fn push(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            correlation_id: None,
            payload,
        }
    }

    /// Creates a request frame with the given correlation id.
    pub fn request(event: impl Into<String>, correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            correlation_id: Some(correlation_id.into()),
            payload,
        }
    }
}

/// The (success, error) response events for a request event.
///
/// Returns `None` for events that have no correlated response.
pub fn response_events(event: &str) -> Option<(&'static str, &'static str)> {
    match event {
        events::OPTIMIZE_PROMPT => Some((events::PROMPT_OPTIMIZED, events::OPTIMIZATION_ERROR)),
        events::ANALYZE_INTENT => Some((events::INTENT_ANALYZED, events::INTENT_ANALYSIS_ERROR)),
        events::SEARCH_PROMPTS => Some((events::SEARCH_RESULTS, events::SEARCH_ERROR)),
        _ => None,
    }
}

/// Advisory client-side latency target for a request event, in milliseconds.
///
/// Exceeding the target logs a warning; it never fails the call.
pub fn soft_latency_target_ms(event: &str) -> Option<u64> {
    match event {
        events::OPTIMIZE_PROMPT => Some(50),
        events::ANALYZE_INTENT => Some(75),
        events::SEARCH_PROMPTS => Some(100),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_round_trip() {
        let frame = Frame::request(events::OPTIMIZE_PROMPT, "c-1", json!({"prompt": "hi"}));
        let line = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&line).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_push_frame_omits_correlation_id() {
        let frame = Frame::push(events::TYPING, json!({}));
        let line = serde_json::to_string(&frame).unwrap();
        assert!(!line.contains("correlation_id"));
    }

    #[test]
    fn test_response_event_pairs() {
        assert_eq!(
            response_events(events::SEARCH_PROMPTS),
            Some((events::SEARCH_RESULTS, events::SEARCH_ERROR))
        );
        assert_eq!(response_events(events::TYPING), None);
    }

    #[test]
    fn test_soft_targets() {
        assert_eq!(soft_latency_target_ms(events::OPTIMIZE_PROMPT), Some(50));
        assert_eq!(soft_latency_target_ms(events::ANALYZE_INTENT), Some(75));
        assert_eq!(soft_latency_target_ms(events::SEARCH_PROMPTS), Some(100));
    }
}
