//! OpenAI-compatible chat-completions client.
//!
//! Speaks the chat completions wire contract (`POST {base}/chat/completions`)
//! with `stream: true`, which covers OpenAI itself plus the many backends
//! that mirror it. Streamed deltas are decoded into [`StreamEvent`]s; tool
//! call fragments keep their index so the engine can reassemble names and
//! argument strings that arrive split across chunks.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::sse::decode_sse;
use super::{ChatApi, ChatRequest, EventStream, LlmError, StreamEvent};

/// Total request timeout. Generous because it bounds the whole streamed body,
/// not just the first byte.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for one OpenAI-compatible chat-completions backend.
pub struct OpenAiChatClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self {
            base_url: {
                let url: String = base_url.into();
                url.trim_end_matches('/').to_string()
            },
            api_key,
            model: model.into(),
            http,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
            body["tool_choice"] = json!("auto");
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl ChatApi for OpenAiChatClient {
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, LlmError> {
        let url = self.completions_url();
        let body = self.build_body(&request);

        debug!(url = %url, model = %self.model, tools = request.tools.len(), "chat stream request");

        let mut builder = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(decode_sse(response, parse_completion_payload))
    }
}

/// Interpret one `data:` payload from a chat-completions stream.
fn parse_completion_payload(payload: &str) -> Vec<Result<StreamEvent, LlmError>> {
    if payload.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            finish_reason: Some("stop".into()),
        })];
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => return vec![Err(LlmError::Decode(e.to_string()))],
    };

    let Some(choice) = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        // Usage-only or housekeeping chunk; nothing to emit.
        return Vec::new();
    };

    let mut events = Vec::new();
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(calls) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for call in calls {
            let index = call.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            let function = call.get("function").unwrap_or(&Value::Null);
            let name = function
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            let arguments = function
                .get("arguments")
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            if id.is_some() || name.is_some() || arguments.is_some() {
                events.push(Ok(StreamEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                }));
            }
        }
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str())
        && !text.is_empty()
    {
        events.push(Ok(StreamEvent::TextDelta(text.to_owned())));
    }

    if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        events.push(Ok(StreamEvent::Done {
            finish_reason: Some(reason.to_owned()),
        }));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn text_events(payload: &str) -> Vec<StreamEvent> {
        parse_completion_payload(payload)
            .into_iter()
            .map(|e| e.expect("parse ok"))
            .collect()
    }

    #[test]
    fn done_sentinel_maps_to_done_event() {
        assert_eq!(
            text_events("[DONE]"),
            vec![StreamEvent::Done {
                finish_reason: Some("stop".into())
            }]
        );
    }

    #[test]
    fn content_delta_maps_to_text() {
        let payload = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(text_events(payload), vec![StreamEvent::TextDelta("Hel".into())]);
    }

    #[test]
    fn tool_call_fragments_keep_index_and_parts() {
        let payload = r#"{"choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"call_1","function":{"name":"Places","arguments":""}},
            {"index":1,"function":{"arguments":"{\"loc"}}
        ]}}]}"#;
        let events = text_events(payload);
        assert_eq!(
            events[0],
            StreamEvent::ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("Places".into()),
                arguments: Some(String::new()),
            }
        );
        assert_eq!(
            events[1],
            StreamEvent::ToolCallDelta {
                index: 1,
                id: None,
                name: None,
                arguments: Some("{\"loc".into()),
            }
        );
    }

    #[test]
    fn finish_reason_emits_done() {
        let payload = r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#;
        assert_eq!(
            text_events(payload),
            vec![StreamEvent::Done {
                finish_reason: Some("tool_calls".into())
            }]
        );
    }

    #[test]
    fn malformed_payload_surfaces_decode_error() {
        let events = parse_completion_payload("{not json");
        assert!(matches!(events[0], Err(LlmError::Decode(_))));
    }

    #[test]
    fn usage_only_chunk_is_silent() {
        let payload = r#"{"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        assert!(parse_completion_payload(payload).is_empty());
    }

    #[test]
    fn body_includes_tools_only_when_present() {
        let client = OpenAiChatClient::new("https://api.example.com/v1", None, "gpt-4o");
        let bare = client.build_body(&ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        });
        assert!(bare.get("tools").is_none());
        assert!(bare.get("tool_choice").is_none());

        let with_tools = client.build_body(&ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            tools: vec![json!({"type":"function"})],
            temperature: Some(0.3),
        });
        assert_eq!(with_tools["tool_choice"], "auto");
        assert_eq!(with_tools["temperature"], 0.3);
    }
}
