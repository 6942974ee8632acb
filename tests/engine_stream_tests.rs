//! Streaming response engine tests.
//!
//! The engine is exercised against scripted model streams so every state
//! transition is deterministic: plain text cycles, tool-call cycles with
//! fragmented names/arguments, and mid-stream faults. Tool dispatches land
//! on a wiremock CRM backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxrelay::backend::{CallerIdentity, CrmClient};
use voxrelay::llm::engine::GENERATION_APOLOGY;
use voxrelay::llm::{
    ChatApi, ChatRequest, EventStream, LlmError, ResponseEngine, ResponseFrame, Role, StreamEvent,
};
use voxrelay::session::{InteractionKind, InteractionRequest, PromptContext};
use voxrelay::tools::{PlacesClient, PropertyClient, ToolCache, ToolInvoker};

/// A model backend that replays pre-scripted event streams and records every
/// request it saw.
struct ScriptedChat {
    passes: Mutex<VecDeque<Vec<Result<StreamEvent, LlmError>>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    fn new(passes: Vec<Vec<Result<StreamEvent, LlmError>>>) -> Arc<Self> {
        Arc::new(Self {
            passes: Mutex::new(passes.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatApi for ScriptedChat {
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        let events = self
            .passes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Request("script exhausted".into()))?;
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

fn invoker_against(crm_url: &str) -> Arc<ToolInvoker> {
    Arc::new(ToolInvoker::new(
        Arc::new(CrmClient::new(crm_url)),
        PlacesClient::new("http://127.0.0.1:1", None),
        PropertyClient::new("http://127.0.0.1:1", "http://127.0.0.1:1", None),
        ToolCache::disabled(),
    ))
}

fn request(response_id: u64) -> InteractionRequest {
    InteractionRequest {
        kind: InteractionKind::ResponseRequired,
        response_id,
        transcript: vec![],
    }
}

async fn collect_frames(engine: &ResponseEngine, response_id: u64) -> Vec<ResponseFrame> {
    engine
        .draft_response(request(response_id), PromptContext::default(), CallerIdentity::default())
        .collect()
        .await
}

fn text(delta: &str) -> Result<StreamEvent, LlmError> {
    Ok(StreamEvent::TextDelta(delta.to_string()))
}

fn done() -> Result<StreamEvent, LlmError> {
    Ok(StreamEvent::Done {
        finish_reason: Some("stop".into()),
    })
}

fn tool_delta(
    index: usize,
    id: Option<&str>,
    name: Option<&str>,
    arguments: Option<&str>,
) -> Result<StreamEvent, LlmError> {
    Ok(StreamEvent::ToolCallDelta {
        index,
        id: id.map(str::to_owned),
        name: name.map(str::to_owned),
        arguments: arguments.map(str::to_owned),
    })
}

#[tokio::test]
async fn plain_text_cycle_streams_deltas_then_one_complete_frame() {
    let chat = ScriptedChat::new(vec![vec![text("Hel"), text("lo"), done()]]);
    let engine = ResponseEngine::new(chat.clone(), invoker_against("http://127.0.0.1:1"), "Ava".into());

    let frames = collect_frames(&engine, 3).await;

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], ResponseFrame::delta(3, "Hel"));
    assert_eq!(frames[1], ResponseFrame::delta(3, "lo"));
    assert_eq!(frames[2], ResponseFrame::finished(3));

    // Exactly one complete frame, and it is last.
    assert_eq!(frames.iter().filter(|f| f.content_complete).count(), 1);

    // The first pass offered tools at the configured temperature.
    let requests = chat.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tools.len(), 5);
    assert_eq!(requests[0].temperature, Some(0.3));
}

#[tokio::test]
async fn fragmented_tool_call_is_reassembled_and_dispatched() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/book_appointment"))
        .and(body_partial_json(json!({
            "lead_name": "Sam Lee",
            "start_time": "2026-08-06T14:00:00",
            "user_id": "42",
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"message": "booked"})))
        .expect(1)
        .mount(&crm)
        .await;

    // Name and argument string both arrive split across deltas.
    let chat = ScriptedChat::new(vec![
        vec![
            tool_delta(0, Some("call_1"), Some("Booking"), Some("")),
            tool_delta(0, None, Some("Request"), Some("{\"lead_name\":\"Sam")),
            tool_delta(0, None, None, Some(" Lee\",\"start_time\":")),
            tool_delta(0, None, None, Some("\"2026-08-06T14:00:00\"}")),
            done(),
        ],
        vec![text("You're booked for two."), done()],
    ]);
    let engine = ResponseEngine::new(chat.clone(), invoker_against(&crm.uri()), "Ava".into());

    let frames = engine
        .draft_response(
            request(5),
            PromptContext::default(),
            CallerIdentity {
                user_id: Some("42".into()),
                lead_id: None,
            },
        )
        .collect::<Vec<_>>()
        .await;

    // Filler first, then the follow-up wording, then the terminal frame.
    assert!(frames.len() >= 3);
    assert!(!frames[0].content.is_empty(), "filler frame must carry text");
    assert!(!frames[0].content_complete);
    assert!(frames.iter().any(|f| f.content == "You're booked for two."));
    assert_eq!(frames.last().unwrap(), &ResponseFrame::finished(5));
    assert_eq!(frames.iter().filter(|f| f.content_complete).count(), 1);

    // Follow-up pass: no tools, and one tool-role result per call id.
    let requests = chat.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].tools.is_empty());
    let tool_messages: Vec<_> = requests[1]
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 1);
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_messages[0].content.contains("scheduled"));
}

#[tokio::test]
async fn failing_tool_yields_error_payload_and_cycle_continues() {
    // Unknown tool name: the call itself errors but the turn still finishes.
    let chat = ScriptedChat::new(vec![
        vec![
            tool_delta(0, Some("call_1"), Some("TimeTravel"), Some("{}")),
            done(),
        ],
        vec![text("I couldn't do that."), done()],
    ]);
    let engine = ResponseEngine::new(chat.clone(), invoker_against("http://127.0.0.1:1"), "Ava".into());

    let frames = collect_frames(&engine, 6).await;
    assert_eq!(frames.last().unwrap(), &ResponseFrame::finished(6));

    let requests = chat.recorded_requests();
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result present even on failure");
    assert!(tool_message.content.contains("error"));
    assert!(tool_message.content.contains("unknown tool"));
}

#[tokio::test]
async fn one_failed_tool_does_not_abort_the_others() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send_message"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"message": "queued"})))
        .expect(1)
        .mount(&crm)
        .await;

    let chat = ScriptedChat::new(vec![
        vec![
            tool_delta(0, Some("call_1"), Some("Nonexistent"), Some("{}")),
            tool_delta(
                1,
                Some("call_2"),
                Some("MessageRequest"),
                Some(r#"{"lead_name":"Sam","message_type":"SMS","message_content":"hi"}"#),
            ),
            done(),
        ],
        vec![text("Done."), done()],
    ]);
    let engine = ResponseEngine::new(chat.clone(), invoker_against(&crm.uri()), "Ava".into());

    let frames = collect_frames(&engine, 7).await;
    assert_eq!(frames.last().unwrap(), &ResponseFrame::finished(7));

    // Both calls produced exactly one result entry each.
    let requests = chat.recorded_requests();
    let tool_messages: Vec<_> = requests[1]
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert!(tool_messages[0].content.contains("error"));
    assert!(tool_messages[1].content.contains("accepted"));
}

#[tokio::test]
async fn mid_stream_fault_collapses_into_one_apologetic_complete_frame() {
    let chat = ScriptedChat::new(vec![vec![
        text("Let me think"),
        Err(LlmError::Stream("connection reset".into())),
    ]]);
    let engine = ResponseEngine::new(chat, invoker_against("http://127.0.0.1:1"), "Ava".into());

    let frames = collect_frames(&engine, 8).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], ResponseFrame::delta(8, "Let me think"));
    let last = frames.last().unwrap();
    assert!(last.content_complete);
    assert_eq!(last.content, GENERATION_APOLOGY);
}

#[tokio::test]
async fn failed_model_call_yields_single_apology() {
    // Empty script: the first chat_stream call itself fails.
    let chat = ScriptedChat::new(vec![]);
    let engine = ResponseEngine::new(chat, invoker_against("http://127.0.0.1:1"), "Ava".into());

    let frames = collect_frames(&engine, 9).await;
    assert_eq!(frames.len(), 1);
    assert!(frames[0].content_complete);
    assert_eq!(frames[0].content, GENERATION_APOLOGY);
}

#[tokio::test]
async fn failed_followup_still_terminates_with_one_complete_frame() {
    // First pass requests a tool; the follow-up call fails (script exhausted).
    let chat = ScriptedChat::new(vec![vec![
        tool_delta(0, Some("call_1"), Some("Whatever"), Some("{}")),
        done(),
    ]]);
    let engine = ResponseEngine::new(chat, invoker_against("http://127.0.0.1:1"), "Ava".into());

    let frames = collect_frames(&engine, 10).await;
    assert_eq!(frames.iter().filter(|f| f.content_complete).count(), 1);
    assert_eq!(frames.last().unwrap().content, GENERATION_APOLOGY);
}
