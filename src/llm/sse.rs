//! Server-sent-events decoding for streaming model responses.
//!
//! Chat-completion backends stream generations as SSE: events separated by a
//! blank line, payloads on `data:` lines, and a `[DONE]` sentinel at the end.
//! This module turns a `reqwest::Response` body into an [`EventStream`],
//! delegating per-payload interpretation to a backend-specific parser.

use super::{EventStream, LlmError, StreamEvent};

/// Pull every complete `data:` payload out of the buffer, leaving any
/// trailing partial event in place for the next network chunk.
pub(crate) fn take_data_payloads(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(boundary) = buffer.find("\n\n") {
        let event: String = buffer.drain(..boundary + 2).collect();
        for line in event.lines() {
            // Only `data:` lines matter; `event:`/`id:`/`retry:` are skipped.
            if let Some(payload) = line.trim_start().strip_prefix("data:") {
                let payload = payload.trim();
                if !payload.is_empty() {
                    payloads.push(payload.to_owned());
                }
            }
        }
    }

    payloads
}

/// Adapt a streaming HTTP response into an [`EventStream`].
///
/// `parse` maps one `data:` payload to zero or more events; it is `FnMut` so
/// parsers may keep state across payloads. The adapter guarantees a trailing
/// `Done` event even when the backend closes the body without a sentinel.
pub(crate) fn decode_sse<F>(response: reqwest::Response, mut parse: F) -> EventStream
where
    F: FnMut(&str) -> Vec<Result<StreamEvent, LlmError>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut finished = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for payload in take_data_payloads(&mut buffer) {
                        for event in parse(&payload) {
                            finished |= matches!(event, Ok(StreamEvent::Done { .. }));
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    // Body closed; flush a possible final event missing the
                    // trailing blank line.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for payload in take_data_payloads(&mut buffer) {
                            for event in parse(&payload) {
                                finished |= matches!(event, Ok(StreamEvent::Done { .. }));
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(LlmError::Stream(e.to_string()));
                    break;
                }
            }
        }

        if !finished {
            yield Ok(StreamEvent::Done { finish_reason: None });
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event_is_extracted() {
        let mut buffer = String::from("data: {\"a\":1}\n\n");
        assert_eq!(take_data_payloads(&mut buffer), vec!["{\"a\":1}"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut buffer = String::from("data: one\n\ndata: two\n\n");
        assert_eq!(take_data_payloads(&mut buffer), vec!["one", "two"]);
    }

    #[test]
    fn partial_event_waits_for_more_data() {
        let mut buffer = String::from("data: whole\n\ndata: par");
        assert_eq!(take_data_payloads(&mut buffer), vec!["whole"]);
        assert_eq!(buffer, "data: par");

        buffer.push_str("tial\n\n");
        assert_eq!(take_data_payloads(&mut buffer), vec!["partial"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let mut buffer = String::from("event: delta\nid: 3\ndata: payload\n\n");
        assert_eq!(take_data_payloads(&mut buffer), vec!["payload"]);
    }

    #[test]
    fn empty_data_lines_are_dropped() {
        let mut buffer = String::from("data:\n\ndata:   \n\n");
        assert!(take_data_payloads(&mut buffer).is_empty());
    }

    #[test]
    fn done_sentinel_passes_through_verbatim() {
        let mut buffer = String::from("data: [DONE]\n\n");
        assert_eq!(take_data_payloads(&mut buffer), vec!["[DONE]"]);
    }
}
