//! Chunk parsing for streamed chat completions.

use std::collections::VecDeque;
use std::fmt::Display;

use eventsource_stream::Eventsource;
use futures::stream::{self, Stream};
use futures::StreamExt;
use serde_json::Value;
use tracing::trace;

use showroom_tool_runtime::{EventStream, LlmError, StopReason, StreamEvent};

/// Decodes a raw SSE byte stream into [`StreamEvent`]s.
///
/// Event framing and UTF-8 decoding happen on the reassembled bytes, so a
/// character split across network chunks arrives intact.
pub(super) fn parse_event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    struct State<T> {
        events: T,
        parser: ChunkParser,
        pending: VecDeque<StreamEvent>,
        done: bool,
    }

    let state = State {
        events: bytes.eventsource().map(|r| r.map_err(|e| e.to_string())).boxed(),
        parser: ChunkParser::new(),
        pending: VecDeque::new(),
        done: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.events.next().await {
                Some(Ok(sse)) => {
                    let parsed = state.parser.parse_data(&sse.data);
                    state.pending.extend(parsed);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(LlmError::StreamError(e)), state));
                }
                None => {
                    let tail = state.parser.finish();
                    state.pending.extend(tail);
                    state.done = true;
                }
            }
        }
    });

    Box::pin(events)
}

/// Turns SSE `data` payloads into [`StreamEvent`]s.
///
/// Tool-call chunks are addressed by index; only the first chunk of a call
/// carries its id and name, so the parser remembers index → id.
#[derive(Debug, Default)]
pub(super) struct ChunkParser {
    calls: Vec<(u64, String)>,
    open: Vec<String>,
    saw_tool_calls: bool,
    ended: bool,
}

impl ChunkParser {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn parse_data(&mut self, data: &str) -> Vec<StreamEvent> {
        let data = data.trim();
        if data.is_empty() {
            return Vec::new();
        }
        if data == "[DONE]" {
            return self.finish();
        }
        match serde_json::from_str::<Value>(data) {
            Ok(chunk) => self.parse_chunk(&chunk),
            Err(e) => {
                trace!(error = %e, data, "ignoring unparseable chunk");
                Vec::new()
            }
        }
    }

    fn parse_chunk(&mut self, chunk: &Value) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(message) = chunk["error"]["message"].as_str() {
            events.push(StreamEvent::Error {
                message: message.to_string(),
            });
            return events;
        }

        let choice = &chunk["choices"][0];
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                events.push(StreamEvent::TextDelta {
                    text: text.to_string(),
                });
            }
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for (position, call) in tool_calls.iter().enumerate() {
                let index = call["index"].as_u64().unwrap_or(position as u64);
                let id = match self.calls.iter().find(|(i, _)| *i == index) {
                    Some((_, id)) => id.clone(),
                    None => {
                        let id = call["id"]
                            .as_str()
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .unwrap_or_else(|| format!("call_{index}"));
                        let name = call["function"]["name"].as_str().unwrap_or("").to_string();
                        self.calls.push((index, id.clone()));
                        self.open.push(id.clone());
                        self.saw_tool_calls = true;
                        events.push(StreamEvent::ToolCallStart {
                            id: id.clone(),
                            name,
                        });
                        id
                    }
                };
                if let Some(arguments) = call["function"]["arguments"].as_str() {
                    if !arguments.is_empty() {
                        events.push(StreamEvent::ToolCallDelta {
                            id,
                            arguments_delta: arguments.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(reason) = choice["finish_reason"].as_str() {
            let stop_reason = match reason {
                "tool_calls" | "function_call" => StopReason::ToolUse,
                "length" => StopReason::MaxTokens,
                "stop" if self.saw_tool_calls => StopReason::ToolUse,
                _ => StopReason::EndTurn,
            };
            events.extend(self.close_calls());
            events.push(StreamEvent::MessageEnd { stop_reason });
            self.ended = true;
        }

        events
    }

    fn close_calls(&mut self) -> Vec<StreamEvent> {
        self.open
            .drain(..)
            .map(|id| StreamEvent::ToolCallEnd { id })
            .collect()
    }

    /// End of the byte stream: close anything the server left open.
    pub(super) fn finish(&mut self) -> Vec<StreamEvent> {
        if self.ended {
            return Vec::new();
        }
        self.ended = true;
        let mut events = self.close_calls();
        events.push(StreamEvent::MessageEnd {
            stop_reason: if self.saw_tool_calls {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            },
        });
        events
    }
}
