use futures::StreamExt;
use serde_json::json;

use showroom_tool_runtime::{
    AssistantContent, ConversationMessage, ModelRequest, ResponseAccumulator, StopReason,
    StreamEvent, ToolAwareLlmProvider, ToolCall, ToolDefinition, ToolResult,
};

use super::sse::{parse_event_stream, ChunkParser};
use super::translate::{build_messages, message_to_openai, tool_definition_to_openai};
use super::OpenAiCompatProvider;

fn parse_all(parser: &mut ChunkParser, payloads: &[&str]) -> Vec<StreamEvent> {
    payloads.iter().flat_map(|d| parser.parse_data(d)).collect()
}

async fn collect_stream(chunks: Vec<Vec<u8>>) -> Vec<StreamEvent> {
    let bytes = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
    let mut events = Vec::new();
    let mut stream = parse_event_stream(bytes);
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    events
}

// ── Translation ─────────────────────────────────────────────────

#[test]
fn test_tool_definition_shape() {
    let def = ToolDefinition {
        name: "placeOrderTool".into(),
        description: "下单".into(),
        input_schema: json!({"type": "object"}),
    };
    let value = tool_definition_to_openai(&def);
    assert_eq!(value["type"], "function");
    assert_eq!(value["function"]["name"], "placeOrderTool");
    assert_eq!(value["function"]["parameters"]["type"], "object");
}

#[test]
fn test_assistant_tool_calls_encode_arguments_as_string() {
    let msg = ConversationMessage::Assistant(AssistantContent {
        text: None,
        tool_calls: vec![ToolCall {
            id: "call_1".into(),
            name: "placeOrderTool".into(),
            input: json!({"orderInfo": "奥迪A4L"}),
        }],
    });
    let value = message_to_openai(&msg);
    assert_eq!(value["role"], "assistant");
    assert!(value["content"].is_null());
    let call = &value["tool_calls"][0];
    assert_eq!(call["id"], "call_1");
    let args: serde_json::Value =
        serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(args["orderInfo"], "奥迪A4L");
}

#[test]
fn test_tool_result_and_system_prompt() {
    let messages = vec![
        ConversationMessage::User("hi".into()),
        ConversationMessage::ToolResult(ToolResult {
            tool_call_id: "call_1".into(),
            content: "ok".into(),
            is_error: false,
        }),
    ];
    let out = build_messages(Some("你是销售经理"), &messages);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0]["role"], "system");
    assert_eq!(out[2]["role"], "tool");
    assert_eq!(out[2]["tool_call_id"], "call_1");

    assert_eq!(build_messages(None, &messages).len(), 2);
}

#[test]
fn test_request_body_includes_tools_and_stream_flag() {
    let provider = OpenAiCompatProvider::new("k".into(), "qwen3-max".into(), "http://localhost/v1".into());
    let request = ModelRequest {
        messages: vec![ConversationMessage::User("hi".into())],
        system_prompt: None,
        tools: vec![ToolDefinition {
            name: "carBrandTool".into(),
            description: "brands".into(),
            input_schema: json!({"type": "object"}),
        }],
        temperature: 0.5,
        max_tokens: 2000,
    };
    let body = provider.request_body(&request);
    assert_eq!(body["model"], "qwen3-max");
    assert_eq!(body["stream"], true);
    assert_eq!(body["tools"].as_array().unwrap().len(), 1);
    assert_eq!(provider.provider_name(), "openai");
}

// ── Chunk parsing ───────────────────────────────────────────────

#[test]
fn test_text_stream() {
    let mut parser = ChunkParser::new();
    let events = parse_all(
        &mut parser,
        &[
            r#"{"choices":[{"delta":{"role":"assistant","content":"您"}}]}"#,
            "",
            r#"{"choices":[{"delta":{"content":"好"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ],
    );
    assert_eq!(
        events,
        vec![
            StreamEvent::TextDelta { text: "您".into() },
            StreamEvent::TextDelta { text: "好".into() },
            StreamEvent::MessageEnd {
                stop_reason: StopReason::EndTurn
            },
        ]
    );
}

#[test]
fn test_tool_call_fragments_accumulate() {
    let mut parser = ChunkParser::new();
    let events = parse_all(
        &mut parser,
        &[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"placeOrderTool","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"orderInfo\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"X\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ],
    );

    let mut acc = ResponseAccumulator::new();
    for event in &events {
        acc.push(event);
    }
    assert_eq!(acc.stop_reason(), Some(StopReason::ToolUse));
    let content = acc.finish();
    assert_eq!(content.tool_calls.len(), 1);
    assert_eq!(content.tool_calls[0].id, "call_1");
    assert_eq!(content.tool_calls[0].input, json!({"orderInfo": "X"}));
}

#[test]
fn test_stream_without_finish_reason_is_closed() {
    let mut parser = ChunkParser::new();
    let mut events = parse_all(
        &mut parser,
        &[r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c9","function":{"name":"carBrandTool","arguments":"{}"}}]}}]}"#],
    );
    events.extend(parser.finish());
    assert!(events.contains(&StreamEvent::ToolCallEnd { id: "c9".into() }));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::MessageEnd {
            stop_reason: StopReason::ToolUse
        })
    );
    assert!(parser.finish().is_empty());
}

#[test]
fn test_error_chunk_and_noise() {
    let mut parser = ChunkParser::new();
    let events = parse_all(
        &mut parser,
        &[
            "",
            "not json",
            r#"{"error":{"message":"quota exceeded"}}"#,
        ],
    );
    assert_eq!(
        events,
        vec![StreamEvent::Error {
            message: "quota exceeded".into()
        }]
    );
}

// ── Byte stream ─────────────────────────────────────────────────

#[tokio::test]
async fn test_multibyte_char_split_across_chunks() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"奥迪\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    )
    .as_bytes();
    // "奥" is three bytes; cut after its first byte.
    let cut = body.iter().position(|&b| b == 0xE5).unwrap() + 1;
    let events = collect_stream(vec![body[..cut].to_vec(), body[cut..].to_vec()]).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::TextDelta { text: "奥迪".into() },
            StreamEvent::MessageEnd {
                stop_reason: StopReason::EndTurn
            },
        ]
    );
}

#[tokio::test]
async fn test_comments_skipped_and_unterminated_stream_closed() {
    let body = concat!(
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"carBrandTool\",\"arguments\":\"{}\"}}]}}]}\n\n",
    );
    let events = collect_stream(vec![body.as_bytes().to_vec()]).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::ToolCallStart {
                id: "c1".into(),
                name: "carBrandTool".into()
            },
            StreamEvent::ToolCallDelta {
                id: "c1".into(),
                arguments_delta: "{}".into()
            },
            StreamEvent::ToolCallEnd { id: "c1".into() },
            StreamEvent::MessageEnd {
                stop_reason: StopReason::ToolUse
            },
        ]
    );
}
