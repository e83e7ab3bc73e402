use serde_json::json;
use tool_protocol::{EventSink, RecordingSink, ToolCallRequest, ToolDefinition, ToolEvent};

#[test]
fn malformed_raw_arguments_degrade_to_empty_object() {
    let request = ToolCallRequest::from_raw_arguments("call-1", "read_file", "{not json");
    assert_eq!(request.arguments, json!({}));

    let non_object = ToolCallRequest::from_raw_arguments("call-2", "read_file", "[1, 2]");
    assert_eq!(non_object.arguments, json!({}));

    let parsed = ToolCallRequest::from_raw_arguments("call-3", "read_file", r#"{"path":"a.txt"}"#);
    assert_eq!(parsed.arguments, json!({"path": "a.txt"}));
}

#[test]
fn request_without_arguments_deserializes_to_empty_object() {
    let request: ToolCallRequest =
        serde_json::from_str(r#"{"call_id":"c","name":"session_list"}"#).expect("parse request");
    assert_eq!(request.arguments, json!({}));
}

#[test]
fn events_serialize_with_type_tag() {
    let event = ToolEvent::Reminder {
        text: "WARNING".to_string(),
    };
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value, json!({"type": "reminder", "text": "WARNING"}));
    assert_eq!(event.call_id(), None);
}

#[test]
fn recording_sink_clones_share_one_log() {
    let sink = RecordingSink::new();
    let mut writer = sink.clone();
    writer.emit(ToolEvent::Completed {
        call_id: "c1".to_string(),
        name: "plan".to_string(),
        success: true,
        result: "ok".to_string(),
        formatted: "ok".to_string(),
    });

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].call_id(), Some("c1"));
}

#[test]
fn definitions_render_function_schema() {
    let definition = ToolDefinition {
        name: "file_hash".to_string(),
        description: "Hash a file".to_string(),
        input_schema: json!({"type": "object"}),
    };

    assert_eq!(
        definition.to_function_schema(),
        json!({
            "type": "function",
            "function": {
                "name": "file_hash",
                "description": "Hash a file",
                "parameters": {"type": "object"},
            }
        })
    );
}
