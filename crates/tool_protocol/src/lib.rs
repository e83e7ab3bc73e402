//! Provider-neutral contract between an agent loop and the host tool layer.
//!
//! This crate only defines the shapes that cross the boundary: the tool-call
//! request handed to the dispatcher, the uniform result handed back, the tool
//! definitions advertised to the model, and the events emitted around each call.
//! Framing and transport belong to the caller.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Builds a request from the raw JSON argument string a chat-completion API returns.
    ///
    /// Malformed argument text degrades to an empty object so the tool handler can
    /// report the missing fields itself.
    #[must_use]
    pub fn from_raw_arguments(
        call_id: impl Into<String>,
        name: impl Into<String>,
        raw_arguments: &str,
    ) -> Self {
        let arguments = serde_json::from_str::<Value>(raw_arguments)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(empty_arguments);
        Self::new(call_id, name, arguments)
    }
}

fn empty_arguments() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Uniform result of one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    /// Raw result (or error message) returned to the model.
    pub result: String,
    /// Short human-readable summary for the operator.
    pub formatted: String,
}

impl ToolOutcome {
    #[must_use]
    pub fn ok(result: impl Into<String>, formatted: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
            formatted: formatted.into(),
        }
    }

    #[must_use]
    pub fn fail(result: impl Into<String>, formatted: impl Into<String>) -> Self {
        Self {
            success: false,
            result: result.into(),
            formatted: formatted.into(),
        }
    }
}

/// Host tool definition advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Renders the definition in the chat-completions `tools` array shape.
    #[must_use]
    pub fn to_function_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

/// Event emitted by the dispatcher around tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEvent {
    Issued {
        call_id: String,
        name: String,
        arguments: Value,
        formatted: String,
    },
    Completed {
        call_id: String,
        name: String,
        success: bool,
        result: String,
        formatted: String,
    },
    /// Warning about incomplete background state, such as an unfinished plan.
    Reminder { text: String },
}

impl ToolEvent {
    /// Returns the tool call identifier, when the event belongs to a call.
    #[must_use]
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::Issued { call_id, .. } | Self::Completed { call_id, .. } => Some(call_id),
            Self::Reminder { .. } => None,
        }
    }
}

/// Receiver of dispatcher events. Serialization is up to the implementor.
pub trait EventSink: Send {
    fn emit(&mut self, event: ToolEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: ToolEvent) {}
}

/// Sink that records events into a shared vector; cloning shares the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ToolEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ToolEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: ToolEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
