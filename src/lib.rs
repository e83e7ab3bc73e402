//! Tool layer for a command-line coding agent.
//!
//! The agent loop hands one tool call at a time to a [`ToolDispatcher`]. The
//! dispatcher checks the whitelist, asks the [`PermissionGate`] about destructive
//! calls, and routes to the filesystem tools, the [`patch_editor`] engine, the
//! [`symbol_index`] definition lookup, or the interactive [`session_manager`].
//! Every handler failure is returned as a `success: false` [`ToolOutcome`]; an
//! operator denial is the single fatal error.
//!
//! # Public API Overview
//! - [`AgentConfig`] for defaults, settings files and environment overrides.
//! - [`ToolDispatcher`] for dispatching calls and emitting [`ToolEvent`]s.
//! - [`OperatorPrompt`] implementations: [`TerminalOperator`], [`ScriptedOperator`].
//! - [`init_logging`] to install a `tracing` subscriber.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod format;
pub mod fs_tools;
pub mod logging;
pub mod permission;
pub mod plan;
pub mod schema;
pub mod shell;
pub mod symbols;
pub mod workspace;

pub use crate::config::{AgentConfig, ConfigError};
pub use crate::dispatcher::ToolDispatcher;
pub use crate::error::{PermissionDenied, ToolError};
pub use crate::format::{format_tool_call, format_tool_result};
pub use crate::logging::{init_logging, LogConfig, LoggingError};
pub use crate::permission::{
    ApprovalChoice, OperatorPrompt, PermissionGate, PermissionPrompt, ScriptedOperator,
    TerminalOperator, Verdict,
};
pub use crate::plan::{PlanTask, Planner, TaskStatus};
pub use crate::schema::tool_definitions;
pub use crate::workspace::Workspace;

pub use tool_protocol::{
    EventSink, NullSink, RecordingSink, ToolCallRequest, ToolDefinition, ToolEvent, ToolOutcome,
};
