use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use session_manager::{SessionRegistry, SessionSnapshot};
use tool_protocol::{EventSink, ToolCallRequest, ToolDefinition, ToolEvent, ToolOutcome};
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::error::{PermissionDenied, ToolError};
use crate::format::{format_tool_call, format_tool_result, NO_SESSIONS};
use crate::fs_tools::{
    self, CreateFileArgs, DeletePathArgs, EditFileArgs, ListDirectoryArgs, PathArgs,
    ReadFileArgs, SearchArgs,
};
use crate::permission::{OperatorPrompt, PermissionGate, Verdict};
use crate::plan::{PlanArgs, Planner};
use crate::schema::{self, tool_definitions};
use crate::shell::{self, RunCommandArgs};
use crate::symbols::{self, SearchSymbolArgs, SymbolFilterArgs};
use crate::workspace::Workspace;

/// Upper bound for one `session_read` wait.
pub const MAX_SESSION_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const SESSION_EOF_MARKER: &str = "[session output closed]";

#[derive(Debug, Deserialize)]
struct SessionCreateArgs {
    command: String,
    #[serde(default)]
    shell: bool,
}

#[derive(Debug, Deserialize)]
struct SessionSendArgs {
    id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct SessionReadArgs {
    id: String,
    #[serde(default)]
    timeout_sec: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SessionIdArgs {
    id: String,
}

/// Composition root of the tool layer.
///
/// Each call is checked against the whitelist, then the permission gate, then
/// routed to its handler. Handler failures come back as `success: false`
/// outcomes; only an operator denial escapes as an error.
pub struct ToolDispatcher {
    config: AgentConfig,
    workspace: Workspace,
    gate: PermissionGate,
    sessions: SessionRegistry,
    planner: Planner,
    sink: Box<dyn EventSink>,
    next_call: u64,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("workspace", &self.workspace)
            .field("gate", &self.gate)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    pub fn new(
        config: AgentConfig,
        operator: Box<dyn OperatorPrompt>,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, ToolError> {
        let workspace = Workspace::new(&config.workspace_root)?;
        let sessions =
            SessionRegistry::new(config.registry_config(Some(workspace.root().to_path_buf())))?;
        let gate = PermissionGate::new(config.bypass_destructive_approval, operator);

        info!(
            workspace = %workspace.root().display(),
            bypass = config.bypass_destructive_approval,
            max_sessions = config.max_sessions,
            "tool dispatcher ready"
        );

        Ok(Self {
            config,
            workspace,
            gate,
            sessions,
            planner: Planner::new(),
            sink,
            next_call: 0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[must_use]
    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Definitions of every tool this dispatcher will accept.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions(&self.config.effective_whitelist())
    }

    /// Convenience wrapper around [`Self::dispatch`] that assigns a call id.
    pub fn call(&mut self, name: &str, arguments: Value) -> Result<ToolOutcome, PermissionDenied> {
        self.next_call += 1;
        let request = ToolCallRequest::new(format!("call-{}", self.next_call), name, arguments);
        self.dispatch(&request)
    }

    pub fn dispatch(&mut self, request: &ToolCallRequest) -> Result<ToolOutcome, PermissionDenied> {
        let name = request.name.as_str();
        let arguments = &request.arguments;

        self.sink.emit(ToolEvent::Issued {
            call_id: request.call_id.clone(),
            name: name.to_string(),
            arguments: arguments.clone(),
            formatted: format_tool_call(name, arguments),
        });

        let result = match self.admit(name) {
            Ok(()) => match self.gate.check(name, arguments) {
                Verdict::Allow => self.execute(name, arguments),
                Verdict::DenyTerminate => {
                    let denied = PermissionDenied {
                        tool: name.to_string(),
                    };
                    self.complete(request, false, denied.to_string());
                    return Err(denied);
                }
            },
            Err(error) => Err(error),
        };

        let outcome = match result {
            Ok(output) => self.complete(request, true, output),
            Err(error) => {
                debug!(tool = name, %error, "tool call failed");
                self.complete(request, false, error.to_string())
            }
        };
        Ok(outcome)
    }

    /// Current plan reminder, if any.
    #[must_use]
    pub fn plan_reminder(&self) -> Option<String> {
        self.planner.reminder()
    }

    /// Pushes the plan reminder, if any, through the event sink.
    pub fn emit_plan_reminder(&mut self) -> Option<String> {
        let text = self.planner.reminder()?;
        self.sink.emit(ToolEvent::Reminder { text: text.clone() });
        Some(text)
    }

    /// Forgets approvals and the plan, and closes every session, for a new
    /// conversation.
    pub fn start_conversation(&mut self) {
        self.gate.reset();
        self.planner = Planner::new();
        self.sessions.close_all();
    }

    /// Closes every live session and stops the reaper.
    pub fn shutdown(&mut self) {
        self.sessions.shutdown();
    }

    fn admit(&self, name: &str) -> Result<(), ToolError> {
        if !self.config.is_whitelisted(name) {
            return Err(ToolError::NotWhitelisted {
                name: name.to_string(),
            });
        }
        if !schema::is_builtin(name) {
            return Err(ToolError::UnknownTool {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn complete(&mut self, request: &ToolCallRequest, success: bool, result: String) -> ToolOutcome {
        let formatted = format_tool_result(&request.name, success, &result, &request.arguments);
        self.sink.emit(ToolEvent::Completed {
            call_id: request.call_id.clone(),
            name: request.name.clone(),
            success,
            result: result.clone(),
            formatted: formatted.clone(),
        });

        info!(tool = %request.name, call_id = %request.call_id, success, "tool call finished");
        if success {
            ToolOutcome::ok(result, formatted)
        } else {
            ToolOutcome::fail(result, formatted)
        }
    }

    fn execute(&mut self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        let workspace = &self.workspace;
        match name {
            schema::READ_FILE => fs_tools::read_file(workspace, &parse::<ReadFileArgs>(name, arguments)?),
            schema::LIST_DIRECTORY => {
                fs_tools::list_directory(workspace, &parse::<ListDirectoryArgs>(name, arguments)?)
            }
            schema::SEARCH_CONTEXT => {
                fs_tools::search_context(workspace, &parse::<SearchArgs>(name, arguments)?)
            }
            schema::SEARCH_SYMBOL => {
                symbols::search_symbol(workspace, &parse::<SearchSymbolArgs>(name, arguments)?)
            }
            schema::LIST_SYMBOLS => {
                symbols::list_symbols(workspace, &parse::<SymbolFilterArgs>(name, arguments)?)
            }
            schema::CREATE_FILE => {
                fs_tools::create_file(workspace, &parse::<CreateFileArgs>(name, arguments)?)
            }
            schema::EDIT_FILE => fs_tools::edit_file(workspace, &parse::<EditFileArgs>(name, arguments)?),
            schema::FILE_HASH => fs_tools::file_hash(workspace, &parse::<PathArgs>(name, arguments)?),
            schema::DELETE_PATH => {
                fs_tools::delete_path(workspace, &parse::<DeletePathArgs>(name, arguments)?)
            }
            schema::MAKE_DIRECTORY => {
                fs_tools::make_directory(workspace, &parse::<PathArgs>(name, arguments)?)
            }
            schema::RUN_COMMAND => shell::run_command(
                workspace,
                &parse::<RunCommandArgs>(name, arguments)?,
                self.config.command_timeout,
            ),
            schema::SESSION_CREATE => {
                let args = parse::<SessionCreateArgs>(name, arguments)?;
                Ok(self.sessions.create(&args.command, args.shell)?)
            }
            schema::SESSION_SEND => {
                let args = parse::<SessionSendArgs>(name, arguments)?;
                self.sessions.send(&args.id, &args.text)?;
                Ok(format!("Sent {} bytes to session {}", args.text.len(), args.id))
            }
            schema::SESSION_READ => {
                let args = parse::<SessionReadArgs>(name, arguments)?;
                let timeout = args
                    .timeout_sec
                    .map(|secs| read_timeout(name, secs))
                    .transpose()?;
                let output = self.sessions.read(&args.id, timeout)?;
                let mut text = output.text();
                if output.eof {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(SESSION_EOF_MARKER);
                }
                Ok(text)
            }
            schema::SESSION_CLOSE => {
                let args = parse::<SessionIdArgs>(name, arguments)?;
                self.sessions.close(&args.id)?;
                Ok(format!("Closed session {}", args.id))
            }
            schema::SESSION_LIST => Ok(render_sessions(&self.sessions.list())),
            schema::PLAN => self.planner.apply(parse::<PlanArgs>(name, arguments)?),
            _ => Err(ToolError::UnknownTool {
                name: name.to_string(),
            }),
        }
    }
}

impl Drop for ToolDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn parse<T: DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments.clone())
        .map_err(|error| ToolError::invalid_arguments(tool, error.to_string()))
}

fn read_timeout(tool: &str, secs: f64) -> Result<Duration, ToolError> {
    let timeout = Duration::try_from_secs_f64(secs)
        .map_err(|error| ToolError::invalid_arguments(tool, format!("timeout_sec: {error}")))?;
    Ok(timeout.min(MAX_SESSION_READ_TIMEOUT))
}

fn render_sessions(sessions: &[SessionSnapshot]) -> String {
    if sessions.is_empty() {
        return NO_SESSIONS.to_string();
    }

    sessions
        .iter()
        .map(|session| {
            format!(
                "{} state={} age={}s idle={}s pid={}{} command={}",
                session.id,
                session.state,
                session.age.as_secs(),
                session.idle.as_secs(),
                session.pid,
                if session.exited { " exited" } else { "" },
                session.command
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
