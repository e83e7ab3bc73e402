//! Operator approval for destructive tool calls.
//!
//! A [`PermissionGate`] lives for one conversation. Per tool it remembers a
//! "yes, for this session" answer; a "no" is terminal for the whole conversation,
//! so every later destructive call is refused without prompting again.

use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, BufReader, Stderr, Stdin, Write};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::schema::is_destructive;

pub const APPROVAL_MENU: &str = "[1] yes, once  [2] yes, for this session  [3] no, abort";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalChoice {
    Once,
    Session,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    DenyTerminate,
}

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionPrompt {
    pub tool: String,
    pub arguments: Value,
}

impl PermissionPrompt {
    #[must_use]
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }

    /// Tool name, pretty-printed arguments and the fixed option menu.
    #[must_use]
    pub fn render(&self) -> String {
        let arguments = serde_json::to_string_pretty(&self.arguments)
            .unwrap_or_else(|_| self.arguments.to_string());
        format!(
            "Permission required for {}\n{arguments}\n{APPROVAL_MENU}",
            self.tool
        )
    }
}

/// Synchronous source of operator decisions.
pub trait OperatorPrompt: Send {
    fn choose(&mut self, prompt: &PermissionPrompt) -> ApprovalChoice;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolApproval {
    ForSession,
    Denied,
}

pub struct PermissionGate {
    bypass: bool,
    approvals: HashMap<String, ToolApproval>,
    operator: Box<dyn OperatorPrompt>,
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("bypass", &self.bypass)
            .field("approvals", &self.approvals)
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    #[must_use]
    pub fn new(bypass: bool, operator: Box<dyn OperatorPrompt>) -> Self {
        Self {
            bypass,
            approvals: HashMap::new(),
            operator,
        }
    }

    /// Decides whether `tool` may run, prompting the operator when no earlier answer
    /// applies.
    pub fn check(&mut self, tool: &str, arguments: &Value) -> Verdict {
        if !is_destructive(tool) || self.bypass {
            return Verdict::Allow;
        }

        if self.is_terminated() {
            warn!(tool, "destructive call after operator denial; terminating");
            return Verdict::DenyTerminate;
        }

        if self.approvals.get(tool) == Some(&ToolApproval::ForSession) {
            debug!(tool, "approved for session");
            return Verdict::Allow;
        }

        let prompt = PermissionPrompt::new(tool, arguments.clone());
        match self.operator.choose(&prompt) {
            ApprovalChoice::Once => {
                info!(tool, "operator approved once");
                Verdict::Allow
            }
            ApprovalChoice::Session => {
                info!(tool, "operator approved for session");
                self.approvals
                    .insert(tool.to_string(), ToolApproval::ForSession);
                Verdict::Allow
            }
            ApprovalChoice::Deny => {
                warn!(tool, "operator denied; terminating run");
                self.approvals.insert(tool.to_string(), ToolApproval::Denied);
                Verdict::DenyTerminate
            }
        }
    }

    /// True once the operator has denied any tool in this conversation.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.approvals
            .values()
            .any(|approval| *approval == ToolApproval::Denied)
    }

    /// Forgets every answer, for a new conversation.
    pub fn reset(&mut self) {
        self.approvals.clear();
    }
}

/// Prompts on a terminal-like reader/writer pair.
#[derive(Debug)]
pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
}

impl TerminalOperator<BufReader<Stdin>, Stderr> {
    /// Reads answers from stdin and prompts on stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R, W> TerminalOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl<R: BufRead + Send, W: Write + Send> OperatorPrompt for TerminalOperator<R, W> {
    fn choose(&mut self, prompt: &PermissionPrompt) -> ApprovalChoice {
        if writeln!(self.output, "\n{}", prompt.render()).is_err() {
            return ApprovalChoice::Deny;
        }

        loop {
            if write!(self.output, "Choice [1-3]: ")
                .and_then(|()| self.output.flush())
                .is_err()
            {
                return ApprovalChoice::Deny;
            }

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => return ApprovalChoice::Deny,
                Ok(_) => {}
            }

            match line.trim() {
                "1" => return ApprovalChoice::Once,
                "2" => return ApprovalChoice::Session,
                "3" => return ApprovalChoice::Deny,
                _ => {
                    if writeln!(self.output, "Please enter 1, 2 or 3.").is_err() {
                        return ApprovalChoice::Deny;
                    }
                }
            }
        }
    }
}

/// Replays a fixed list of answers and records every prompt; denies once the script
/// runs out. Clones share the same script and log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    script: Arc<Mutex<VecDeque<ApprovalChoice>>>,
    prompts: Arc<Mutex<Vec<PermissionPrompt>>>,
}

impl ScriptedOperator {
    pub fn new(choices: impl IntoIterator<Item = ApprovalChoice>) -> Self {
        Self {
            script: Arc::new(Mutex::new(choices.into_iter().collect())),
            prompts: Arc::default(),
        }
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<PermissionPrompt> {
        lock_unpoisoned(&self.prompts).clone()
    }
}

impl OperatorPrompt for ScriptedOperator {
    fn choose(&mut self, prompt: &PermissionPrompt) -> ApprovalChoice {
        lock_unpoisoned(&self.prompts).push(prompt.clone());
        lock_unpoisoned(&self.script)
            .pop_front()
            .unwrap_or(ApprovalChoice::Deny)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Cursor;

    fn gate(choices: &[ApprovalChoice]) -> (PermissionGate, ScriptedOperator) {
        let operator = ScriptedOperator::new(choices.iter().copied());
        (
            PermissionGate::new(false, Box::new(operator.clone())),
            operator,
        )
    }

    #[test]
    fn non_destructive_tools_never_prompt() {
        let (mut gate, operator) = gate(&[]);
        assert_eq!(gate.check("read_file", &json!({})), Verdict::Allow);
        assert_eq!(gate.check("session_read", &json!({})), Verdict::Allow);
        assert!(operator.prompts().is_empty());
    }

    #[test]
    fn bypass_allows_without_prompt() {
        let operator = ScriptedOperator::new([]);
        let mut gate = PermissionGate::new(true, Box::new(operator.clone()));
        assert_eq!(gate.check("delete_path", &json!({})), Verdict::Allow);
        assert!(operator.prompts().is_empty());
    }

    #[test]
    fn once_is_consumed_and_session_is_sticky() {
        let (mut gate, operator) = gate(&[
            ApprovalChoice::Once,
            ApprovalChoice::Session,
        ]);

        assert_eq!(gate.check("create_file", &json!({})), Verdict::Allow);
        assert_eq!(gate.check("create_file", &json!({})), Verdict::Allow);
        assert_eq!(gate.check("create_file", &json!({})), Verdict::Allow);
        assert_eq!(operator.prompts().len(), 2);
    }

    #[test]
    fn denial_terminates_every_later_destructive_call() {
        let (mut gate, operator) = gate(&[ApprovalChoice::Deny, ApprovalChoice::Session]);

        assert_eq!(gate.check("create_file", &json!({"path": "a"})), Verdict::DenyTerminate);
        assert_eq!(gate.check("create_file", &json!({})), Verdict::DenyTerminate);
        assert_eq!(gate.check("run_command", &json!({})), Verdict::DenyTerminate);
        assert_eq!(operator.prompts().len(), 1);
        assert_eq!(gate.check("read_file", &json!({})), Verdict::Allow);
    }

    #[test]
    fn reset_starts_a_fresh_conversation() {
        let (mut gate, _operator) = gate(&[ApprovalChoice::Deny, ApprovalChoice::Once]);
        assert_eq!(gate.check("edit_file", &json!({})), Verdict::DenyTerminate);

        gate.reset();
        assert!(!gate.is_terminated());
        assert_eq!(gate.check("edit_file", &json!({})), Verdict::Allow);
    }

    #[test]
    fn terminal_operator_reprompts_on_invalid_input() {
        let mut operator = TerminalOperator::new(Cursor::new("maybe\n2\n"), Vec::new());
        let prompt = PermissionPrompt::new("create_file", json!({"path": "notes.txt"}));

        assert_eq!(operator.choose(&prompt), ApprovalChoice::Session);

        let (_, output) = operator.into_parts();
        let output = String::from_utf8(output).expect("utf8");
        assert!(output.contains("Permission required for create_file"));
        assert!(output.contains("\"path\": \"notes.txt\""));
        assert!(output.contains(APPROVAL_MENU));
        assert!(output.contains("Please enter 1, 2 or 3."));
    }

    #[test]
    fn terminal_operator_treats_eof_as_deny() {
        let mut operator = TerminalOperator::new(Cursor::new(""), Vec::new());
        let prompt = PermissionPrompt::new("run_command", json!({"command": "ls"}));
        assert_eq!(operator.choose(&prompt), ApprovalChoice::Deny);
    }
}
