//! Per-conversation task plan driven by the `plan` tool.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::schema::PLAN;

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Update,
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    fn color(self) -> &'static str {
        match self {
            Self::Pending => RED,
            Self::InProgress => YELLOW,
            Self::Completed => GREEN,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    /// 1-based.
    pub id: usize,
    pub description: String,
    pub status: TaskStatus,
}

/// Arguments of one `plan` call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanArgs {
    pub action: PlanAction,
    #[serde(default)]
    pub tasks: Option<Vec<String>>,
    #[serde(default)]
    pub task_id: Option<usize>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Planner {
    tasks: Option<Vec<PlanTask>>,
}

impl Planner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tasks(&self) -> Option<&[PlanTask]> {
        self.tasks.as_deref()
    }

    /// Runs one plan action and returns the rendered plan.
    pub fn apply(&mut self, args: PlanArgs) -> Result<String, ToolError> {
        match args.action {
            PlanAction::Create => {
                let descriptions = args
                    .tasks
                    .filter(|tasks| !tasks.is_empty())
                    .ok_or_else(|| invalid("create requires a non-empty 'tasks' list"))?;
                self.tasks = Some(
                    descriptions
                        .into_iter()
                        .enumerate()
                        .map(|(index, description)| PlanTask {
                            id: index + 1,
                            description,
                            status: TaskStatus::Pending,
                        })
                        .collect(),
                );
            }
            PlanAction::Update => {
                let tasks = self.tasks.as_mut().ok_or_else(no_plan)?;
                let (Some(task_id), Some(status)) = (args.task_id, args.status) else {
                    return Err(invalid("update requires 'task_id' and 'status'"));
                };
                let task = tasks
                    .iter_mut()
                    .find(|task| task.id == task_id)
                    .ok_or_else(|| invalid(format!("task {task_id} not found")))?;
                task.status = status;
            }
            PlanAction::Check => {
                if self.tasks.is_none() {
                    return Err(no_plan());
                }
            }
        }

        Ok(self.render())
    }

    /// Colored one-line-per-task rendering; empty when no plan exists.
    #[must_use]
    pub fn render(&self) -> String {
        let Some(tasks) = &self.tasks else {
            return String::new();
        };

        tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let prefix = if index == 0 { "↳ " } else { "  " };
                format!(
                    "{prefix}- {}{}{RESET}",
                    task.status.color(),
                    task.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Warning for the reminder channel: no plan yet, or tasks left unfinished.
    #[must_use]
    pub fn reminder(&self) -> Option<String> {
        let Some(tasks) = &self.tasks else {
            return Some(
                "WARNING: No execution plan created. Use plan(action='create', tasks=[...]) to create one."
                    .to_string(),
            );
        };

        let incomplete: Vec<&PlanTask> = tasks
            .iter()
            .filter(|task| task.status != TaskStatus::Completed)
            .collect();
        if incomplete.is_empty() {
            return None;
        }

        let mut lines = vec![format!(
            "WARNING: {} task(s) still incomplete:",
            incomplete.len()
        )];
        lines.extend(
            incomplete
                .iter()
                .map(|task| format!("  [{}] {:12} - {}", task.id, task.status, task.description)),
        );
        Some(lines.join("\n"))
    }
}

fn invalid(reason: impl Into<String>) -> ToolError {
    ToolError::invalid_arguments(PLAN, reason)
}

fn no_plan() -> ToolError {
    invalid("no plan exists; create a plan first")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn create(tasks: &[&str]) -> PlanArgs {
        PlanArgs {
            action: PlanAction::Create,
            tasks: Some(tasks.iter().map(|task| task.to_string()).collect()),
            task_id: None,
            status: None,
        }
    }

    fn update(task_id: usize, status: TaskStatus) -> PlanArgs {
        PlanArgs {
            action: PlanAction::Update,
            tasks: None,
            task_id: Some(task_id),
            status: Some(status),
        }
    }

    #[test]
    fn missing_plan_produces_reminder() {
        let planner = Planner::new();
        assert!(planner
            .reminder()
            .is_some_and(|text| text.starts_with("WARNING: No execution plan")));
    }

    #[test]
    fn create_renders_pending_tasks_with_marker() {
        let mut planner = Planner::new();
        let rendered = planner.apply(create(&["read", "edit"])).expect("create");

        assert_eq!(
            rendered,
            format!("↳ - {RED}read{RESET}\n  - {RED}edit{RESET}")
        );
    }

    #[test]
    fn reminder_lists_incomplete_tasks_until_done() {
        let mut planner = Planner::new();
        planner.apply(create(&["read", "edit"])).expect("create");
        planner
            .apply(update(1, TaskStatus::Completed))
            .expect("update");
        planner
            .apply(update(2, TaskStatus::InProgress))
            .expect("update");

        assert_eq!(
            planner.reminder().as_deref(),
            Some("WARNING: 1 task(s) still incomplete:\n  [2] in_progress  - edit")
        );

        planner
            .apply(update(2, TaskStatus::Completed))
            .expect("update");
        assert_eq!(planner.reminder(), None);
    }

    #[test]
    fn update_and_check_require_a_plan() {
        let mut planner = Planner::new();
        assert!(planner.apply(update(1, TaskStatus::Completed)).is_err());
        assert!(planner
            .apply(PlanArgs {
                action: PlanAction::Check,
                tasks: None,
                task_id: None,
                status: None,
            })
            .is_err());
    }

    #[test]
    fn unknown_task_id_is_rejected() {
        let mut planner = Planner::new();
        planner.apply(create(&["one"])).expect("create");
        assert!(planner.apply(update(7, TaskStatus::Completed)).is_err());
    }

    #[test]
    fn args_deserialize_from_tool_json() {
        let args: PlanArgs = serde_json::from_value(serde_json::json!({
            "action": "update",
            "task_id": 2,
            "status": "in_progress"
        }))
        .expect("args");
        assert_eq!(args.action, PlanAction::Update);
        assert_eq!(args.status, Some(TaskStatus::InProgress));
    }
}
