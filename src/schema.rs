//! Built-in tool names and the JSON-schema definitions advertised to the model.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tool_protocol::ToolDefinition;

pub const READ_FILE: &str = "read_file";
pub const LIST_DIRECTORY: &str = "list_directory";
pub const SEARCH_CONTEXT: &str = "search_context";
pub const SEARCH_SYMBOL: &str = "search_symbol";
pub const LIST_SYMBOLS: &str = "list_symbols";
pub const CREATE_FILE: &str = "create_file";
pub const EDIT_FILE: &str = "edit_file";
pub const FILE_HASH: &str = "file_hash";
pub const DELETE_PATH: &str = "delete_path";
pub const MAKE_DIRECTORY: &str = "make_directory";
pub const RUN_COMMAND: &str = "run_command";
pub const SESSION_CREATE: &str = "session_create";
pub const SESSION_SEND: &str = "session_send";
pub const SESSION_READ: &str = "session_read";
pub const SESSION_CLOSE: &str = "session_close";
pub const SESSION_LIST: &str = "session_list";
pub const PLAN: &str = "plan";

pub const BUILTIN_TOOLS: [&str; 17] = [
    READ_FILE,
    LIST_DIRECTORY,
    SEARCH_CONTEXT,
    SEARCH_SYMBOL,
    LIST_SYMBOLS,
    CREATE_FILE,
    EDIT_FILE,
    FILE_HASH,
    DELETE_PATH,
    MAKE_DIRECTORY,
    RUN_COMMAND,
    SESSION_CREATE,
    SESSION_SEND,
    SESSION_READ,
    SESSION_CLOSE,
    SESSION_LIST,
    PLAN,
];

/// Tools that mutate filesystem, process, or session state and therefore pass
/// through the permission gate.
pub const DESTRUCTIVE_TOOLS: [&str; 8] = [
    CREATE_FILE,
    EDIT_FILE,
    DELETE_PATH,
    MAKE_DIRECTORY,
    RUN_COMMAND,
    SESSION_CREATE,
    SESSION_SEND,
    SESSION_CLOSE,
];

#[must_use]
pub fn is_destructive(tool: &str) -> bool {
    DESTRUCTIVE_TOOLS.contains(&tool)
}

#[must_use]
pub fn is_builtin(tool: &str) -> bool {
    BUILTIN_TOOLS.contains(&tool)
}

/// Definitions for the whitelisted built-in tools, in a stable order. The planning
/// tool is always included.
#[must_use]
pub fn tool_definitions(whitelist: &BTreeSet<String>) -> Vec<ToolDefinition> {
    BUILTIN_TOOLS
        .iter()
        .filter(|name| **name == PLAN || whitelist.contains(**name))
        .filter_map(|name| definition(name))
        .collect()
}

fn definition(name: &str) -> Option<ToolDefinition> {
    let (description, schema) = match name {
        READ_FILE => (
            "Read file content, optionally only selected 1-based inclusive lines, capped in bytes, or with file metadata.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path inside the workspace"},
                    "ranges": {
                        "type": "array",
                        "description": "Line ranges such as [[1, 10], [20, 30]]",
                        "items": {
                            "type": "array",
                            "items": {"type": "integer"},
                            "minItems": 2,
                            "maxItems": 2
                        }
                    },
                    "start_line": {"type": "integer", "minimum": 1, "description": "First line (1-based, inclusive); not combined with ranges"},
                    "end_line": {"type": "integer", "minimum": 1, "description": "Last line (1-based, inclusive); not combined with ranges"},
                    "max_bytes": {"type": "integer", "minimum": 1, "description": "Return at most this many bytes"},
                    "with_metadata": {"type": "boolean", "default": false, "description": "Prefix size, line count, modification time and permissions"}
                },
                "required": ["path"]
            }),
        ),
        LIST_DIRECTORY => (
            "List directory entries with permissions, link count, size and modification time.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "default": "."},
                    "show_hidden": {"type": "boolean", "default": true}
                },
                "required": []
            }),
        ),
        SEARCH_CONTEXT => (
            "Search files under a directory for a regular expression; returns path:line:text.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Regular expression"},
                    "path": {"type": "string", "default": "."}
                },
                "required": ["pattern"]
            }),
        ),
        SEARCH_SYMBOL => (
            "Find definitions of a symbol by exact, case-sensitive name using tree-sitter \
             grammars for Rust, Python, Go, Java, C, C++ and Bash. Returns JSON with file, \
             line span, language and kind.",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "Name such as parse or Parser::parse"},
                    "path": {"type": "string", "default": ".", "description": "File or directory to scan"},
                    "language": {"type": "string", "description": "Restrict to one language"},
                    "kind": {"type": "string", "description": "Restrict to one kind, e.g. function, method, class, struct"},
                    "max_results": {"type": "integer", "minimum": 1, "default": 100},
                    "offset": {"type": "integer", "minimum": 0, "default": 0}
                },
                "required": ["symbol"]
            }),
        ),
        LIST_SYMBOLS => (
            "List every definition under a file or directory, in path and line order. \
             Returns JSON with file, line span, language, kind and name.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "default": "."},
                    "language": {"type": "string"},
                    "kind": {"type": "string"},
                    "max_results": {"type": "integer", "minimum": 1, "default": 100},
                    "offset": {"type": "integer", "minimum": 0, "default": 0}
                },
                "required": []
            }),
        ),
        CREATE_FILE => (
            "Create a new file. Fails if the file already exists; use edit_file to modify files.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
        ),
        EDIT_FILE => (
            "Apply anchor-located hunks to an existing file atomically. Every anchor is \
             resolved against the original content; overlapping hunks are rejected.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "hunks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "operation": {
                                    "type": "string",
                                    "enum": ["replace", "insert_before", "insert_after", "delete"]
                                },
                                "anchor": {
                                    "type": "object",
                                    "properties": {
                                        "kind": {"type": "string", "enum": ["exact", "regex"], "default": "exact"},
                                        "pattern": {"type": "string"},
                                        "occurrence": {"type": "string", "enum": ["first", "last", "nth"]},
                                        "n": {"type": "integer", "minimum": 1}
                                    },
                                    "required": ["pattern"]
                                },
                                "content": {"type": "string"}
                            },
                            "required": ["operation", "anchor"]
                        }
                    },
                    "expected_hash": {
                        "type": "string",
                        "description": "Hash from file_hash; the edit fails if the file changed since"
                    },
                    "dry_run": {"type": "boolean", "default": false}
                },
                "required": ["path", "hunks"]
            }),
        ),
        FILE_HASH => (
            "Return the content hash of a file, for use as edit_file's expected_hash.",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        ),
        DELETE_PATH => (
            "Delete a file, or a directory when recursive is true.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "recursive": {"type": "boolean", "default": false}
                },
                "required": ["path"]
            }),
        ),
        MAKE_DIRECTORY => (
            "Create a directory and any missing parents.",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        ),
        RUN_COMMAND => (
            "Run a one-shot shell command and return its exit status, stdout and stderr.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout_sec": {"type": "integer", "minimum": 1},
                    "cwd": {"type": "string"}
                },
                "required": ["command"]
            }),
        ),
        SESSION_CREATE => (
            "Start an interactive process (shell, REPL, remote session) over pipes and return its id.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "shell": {"type": "boolean", "default": false, "description": "Run under sh -c"}
                },
                "required": ["command"]
            }),
        ),
        SESSION_SEND => (
            "Write a line of text to a session's standard input.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "text": {"type": "string"}
                },
                "required": ["id", "text"]
            }),
        ),
        SESSION_READ => (
            "Wait for output from a session; returns early once output is available.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "timeout_sec": {"type": "number", "minimum": 0}
                },
                "required": ["id"]
            }),
        ),
        SESSION_CLOSE => (
            "Terminate a session.",
            json!({
                "type": "object",
                "properties": {"id": {"type": "string"}},
                "required": ["id"]
            }),
        ),
        SESSION_LIST => (
            "List live sessions with their age, idle time and state.",
            json!({"type": "object", "properties": {}, "required": []}),
        ),
        PLAN => (
            "Manage the task plan. Create it at the start of any non-trivial task and keep task \
             status current.",
            json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["create", "update", "check"]},
                    "tasks": {"type": "array", "items": {"type": "string"}},
                    "task_id": {"type": "integer"},
                    "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
                },
                "required": ["action"]
            }),
        ),
        _ => return None,
    };

    Some(ToolDefinition::new(name, description, schema))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_has_a_definition() {
        let all: BTreeSet<String> = BUILTIN_TOOLS.iter().map(|name| name.to_string()).collect();
        let definitions = tool_definitions(&all);
        assert_eq!(definitions.len(), BUILTIN_TOOLS.len());
        assert!(definitions
            .iter()
            .all(|definition| definition.input_schema["type"] == Value::from("object")));
    }

    #[test]
    fn definitions_follow_whitelist_and_keep_plan() {
        let whitelist = BTreeSet::from([READ_FILE.to_string()]);
        let names: Vec<String> = tool_definitions(&whitelist)
            .into_iter()
            .map(|definition| definition.name)
            .collect();
        assert_eq!(names, vec![READ_FILE.to_string(), PLAN.to_string()]);
    }

    #[test]
    fn read_tools_are_not_destructive() {
        for tool in [READ_FILE, LIST_DIRECTORY, SEARCH_CONTEXT, SEARCH_SYMBOL, LIST_SYMBOLS, FILE_HASH, SESSION_READ, SESSION_LIST, PLAN] {
            assert!(!is_destructive(tool), "{tool}");
        }
        assert!(is_destructive(SESSION_SEND));
    }
}
