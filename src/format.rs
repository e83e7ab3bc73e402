//! One-line summaries of tool calls and results for the operator.

use serde_json::Value;

use crate::schema::{
    CREATE_FILE, DELETE_PATH, EDIT_FILE, FILE_HASH, LIST_DIRECTORY, MAKE_DIRECTORY, PLAN,
    LIST_SYMBOLS, READ_FILE, RUN_COMMAND, SEARCH_CONTEXT, SEARCH_SYMBOL, SESSION_CLOSE,
    SESSION_CREATE, SESSION_LIST, SESSION_READ, SESSION_SEND,
};

pub const NO_MATCHES: &str = "No matches found";
pub const EMPTY_DIRECTORY: &str = "Empty directory";
pub const NO_SESSIONS: &str = "No live sessions";

const PREVIEW_CHARS: usize = 100;

#[must_use]
pub fn format_tool_call(name: &str, arguments: &Value) -> String {
    let text = |key: &str| arguments.get(key).and_then(Value::as_str).unwrap_or("");
    let path = || {
        arguments
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".")
    };

    match name {
        SEARCH_CONTEXT => format!("SEARCH(pattern=\"{}\", path=\"{}\")", text("pattern"), path()),
        SEARCH_SYMBOL => format!("SYMBOL(\"{}\", path=\"{}\")", text("symbol"), path()),
        LIST_SYMBOLS => format!("SYMBOLS(\"{}\")", path()),
        READ_FILE => match arguments.get("ranges").and_then(Value::as_array) {
            Some(ranges) if !ranges.is_empty() => {
                let ranges = ranges
                    .iter()
                    .map(|range| match range.as_array().map(Vec::as_slice) {
                        Some([start, end]) => format!("{start}-{end}"),
                        _ => range.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("READ(\"{}\", lines=[{ranges}])", text("path"))
            }
            _ => format!("READ(\"{}\")", text("path")),
        },
        CREATE_FILE => format!("CREATE(\"{}\")", text("path")),
        EDIT_FILE => {
            let hunks = arguments
                .get("hunks")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            let dry_run = if flag(arguments, "dry_run") {
                ", dry_run"
            } else {
                ""
            };
            format!("EDIT(\"{}\", hunks={hunks}{dry_run})", text("path"))
        }
        LIST_DIRECTORY => format!("LIST(\"{}\")", path()),
        FILE_HASH => format!("HASH(\"{}\")", text("path")),
        DELETE_PATH => {
            let recursive = if flag(arguments, "recursive") {
                ", recursive"
            } else {
                ""
            };
            format!("DELETE(\"{}\"{recursive})", text("path"))
        }
        MAKE_DIRECTORY => format!("MKDIR(\"{}\")", text("path")),
        RUN_COMMAND => format!("RUN(\"{}\")", text("command")),
        SESSION_CREATE => format!("SESSION_CREATE(\"{}\")", text("command")),
        SESSION_SEND => format!("SESSION_SEND({})", text("id")),
        SESSION_READ => format!("SESSION_READ({})", text("id")),
        SESSION_CLOSE => format!("SESSION_CLOSE({})", text("id")),
        SESSION_LIST => "SESSION_LIST".to_string(),
        PLAN => format!("PLAN {}", text("action").to_uppercase()),
        _ => format!("{}({arguments})", name.to_uppercase()),
    }
}

#[must_use]
pub fn format_tool_result(name: &str, success: bool, result: &str, arguments: &Value) -> String {
    if !success {
        return format!("[FAIL] {}", result.lines().next().unwrap_or(""));
    }

    match name {
        READ_FILE => format!("[OK] read {} lines", result.lines().count()),
        CREATE_FILE => {
            let lines = arguments
                .get("content")
                .and_then(Value::as_str)
                .map_or(0, |content| content.matches('\n').count() + 1);
            format!("[OK] created {lines} lines")
        }
        EDIT_FILE => {
            let hunks = arguments
                .get("hunks")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            if flag(arguments, "dry_run") {
                format!("[OK] dry run, {hunks} hunk(s) resolved")
            } else {
                format!("[OK] applied {hunks} hunk(s)")
            }
        }
        SEARCH_CONTEXT => format!("[OK] {} results", count_lines_unless(result, NO_MATCHES)),
        LIST_DIRECTORY => format!("[OK] {} items", count_lines_unless(result, EMPTY_DIRECTORY)),
        SEARCH_SYMBOL | LIST_SYMBOLS => {
            let returned = serde_json::from_str::<Value>(result)
                .ok()
                .and_then(|page| page.get("returned").and_then(Value::as_u64))
                .unwrap_or(0);
            format!("[OK] {returned} symbols")
        }
        SESSION_LIST => format!("[OK] {} sessions", count_lines_unless(result, NO_SESSIONS)),
        SESSION_CREATE => format!("[OK] session {}", result.trim()),
        SESSION_READ => format!("[OK] {} bytes", result.len()),
        PLAN => result.to_string(),
        _ => {
            let preview: String = result
                .chars()
                .take(PREVIEW_CHARS)
                .map(|ch| if ch == '\n' { ' ' } else { ch })
                .collect();
            format!("[OK] {preview}")
        }
    }
}

fn flag(arguments: &Value, key: &str) -> bool {
    arguments.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn count_lines_unless(result: &str, empty_marker: &str) -> usize {
    if result.trim().is_empty() || result.trim() == empty_marker {
        0
    } else {
        result.lines().count()
    }
}
