//! Definition lookup tools backed by [`symbol_index`].

use serde::{Deserialize, Serialize};
use symbol_index::{
    find_symbols, Language, SymbolKind, SymbolPage, SymbolQuery, DEFAULT_MAX_RESULTS,
};
use tracing::debug;

use crate::error::ToolError;
use crate::schema::{LIST_SYMBOLS, SEARCH_SYMBOL};
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SymbolFilterArgs {
    #[serde(default = "current_dir")]
    pub path: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl Default for SymbolFilterArgs {
    fn default() -> Self {
        Self {
            path: current_dir(),
            language: None,
            kind: None,
            max_results: None,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchSymbolArgs {
    pub symbol: String,
    #[serde(flatten)]
    pub filter: SymbolFilterArgs,
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Serialize)]
struct SymbolReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<&'a str>,
    path: &'a str,
    total: usize,
    offset: usize,
    returned: usize,
    truncated: bool,
    results: Vec<SymbolEntry>,
}

#[derive(Debug, Serialize)]
struct SymbolEntry {
    file: String,
    start_line: usize,
    end_line: usize,
    language: Language,
    kind: SymbolKind,
    name: String,
}

/// Definitions whose name matches `symbol` exactly, as a JSON page.
pub fn search_symbol(workspace: &Workspace, args: &SearchSymbolArgs) -> Result<String, ToolError> {
    let symbol = args.symbol.trim();
    if symbol.is_empty() {
        return Err(ToolError::invalid_arguments(SEARCH_SYMBOL, "symbol must not be empty"));
    }
    run(workspace, SEARCH_SYMBOL, Some(symbol), &args.filter)
}

/// Every definition under `path`, as a JSON page.
pub fn list_symbols(workspace: &Workspace, args: &SymbolFilterArgs) -> Result<String, ToolError> {
    run(workspace, LIST_SYMBOLS, None, args)
}

fn run(
    workspace: &Workspace,
    tool: &str,
    symbol: Option<&str>,
    filter: &SymbolFilterArgs,
) -> Result<String, ToolError> {
    let query = query(tool, symbol, filter)?;
    let start = workspace.resolve_existing(&filter.path)?;
    let page = find_symbols(&start, &query)?;
    debug!(tool, path = %filter.path, total = page.total, "symbol lookup finished");
    render(workspace, symbol, &filter.path, page)
}

fn query(tool: &str, symbol: Option<&str>, filter: &SymbolFilterArgs) -> Result<SymbolQuery, ToolError> {
    let max_results = filter.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    if max_results == 0 {
        return Err(ToolError::invalid_arguments(tool, "max_results must be at least 1"));
    }
    Ok(SymbolQuery {
        name: symbol.map(str::to_string),
        language: filter.language.as_deref().map(str::parse::<Language>).transpose()?,
        kind: filter.kind.as_deref().map(str::parse::<SymbolKind>).transpose()?,
        offset: filter.offset,
        max_results,
    })
}

fn render(
    workspace: &Workspace,
    symbol: Option<&str>,
    path: &str,
    page: SymbolPage,
) -> Result<String, ToolError> {
    let results: Vec<SymbolEntry> = page
        .symbols
        .into_iter()
        .map(|found| SymbolEntry {
            file: workspace.display(&found.path),
            start_line: found.start_line,
            end_line: found.end_line,
            language: found.language,
            kind: found.kind,
            name: found.name,
        })
        .collect();
    let report = SymbolReport {
        symbol,
        path,
        total: page.total,
        offset: page.offset,
        returned: results.len(),
        truncated: page.truncated,
        results,
    };
    serde_json::to_string_pretty(&report)
        .map_err(|error| ToolError::CommandFailed(format!("failed to encode symbol results: {error}")))
}
