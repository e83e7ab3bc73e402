use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use tree_sitter::Parser;
use walkdir::{DirEntry, WalkDir};

use crate::error::IndexError;
use crate::extract::{definitions, Definition};
use crate::language::{Language, SymbolKind};

/// Files above this size are not parsed.
pub const MAX_INDEXED_FILE_BYTES: u64 = 2 * 1024 * 1024;
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// A definition found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub path: PathBuf,
    pub language: Language,
    pub kind: SymbolKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolQuery {
    /// Exact, case-sensitive name; `None` lists every definition.
    pub name: Option<String>,
    pub language: Option<Language>,
    pub kind: Option<SymbolKind>,
    pub offset: usize,
    pub max_results: usize,
}

impl Default for SymbolQuery {
    fn default() -> Self {
        Self {
            name: None,
            language: None,
            kind: None,
            offset: 0,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl SymbolQuery {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    fn accepts(&self, definition: &Definition) -> bool {
        self.kind.map_or(true, |kind| kind == definition.kind)
            && self
                .name
                .as_deref()
                .map_or(true, |target| name_matches(&definition.name, target))
    }
}

/// One page of results in path then line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPage {
    pub total: usize,
    pub offset: usize,
    pub symbols: Vec<Symbol>,
    pub truncated: bool,
}

/// Whether `candidate` names `target`, allowing a `::` qualified form on either side.
///
/// `Point::new` matches a search for `new`, and a search for `Point::new`
/// matches a bare `new` defined inside an impl or class body.
#[must_use]
pub fn name_matches(candidate: &str, target: &str) -> bool {
    if candidate == target {
        return true;
    }
    if candidate
        .rsplit_once("::")
        .is_some_and(|(_, last)| last == target)
    {
        return true;
    }
    target
        .rsplit_once("::")
        .is_some_and(|(_, last)| last == candidate)
}

/// Scans `start` (a file or directory) for definitions matching `query`.
///
/// Hidden entries below `start`, symlinks, unreadable files and files over
/// [`MAX_INDEXED_FILE_BYTES`] are skipped.
pub fn find_symbols(start: &Path, query: &SymbolQuery) -> Result<SymbolPage, IndexError> {
    let mut parsers = Parsers::default();
    let mut matches = Vec::new();

    let walker = WalkDir::new(start)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
    for entry in walker.filter_map(Result::ok) {
        let Some(language) = indexable(&entry, query) else {
            continue;
        };
        let path = entry.path();
        let source = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(error) => {
                debug!(path = %path.display(), %error, "skipping unreadable source file");
                continue;
            }
        };
        let Some(tree) = parsers.get(language)?.parse(&source, None) else {
            debug!(path = %path.display(), "parser gave up on source file");
            continue;
        };
        matches.extend(
            definitions(language, &tree, &source)
                .into_iter()
                .filter(|definition| query.accepts(definition))
                .map(|definition| Symbol {
                    path: path.to_path_buf(),
                    language,
                    kind: definition.kind,
                    name: definition.name,
                    start_line: definition.start_line,
                    end_line: definition.end_line,
                }),
        );
    }

    let total = matches.len();
    let symbols: Vec<Symbol> = matches
        .into_iter()
        .skip(query.offset)
        .take(query.max_results)
        .collect();
    debug!(start = %start.display(), total, returned = symbols.len(), "symbol scan finished");
    Ok(SymbolPage {
        total,
        offset: query.offset,
        truncated: query.offset.saturating_add(symbols.len()) < total,
        symbols,
    })
}

fn indexable(entry: &DirEntry, query: &SymbolQuery) -> Option<Language> {
    if !entry.file_type().is_file() {
        return None;
    }
    let language = Language::from_path(entry.path())?;
    if query.language.is_some_and(|wanted| wanted != language) {
        return None;
    }
    let size = entry.metadata().ok()?.len();
    (size <= MAX_INDEXED_FILE_BYTES).then_some(language)
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

/// One parser per grammar, loaded on first use.
#[derive(Default)]
struct Parsers {
    loaded: HashMap<Language, Parser>,
}

impl Parsers {
    fn get(&mut self, language: Language) -> Result<&mut Parser, IndexError> {
        match self.loaded.entry(language) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&language.grammar())
                    .map_err(|source| IndexError::Grammar { language, source })?;
                Ok(entry.insert(parser))
            }
        }
    }
}
