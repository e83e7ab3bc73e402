//! Definition lookup over source trees using tree-sitter grammars.

mod error;
mod extract;
mod index;
mod language;

pub use error::IndexError;
pub use index::{
    find_symbols, name_matches, Symbol, SymbolPage, SymbolQuery, DEFAULT_MAX_RESULTS,
    MAX_INDEXED_FILE_BYTES,
};
pub use language::{Language, SymbolKind};
