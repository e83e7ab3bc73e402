use thiserror::Error;

use crate::language::Language;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to load the {language} grammar: {source}")]
    Grammar {
        language: Language,
        #[source]
        source: tree_sitter::LanguageError,
    },

    #[error("unknown language {name:?}; expected one of: {expected}")]
    UnknownLanguage { name: String, expected: String },

    #[error("unknown symbol kind {name:?}; expected one of: {expected}")]
    UnknownKind { name: String, expected: String },
}
