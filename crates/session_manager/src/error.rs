use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session command: {reason}")]
    InvalidCommand { reason: String },

    #[error("session {id} not found")]
    NotFound { id: String },

    #[error("session {id} is closed")]
    Closed { id: String },

    #[error("session limit reached ({cap} live sessions); close a session before creating another")]
    CapacityExceeded { cap: usize },

    #[error("I/O error while {operation} for session {id}: {source}")]
    Io {
        operation: &'static str,
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start session reaper: {0}")]
    ReaperSpawn(#[source] std::io::Error),
}

impl SessionError {
    #[must_use]
    pub fn io(operation: &'static str, id: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            id: id.into(),
            source,
        }
    }

    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    #[must_use]
    pub fn closed(id: impl Into<String>) -> Self {
        Self::Closed { id: id.into() }
    }

    /// Returns true when retrying after closing another session may succeed.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}
