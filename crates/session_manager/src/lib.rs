//! Interactive process sessions: spawn, stream stdin/stdout, expire, terminate.

mod drain;
mod error;
mod pipe;
mod registry;
mod session;

pub use error::SessionError;
pub use pipe::{ProcessPipe, SessionCommand};
pub use registry::{
    RegistryConfig, SessionRegistry, DEFAULT_MAX_SESSIONS, DEFAULT_REAPER_INTERVAL,
    SESSION_ID_LEN,
};
pub use session::{
    ExpiryPolicy, Session, SessionOptions, SessionOutput, SessionSnapshot, SessionState,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_KILL_GRACE, DEFAULT_MAX_LIFETIME, DEFAULT_OUTPUT_BUFFER_CAP,
    DEFAULT_READ_CHUNK_CAP, DEFAULT_READ_TIMEOUT,
};
