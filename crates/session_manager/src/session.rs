use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::drain::{OutputBuffer, OutputDrain};
use crate::error::SessionError;
use crate::pipe::{terminate, ProcessPipe, SessionCommand};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_READ_CHUNK_CAP: usize = 4 * 1024;
pub const DEFAULT_OUTPUT_BUFFER_CAP: usize = 256 * 1024;
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Active,
    Expired,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Idle and absolute expiry thresholds, whichever is reached first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
        }
    }
}

impl ExpiryPolicy {
    #[must_use]
    pub fn is_expired(&self, created_at: Instant, last_active_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_active_at) > self.idle_timeout
            || now.saturating_duration_since(created_at) > self.max_lifetime
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub expiry: ExpiryPolicy,
    pub output_buffer_cap: usize,
    pub read_chunk_cap: usize,
    pub default_read_timeout: Duration,
    pub kill_grace: Duration,
    pub cwd: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            expiry: ExpiryPolicy::default(),
            output_buffer_cap: DEFAULT_OUTPUT_BUFFER_CAP,
            read_chunk_cap: DEFAULT_READ_CHUNK_CAP,
            default_read_timeout: DEFAULT_READ_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            cwd: None,
        }
    }
}

/// Bytes returned by one [`Session::read`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutput {
    pub bytes: Vec<u8>,
    /// The child closed stdout and stderr and everything has been consumed.
    pub eof: bool,
}

impl SessionOutput {
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Point-in-time view of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: String,
    pub command: String,
    pub pid: u32,
    pub state: SessionState,
    pub age: Duration,
    pub idle: Duration,
    pub buffered_bytes: usize,
    pub exited: bool,
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    last_active_at: Instant,
    /// Reads currently waiting for output; a waiting reader is activity.
    readers: usize,
}

/// One supervised interactive process.
pub struct Session {
    id: String,
    command: String,
    pid: u32,
    created_at: Instant,
    options: SessionOptions,
    lifecycle: Mutex<Lifecycle>,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Child>,
    output: Arc<OutputBuffer>,
    drain: Mutex<OutputDrain>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Spawns the process and starts draining its output before returning.
    pub fn start(
        id: impl Into<String>,
        command: &SessionCommand,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let id = id.into();
        let ProcessPipe {
            mut child,
            stdin,
            stdout,
            stderr,
        } = ProcessPipe::spawn(command, options.cwd.as_deref())?;
        let pid = child.id();
        let created_at = Instant::now();

        let output = Arc::new(OutputBuffer::new(options.output_buffer_cap, 2));
        let streams: Vec<(&'static str, Box<dyn std::io::Read + Send>)> =
            vec![("stdout", Box::new(stdout)), ("stderr", Box::new(stderr))];
        let drain = match OutputDrain::start(&id, &output, streams) {
            Ok(drain) => drain,
            Err(source) => {
                terminate(&mut child, options.kill_grace);
                return Err(SessionError::io("starting output drain", id, source));
            }
        };

        let session = Self {
            id,
            command: command.display.clone(),
            pid,
            created_at,
            options,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Starting,
                last_active_at: created_at,
                readers: 0,
            }),
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(child),
            output,
            drain: Mutex::new(drain),
        };
        session.lock_lifecycle().state = SessionState::Active;

        info!(session_id = %session.id, pid, command = %session.command, "session started");
        Ok(session)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Current state, after applying the expiry policy.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.check_expiry(Instant::now());
        self.lock_lifecycle().state
    }

    /// Marks the session expired once it crosses a threshold; returns whether it is.
    pub fn check_expiry(&self, now: Instant) -> bool {
        let mut lifecycle = self.lock_lifecycle();
        let last_active_at = if lifecycle.readers > 0 {
            now
        } else {
            lifecycle.last_active_at
        };
        if lifecycle.state == SessionState::Active
            && self
                .options
                .expiry
                .is_expired(self.created_at, last_active_at, now)
        {
            lifecycle.state = SessionState::Expired;
            debug!(session_id = %self.id, "session expired");
        }
        lifecycle.state == SessionState::Expired
    }

    /// Writes `text` to stdin, terminated by a newline.
    pub fn send(&self, text: &str) -> Result<(), SessionError> {
        self.ensure_active()?;

        let mut payload = text.to_string();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }

        let write_result = {
            let mut stdin = lock_unpoisoned(&self.stdin);
            // Re-checked under the stdin lock so a close that started meanwhile wins.
            self.ensure_active()?;
            let Some(writer) = stdin.as_mut() else {
                return Err(SessionError::closed(&self.id));
            };
            writer
                .write_all(payload.as_bytes())
                .and_then(|()| writer.flush())
        };

        if let Err(source) = write_result {
            // A close that raced this write wins.
            if self.lock_lifecycle().state == SessionState::Closed
                || source.kind() == ErrorKind::BrokenPipe
            {
                return Err(SessionError::closed(&self.id));
            }
            return Err(SessionError::io("writing to stdin", &self.id, source));
        }

        self.touch();
        Ok(())
    }

    /// Waits up to `timeout` (or the configured default) for output.
    ///
    /// Returns as soon as any output is buffered, at most `read_chunk_cap` bytes per
    /// call, and an empty result when the child stays silent. Every successful read
    /// counts as activity, including an empty one, and the session cannot go idle
    /// while a read is waiting.
    pub fn read(&self, timeout: Option<Duration>) -> Result<SessionOutput, SessionError> {
        {
            self.check_expiry(Instant::now());
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.state != SessionState::Active {
                return Err(SessionError::closed(&self.id));
            }
            lifecycle.readers += 1;
        }

        let timeout = timeout.unwrap_or(self.options.default_read_timeout);
        let drained = self.output.read(self.options.read_chunk_cap, timeout);

        {
            let mut lifecycle = self.lock_lifecycle();
            lifecycle.readers = lifecycle.readers.saturating_sub(1);
        }
        if drained.closed {
            return Err(SessionError::closed(&self.id));
        }
        self.touch();

        Ok(SessionOutput {
            bytes: drained.bytes,
            eof: drained.eof,
        })
    }

    /// Terminates the child and releases its resources. Idempotent.
    pub fn close(&self) {
        {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.state == SessionState::Closed {
                return;
            }
            lifecycle.state = SessionState::Closed;
        }

        self.output.close();
        terminate(&mut lock_unpoisoned(&self.child), self.options.kill_grace);
        lock_unpoisoned(&self.stdin).take();
        lock_unpoisoned(&self.drain).release();

        info!(session_id = %self.id, pid = self.pid, "session closed");
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let now = Instant::now();
        self.check_expiry(now);
        let (state, last_active_at) = {
            let lifecycle = self.lock_lifecycle();
            (lifecycle.state, lifecycle.last_active_at)
        };
        let exited = !matches!(lock_unpoisoned(&self.child).try_wait(), Ok(None));

        SessionSnapshot {
            id: self.id.clone(),
            command: self.command.clone(),
            pid: self.pid,
            state,
            age: now.saturating_duration_since(self.created_at),
            idle: now.saturating_duration_since(last_active_at),
            buffered_bytes: self.output.len(),
            exited,
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        self.check_expiry(Instant::now());
        match self.lock_lifecycle().state {
            SessionState::Active => Ok(()),
            SessionState::Starting | SessionState::Expired | SessionState::Closed => {
                Err(SessionError::closed(&self.id))
            }
        }
    }

    fn touch(&self) {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.state == SessionState::Active {
            lifecycle.last_active_at = Instant::now();
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock_unpoisoned(&self.lifecycle)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_uses_whichever_threshold_comes_first() {
        let policy = ExpiryPolicy {
            idle_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(300),
        };
        let created = Instant::now();

        let recent = created + Duration::from_secs(100);
        assert!(!policy.is_expired(created, recent, recent + Duration::from_secs(10)));
        assert!(policy.is_expired(created, recent, recent + Duration::from_secs(31)));

        let busy = created + Duration::from_secs(299);
        assert!(policy.is_expired(created, busy, created + Duration::from_secs(301)));
    }

    #[cfg(unix)]
    #[test]
    fn send_waiting_on_stdin_fails_once_close_begins() {
        let command = SessionCommand::parse("cat", false).expect("command");
        let session = Session::start("race", &command, SessionOptions::default()).expect("start");

        std::thread::scope(|scope| {
            let stdin = lock_unpoisoned(&session.stdin);
            let sender = scope.spawn(|| session.send("late"));
            std::thread::sleep(Duration::from_millis(100));

            session.lock_lifecycle().state = SessionState::Closed;
            drop(stdin);

            let result = sender.join().expect("sender thread");
            assert!(
                matches!(result, Err(SessionError::Closed { .. })),
                "unexpected send result: {result:?}"
            );
        });

        session.lock_lifecycle().state = SessionState::Active;
        session.close();
    }

    #[cfg(unix)]
    #[test]
    fn waiting_reader_keeps_session_from_going_idle() {
        let command = SessionCommand::parse("cat", false).expect("command");
        let options = SessionOptions {
            expiry: ExpiryPolicy {
                idle_timeout: Duration::from_millis(100),
                max_lifetime: Duration::from_secs(60),
            },
            ..SessionOptions::default()
        };
        let session = Session::start("reader", &command, options).expect("start");

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| session.read(Some(Duration::from_millis(400))));
            std::thread::sleep(Duration::from_millis(250));
            assert!(!session.check_expiry(Instant::now()));

            let output = reader.join().expect("reader thread").expect("read");
            assert!(output.is_empty());
        });
        assert!(!session.check_expiry(Instant::now()));
    }
}
