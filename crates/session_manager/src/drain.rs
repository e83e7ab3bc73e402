use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

const DRAIN_READ_CHUNK: usize = 4096;

#[derive(Debug, Default)]
struct BufferState {
    bytes: VecDeque<u8>,
    open_streams: usize,
    closed: bool,
}

/// Bounded byte buffer between a session's drain threads and its reader.
///
/// Writers block while the buffer is full instead of discarding output, which in
/// turn back-pressures the child through its pipe.
#[derive(Debug)]
pub(crate) struct OutputBuffer {
    state: Mutex<BufferState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Drained {
    pub bytes: Vec<u8>,
    /// Every stream reached EOF and nothing is left to read.
    pub eof: bool,
    /// The buffer was closed while nothing was available.
    pub closed: bool,
}

impl OutputBuffer {
    pub(crate) fn new(capacity: usize, streams: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                bytes: VecDeque::new(),
                open_streams: streams,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends `chunk`, waiting for room as needed. Returns false once the buffer is
    /// closed, telling the drain to stop.
    pub(crate) fn push(&self, mut chunk: &[u8]) -> bool {
        let mut state = self.lock();
        while !chunk.is_empty() {
            while !state.closed && state.bytes.len() >= self.capacity {
                state = self
                    .writable
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if state.closed {
                return false;
            }

            let room = self.capacity - state.bytes.len();
            let take = room.min(chunk.len());
            state.bytes.extend(&chunk[..take]);
            chunk = &chunk[take..];
            self.readable.notify_all();
        }
        true
    }

    pub(crate) fn finish_stream(&self) {
        let mut state = self.lock();
        state.open_streams = state.open_streams.saturating_sub(1);
        self.readable.notify_all();
    }

    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    /// Waits up to `timeout` for output and removes at most `max` bytes.
    ///
    /// Returns as soon as any bytes are available, on EOF of every stream, or on
    /// close.
    pub(crate) fn read(&self, max: usize, timeout: Duration) -> Drained {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            if !state.bytes.is_empty() {
                let take = max.max(1).min(state.bytes.len());
                let bytes: Vec<u8> = state.bytes.drain(..take).collect();
                self.writable.notify_all();
                return Drained {
                    bytes,
                    eof: false,
                    closed: false,
                };
            }
            if state.closed {
                return Drained {
                    closed: true,
                    ..Drained::default()
                };
            }
            if state.open_streams == 0 {
                return Drained {
                    eof: true,
                    ..Drained::default()
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Drained::default();
            }

            state = match self.readable.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Background threads moving bytes from a child's pipes into its [`OutputBuffer`].
#[derive(Debug)]
pub(crate) struct OutputDrain {
    handles: Vec<JoinHandle<()>>,
}

impl OutputDrain {
    pub(crate) fn start(
        session_id: &str,
        buffer: &Arc<OutputBuffer>,
        streams: Vec<(&'static str, Box<dyn Read + Send>)>,
    ) -> std::io::Result<Self> {
        let mut handles = Vec::with_capacity(streams.len());
        for (label, reader) in streams {
            let buffer = Arc::clone(buffer);
            let thread_id = session_id.to_string();
            let handle = thread::Builder::new()
                .name(format!("session-{session_id}-{label}"))
                .spawn(move || drain_stream(&thread_id, label, reader, &buffer))?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    /// Joins threads that already finished and detaches the rest; a drain blocked on a
    /// pipe held open by an orphaned grandchild must not stall close().
    pub(crate) fn release(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn drain_stream(session_id: &str, label: &str, mut reader: Box<dyn Read + Send>, buffer: &OutputBuffer) {
    let mut chunk = [0u8; DRAIN_READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if !buffer.push(&chunk[..n]) {
                    break;
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => {
                debug!(session_id, stream = label, %error, "drain read failed");
                break;
            }
        }
    }

    buffer.finish_stream();
    debug!(session_id, stream = label, "drain finished");
}
