use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SessionError;
use crate::pipe::SessionCommand;
use crate::session::{lock_unpoisoned, Session, SessionOptions, SessionOutput, SessionSnapshot};

pub const DEFAULT_MAX_SESSIONS: usize = 3;
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(2);
pub const SESSION_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub max_sessions: usize,
    pub reaper_interval: Duration,
    pub session: SessionOptions,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            session: SessionOptions::default(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionTable {
    live: HashMap<String, Arc<Session>>,
    /// Ids handed out to creations that are still spawning; they count against the cap.
    reserved: HashSet<String>,
}

impl SessionTable {
    fn occupied(&self) -> usize {
        self.live.len() + self.reserved.len()
    }

    fn fresh_id(&self) -> String {
        loop {
            let mut id = Uuid::new_v4().simple().to_string();
            id.truncate(SESSION_ID_LEN);
            if !self.live.contains_key(&id) && !self.reserved.contains(&id) {
                return id;
            }
        }
    }
}

#[derive(Debug)]
struct RegistryInner {
    config: RegistryConfig,
    table: Mutex<SessionTable>,
}

impl RegistryInner {
    fn reap_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<Arc<Session>> = {
            let mut table = lock_unpoisoned(&self.table);
            let ids: Vec<String> = table
                .live
                .iter()
                .filter(|(_, session)| session.check_expiry(now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| table.live.remove(id))
                .collect()
        };

        let mut closed = Vec::with_capacity(expired.len());
        for session in expired {
            session.close();
            info!(session_id = %session.id(), "reaped expired session");
            closed.push(session.id().to_string());
        }
        closed
    }
}

#[derive(Debug)]
struct Reaper {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns every live [`Session`], enforces the concurrency cap and closes expired
/// sessions from a background reaper thread.
///
/// The table lock only guards map mutation; process I/O runs outside it.
#[derive(Debug)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
    reaper: Mutex<Option<Reaper>>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self, SessionError> {
        let inner = Arc::new(RegistryInner {
            config,
            table: Mutex::new(SessionTable::default()),
        });
        let reaper = spawn_reaper(Arc::downgrade(&inner), inner.config.reaper_interval)?;

        Ok(Self {
            inner,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Starts a session and returns its id.
    pub fn create(&self, command: &str, shell: bool) -> Result<String, SessionError> {
        let command = SessionCommand::parse(command, shell)?;
        let cap = self.inner.config.max_sessions;

        let id = {
            let mut table = lock_unpoisoned(&self.inner.table);
            if table.occupied() >= cap {
                debug!(cap, "session capacity exceeded");
                return Err(SessionError::CapacityExceeded { cap });
            }
            let id = table.fresh_id();
            table.reserved.insert(id.clone());
            id
        };

        let started = Session::start(id.clone(), &command, self.inner.config.session.clone());

        let mut table = lock_unpoisoned(&self.inner.table);
        table.reserved.remove(&id);
        let session = started?;
        table.live.insert(id.clone(), Arc::new(session));
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<SessionSnapshot, SessionError> {
        Ok(self.lookup(id)?.snapshot())
    }

    pub fn send(&self, id: &str, text: &str) -> Result<(), SessionError> {
        self.lookup(id)?.send(text)
    }

    pub fn read(&self, id: &str, timeout: Option<Duration>) -> Result<SessionOutput, SessionError> {
        self.lookup(id)?.read(timeout)
    }

    /// Removes the session from the registry, then terminates it.
    pub fn close(&self, id: &str) -> Result<(), SessionError> {
        let session = lock_unpoisoned(&self.inner.table)
            .live
            .remove(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        session.close();
        Ok(())
    }

    /// Snapshot of every live session, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<Session>> = lock_unpoisoned(&self.inner.table)
            .live
            .values()
            .cloned()
            .collect();

        let mut snapshots: Vec<SessionSnapshot> =
            sessions.iter().map(|session| session.snapshot()).collect();
        snapshots.sort_by(|left, right| right.age.cmp(&left.age).then(left.id.cmp(&right.id)));
        snapshots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner.table).live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every expired session now, returning their ids. The reaper thread calls
    /// this on each tick.
    pub fn reap_expired(&self) -> Vec<String> {
        self.inner.reap_expired()
    }

    /// Closes every live session.
    pub fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = lock_unpoisoned(&self.inner.table)
            .live
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            session.close();
        }
    }

    /// Stops the reaper and closes every session.
    pub fn shutdown(&self) {
        if let Some(reaper) = lock_unpoisoned(&self.reaper).take() {
            drop(reaper.shutdown);
            if reaper.handle.join().is_err() {
                warn!("session reaper panicked");
            }
        }
        self.close_all();
    }

    fn lookup(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        lock_unpoisoned(&self.inner.table)
            .live
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::not_found(id))
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_reaper(inner: Weak<RegistryInner>, interval: Duration) -> Result<Reaper, SessionError> {
    let (shutdown, signal) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("session-reaper".to_string())
        .spawn(move || loop {
            match signal.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    inner.reap_expired();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
        .map_err(SessionError::ReaperSpawn)?;

    Ok(Reaper { shutdown, handle })
}
