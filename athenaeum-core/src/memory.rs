//! Conversation memory: append-only per-thread checkpoints.
//!
//! A thread's history is a sequence of [`Turn`]s numbered from 1. Stores only
//! ever append the next turn; earlier turns are never rewritten, so replaying
//! a thread always reproduces the same log. The orchestrator loads the latest
//! [`AgentState`] at the start of a turn and appends one turn at its end.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::error::MemoryError;
use crate::persistence::{atomic_write_json, load_json};
use crate::types::{AgentState, Message, ResponseFlags};

/// The messages produced by one orchestrator turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based position of this turn in its thread.
    pub number: u64,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub flags: ResponseFlags,
    pub completed_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(number: u64, messages: Vec<Message>, flags: ResponseFlags) -> Self {
        Self {
            number,
            messages,
            flags,
            completed_at: Utc::now(),
        }
    }
}

/// Rebuild the latest state of a thread from its turns.
pub fn replay(thread_id: &str, turns: &[Turn]) -> AgentState {
    let mut state = AgentState::new(thread_id);
    for turn in turns {
        state.messages.extend(turn.messages.iter().cloned());
    }
    state.turns = turns.len() as u64;
    state
}

/// Persistent mapping from thread id to its checkpointed turns.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Latest checkpoint for `thread_id`, or `None` for an unknown thread.
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, MemoryError>;

    /// Append the next turn. `turn.number` must be exactly one past the last
    /// stored turn.
    async fn append(&self, thread_id: &str, turn: Turn) -> Result<(), MemoryError>;

    /// All stored turns, oldest first.
    async fn turns(&self, thread_id: &str) -> Result<Vec<Turn>, MemoryError>;
}

fn check_next(thread_id: &str, stored: usize, turn: &Turn) -> Result<(), MemoryError> {
    let expected = stored as u64 + 1;
    if turn.number != expected {
        return Err(MemoryError::NonContiguousTurn {
            thread_id: thread_id.to_string(),
            expected,
            got: turn.number,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, Vec<Turn>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, MemoryError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).map(|turns| replay(thread_id, turns)))
    }

    async fn append(&self, thread_id: &str, turn: Turn) -> Result<(), MemoryError> {
        let mut threads = self.threads.write().await;
        let turns = threads.entry(thread_id.to_string()).or_default();
        check_next(thread_id, turns.len(), &turn)?;
        debug!(thread_id, turn = turn.number, "Checkpoint appended");
        turns.push(turn);
        Ok(())
    }

    async fn turns(&self, thread_id: &str) -> Result<Vec<Turn>, MemoryError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ThreadFile {
    thread_id: String,
    turns: Vec<Turn>,
}

/// One JSON file per thread, replaced atomically on every append.
#[derive(Debug)]
pub struct FileMemoryStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileMemoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `thread_id`. Characters outside `[A-Za-z0-9_-]` are
    /// hex-escaped so any id maps to a single safe file name.
    pub fn thread_path(&self, thread_id: &str) -> PathBuf {
        let mut name = String::with_capacity(thread_id.len());
        for b in thread_id.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                name.push(b as char);
            } else {
                name.push_str(&format!("%{b:02x}"));
            }
        }
        self.dir.join(format!("{name}.json"))
    }

    async fn read_turns(&self, thread_id: &str) -> Result<Vec<Turn>, MemoryError> {
        let path = self.thread_path(thread_id);
        match load_json::<ThreadFile>(&path).await {
            Ok(Some(file)) => Ok(file.turns),
            Ok(None) => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(MemoryError::Corruption {
                thread_id: thread_id.to_string(),
                message: e.to_string(),
            }),
            Err(e) => Err(MemoryError::Persistence {
                message: format!("Failed to read {}: {e}", path.display()),
            }),
        }
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, MemoryError> {
        let turns = self.read_turns(thread_id).await?;
        if turns.is_empty() {
            return Ok(None);
        }
        Ok(Some(replay(thread_id, &turns)))
    }

    async fn append(&self, thread_id: &str, turn: Turn) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        let mut turns = self.read_turns(thread_id).await?;
        check_next(thread_id, turns.len(), &turn)?;
        let number = turn.number;
        turns.push(turn);

        let path = self.thread_path(thread_id);
        let file = ThreadFile {
            thread_id: thread_id.to_string(),
            turns,
        };
        atomic_write_json(&path, &file)
            .await
            .map_err(|e| MemoryError::Persistence {
                message: format!("Failed to write {}: {e}", path.display()),
            })?;
        debug!(thread_id, turn = number, path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn turns(&self, thread_id: &str) -> Result<Vec<Turn>, MemoryError> {
        self.read_turns(thread_id).await
    }
}

// ---------------------------------------------------------------------------
// Per-thread serialization
// ---------------------------------------------------------------------------

/// Table of per-thread async mutexes.
///
/// Holding the guard for a thread id excludes any other turn on the same
/// thread; distinct threads never contend. An entry is removed once its last
/// holder or waiter is gone, so the table only holds threads with a turn in
/// flight.
#[derive(Debug, Default)]
pub struct ThreadLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn lock(&self, thread_id: &str) -> ThreadGuard<'_> {
        let lock = Arc::clone(self.table().entry(thread_id.to_string()).or_default());
        let guard = lock.lock_owned().await;
        ThreadGuard {
            owner: self,
            thread_id: thread_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Thread ids with a turn running or waiting.
    pub fn active(&self) -> usize {
        self.table().len()
    }
}

/// Exclusive hold on one thread id; releases and prunes on drop.
pub struct ThreadGuard<'a> {
    owner: &'a ThreadLocks,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.owner.table();
        // Waiters clone the Arc under the table lock, so a count of one
        // means the map holds the only reference.
        if table
            .get(&self.thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.thread_id);
        }
    }
}
