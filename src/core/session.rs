//! Keyed, in-memory session state.
//!
//! Sessions are created implicitly on first reference and live for the life
//! of the process. Mutation is serialized per key: appends on one session
//! never interleave mid-turn, and snapshots never observe a half-written
//! turn. Unrelated sessions share nothing but the map itself.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;

use crate::core::message::Turn;

/// Shared handle to one session's transcript.
///
/// A relay holds its handle across a whole stream, so an assistant turn
/// committed after a concurrent clear lands on the emptied transcript
/// (last-writer-wins; the accepted race, not a defect).
#[derive(Clone, Default)]
pub struct SessionHandle {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl SessionHandle {
    pub fn append(&self, turn: Turn) {
        self.lock().push(turn);
    }

    /// Read-only copy of the transcript in insertion order.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.lock().clone()
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Turn>> {
        // Appends and clears cannot panic mid-write; recover the data if a
        // holder ever does.
        self.turns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Map from session key to transcript. Cheap to clone; all clones share the
/// same underlying sessions.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the transcript for `key`, creating an empty one if absent.
    pub fn get_or_create(&self, key: &str) -> SessionHandle {
        self.sessions.entry(key.to_string()).or_default().clone()
    }

    pub fn append(&self, key: &str, turn: Turn) {
        self.get_or_create(key).append(turn);
    }

    /// Truncate the session's transcript. Clearing a never-seen key is a
    /// no-op and does not create the session.
    pub fn clear(&self, key: &str) {
        if let Some(handle) = self.sessions.get(key) {
            handle.clear();
        }
    }

    pub fn snapshot(&self, key: &str) -> Vec<Turn> {
        self.sessions
            .get(key)
            .map(|handle| handle.snapshot())
            .unwrap_or_default()
    }
}
