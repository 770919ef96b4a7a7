//! Per-share session tracking.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use vfsx::{OpKind, ParsedMessage};

/// What the daemon knows about one share.
#[derive(Clone, Debug)]
pub struct Session {
    /// Share root the session is keyed by
    pub root_path: String,
    /// Number of requests seen for this share, including the current one
    pub operations: u64,
    /// When the first request for this share arrived
    pub started: Instant,
}

/// Sessions keyed by share root, shared by all connections.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request and return the session as it stands after it.
    ///
    /// A session is created on first sight of its root and removed again by
    /// `disconnect`; the returned snapshot is the final state in that case.
    pub fn observe(&self, request: &ParsedMessage) -> Session {
        let mut sessions = self.lock();
        let session = sessions
            .entry(request.root_path.clone())
            .or_insert_with(|| {
                tracing::info!(root = %request.root_path, "session started");
                Session {
                    root_path: request.root_path.clone(),
                    operations: 0,
                    started: Instant::now(),
                }
            });
        session.operations += 1;
        let snapshot = session.clone();

        if request.kind() == Some(OpKind::Disconnect) {
            sessions.remove(&request.root_path);
            tracing::info!(
                root = %snapshot.root_path,
                operations = snapshot.operations,
                elapsed = ?snapshot.started.elapsed(),
                "session ended"
            );
        }
        snapshot
    }

    /// Get a snapshot of the session for `root_path`.
    pub fn get(&self, root_path: &str) -> Option<Session> {
        self.lock().get(root_path).cloned()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no session is open.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
