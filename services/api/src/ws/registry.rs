//! The connection registry: the only state shared across connections.

use crate::models::ActiveSession;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;
use voxchat_core::ServerFrame;

/// Outbound side of a live connection. Frames pushed here are written to the
/// socket in order by the connection's writer task.
pub type ConnectionHandle = mpsc::Sender<ServerFrame>;

/// Server-side state for one live connection.
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    interrupted: AtomicBool,
    connection: ConnectionHandle,
}

impl Session {
    fn new(id: Uuid, connection: ConnectionHandle) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            interrupted: AtomicBool::new(false),
            connection,
        }
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    /// Records a barge-in. In-flight completions are not cancelled.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.touch();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Clears the interrupt flag for a new turn, returning whether it was set.
    pub fn begin_turn(&self) -> bool {
        self.touch();
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    fn summary(&self) -> ActiveSession {
        ActiveSession {
            id: self.id,
            created_at: self.created_at,
            last_activity: self.last_activity(),
        }
    }
}

/// Maps session identifiers to live connections.
///
/// Insert, remove and lookup all go through the same async mutex. At most one
/// entry exists per identifier, and identifiers are never reused while live.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<Session>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a fresh session identifier to `connection` and registers it.
    pub async fn register(&self, connection: ConnectionHandle) -> Arc<Session> {
        let mut sessions = self.sessions.lock().await;
        let mut id = Uuid::new_v4();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let session = Arc::new(Session::new(id, connection));
        sessions.insert(id, session.clone());
        session
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.lock().await.remove(&id)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Snapshot of live sessions, oldest first.
    pub async fn sessions(&self) -> Vec<ActiveSession> {
        let mut sessions: Vec<ActiveSession> = self
            .sessions
            .lock()
            .await
            .values()
            .map(|s| s.summary())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }
}
