//! Connection-to-session bindings.
//!
//! Maps each live WebSocket connection to the session it feeds, creating the
//! session lazily on first use. The registry is owned by the server's shared
//! state and scoped to its lifetime; bindings themselves are ephemeral and
//! never persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{Db, StorageError};
use crate::models::DEFAULT_SESSION_TITLE;

/// Opaque identity of one live connection, minted when the socket is
/// accepted and dead once it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The session a connection is bound to.
#[derive(Debug, Clone)]
pub struct Binding {
    pub session_id: String,
    pub user_id: String,
}

/// Live connection bindings. At most one binding exists per connection;
/// binding creation is the only write path.
pub struct ConnectionRegistry {
    db: Arc<Db>,
    agent_name: String,
    bindings: Mutex<HashMap<ConnectionId, Binding>>,
}

impl ConnectionRegistry {
    pub fn new(db: Arc<Db>, agent_name: String) -> Self {
        Self {
            db,
            agent_name,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the binding for `conn`, creating a fresh session for it if
    /// none exists yet. The entry API guards the insert so a binding, once
    /// present, is never overwritten.
    pub async fn resolve(
        &self,
        conn: ConnectionId,
        user_id: &str,
    ) -> Result<Binding, StorageError> {
        if let Some(binding) = self.bindings.lock().expect("registry lock").get(&conn) {
            return Ok(binding.clone());
        }

        let session = self
            .db
            .create_session(DEFAULT_SESSION_TITLE, user_id, &self.agent_name)
            .await?;
        info!(%conn, session_id = %session.id, "bound connection to new session");

        let mut bindings = self.bindings.lock().expect("registry lock");
        let binding = bindings
            .entry(conn)
            .or_insert(Binding {
                session_id: session.id,
                user_id: user_id.to_string(),
            })
            .clone();
        Ok(binding)
    }

    /// Drops the binding for a closed connection. No-op if absent.
    pub fn release(&self, conn: ConnectionId) {
        if self.bindings.lock().expect("registry lock").remove(&conn).is_some() {
            debug!(%conn, "released connection binding");
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.bindings.lock().expect("registry lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn registry() -> ConnectionRegistry {
        let db = Arc::new(db::in_memory().await);
        ConnectionRegistry::new(db, "business-agent".to_string())
    }

    #[tokio::test]
    async fn resolve_is_stable_for_one_connection() {
        let registry = registry().await;
        let conn = ConnectionId::new();

        let first = registry.resolve(conn, "default_user").await.unwrap();
        let second = registry.resolve(conn, "default_user").await.unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn distinct_connections_get_distinct_sessions() {
        let registry = Arc::new(registry().await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .resolve(ConnectionId::new(), "default_user")
                    .await
                    .unwrap()
                    .session_id
            }));
        }

        let mut session_ids = Vec::new();
        for handle in handles {
            session_ids.push(handle.await.unwrap());
        }
        session_ids.sort();
        session_ids.dedup();
        assert_eq!(session_ids.len(), 8, "no two connections share a session");
        assert_eq!(registry.len(), 8);
    }

    #[tokio::test]
    async fn release_removes_binding_and_reconnect_gets_fresh_session() {
        let registry = registry().await;
        let conn = ConnectionId::new();

        let first = registry.resolve(conn, "default_user").await.unwrap();
        registry.release(conn);
        assert_eq!(registry.len(), 0);

        // Releasing twice is a no-op.
        registry.release(conn);

        let second = registry.resolve(conn, "default_user").await.unwrap();
        assert_ne!(first.session_id, second.session_id);
    }
}
