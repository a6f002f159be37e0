//! Presence registry
//!
//! At most one entry per user: the most recently authenticated connection.
//! Reconnecting replaces the entry; a disconnect only removes it when the
//! disconnecting session is still the one on record, so a late close from a
//! superseded socket cannot evict the newer session.

use std::sync::Arc;

use dashmap::DashMap;
use uchat_shared::UserId;

use super::connection::{Connection, SessionId};

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: DashMap<UserId, Arc<Connection>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `conn` as its user's current connection.
    ///
    /// Returns the connection it replaced, if it was a different session.
    pub fn join(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let session_id = conn.session_id;
        let previous = self.entries.insert(conn.user_id, conn);
        previous.filter(|prev| prev.session_id != session_id)
    }

    /// Remove the user's entry if `session_id` is still the one on record.
    ///
    /// Returns whether an entry was removed.
    pub fn leave(&self, user_id: UserId, session_id: SessionId) -> bool {
        self.entries
            .remove_if(&user_id, |_, current| current.session_id == session_id)
            .is_some()
    }

    /// Currently online identities, in no particular order
    pub fn snapshot(&self) -> Vec<UserId> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    pub fn current(&self, user_id: &UserId) -> Option<Arc<Connection>> {
        self.entries.get(user_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    fn connection(user_id: UserId) -> Arc<Connection> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Connection::new(user_id, tx))
    }

    #[test]
    fn test_join_and_leave() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let conn = connection(user);

        assert!(registry.join(Arc::clone(&conn)).is_none());
        assert!(registry.is_online(&user));

        assert!(registry.leave(user, conn.session_id));
        assert!(!registry.is_online(&user));
        assert!(!registry.leave(user, conn.session_id), "second leave is a no-op");
    }

    #[test]
    fn test_reconnect_replaces_entry() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let first = connection(user);
        let second = connection(user);

        registry.join(Arc::clone(&first));
        let replaced = registry.join(Arc::clone(&second)).expect("first session replaced");

        assert_eq!(replaced.session_id, first.session_id);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.current(&user).map(|c| c.session_id),
            Some(second.session_id)
        );
    }

    #[test]
    fn test_stale_disconnect_does_not_evict_newer_session() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let h1 = connection(user);
        let h2 = connection(user);

        registry.join(Arc::clone(&h1));
        registry.join(Arc::clone(&h2));

        assert!(!registry.leave(user, h1.session_id));
        assert!(registry.is_online(&user));
        assert_eq!(registry.current(&user).map(|c| c.session_id), Some(h2.session_id));
    }

    #[test]
    fn test_rejoin_same_session_reports_nothing_replaced() {
        let registry = PresenceRegistry::new();
        let conn = connection(UserId::new());

        registry.join(Arc::clone(&conn));
        assert!(registry.join(Arc::clone(&conn)).is_none());
    }

    #[test]
    fn test_snapshot_matches_unmatched_joins() {
        let registry = PresenceRegistry::new();
        let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
        let conns: Vec<_> = users.iter().map(|u| connection(*u)).collect();

        for conn in &conns {
            registry.join(Arc::clone(conn));
        }
        registry.leave(users[1], conns[1].session_id);
        registry.leave(users[3], conns[3].session_id);
        // Leave with a handle that never joined
        registry.leave(users[4], SessionId::new());

        let online: HashSet<UserId> = registry.snapshot().into_iter().collect();
        let expected: HashSet<UserId> = [users[0], users[2], users[4]].into_iter().collect();
        assert_eq!(online, expected);
    }

    #[tokio::test]
    async fn test_concurrent_joins_for_distinct_users() {
        let registry = Arc::new(PresenceRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let user = UserId::new();
                registry.join(connection(user));
                user
            }));
        }

        let mut joined = HashSet::new();
        for handle in handles {
            joined.insert(handle.await.unwrap());
        }

        let online: HashSet<UserId> = registry.snapshot().into_iter().collect();
        assert_eq!(online, joined);
    }
}
