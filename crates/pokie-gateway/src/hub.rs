use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use pokie_types::events::SessionEvent;

/// Outbound buffer per connection. A client this far behind misses events
/// and has to refetch session state.
pub const CONNECTION_BUFFER: usize = 64;

pub type ConnectionId = Uuid;

/// Serialized event text, shared by every connection it is sent to.
pub type Frame = Arc<str>;

/// Tracks open client connections per session and fans events out to them.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// session_id -> (conn_id -> outbound sender)
    sessions: RwLock<HashMap<String, HashMap<ConnectionId, mpsc::Sender<Frame>>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a session. Returns its id and the receiver
    /// the connection loop drains.
    pub async fn register(&self, session_id: &str) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        self.inner
            .sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(conn_id, tx);

        debug!("Connection {} registered for session {}", conn_id, session_id);
        (conn_id, rx)
    }

    /// Remove a connection. The session entry goes away with its last connection.
    pub async fn unregister(&self, session_id: &str, conn_id: ConnectionId) {
        let mut sessions = self.inner.sessions.write().await;
        remove_connection(&mut sessions, session_id, conn_id);
    }

    /// Send an event to every connection registered for the session.
    ///
    /// Never waits on a slow client and never fails: closed connections are
    /// pruned, full ones skip this event. Returns how many connections
    /// accepted it.
    pub async fn broadcast(&self, session_id: &str, event: &SessionEvent) -> usize {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let sessions = self.inner.sessions.read().await;
            let Some(connections) = sessions.get(session_id) else {
                return 0;
            };

            for (&conn_id, tx) in connections {
                match tx.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            "Connection {} in session {} is lagging, dropped {} event",
                            conn_id,
                            session_id,
                            event.kind()
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(conn_id),
                }
            }
        }

        if !closed.is_empty() {
            let mut sessions = self.inner.sessions.write().await;
            for conn_id in closed {
                debug!("Pruning closed connection {} from session {}", conn_id, session_id);
                remove_connection(&mut sessions, session_id, conn_id);
            }
        }

        delivered
    }

    /// Number of open connections for a session.
    pub async fn connection_count(&self, session_id: &str) -> usize {
        self.inner
            .sessions
            .read()
            .await
            .get(session_id)
            .map_or(0, HashMap::len)
    }

    /// Number of sessions with at least one open connection.
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}

fn remove_connection(
    sessions: &mut HashMap<String, HashMap<ConnectionId, mpsc::Sender<Frame>>>,
    session_id: &str,
    conn_id: ConnectionId,
) {
    if let Some(connections) = sessions.get_mut(session_id) {
        connections.remove(&conn_id);
        if connections.is_empty() {
            sessions.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(story_id: &str) -> SessionEvent {
        SessionEvent::VotingStarted {
            story_id: story_id.into(),
            timer_end_time: None,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_only_that_session() {
        let hub = NotificationHub::new();
        let (_a, mut rx_a) = hub.register("s1").await;
        let (_b, mut rx_b) = hub.register("s1").await;
        let (_c, mut rx_c) = hub.register("s2").await;

        assert_eq!(hub.broadcast("s1", &started("t1")).await, 2);

        let frame = rx_a.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "voting_started");
        assert_eq!(json["data"]["story_id"], "t1");
        assert!(rx_b.recv().await.is_some());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_prunes_empty_sessions() {
        let hub = NotificationHub::new();
        let (a, _rx_a) = hub.register("s1").await;
        let (b, _rx_b) = hub.register("s1").await;
        assert_eq!(hub.connection_count("s1").await, 2);

        hub.unregister("s1", a).await;
        assert_eq!(hub.connection_count("s1").await, 1);
        hub.unregister("s1", b).await;
        assert_eq!(hub.session_count().await, 0);

        // Unknown ids are a no-op
        hub.unregister("s1", b).await;
        hub.unregister("nope", Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn dropped_connection_is_pruned_and_others_still_receive() {
        let hub = NotificationHub::new();
        let (_a, rx_a) = hub.register("s1").await;
        let (_b, mut rx_b) = hub.register("s1").await;
        drop(rx_a);

        assert_eq!(hub.broadcast("s1", &started("t1")).await, 1);
        assert!(rx_b.recv().await.is_some());
        assert_eq!(hub.connection_count("s1").await, 1);
    }

    #[tokio::test]
    async fn full_connection_skips_event_without_blocking() {
        let hub = NotificationHub::new();
        let (_slow, mut rx_slow) = hub.register("s1").await;

        for _ in 0..CONNECTION_BUFFER {
            assert_eq!(hub.broadcast("s1", &started("t1")).await, 1);
        }
        assert_eq!(hub.broadcast("s1", &started("t2")).await, 0);
        // Still registered: lagging is not the same as gone
        assert_eq!(hub.connection_count("s1").await, 1);

        let first = rx_slow.recv().await.unwrap();
        assert!(first.contains("\"t1\""));
    }

    #[tokio::test]
    async fn broadcast_to_unknown_session_is_noop() {
        let hub = NotificationHub::new();
        assert_eq!(hub.broadcast("ghost", &started("t1")).await, 0);
    }

    #[tokio::test]
    async fn concurrent_register_and_broadcast() {
        let hub = NotificationHub::new();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                let (id, rx) = hub.register("s1").await;
                hub.broadcast("s1", &started(&format!("t{}", i))).await;
                drop(rx);
                hub.unregister("s1", id).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(hub.session_count().await, 0);
    }
}
