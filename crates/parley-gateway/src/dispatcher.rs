use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Manages all connected clients and routes events to them.
///
/// Presence goes over the broadcast channel (everyone sees who is online);
/// message and conversation events go over per-user channels so only the two
/// participants of a conversation ever receive them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — all connected clients receive all events
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Track online users: user_id -> handle
    online_users: RwLock<HashMap<Uuid, String>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    /// A reconnect replaces the previous channel; the conn_id lets the old
    /// connection's teardown recognize it no longer owns the entry.
    pub async fn register_user_channel(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.user_channels.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Dropped silently if the
    /// user has no gateway connection; they will see the data on their next
    /// query instead.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Register a user as online.
    pub async fn user_online(&self, user_id: Uuid, handle: String) {
        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, handle.clone());

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            handle,
            online: true,
        });
    }

    /// Register a user as offline. Only cleans up if conn_id matches.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        // Only clean up if this connection still owns the user channel
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels.get(&user_id).map_or(false, |(cid, _)| *cid == conn_id)
        };

        if !is_current {
            // A newer connection has taken over — don't touch anything
            return;
        }

        let handle = self
            .inner
            .online_users
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default();

        self.unregister_user_channel(user_id, conn_id).await;

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            handle,
            online: false,
        });
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn targeted_send_reaches_only_the_target() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        dispatcher
            .send_to_user(alice, GatewayEvent::ConversationCreate { id: Uuid::new_v4() })
            .await;

        assert!(matches!(
            alice_rx.try_recv(),
            Ok(GatewayEvent::ConversationCreate { .. })
        ));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_offline_user_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .send_to_user(Uuid::new_v4(), GatewayEvent::ConversationCreate { id: Uuid::new_v4() })
            .await;
    }

    #[tokio::test]
    async fn reconnect_takes_over_the_user_channel() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (old_conn, mut old_rx) = dispatcher.register_user_channel(user).await;
        let (_, mut new_rx) = dispatcher.register_user_channel(user).await;

        // The old connection's teardown must not tear down the new channel
        dispatcher.user_offline(user, old_conn).await;

        dispatcher
            .send_to_user(user, GatewayEvent::ConversationCreate { id: Uuid::new_v4() })
            .await;

        assert!(new_rx.try_recv().is_ok());
        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn presence_is_broadcast_to_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let user = Uuid::new_v4();

        dispatcher.user_online(user, "alice".into()).await;

        match rx.recv().await {
            Ok(GatewayEvent::PresenceUpdate { user_id, handle, online }) => {
                assert_eq!(user_id, user);
                assert_eq!(handle, "alice");
                assert!(online);
            }
            other => panic!("expected PresenceUpdate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn offline_clears_presence_and_channel() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (conn_id, _rx) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user, "alice".into()).await;
        dispatcher.user_offline(user, conn_id).await;

        assert!(dispatcher.online_users().await.is_empty());
    }
}
