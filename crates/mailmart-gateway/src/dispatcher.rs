use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use mailmart_types::events::Outgoing;

/// Capacity of the live outbound channel, and of the backlog held while no
/// bridge is connected.
const OUTBOX_CAPACITY: usize = 1024;

/// Fans outgoing messages out to every connected messaging bridge.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connected bridge receives every outgoing message
    outbox_tx: broadcast::Sender<Outgoing>,

    /// Messages published with nobody listening, oldest first
    backlog: Mutex<VecDeque<Outgoing>>,

    /// Connected bridges: conn_id -> remote label
    bridges: RwLock<HashMap<Uuid, String>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (outbox_tx, _) = broadcast::channel(OUTBOX_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                outbox_tx,
                backlog: Mutex::new(VecDeque::new()),
                bridges: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outgoing> {
        self.inner.outbox_tx.subscribe()
    }

    /// Send to every live bridge, or park the message in the backlog when
    /// none is listening.
    pub fn publish(&self, message: Outgoing) {
        if let Err(broadcast::error::SendError(message)) = self.inner.outbox_tx.send(message) {
            let Ok(mut backlog) = self.inner.backlog.lock() else {
                warn!("Backlog lock poisoned, dropped message for chat {}", message.chat_id);
                return;
            };
            if backlog.len() >= OUTBOX_CAPACITY {
                if let Some(dropped) = backlog.pop_front() {
                    warn!("Backlog full, dropped oldest message for chat {}", dropped.chat_id);
                }
            }
            debug!("No bridge connected, holding message for chat {}", message.chat_id);
            backlog.push_back(message);
        }
    }

    /// Publish a batch, returning how many messages were accepted.
    pub fn publish_all(&self, messages: Vec<Outgoing>) -> usize {
        let count = messages.len();
        for message in messages {
            self.publish(message);
        }
        count
    }

    /// Take everything held while no bridge was connected.
    pub fn drain_backlog(&self) -> Vec<Outgoing> {
        match self.inner.backlog.lock() {
            Ok(mut backlog) => backlog.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn bridge_connected(&self, label: String) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.bridges.write().await.insert(conn_id, label);
        conn_id
    }

    pub async fn bridge_disconnected(&self, conn_id: Uuid) -> Option<String> {
        self.inner.bridges.write().await.remove(&conn_id)
    }
}
