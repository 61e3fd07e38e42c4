use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::error::WireError;
use crate::wire::ChannelKind;

/// Handle to one open socket. Frames pushed here are picked up by the
/// writer task that owns the actual sink half.
#[derive(Clone)]
pub struct Connection {
    id: Uuid,
    kind: ChannelKind,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl Connection {
    pub fn new(kind: ChannelKind, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            outbound,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Queue a raw frame for delivery. Fails once the writer task has
    /// hung up, which means the socket is gone.
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), WireError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| WireError::ConnectionClosed)
    }
}

/// Open connections bucketed by channel. The peer may reconnect without
/// the old socket having been reaped yet, so each bucket is a list and
/// the most recently registered socket wins.
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<ChannelKind, Vec<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(HashMap::new()),
        })
    }

    pub async fn register(&self, conn: Connection) {
        let mut map = self.inner.write().await;
        map.entry(conn.kind()).or_default().push(conn);
    }

    pub async fn unregister(&self, kind: ChannelKind, id: Uuid) -> bool {
        let mut map = self.inner.write().await;
        match map.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|c| c.id() != id);
                list.len() != before
            }
            None => false,
        }
    }

    /// The connection outbound frames should go to, newest first.
    pub async fn active(&self, kind: ChannelKind) -> Option<Connection> {
        let map = self.inner.read().await;
        map.get(&kind).and_then(|list| list.last().cloned())
    }

    pub async fn count(&self, kind: ChannelKind) -> usize {
        let map = self.inner.read().await;
        map.get(&kind).map_or(0, Vec::len)
    }
}
