use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

/// Consumer of decoded screenshot frames. The stream is lossy by
/// design; a sink may drop frames it cannot keep up with.
#[async_trait]
pub trait ImageSink: Send + Sync {
    async fn submit(&self, seq: u64, frame: Bytes);
}

/// Keeps only the newest frame. Stale frames that arrive out of order
/// are discarded so a slow socket cannot roll the picture backwards.
pub struct LatestFrameStore {
    tx: watch::Sender<Option<(u64, Bytes)>>,
}

impl LatestFrameStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Watch handle for code that wants to be woken on new frames.
    pub fn subscribe(&self) -> watch::Receiver<Option<(u64, Bytes)>> {
        self.tx.subscribe()
    }

    /// The most recent frame, if any arrived yet.
    pub fn latest(&self) -> Option<Bytes> {
        self.tx.borrow().as_ref().map(|(_, frame)| frame.clone())
    }
}

impl Default for LatestFrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSink for LatestFrameStore {
    async fn submit(&self, seq: u64, frame: Bytes) {
        self.tx.send_if_modified(|slot| match slot {
            Some((current, _)) if *current >= seq => false,
            _ => {
                *slot = Some((seq, frame));
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_newest_frame() {
        let store = LatestFrameStore::new();
        store.submit(1, Bytes::from_static(b"one")).await;
        store.submit(2, Bytes::from_static(b"two")).await;
        assert_eq!(store.latest().unwrap().as_ref(), b"two");
    }

    #[tokio::test]
    async fn stale_frame_is_dropped() {
        let store = LatestFrameStore::new();
        store.submit(5, Bytes::from_static(b"new")).await;
        store.submit(3, Bytes::from_static(b"old")).await;
        assert_eq!(store.latest().unwrap().as_ref(), b"new");
    }

    #[tokio::test]
    async fn subscribers_wake_on_fresh_frames_only() {
        let store = LatestFrameStore::new();
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.submit(1, Bytes::from_static(b"fresh")).await;
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.submit(1, Bytes::from_static(b"dup")).await;
        assert!(!rx.has_changed().unwrap());
    }
}
