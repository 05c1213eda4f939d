use bytes::Bytes;
use tokio::sync::watch;

/// The shared single-item buffer: the most recently published frame and a
/// generation counter bumped on every publish.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    pub frame: Bytes,
    pub generation: u64,
}

/// Single-slot, multi-reader frame broadcast.
///
/// One producer overwrites the slot; every consumer observes the latest
/// frame and blocks until the generation moves past the one it last saw.
/// Consumers cancel by dropping their receiver, so the producer keeps no
/// per-consumer bookkeeping.
pub struct FrameBroadcaster {
    tx: watch::Sender<FrameSlot>,
}

impl FrameBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(FrameSlot::default());
        Self { tx }
    }

    /// Overwrites the slot with a new frame and wakes all waiting consumers.
    pub fn publish(&self, frame: Bytes) {
        self.tx.send_modify(|slot| {
            slot.frame = frame;
            slot.generation += 1;
        });
    }

    /// Creates a consumer positioned at the current generation: its first
    /// `next_frame` call blocks until the next publish.
    pub fn subscribe(&self) -> FrameReceiver {
        let rx = self.tx.subscribe();
        let last_seen = rx.borrow().generation;
        FrameReceiver { rx, last_seen }
    }

    /// Snapshot of the current slot without waiting.
    pub fn latest(&self) -> FrameSlot {
        self.tx.borrow().clone()
    }
}

impl Default for FrameBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// A consumer of the frame broadcast.
pub struct FrameReceiver {
    rx: watch::Receiver<FrameSlot>,
    last_seen: u64,
}

impl FrameReceiver {
    /// Waits until the slot generation differs from the one last returned,
    /// then yields a snapshot copy of the frame. Returns `None` once the
    /// broadcaster is gone.
    pub async fn next_frame(&mut self) -> Option<(Bytes, u64)> {
        loop {
            {
                let slot = self.rx.borrow_and_update();
                if slot.generation != self.last_seen {
                    self.last_seen = slot.generation;
                    return Some((slot.frame.clone(), slot.generation));
                }
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn consumer_sees_published_frame() {
        let broadcaster = FrameBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(Bytes::from_static(b"\xff\xd8one"));
        let (frame, generation) = rx.next_frame().await.unwrap();
        assert_eq!(frame.as_ref(), b"\xff\xd8one");
        assert_eq!(generation, 1);
    }

    #[tokio::test]
    async fn second_consume_blocks_until_next_publish() {
        let broadcaster = FrameBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(Bytes::from_static(b"first"));
        rx.next_frame().await.unwrap();

        // No intervening publish: the consumer must not complete.
        let blocked = timeout(Duration::from_millis(100), rx.next_frame()).await;
        assert!(blocked.is_err());

        broadcaster.publish(Bytes::from_static(b"second"));
        let (frame, _) = timeout(Duration::from_secs(1), rx.next_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.as_ref(), b"second");
    }

    #[tokio::test]
    async fn one_publish_wakes_all_consumers() {
        let broadcaster = FrameBroadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let wait_a = tokio::spawn(async move { a.next_frame().await });
        let wait_b = tokio::spawn(async move { b.next_frame().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        broadcaster.publish(Bytes::from_static(b"wake"));

        let (got_a, got_b) = tokio::join!(wait_a, wait_b);
        assert_eq!(got_a.unwrap().unwrap().0.as_ref(), b"wake");
        assert_eq!(got_b.unwrap().unwrap().0.as_ref(), b"wake");
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_newer_generations() {
        let broadcaster = FrameBroadcaster::new();
        broadcaster.publish(Bytes::from_static(b"old"));

        let mut rx = broadcaster.subscribe();
        let blocked = timeout(Duration::from_millis(50), rx.next_frame()).await;
        assert!(blocked.is_err(), "subscriber starts at the current generation");

        broadcaster.publish(Bytes::from_static(b"new"));
        let (frame, _) = rx.next_frame().await.unwrap();
        assert_eq!(frame.as_ref(), b"new");
    }
}
