//! Asynchronous outbound channel
//!
//! Producers call [`Channel::publish`], which never waits: messages go into a
//! bounded queue drained by a background forwarder into a [`ChannelSink`].
//! When the queue is full the message is dropped and counted. The forwarder
//! makes one delivery attempt per message; retries and ordering belong to
//! whatever sits behind the sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Per-observation keyword/traffic notices
pub const TOPIC_TREND_KEYWORDS: &str = "trend-keywords";
/// Enriched aggregates after a merge-back
pub const TOPIC_TREND_CREATED: &str = "trend-created";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub topic: String,
    /// Partition/ordering key; the keyword for every trend topic
    pub key: String,
    pub payload: serde_json::Value,
    pub message_id: Uuid,
}

impl ChannelMessage {
    pub fn new<T: Serialize>(topic: &str, key: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self {
            topic: topic.to_string(),
            key: key.into(),
            payload: serde_json::to_value(payload)?,
            message_id: Uuid::new_v4(),
        })
    }
}

/// Fire-and-forget publish
pub trait Channel: Send + Sync {
    /// Hand `message` off without waiting for delivery
    fn publish(&self, message: ChannelMessage) -> Result<()>;
}

/// Final destination of channel messages
#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn deliver(&self, message: ChannelMessage) -> Result<()>;
}

/// Bounded queue + forwarder task
pub struct BufferedChannel {
    tx: mpsc::Sender<ChannelMessage>,
    dropped: Arc<AtomicU64>,
}

impl BufferedChannel {
    /// Create the channel and spawn its forwarder
    ///
    /// The forwarder exits once every `BufferedChannel` handle is dropped and
    /// the queue has drained.
    pub fn spawn(capacity: usize, sink: Arc<dyn ChannelSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ChannelMessage>(capacity.max(1));

        let forwarder = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let topic = message.topic.clone();
                let message_id = message.message_id;
                if let Err(e) = sink.deliver(message).await {
                    warn!(topic = %topic, %message_id, "Channel delivery failed: {}", e);
                }
            }
            debug!("Channel forwarder stopped");
        });

        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            forwarder,
        )
    }

    /// Messages dropped because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Channel for BufferedChannel {
    fn publish(&self, message: ChannelMessage) -> Result<()> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %message.topic, key = %message.key, "Channel queue full, message dropped");
                Err(Error::Publish(format!("queue full, dropped {}", message.message_id)))
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %message.topic, key = %message.key, "Channel closed, message dropped");
                Err(Error::Publish(format!("channel closed, dropped {}", message.message_id)))
            }
        }
    }
}

/// Writes one structured log line per message
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ChannelSink for LogSink {
    async fn deliver(&self, message: ChannelMessage) -> Result<()> {
        info!(
            topic = %message.topic,
            key = %message.key,
            message_id = %message.message_id,
            payload = %message.payload,
            "Channel message"
        );
        Ok(())
    }
}

/// Fans messages out to in-process subscribers
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ChannelMessage>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ChannelSink for BroadcastSink {
    async fn deliver(&self, message: ChannelMessage) -> Result<()> {
        if self.tx.send(message).is_err() {
            debug!("No in-process channel subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Sink that blocks until released
    struct StalledSink {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ChannelSink for StalledSink {
        async fn deliver(&self, _message: ChannelMessage) -> Result<()> {
            self.release.notified().await;
            Ok(())
        }
    }

    fn message(key: &str) -> ChannelMessage {
        ChannelMessage::new(TOPIC_TREND_KEYWORDS, key, &serde_json::json!({ "keyword": key })).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_in_order() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();
        let (channel, _forwarder) = BufferedChannel::spawn(16, Arc::new(sink));

        channel.publish(message("a")).unwrap();
        channel.publish(message("b")).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(second.key, "b");
        assert_eq!(channel.dropped(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_waiting() {
        let release = Arc::new(Notify::new());
        let (channel, _forwarder) = BufferedChannel::spawn(
            1,
            Arc::new(StalledSink {
                release: release.clone(),
            }),
        );

        // First message is taken by the stalled forwarder, second fills the queue
        channel.publish(message("a")).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.publish(message("b")).unwrap();

        assert!(matches!(channel.publish(message("c")), Err(Error::Publish(_))));
        assert!(matches!(channel.publish(message("d")), Err(Error::Publish(_))));
        assert_eq!(channel.dropped(), 2);

        release.notify_waiters();
    }

    #[test]
    fn test_message_ids_are_unique() {
        assert_ne!(message("a").message_id, message("a").message_id);
    }
}
