//! Downstream publish notification.
//!
//! The core notifies the sink after an approval that published has been
//! committed. Delivery is fire-and-forget: the core neither waits for nor
//! retries an acknowledgement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::item::ItemId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishNotice {
    pub id: ItemId,
    pub media_or_doc_ref: String,
    pub published_at: DateTime<Utc>,
}

pub trait PublishSink: Send + Sync {
    fn publish(&self, notice: PublishNotice);
}

/// Sink that only records the notice in the service log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublishSink;

impl PublishSink for LogPublishSink {
    fn publish(&self, notice: PublishNotice) {
        info!(
            "Published {} ({}) at {}",
            notice.id, notice.media_or_doc_ref, notice.published_at
        );
    }
}

/// Sink that forwards notices over an unbounded channel.
pub struct ChannelPublishSink {
    sender: mpsc::UnboundedSender<PublishNotice>,
}

impl ChannelPublishSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PublishNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl PublishSink for ChannelPublishSink {
    fn publish(&self, notice: PublishNotice) {
        if self.sender.send(notice).is_err() {
            error!("Failed to forward publish notice: receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_notices() {
        let (sink, mut receiver) = ChannelPublishSink::new();
        let notice = PublishNotice {
            id: ItemId::from("d"),
            media_or_doc_ref: "docs://d".to_string(),
            published_at: Utc::now(),
        };
        sink.publish(notice.clone());
        assert_eq!(receiver.recv().await, Some(notice));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, receiver) = ChannelPublishSink::new();
        drop(receiver);
        sink.publish(PublishNotice {
            id: ItemId::from("d"),
            media_or_doc_ref: "docs://d".to_string(),
            published_at: Utc::now(),
        });
    }
}
