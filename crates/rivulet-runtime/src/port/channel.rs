//! Message channels between one producer and one consumer.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Default capacity of bounded channels.
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Capacity policy applied to every channel of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCapacity {
    /// At most `n` queued messages; producers wait while the channel is full.
    Bounded(NonZeroUsize),
    /// Unbounded queue; producers never wait.
    Dynamic,
}

impl ChannelCapacity {
    /// Creates a bounded capacity, or `None` for zero.
    pub fn bounded(size: usize) -> Option<Self> {
        NonZeroUsize::new(size).map(Self::Bounded)
    }
}

impl Default for ChannelCapacity {
    fn default() -> Self {
        Self::Bounded(NonZeroUsize::MIN.saturating_add(DEFAULT_CHANNEL_SIZE - 1))
    }
}

/// Creates a channel with the given capacity.
pub(crate) fn channel(capacity: ChannelCapacity) -> (ChannelSender, ChannelReceiver) {
    match capacity {
        ChannelCapacity::Bounded(size) => {
            let (tx, rx) = mpsc::channel(size.get());
            (ChannelSender::Bounded(tx), ChannelReceiver::Bounded(rx))
        }
        ChannelCapacity::Dynamic => {
            let (tx, rx) = mpsc::unbounded_channel();
            (ChannelSender::Dynamic(tx), ChannelReceiver::Dynamic(rx))
        }
    }
}

/// Producer side of a channel.
#[derive(Debug, Clone)]
pub(crate) enum ChannelSender {
    Bounded(mpsc::Sender<Value>),
    Dynamic(mpsc::UnboundedSender<Value>),
}

impl ChannelSender {
    /// Sends a message, waiting for room on bounded channels.
    ///
    /// Returns `false` if the consumer is gone.
    pub async fn send(&self, value: Value) -> bool {
        match self {
            Self::Bounded(tx) => tx.send(value).await.is_ok(),
            Self::Dynamic(tx) => tx.send(value).is_ok(),
        }
    }
}

/// Consumer side of a channel.
#[derive(Debug)]
pub(crate) enum ChannelReceiver {
    Bounded(mpsc::Receiver<Value>),
    Dynamic(mpsc::UnboundedReceiver<Value>),
}

impl ChannelReceiver {
    /// Receives the next message, or `None` once every producer is gone and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Value> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Dynamic(rx) => rx.recv().await,
        }
    }
}
