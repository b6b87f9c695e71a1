//! Reading and writing handles bound to materialized ports.

use std::collections::BTreeMap;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::channel::{ChannelReceiver, ChannelSender};
use crate::error::{Error, Result};

/// Tracing target for port handles.
const TRACING_TARGET: &str = "rivulet_runtime::port";

/// Receivers backing a port, mirroring its shape.
#[derive(Debug)]
pub(crate) enum ReaderNode {
    Leaf(ChannelReceiver),
    Map(BTreeMap<String, ReaderNode>),
}

impl ReaderNode {
    /// Receives one message per leaf and assembles map ports into objects.
    ///
    /// Returns `None` as soon as any leaf is closed.
    fn recv(&mut self) -> BoxFuture<'_, Option<Value>> {
        async move {
            match self {
                Self::Leaf(rx) => rx.recv().await,
                Self::Map(entries) => {
                    let keys: Vec<String> = entries.keys().cloned().collect();
                    let values = future::try_join_all(
                        entries
                            .values_mut()
                            .map(|entry| entry.recv().map(|value| value.ok_or(()))),
                    )
                    .await
                    .ok()?;
                    Some(Value::Object(keys.into_iter().zip(values).collect::<Map<_, _>>()))
                }
            }
        }
        .boxed()
    }

    fn bufferize(&mut self, cancel: &CancellationToken) {
        match self {
            Self::Leaf(rx) => {
                if matches!(rx, ChannelReceiver::Dynamic(_)) {
                    return;
                }
                let (tx, buffered) = mpsc::unbounded_channel();
                let upstream = std::mem::replace(rx, ChannelReceiver::Dynamic(buffered));
                tokio::spawn(forward(upstream, tx, cancel.clone()));
            }
            Self::Map(entries) => {
                for entry in entries.values_mut() {
                    entry.bufferize(cancel);
                }
            }
        }
    }
}

/// Drains a bounded channel into an unbounded one.
async fn forward(
    mut upstream: ChannelReceiver,
    tx: mpsc::UnboundedSender<Value>,
    cancel: CancellationToken,
) {
    loop {
        let value = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            value = upstream.recv() => value,
        };
        let Some(value) = value else { break };
        if tx.send(value).is_err() {
            break;
        }
    }
}

/// Consuming end of a port.
#[derive(Debug)]
pub struct PortReader {
    name: String,
    node: ReaderNode,
    cancel: CancellationToken,
}

impl PortReader {
    pub(crate) fn new(name: impl Into<String>, node: ReaderNode, cancel: CancellationToken) -> Self {
        Self {
            name: name.into(),
            node,
            cancel,
        }
    }

    /// Returns the qualified port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receives the next message.
    ///
    /// Returns `Ok(None)` once the port is closed and drained, and
    /// [`Error::Cancelled`] if the network is shut down while waiting.
    pub async fn recv(&mut self) -> Result<Option<Value>> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            value = self.node.recv() => Ok(value),
        }
    }

    /// Receives the next message, failing with [`Error::Closed`] if the port
    /// is closed.
    pub async fn pull(&mut self) -> Result<Value> {
        let value = self.recv().await?;
        tracing::trace!(target: TRACING_TARGET, port = %self.name, "Pulled message");
        value.ok_or_else(|| Error::Closed(self.name.clone()))
    }

    /// Decouples this reader from its producers with unbounded look-ahead.
    ///
    /// Producers feeding this port no longer wait for a matching read. Must
    /// be called within a tokio runtime.
    pub fn bufferize(&mut self) {
        tracing::debug!(target: TRACING_TARGET, port = %self.name, "Bufferizing port");
        self.node.bufferize(&self.cancel);
    }
}

/// Senders backing a port, mirroring its shape.
///
/// A leaf may feed any number of channels, one per destination.
#[derive(Debug, Clone)]
pub(crate) enum WriterNode {
    Leaf(Vec<ChannelSender>),
    Map(BTreeMap<String, WriterNode>),
}

impl WriterNode {
    fn send<'a>(&'a self, port: &'a str, value: Value) -> BoxFuture<'a, Result<()>> {
        async move {
            match self {
                Self::Leaf(senders) => {
                    for sender in senders {
                        if !sender.send(value.clone()).await {
                            tracing::trace!(
                                target: TRACING_TARGET,
                                port = %port,
                                "Destination closed, message dropped"
                            );
                        }
                    }
                    Ok(())
                }
                Self::Map(entries) => {
                    let Value::Object(mut object) = value else {
                        return Err(Error::invalid_message(port, "expected an object"));
                    };
                    let mut parts = Vec::with_capacity(entries.len());
                    for (key, entry) in entries {
                        let value = object.remove(key).ok_or_else(|| {
                            Error::invalid_message(port, format!("missing key '{key}'"))
                        })?;
                        parts.push((entry, value));
                    }
                    if let Some(key) = object.keys().next() {
                        return Err(Error::invalid_message(port, format!("unexpected key '{key}'")));
                    }
                    for (entry, value) in parts {
                        entry.send(port, value).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }
}

/// Producing end of a port.
///
/// Cloning a writer adds another producer; the downstream channels close
/// once every clone is dropped.
#[derive(Debug, Clone)]
pub struct PortWriter {
    name: String,
    node: WriterNode,
    cancel: CancellationToken,
}

impl PortWriter {
    pub(crate) fn new(name: impl Into<String>, node: WriterNode, cancel: CancellationToken) -> Self {
        Self {
            name: name.into(),
            node,
            cancel,
        }
    }

    /// Returns the qualified port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a message to every destination of the port.
    ///
    /// Map-shaped ports split an object onto their entries. Waits while a
    /// bounded destination is full and fails with [`Error::Cancelled`] if the
    /// network is shut down meanwhile.
    pub async fn push(&self, value: Value) -> Result<()> {
        tracing::trace!(target: TRACING_TARGET, port = %self.name, "Pushing message");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            result = self.node.send(&self.name, value) => result,
        }
    }

    /// Closes this producer.
    pub fn close(self) {
        tracing::debug!(target: TRACING_TARGET, port = %self.name, "Closing port");
    }
}
