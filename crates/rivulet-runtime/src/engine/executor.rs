//! Network materialization.

use std::collections::{BTreeMap, HashMap};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::network::{Network, run_worker};
use super::{EngineConfig, TRACING_TARGET};
use crate::compiler::validate;
use crate::error::{Error, Result};
use crate::operator::{OperatorId, OperatorTree};
use crate::port::{
    ChannelReceiver, ChannelSender, PortAddr, PortDirection, PortNode, PortReader, PortWriter,
    ReaderNode, WriterNode, channel,
};
use crate::primitive::WorkerContext;

/// Starts operator networks from flat trees.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        tracing::debug!(
            target: TRACING_TARGET,
            channel_size = config.channel_size,
            channel_dynamic = config.channel_dynamic,
            "Engine initialized"
        );
        Self { config }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates `tree` and spawns one worker per primitive.
    ///
    /// Every linked consumer leaf gets its own channel, plus one per root
    /// out-port leaf for external reads. Must be called within a tokio
    /// runtime.
    pub fn start(&self, tree: &OperatorTree) -> Result<Network> {
        validate(tree)?;

        let id = Uuid::now_v7();
        let root = tree.operator(tree.root())?;
        let cancel = CancellationToken::new();
        let mut wiring = Wiring::new(tree, self.config.clone(), cancel.clone())?;

        let mut workers = JoinSet::new();
        for primitive in tree.primitives() {
            let operator = tree.operator(primitive)?;
            let behavior = operator.behavior().cloned().ok_or_else(|| {
                Error::StructuralCompile(format!("operator {primitive} has no behavior"))
            })?;
            let name = tree.qualified_name(primitive);

            let mut inputs = BTreeMap::new();
            for port in operator.in_ports().names() {
                inputs.insert(port.to_owned(), wiring.reader(primitive, PortDirection::In, port)?);
            }
            let mut outputs = BTreeMap::new();
            for port in operator.out_ports().names() {
                outputs.insert(port.to_owned(), wiring.writer(primitive, PortDirection::Out, port)?);
            }

            let ctx = WorkerContext::new(
                name.clone(),
                operator.values().clone(),
                inputs,
                outputs,
                cancel.clone(),
            );
            workers.spawn(run_worker(name, behavior, ctx));
        }

        let mut inputs = BTreeMap::new();
        for port in root.in_ports().names() {
            inputs.insert(port.to_owned(), wiring.writer(tree.root(), PortDirection::In, port)?);
        }
        let mut outputs = BTreeMap::new();
        for port in root.out_ports().names() {
            outputs.insert(port.to_owned(), wiring.reader(tree.root(), PortDirection::Out, port)?);
        }
        drop(wiring);

        tracing::info!(
            target: TRACING_TARGET,
            run = %id,
            operator = %root.name(),
            workers = workers.len(),
            capacity = ?self.config.capacity(),
            "Network started"
        );

        Ok(Network::new(
            id,
            root.name(),
            inputs,
            outputs,
            workers,
            cancel,
        ))
    }
}

/// Channels of a network being started.
///
/// Holds one sender per consumer leaf until every producer has cloned its
/// own; dropping it leaves the producers as the only senders.
struct Wiring<'a> {
    tree: &'a OperatorTree,
    root_primitive: bool,
    senders: HashMap<PortAddr, ChannelSender>,
    receivers: HashMap<PortAddr, ChannelReceiver>,
    cancel: CancellationToken,
}

impl<'a> Wiring<'a> {
    fn new(tree: &'a OperatorTree, config: EngineConfig, cancel: CancellationToken) -> Result<Self> {
        let capacity = config.capacity();
        let root = tree.root();
        let mut consumers = Vec::new();
        for primitive in tree.primitives() {
            consumers.extend(
                tree.leaf_addrs(primitive)
                    .into_iter()
                    .filter(|addr| addr.direction == PortDirection::In),
            );
        }
        consumers.extend(
            tree.leaf_addrs(root)
                .into_iter()
                .filter(|addr| addr.direction == PortDirection::Out),
        );

        let mut senders = HashMap::with_capacity(consumers.len());
        let mut receivers = HashMap::with_capacity(consumers.len());
        for addr in consumers {
            let (tx, rx) = channel(capacity);
            senders.insert(addr.clone(), tx);
            receivers.insert(addr, rx);
        }

        Ok(Self {
            tree,
            root_primitive: tree.operator(root)?.is_primitive(),
            senders,
            receivers,
            cancel,
        })
    }

    fn port_node(&self, operator: OperatorId, direction: PortDirection, port: &str) -> Result<PortNode> {
        self.tree
            .operator(operator)?
            .ports(direction)
            .node(&[port.to_owned()])
            .cloned()
            .ok_or_else(|| Error::unknown_port(self.tree.qualified_name(operator), port))
    }

    fn writer(&self, operator: OperatorId, direction: PortDirection, port: &str) -> Result<PortWriter> {
        let addr = PortAddr::new(operator, direction, vec![port.to_owned()]);
        let node = self.writer_node(&addr, &self.port_node(operator, direction, port)?)?;
        Ok(PortWriter::new(self.tree.describe(&addr), node, self.cancel.clone()))
    }

    fn writer_node(&self, addr: &PortAddr, node: &PortNode) -> Result<WriterNode> {
        match node {
            // A primitive root is its own boundary: its leaves feed their own channels.
            PortNode::Leaf(leaf) => {
                let targets = if self.root_primitive {
                    std::slice::from_ref(addr)
                } else {
                    leaf.destinations.as_slice()
                };
                let senders = targets
                    .iter()
                    .map(|target| {
                        self.senders.get(target).cloned().ok_or_else(|| {
                            Error::StructuralCompile(format!(
                                "no channel for '{}'",
                                self.tree.describe(target)
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(WriterNode::Leaf(senders))
            }
            PortNode::Map(entries) => entries
                .iter()
                .map(|(key, entry)| {
                    let node = self.writer_node(&addr.join(std::slice::from_ref(key)), entry)?;
                    Ok((key.clone(), node))
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(WriterNode::Map),
        }
    }

    fn reader(&mut self, operator: OperatorId, direction: PortDirection, port: &str) -> Result<PortReader> {
        let addr = PortAddr::new(operator, direction, vec![port.to_owned()]);
        let node = self.port_node(operator, direction, port)?;
        let node = self.reader_node(&addr, &node)?;
        Ok(PortReader::new(self.tree.describe(&addr), node, self.cancel.clone()))
    }

    fn reader_node(&mut self, addr: &PortAddr, node: &PortNode) -> Result<ReaderNode> {
        match node {
            PortNode::Leaf(_) => self.receivers.remove(addr).map(ReaderNode::Leaf).ok_or_else(|| {
                Error::StructuralCompile(format!("no channel for '{}'", self.tree.describe(addr)))
            }),
            PortNode::Map(entries) => {
                let mut nodes = BTreeMap::new();
                for (key, entry) in entries {
                    let node = self.reader_node(&addr.join(std::slice::from_ref(key)), entry)?;
                    nodes.insert(key.clone(), node);
                }
                Ok(ReaderNode::Map(nodes))
            }
        }
    }
}
