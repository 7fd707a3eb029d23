use super::edge::{Condition, Edge, EdgeId, NodeId};
use super::record::{ConnectorRecord, FlowRecord, NodeRecord};
use super::registry::NodeRegistry;
use crate::backend::ScriptEngine;
use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::interpreter::Interpreter;
use crate::log::{LogLine, LogSink, TracingSink};
use crate::node::{Fields, InitNode, Node, NodeRole, StartNode};
use ahash::AHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// A node placed in a flowchart: the unit of work plus the graph-owned metadata around it.
pub struct NodeEntry {
    pub id: NodeId,
    pub label: String,
    pub node: Arc<dyn Node>,
    inputs: Vec<EdgeId>,
    outputs: Vec<EdgeId>,
    /// Persisted fields the engine does not interpret (canvas position, colors, ...).
    pub attributes: Fields,
}

impl NodeEntry {
    pub fn role(&self) -> NodeRole {
        self.node.role()
    }

    /// Incoming edge ids, in insertion order.
    pub fn inputs(&self) -> &[EdgeId] {
        &self.inputs
    }

    /// Outgoing edge ids, in insertion order. Conditions are evaluated in this order.
    pub fn outputs(&self) -> &[EdgeId] {
        &self.outputs
    }
}

impl std::fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeEntry")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("classname", &self.node.classname())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// Requests cooperative cancellation of an in-flight pass. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Takes effect at the next tick boundary; an in-flight node runs to completion.
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The graph: an arena of nodes and an arena of edges referencing each other by id.
///
/// Node order is insertion order. The id indexes are rebuilt on every removal so
/// "edges of this node" stays a direct lookup.
pub struct Flowchart {
    nodes: Vec<NodeEntry>,
    edges: Vec<Edge>,
    node_index: AHashMap<NodeId, usize>,
    edge_index: AHashMap<EdgeId, usize>,
    running: Arc<AtomicBool>,
    sink: Arc<dyn LogSink>,
    scripts: Arc<dyn ScriptEngine>,
    config: EngineConfig,
    document: Fields,
}

impl Flowchart {
    /// An empty flowchart using the built-in interpreter and the `tracing` console sink.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_index: AHashMap::new(),
            edge_index: AHashMap::new(),
            running: Arc::new(AtomicBool::new(false)),
            sink: Arc::new(TracingSink),
            scripts: Arc::new(Interpreter::new()),
            config: EngineConfig::default(),
            document: Fields::new(),
        }
    }

    /// A flowchart seeded with an `Init` and a `Start` node.
    pub fn with_defaults() -> Self {
        let mut flow = Self::new();
        let defaults: [(&str, Arc<dyn Node>); 2] = [
            ("Init", Arc::new(InitNode::new())),
            ("Start", Arc::new(StartNode)),
        ];
        for (label, node) in defaults {
            if let Err(e) = flow.insert(new_id(), label, node, Fields::new(), true) {
                warn!(node = %label, error = %e, "could not seed default node");
            }
        }
        flow
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_script_engine(mut self, scripts: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The evaluator used for edge conditions. Node kinds that run scripts should share it.
    pub fn scripts(&self) -> Arc<dyn ScriptEngine> {
        Arc::clone(&self.scripts)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn log(&self, line: LogLine) {
        self.sink.append(&line);
    }

    // --- mutation ---

    /// Adds a node under a fresh id.
    pub fn add_node(&mut self, label: &str, node: impl Node + 'static) -> Result<NodeId, FlowError> {
        self.add_shared_node(new_id(), label, Arc::new(node))
    }

    pub fn add_node_with_id(
        &mut self,
        id: &str,
        label: &str,
        node: impl Node + 'static,
    ) -> Result<NodeId, FlowError> {
        self.add_shared_node(id.to_string(), label, Arc::new(node))
    }

    pub fn add_shared_node(
        &mut self,
        id: NodeId,
        label: &str,
        node: Arc<dyn Node>,
    ) -> Result<NodeId, FlowError> {
        self.insert(id, label, node, Fields::new(), true)
    }

    fn insert(
        &mut self,
        id: NodeId,
        label: &str,
        node: Arc<dyn Node>,
        attributes: Fields,
        strict: bool,
    ) -> Result<NodeId, FlowError> {
        if self.node_index.contains_key(&id) {
            return Err(FlowError::DuplicateNodeId(id));
        }
        match node.role() {
            NodeRole::Start => {
                if let Some(existing) = self.nodes.iter().find(|n| n.role() == NodeRole::Start) {
                    if strict {
                        return Err(FlowError::DuplicateStart(existing.label.clone()));
                    }
                    warn!(node = %label, existing = %existing.label, "flowchart has more than one start node");
                }
            }
            NodeRole::Init => {
                if let Some(existing) = self.init_node() {
                    return Err(FlowError::DuplicateInit(existing.label.clone()));
                }
            }
            NodeRole::Task => {}
        }
        debug!(node = %label, id = %id, classname = node.classname(), "adding node");
        self.node_index.insert(id.clone(), self.nodes.len());
        self.nodes.push(NodeEntry {
            id: id.clone(),
            label: label.to_string(),
            node,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes,
        });
        Ok(id)
    }

    /// Adds an always-true edge.
    pub fn add_edge(&mut self, source: &str, target: &str) -> Result<EdgeId, FlowError> {
        self.add_conditional_edge(source, target, Condition::default())
    }

    pub fn add_conditional_edge(
        &mut self,
        source: &str,
        target: &str,
        condition: Condition,
    ) -> Result<EdgeId, FlowError> {
        self.connect(source, target, condition, Fields::new())
    }

    fn connect(
        &mut self,
        source: &str,
        target: &str,
        condition: Condition,
        attributes: Fields,
    ) -> Result<EdgeId, FlowError> {
        let source_pos = self.position(source)?;
        let target_pos = self.position(target)?;
        let id = new_id();
        self.nodes[source_pos].outputs.push(id.clone());
        self.nodes[target_pos].inputs.push(id.clone());
        self.edge_index.insert(id.clone(), self.edges.len());
        self.edges.push(Edge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            condition,
            attributes,
        });
        Ok(id)
    }

    /// Removes a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<(), FlowError> {
        let pos = self.position(id)?;
        let entry = self.nodes.remove(pos);
        let incident: Vec<&EdgeId> = entry.inputs.iter().chain(entry.outputs.iter()).collect();
        for edge_id in incident {
            self.detach(edge_id);
        }
        self.edges
            .retain(|e| e.source != entry.id && e.target != entry.id);
        self.reindex();
        debug!(node = %entry.label, "removed node");
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge, FlowError> {
        let pos = *self
            .edge_index
            .get(id)
            .ok_or_else(|| FlowError::EdgeNotFound(id.to_string()))?;
        self.detach(id);
        let edge = self.edges.remove(pos);
        self.reindex();
        Ok(edge)
    }

    /// Unlinks an edge id from both endpoints' edge lists.
    fn detach(&mut self, edge_id: &str) {
        for entry in &mut self.nodes {
            entry.inputs.retain(|e| e != edge_id);
            entry.outputs.retain(|e| e != edge_id);
        }
    }

    fn reindex(&mut self) {
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        self.edge_index = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
    }

    /// Drops all nodes and edges.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.node_index.clear();
        self.edge_index.clear();
    }

    // --- queries ---

    fn position(&self, id: &str) -> Result<usize, FlowError> {
        self.node_index
            .get(id)
            .copied()
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeEntry> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn find_edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index.get(id).map(|&i| &self.edges[i])
    }

    /// First node carrying `label`. Labels are not required to be unique.
    pub fn node_by_label(&self, label: &str) -> Option<&NodeEntry> {
        self.nodes.iter().find(|n| n.label == label)
    }

    pub fn nodes(&self) -> &[NodeEntry] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The canonical start: among start nodes, the one with the fewest incoming edges;
    /// the earliest inserted wins a tie.
    pub fn start_node(&self) -> Result<&NodeEntry, FlowError> {
        self.nodes
            .iter()
            .filter(|n| n.role() == NodeRole::Start)
            .min_by_key(|n| n.inputs.len())
            .ok_or(FlowError::MissingStart)
    }

    pub fn init_node(&self) -> Option<&NodeEntry> {
        self.nodes.iter().find(|n| n.role() == NodeRole::Init)
    }

    pub fn output_edges(&self, id: &str) -> Vec<&Edge> {
        self.find_node(id)
            .map(|n| n.outputs.iter().filter_map(|e| self.find_edge(e)).collect())
            .unwrap_or_default()
    }

    pub fn input_edges(&self, id: &str) -> Vec<&Edge> {
        self.find_node(id)
            .map(|n| n.inputs.iter().filter_map(|e| self.find_edge(e)).collect())
            .unwrap_or_default()
    }

    /// Targets of the node's outgoing edges, in edge order.
    pub fn children(&self, id: &str) -> Vec<&NodeEntry> {
        self.output_edges(id)
            .into_iter()
            .filter_map(|e| self.find_node(&e.target))
            .collect()
    }

    // --- cancellation ---

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    // --- persistence ---

    pub fn to_record(&self) -> FlowRecord {
        let nodes = self
            .nodes
            .iter()
            .map(|n| {
                let mut fields = n.attributes.clone();
                fields.extend(n.node.fields());
                NodeRecord {
                    id: n.id.clone(),
                    label: n.label.clone(),
                    classname: n.node.classname().to_string(),
                    fields,
                }
            })
            .collect();
        let connectors = self
            .edges
            .iter()
            .map(|e| ConnectorRecord {
                node1: e.source.clone(),
                node2: e.target.clone(),
                condition: Some(e.condition.clone()),
                extra: e.attributes.clone(),
            })
            .collect();
        FlowRecord {
            nodes,
            connectors,
            extra: self.document.clone(),
        }
    }

    /// Rebuilds a flowchart from its persisted form. Node kinds come from `registry`, which
    /// also provides the script engine shared with edge conditions.
    pub fn from_record(record: FlowRecord, registry: &NodeRegistry) -> Result<Self, FlowError> {
        let mut flow = Self::new().with_script_engine(registry.scripts());
        flow.document = record.extra;
        for node_record in &record.nodes {
            let node = registry.build_node(node_record)?;
            flow.insert(
                node_record.id.clone(),
                &node_record.label,
                node,
                node_record.fields.clone(),
                false,
            )?;
        }
        for connector in record.connectors {
            flow.connect(
                &connector.node1,
                &connector.node2,
                connector.condition.unwrap_or_default(),
                connector.extra,
            )?;
        }
        debug!(
            nodes = flow.nodes.len(),
            edges = flow.edges.len(),
            "loaded flowchart"
        );
        Ok(flow)
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        self.to_record().to_json()
    }

    pub fn from_json(json: &str, registry: &NodeRegistry) -> Result<Self, FlowError> {
        Self::from_record(FlowRecord::from_json(json)?, registry)
    }

    /// Renders the graph as a mermaid `graph TD` diagram.
    pub fn to_mermaid(&self) -> String {
        super::mermaid::render(self)
    }
}

impl Default for Flowchart {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PromptNode;

    #[test]
    fn rejects_second_start_and_init() {
        let mut flow = Flowchart::with_defaults();
        assert!(matches!(
            flow.add_node("Again", StartNode),
            Err(FlowError::DuplicateStart(label)) if label == "Start"
        ));
        assert!(matches!(
            flow.add_node("Again", InitNode::new()),
            Err(FlowError::DuplicateInit(_))
        ));
        assert_eq!(flow.nodes().len(), 2);
    }

    #[test]
    fn edges_are_indexed_on_both_endpoints() {
        let mut flow = Flowchart::new();
        let a = flow.add_node("A", PromptNode::from_template("a")).unwrap();
        let b = flow.add_node("B", PromptNode::from_template("b")).unwrap();
        let edge = flow.add_edge(&a, &b).unwrap();

        assert_eq!(flow.find_node(&a).unwrap().outputs(), [edge.clone()]);
        assert_eq!(flow.find_node(&b).unwrap().inputs(), [edge.clone()]);
        assert_eq!(flow.children(&a)[0].label, "B");
        assert!(matches!(
            flow.add_edge(&a, "missing"),
            Err(FlowError::NodeNotFound(_))
        ));
    }

    #[test]
    fn removing_a_node_drops_incident_edges() {
        let mut flow = Flowchart::new();
        let a = flow.add_node("A", PromptNode::from_template("a")).unwrap();
        let b = flow.add_node("B", PromptNode::from_template("b")).unwrap();
        let c = flow.add_node("C", PromptNode::from_template("c")).unwrap();
        flow.add_edge(&a, &b).unwrap();
        flow.add_edge(&b, &c).unwrap();
        let keep = flow.add_edge(&a, &c).unwrap();

        flow.remove_node(&b).unwrap();
        assert_eq!(flow.edges().len(), 1);
        assert_eq!(flow.find_node(&a).unwrap().outputs(), [keep.clone()]);
        assert_eq!(flow.find_node(&c).unwrap().inputs(), [keep]);
        assert!(flow.find_node(&b).is_none());
    }

    #[test]
    fn start_resolution_prefers_fewest_inputs() {
        let mut record = FlowRecord::default();
        for (id, label) in [("s1", "First"), ("s2", "Second")] {
            record.nodes.push(NodeRecord {
                id: id.to_string(),
                label: label.to_string(),
                classname: "StartNode".to_string(),
                fields: Fields::new(),
            });
        }
        let tie = Flowchart::from_record(record.clone(), &NodeRegistry::default()).unwrap();
        assert_eq!(tie.start_node().unwrap().label, "First");

        record.connectors.push(ConnectorRecord {
            node1: "s2".to_string(),
            node2: "s1".to_string(),
            condition: None,
            extra: Fields::new(),
        });
        let flow = Flowchart::from_record(record, &NodeRegistry::default()).unwrap();
        assert_eq!(flow.start_node().unwrap().label, "Second");
    }

    #[test]
    fn missing_start_is_reported() {
        assert!(matches!(
            Flowchart::new().start_node(),
            Err(FlowError::MissingStart)
        ));
    }
}
