//! The graph: node and edge arenas, their persisted form, and the classname registry used to
//! rebuild nodes from documents.

mod edge;
mod graph;
mod mermaid;
mod record;
mod registry;

pub use edge::{Condition, Edge, EdgeId, NodeId};
pub use graph::{Flowchart, NodeEntry, StopHandle};
pub use record::{ConnectorRecord, FlowRecord, NodeRecord};
pub use registry::{FactoryContext, NodeFactory, NodeRegistry, NodeRegistryBuilder};
