//! Prelude module for convenient imports
//!
//! Re-exports the types needed to build, load and run flowcharts.
//!
//! # Example
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//!
//! # async fn run_example() -> Result<()> {
//! let json = std::fs::read_to_string("path/to/flow.json")?;
//! let mut flow = Flowchart::from_json(&json, &NodeRegistry::default())?;
//!
//! let report = flow.run(&State::new()).await?;
//! println!("{}", report.state);
//! # Ok(())
//! # }
//! ```

// Graph and traversal
pub use crate::engine::{RunReport, RunStatus, Tick, Traversal};
pub use crate::flow::{Condition, Edge, FlowRecord, Flowchart, NodeRegistry, StopHandle};

// State
pub use crate::state::{Message, Role, State};

// Nodes
pub use crate::node::{
    AssertNode, DateNode, DynamicWindowedMemoryNode, EnvNode, FunctionNode, HistoryNode,
    InitNode, InputNode, InputProvider, MemoryNode, Node, NodeRole, PromptNode, QueuedInput,
    RandomNode, RegexNode, StartNode, TagNode, TextData, WindowedMemoryNode,
};

// Scripting
pub use crate::backend::{Evaluation, Scope, ScriptEngine};
pub use crate::interpreter::Interpreter;
pub use crate::trace::TraceFormatter;

// Logging and configuration
pub use crate::config::EngineConfig;
pub use crate::log::{LogLine, LogSink, MemorySink, TracingSink};

// Error types
pub use crate::error::{FlowError, NodeError, ScriptError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
