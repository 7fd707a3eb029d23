//! # Nagare - Incremental Flowchart Execution Engine
//!
//! **Nagare** runs flowcharts: directed graphs of nodes connected by edges that carry optional
//! scripted conditions. A single mutable [`State`](state::State) threads through the run. Each
//! node reads it, produces one output, and that output is stored under the node's label before
//! the outgoing conditions decide which nodes run next.
//!
//! ## Core Workflow
//!
//! 1.  **Build or Load a Flowchart**: Add nodes and edges with the [`Flowchart`](flow::Flowchart)
//!     API, or rebuild one from its persisted JSON form through a [`NodeRegistry`](flow::NodeRegistry).
//! 2.  **Prepare a State**: Seed the snapshot and result the first node should see.
//! 3.  **Run**: `initialize` executes the one-shot init branch, `run` executes from the canonical
//!     start node. Both are tick-based: one node per tick, cancellation checked between ticks,
//!     node work offloaded to a blocking worker.
//! 4.  **Inspect**: The returned [`RunReport`](engine::RunReport) carries the final state and a
//!     [`RunStatus`](engine::RunStatus); console lines go to the configured [`LogSink`](log::LogSink).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> std::result::Result<(), FlowError> {
//! let mut flow = Flowchart::new();
//! let scripts = flow.scripts();
//!
//! let start = flow.add_node("Start", StartNode)?;
//! let one = flow.add_node(
//!     "One",
//!     FunctionNode::from_source("def main(state):\n    return state.result + '1'", Arc::clone(&scripts)),
//! )?;
//! let two = flow.add_node(
//!     "Two",
//!     FunctionNode::from_source("def main(state):\n    return state.result + '2'", scripts),
//! )?;
//! flow.add_edge(&start, &one)?;
//! flow.add_conditional_edge(&one, &two, Condition::returning("ends in 1", "state.result.endswith('1')"))?;
//!
//! let report = flow.run(&State::new()).await?;
//! assert_eq!(report.status, RunStatus::Completed);
//! assert_eq!(&report.state["Two"], "12");
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod backend;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod interpreter;
pub mod log;
pub mod node;
pub mod prelude;
pub mod state;
pub mod trace;
