//! The traversal state machine: a FIFO work queue, one node per tick, re-checked for
//! cancellation at every tick boundary.

use crate::error::FlowError;
use crate::flow::{Flowchart, NodeId};
use crate::log::LogLine;
use crate::state::State;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

mod cost;
mod traversal;

pub use traversal::Traversal;

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The queue drained.
    Completed,
    /// A node returned no output; nothing after it was queued.
    Halted { label: String },
    /// The stop flag was cleared or the tick limit was reached.
    Stopped,
    /// A node or one of its edge conditions failed.
    Failed { label: String, message: String },
    /// `initialize` found no init node, or it had already run.
    AlreadyInitialized,
}

impl RunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed { .. })
    }
}

/// The state as the pass left it, plus how and where it ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: State,
    pub status: RunStatus,
    /// Labels of executed nodes, in execution order.
    pub visited: Vec<String>,
    pub ticks: u64,
}

/// Outcome of a single [`Traversal::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Finished(RunStatus),
}

impl Flowchart {
    /// Starts a pass from the canonical start node on a copy of `state`.
    pub fn traverse(&mut self, state: &State) -> Result<Traversal<'_>, FlowError> {
        self.traverse_from(state.copy(), std::iter::empty())
    }

    /// Starts a pass with an explicit queue; an empty queue means the canonical start node.
    pub fn traverse_from(
        &mut self,
        state: State,
        queue: impl IntoIterator<Item = NodeId>,
    ) -> Result<Traversal<'_>, FlowError> {
        let mut queue: VecDeque<NodeId> = queue.into_iter().collect();
        if let Some(missing) = queue.iter().find(|id| self.find_node(id).is_none()) {
            return Err(FlowError::NodeNotFound(missing.clone()));
        }
        if queue.is_empty() {
            queue.push_back(self.start_node()?.id.clone());
        }
        Ok(Traversal::new(self, state, queue))
    }

    /// Runs a full pass from the canonical start node. `state` itself is left untouched.
    pub async fn run(&mut self, state: &State) -> Result<RunReport, FlowError> {
        self.run_from(state.copy(), std::iter::empty()).await
    }

    pub async fn run_from(
        &mut self,
        state: State,
        queue: impl IntoIterator<Item = NodeId>,
    ) -> Result<RunReport, FlowError> {
        let config = self.config().clone();
        let mut traversal = self.traverse_from(state, queue)?;
        while traversal.step().await == Tick::Continue {
            if config.tick_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.tick_delay_ms)).await;
            } else if config.yield_between_ticks {
                tokio::task::yield_now().await;
            }
        }
        let report = traversal.finish();
        info!(status = ?report.status, ticks = report.ticks, "pass finished");
        Ok(report)
    }

    /// Runs the one-time initialization pass from the init node.
    ///
    /// Without an init node, or once it has run, nothing executes and the report carries
    /// a copy of `state` with [`RunStatus::AlreadyInitialized`].
    pub async fn initialize(&mut self, state: &State) -> Result<RunReport, FlowError> {
        let init = self
            .init_node()
            .filter(|entry| !entry.node.exhausted())
            .map(|entry| entry.id.clone());
        match init {
            Some(id) => self.run_from(state.copy(), [id]).await,
            None => {
                debug!("skipping initialization");
                self.log(LogLine::AlreadyInitialized);
                Ok(RunReport {
                    state: state.copy(),
                    status: RunStatus::AlreadyInitialized,
                    visited: Vec::new(),
                    ticks: 0,
                })
            }
        }
    }
}
