use super::{RunReport, RunStatus, Tick};
use crate::error::NodeError;
use crate::flow::{Edge, Flowchart, NodeId};
use crate::log::LogLine;
use crate::state::State;
use crate::trace::TraceFormatter;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type NodeOutcome = Result<Option<String>, NodeError>;

/// A node handed to a blocking worker whose result has not been collected yet.
struct InFlight {
    label: String,
    edges: Vec<Edge>,
    worker: JoinHandle<(State, NodeOutcome)>,
}

/// One pass over a flowchart, advanced a tick at a time.
///
/// Holds the graph exclusively, so only one pass can be in flight per flowchart. Hosts
/// that drive their own loop call [`Traversal::step`] until it reports `Finished`;
/// [`Flowchart::run`] does exactly that.
pub struct Traversal<'g> {
    flow: &'g mut Flowchart,
    queue: VecDeque<NodeId>,
    state: State,
    in_flight: Option<InFlight>,
    status: Option<RunStatus>,
    visited: Vec<String>,
    ticks: u64,
}

impl<'g> Traversal<'g> {
    pub(super) fn new(flow: &'g mut Flowchart, state: State, queue: VecDeque<NodeId>) -> Self {
        flow.set_running(true);
        Self {
            flow,
            queue,
            state,
            in_flight: None,
            status: None,
            visited: Vec::new(),
            ticks: 0,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Node ids waiting to run, front first.
    pub fn queue(&self) -> &VecDeque<NodeId> {
        &self.queue
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn status(&self) -> Option<&RunStatus> {
        self.status.as_ref()
    }

    /// Executes at most one node. Cancellation and the tick limit are checked first.
    ///
    /// Cancel safe: if the returned future is dropped while a node is running, the node
    /// keeps running on its worker and the next call picks its result up. The traversal
    /// state only changes once that result is in.
    pub async fn step(&mut self) -> Tick {
        if let Some(status) = &self.status {
            return Tick::Finished(status.clone());
        }
        if self.in_flight.is_none() {
            if let Some(tick) = self.dispatch() {
                return tick;
            }
        }
        self.settle().await
    }

    /// Pops the next node, runs `before` and hands the node to a blocking worker.
    /// Returns a tick only when the pass ends here.
    fn dispatch(&mut self) -> Option<Tick> {
        let Some(id) = self.queue.front().cloned() else {
            return Some(self.conclude(RunStatus::Completed));
        };
        if !self.flow.is_running() {
            info!(pending = self.queue.len(), "traversal stopped");
            return Some(self.conclude(RunStatus::Stopped));
        }
        if let Some(max) = self.flow.config().max_ticks {
            if self.ticks >= max {
                warn!(max_ticks = max, "tick limit reached");
                return Some(self.conclude(RunStatus::Stopped));
            }
        }
        self.queue.pop_front();

        let Some(entry) = self.flow.find_node(&id) else {
            return Some(self.fail(id.clone(), format!("node '{}' is no longer in the flowchart", id)));
        };
        let label = entry.label.clone();
        let node = Arc::clone(&entry.node);
        let edges: Vec<Edge> = self.flow.output_edges(&id).into_iter().cloned().collect();

        self.ticks += 1;
        self.visited.push(label.clone());
        debug!(node = %label, tick = self.ticks, "running node");

        let input = match node.before(&label, &self.state) {
            Ok(input) => input,
            Err(e) => return Some(self.fail(label, e.to_string())),
        };

        // The worker gets its own copy; `self.state` keeps the last settled state.
        let mut state = self.state.clone();
        let worker_label = label.clone();
        let worker = tokio::task::spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                node.run(&worker_label, input, &mut state)
            }))
            .unwrap_or_else(|payload| Err(NodeError::Panicked(panic_message(payload))));
            (state, outcome)
        });
        self.in_flight = Some(InFlight {
            label,
            edges,
            worker,
        });
        None
    }

    /// Waits for the in-flight node, then records its output and queues its children.
    async fn settle(&mut self) -> Tick {
        let joined = match self.in_flight.as_mut() {
            Some(in_flight) => (&mut in_flight.worker).await,
            None => return Tick::Continue,
        };
        let Some(InFlight { label, edges, .. }) = self.in_flight.take() else {
            return Tick::Continue;
        };

        let outcome = match joined {
            Ok((state, outcome)) => {
                self.state = state;
                outcome
            }
            Err(e) => return self.fail(label, format!("worker did not complete: {}", e)),
        };

        let output = match outcome {
            Ok(Some(output)) => output,
            Ok(None) => {
                debug!(node = %label, "node returned no output, halting");
                return self.conclude(RunStatus::Halted { label });
            }
            Err(e) => return self.fail(label, e.to_string()),
        };

        self.state.set(label.as_str(), output.as_str());
        self.state.result = output.clone();
        self.flow.log(LogLine::Output {
            label: label.clone(),
            output,
        });

        for edge in &edges {
            match self.condition_holds(edge) {
                Ok(true) => {
                    if !self.queue.contains(&edge.target) {
                        self.queue.push_back(edge.target.clone());
                    }
                }
                Ok(false) => {}
                Err(message) => return self.fail(label, message),
            }
        }

        if self.queue.is_empty() {
            return self.conclude(RunStatus::Completed);
        }
        Tick::Continue
    }

    fn condition_holds(&self, edge: &Edge) -> Result<bool, String> {
        if edge.condition.is_unconditional() {
            return Ok(true);
        }
        let evaluation = self
            .flow
            .scripts()
            .call_main(&edge.condition.text, &self.state)
            .map_err(|e| e.to_string())?;
        let holds = evaluation.value.is_truthy();
        debug!(
            edge = %edge.id,
            condition = %edge.condition.label,
            holds,
            reason = %TraceFormatter::format_trace(&evaluation.trace),
            "evaluated condition"
        );
        Ok(holds)
    }

    fn fail(&mut self, label: String, message: String) -> Tick {
        error!(node = %label, %message, "traversal aborted");
        self.conclude(RunStatus::Failed { label, message })
    }

    /// Records the terminal status and writes the one terminal console line.
    fn conclude(&mut self, status: RunStatus) -> Tick {
        let line = match &status {
            RunStatus::Completed | RunStatus::Halted { .. } => LogLine::Done,
            RunStatus::Stopped => LogLine::Stopped,
            RunStatus::Failed { label, message } => LogLine::Error {
                label: label.clone(),
                message: message.clone(),
            },
            RunStatus::AlreadyInitialized => LogLine::AlreadyInitialized,
        };
        self.flow.log(line);
        self.flow.set_running(false);
        self.queue.clear();
        self.status = Some(status.clone());
        Tick::Finished(status)
    }

    /// Ends the pass and hands back the state. An unfinished pass counts as stopped.
    ///
    /// A node still running on its worker is left to finish; its result is discarded and
    /// the report carries the state from before it ran.
    pub fn finish(mut self) -> RunReport {
        if let Some(in_flight) = self.in_flight.take() {
            warn!(node = %in_flight.label, "discarding the result of an in-flight node");
        }
        let status = match self.status.take() {
            Some(status) => status,
            None => match self.conclude(RunStatus::Stopped) {
                Tick::Finished(status) => status,
                Tick::Continue => RunStatus::Stopped,
            },
        };
        RunReport {
            state: std::mem::take(&mut self.state),
            status,
            visited: std::mem::take(&mut self.visited),
            ticks: self.ticks,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "node panicked".to_string())
}
