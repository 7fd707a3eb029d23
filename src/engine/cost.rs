use crate::flow::Flowchart;
use crate::state::State;
use tracing::debug;

impl Flowchart {
    /// Pre-flight estimate: the sum of every node's `cost`, in insertion order.
    ///
    /// Works on a copy of `state`, so each node can record its label (and kinds like prompts
    /// their rendered text) for the nodes after it without touching the caller's state.
    /// No node is run.
    pub fn cost(&self, state: &State) -> f64 {
        let mut scratch = state.copy();
        self.nodes().iter().fold(0.0, |total, entry| {
            let cost = entry.node.cost(&entry.label, &mut scratch);
            debug!(node = %entry.label, cost, "estimated node cost");
            total + cost
        })
    }
}
