//! Common test utilities for building flowcharts and fake nodes.
use nagare::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Outputs a fixed value, or the halt signal when `None`.
#[allow(dead_code)]
pub struct FixedNode(pub Option<String>);

impl FixedNode {
    #[allow(dead_code)]
    pub fn output(text: &str) -> Self {
        Self(Some(text.to_string()))
    }

    #[allow(dead_code)]
    pub fn halt() -> Self {
        Self(None)
    }
}

impl Node for FixedNode {
    fn classname(&self) -> &'static str {
        "FixedNode"
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> std::result::Result<Option<String>, NodeError> {
        Ok(self.0.clone())
    }
}

/// Always fails with the given message.
#[allow(dead_code)]
pub struct FailingNode(pub String);

impl Node for FailingNode {
    fn classname(&self) -> &'static str {
        "FailingNode"
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> std::result::Result<Option<String>, NodeError> {
        Err(NodeError::Failed(self.0.clone()))
    }
}

/// Panics inside `run`.
#[allow(dead_code)]
pub struct PanickingNode;

impl Node for PanickingNode {
    fn classname(&self) -> &'static str {
        "PanickingNode"
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> std::result::Result<Option<String>, NodeError> {
        panic!("worker blew up")
    }
}

/// Sleeps on its worker thread before producing its output.
#[allow(dead_code)]
pub struct SlowNode {
    pub delay: std::time::Duration,
    pub output: String,
}

impl Node for SlowNode {
    fn classname(&self) -> &'static str {
        "SlowNode"
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> std::result::Result<Option<String>, NodeError> {
        std::thread::sleep(self.delay);
        Ok(Some(self.output.clone()))
    }
}

/// Reports a fixed cost and records its label like a real node would.
#[allow(dead_code)]
pub struct CostNode(pub f64);

impl Node for CostNode {
    fn classname(&self) -> &'static str {
        "CostNode"
    }

    fn run(&self, _: &str, _: Option<String>, state: &mut State) -> std::result::Result<Option<String>, NodeError> {
        Ok(Some(state.result.clone()))
    }

    fn cost(&self, label: &str, state: &mut State) -> f64 {
        state.set(label, "");
        self.0
    }
}

/// Counts how often it ran; outputs the count.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingNode(pub Arc<AtomicUsize>);

impl Node for CountingNode {
    fn classname(&self) -> &'static str {
        "CountingNode"
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> std::result::Result<Option<String>, NodeError> {
        let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(n.to_string()))
    }
}

/// An empty flowchart whose console lines are captured.
#[allow(dead_code)]
pub fn recorded_flow() -> (Flowchart, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let flow = Flowchart::new().with_sink(sink.clone());
    (flow, sink)
}

/// A function node sharing the flowchart's script engine.
#[allow(dead_code)]
pub fn function(flow: &Flowchart, source: &str) -> FunctionNode {
    FunctionNode::from_source(source, flow.scripts())
}

/// Start -> "One" (appends "1") -> "Two" (appends "2"), both edges unconditional.
#[allow(dead_code)]
pub fn create_append_chain() -> (Flowchart, Arc<MemorySink>) {
    let (mut flow, sink) = recorded_flow();
    let start = flow.add_node("Start", StartNode).expect("Failed to add start");
    let one = flow
        .add_node("One", function(&flow, "def main(state):\n    return state.result + \"1\"\n"))
        .expect("Failed to add first function");
    let two = flow
        .add_node("Two", function(&flow, "def main(state):\n    return state.result + \"2\"\n"))
        .expect("Failed to add second function");
    flow.add_edge(&start, &one).expect("Failed to connect start");
    flow.add_edge(&one, &two).expect("Failed to connect functions");
    (flow, sink)
}

/// A persisted flowchart: Start -> Greeting (prompt) -> Shout (function), with a conditional
/// edge back to an assert node and unknown canvas fields on every node.
#[allow(dead_code)]
pub const GREETING_FLOW_JSON: &str = r#"{
    "nodes": [
        {"id": "n-start", "label": "Start", "classname": "StartNode", "center_x": 10, "center_y": 20},
        {"id": "n-greet", "label": "Greeting", "classname": "PromptNode",
         "prompt": {"label": "greet", "text": "hello {state[Name]}"}, "center_x": 110, "center_y": 20},
        {"id": "n-shout", "label": "Shout", "classname": "FuncNode",
         "func": {"label": "shout", "text": "def main(state):\n    return Greeting.upper()\n"}},
        {"id": "n-check", "label": "Check", "classname": "AssertNode",
         "assertion": {"label": "loud", "text": "Shout == 'HELLO ADA'"}}
    ],
    "connectors": [
        {"node1": "n-start", "node2": "n-greet"},
        {"node1": "n-greet", "node2": "n-shout",
         "condition": {"label": "has name", "text": "def main(state):\n    return 'ada' in state.result\n"}},
        {"node1": "n-shout", "node2": "n-check", "condition": ""}
    ],
    "version": 2
}"#;
