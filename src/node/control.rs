use super::{Node, NodeRole};
use crate::error::NodeError;
use crate::state::State;
use std::sync::atomic::{AtomicBool, Ordering};

/// Entry point of a traversal. Outputs an empty string.
#[derive(Debug, Default)]
pub struct StartNode;

impl Node for StartNode {
    fn classname(&self) -> &'static str {
        "StartNode"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Start
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> Result<Option<String>, NodeError> {
        Ok(Some(String::new()))
    }
}

/// Entry point of the one-time initialization pass. The second run yields the halt signal.
#[derive(Debug, Default)]
pub struct InitNode {
    has_run: AtomicBool,
}

impl InitNode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Node for InitNode {
    fn classname(&self) -> &'static str {
        "InitNode"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Init
    }

    fn run(&self, _: &str, _: Option<String>, _: &mut State) -> Result<Option<String>, NodeError> {
        if self.has_run.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(String::new()))
    }

    fn exhausted(&self) -> bool {
        self.has_run.load(Ordering::SeqCst)
    }
}
