use super::graph::Flowchart;
use std::fmt::Write;

/// Renders nodes as `id(label)` and edges as `a --> b`, or `a -->|label| b` when the
/// condition has a label.
pub(super) fn render(flow: &Flowchart) -> String {
    let mut out = String::from("graph TD\n");
    for node in flow.nodes() {
        let _ = writeln!(out, "{}({})", node.id, node.label);
    }
    for edge in flow.edges() {
        let label = edge.condition.label.trim();
        if label.is_empty() {
            let _ = writeln!(out, "{} --> {}", edge.source, edge.target);
        } else {
            let _ = writeln!(out, "{} -->|{}| {}", edge.source, label, edge.target);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::flow::{Condition, Flowchart};
    use crate::node::{PromptNode, StartNode};

    #[test]
    fn renders_nodes_and_labelled_edges() {
        let mut flow = Flowchart::new();
        flow.add_node_with_id("s", "Start", StartNode).unwrap();
        flow.add_node_with_id("p", "Ask", PromptNode::from_template("hi")).unwrap();
        flow.add_edge("s", "p").unwrap();
        flow.add_conditional_edge("p", "p", Condition::returning("again", "False"))
            .unwrap();

        assert_eq!(
            flow.to_mermaid(),
            "graph TD\ns(Start)\np(Ask)\ns --> p\np -->|again| p\n"
        );
    }
}
