//! Traversal tests: scheduling, halting, failures and cancellation.
mod common;
use common::*;
use nagare::prelude::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

#[cfg(test)]
mod traversal_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_is_visited_first() {
        let (mut flow, sink) = create_append_chain();
        let report = flow.run(&State::new()).await.expect("Failed to run");

        assert_eq!(report.visited.first().map(String::as_str), Some("Start"));
        assert_eq!(sink.lines()[0], "Start: ");
    }

    #[tokio::test]
    async fn test_append_chain_yields_twelve() {
        let (mut flow, sink) = create_append_chain();
        let report = flow.run(&State::with_result("")).await.expect("Failed to run");

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(&report.state["Two"], "12");
        assert_eq!(report.state.result, "12");
        assert_eq!(
            sink.lines(),
            vec!["Start: ", "One: 1", "Two: 12", "[System: Done]"]
        );
    }

    #[tokio::test]
    async fn test_run_leaves_caller_state_untouched() {
        let (mut flow, _) = create_append_chain();
        let template = State::with_result("x");
        let report = flow.run(&template).await.expect("Failed to run");

        assert_eq!(report.state.result, "12");
        assert_eq!(template.result, "x");
        assert!(template.snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_halt_enqueues_no_children() {
        let (mut flow, sink) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let halt = flow.add_node("Halt", FixedNode::halt()).unwrap();
        let left = flow.add_node("Left", FixedNode::output("l")).unwrap();
        let right = flow.add_node("Right", FixedNode::output("r")).unwrap();
        flow.add_edge(&start, &halt).unwrap();
        flow.add_edge(&halt, &left).unwrap();
        flow.add_edge(&halt, &right).unwrap();

        let report = flow.run(&State::new()).await.unwrap();

        assert_eq!(
            report.status,
            RunStatus::Halted {
                label: "Halt".to_string()
            }
        );
        assert_eq!(report.visited, vec!["Start", "Halt"]);
        assert!(!report.state.snapshot.contains_key("Halt"));
        assert_eq!(sink.lines(), vec!["Start: ", "[System: Done]"]);
    }

    #[tokio::test]
    async fn test_queue_deduplicates_targets() {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let target = flow
            .add_node("Target", CountingNode(Arc::clone(&counter)))
            .unwrap();
        flow.add_edge(&start, &target).unwrap();
        flow.add_edge(&start, &target).unwrap();

        let report = flow.run(&State::new()).await.unwrap();

        assert_eq!(report.visited, vec!["Start", "Target"]);
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_self_loop_consumes_one_tick_per_visit() {
        let (flow, sink) = recorded_flow();
        let mut flow = flow.with_config(EngineConfig {
            max_ticks: Some(5),
            ..EngineConfig::default()
        });
        let start = flow.add_node("Start", StartNode).unwrap();
        let again = flow.add_node("Again", CountingNode::default()).unwrap();
        flow.add_edge(&start, &again).unwrap();
        flow.add_edge(&again, &again).unwrap();

        let report = flow.run(&State::new()).await.unwrap();

        assert_eq!(report.status, RunStatus::Stopped);
        assert_eq!(report.ticks, 5);
        assert_eq!(report.visited, vec!["Start", "Again", "Again", "Again", "Again"]);
        assert_eq!(&report.state["Again"], "4");
        assert_eq!(sink.lines().last().map(String::as_str), Some("[System: Stopped]"));
    }

    #[tokio::test]
    async fn test_self_loop_steps_one_visit_at_a_time() {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let again = flow.add_node("Again", CountingNode::default()).unwrap();
        flow.add_edge(&start, &again).unwrap();
        flow.add_edge(&again, &again).unwrap();

        let mut traversal = flow.traverse(&State::new()).unwrap();
        for tick in 1..=4 {
            assert_eq!(traversal.step().await, Tick::Continue);
            assert_eq!(traversal.ticks(), tick);
            assert_eq!(traversal.queue().len(), 1);
        }
        assert_eq!(&traversal.state()["Again"], "3");
        let report = traversal.finish();
        assert_eq!(report.status, RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_takes_effect_at_next_tick() {
        let (mut flow, sink) = create_append_chain();
        let stop = flow.stop_handle();

        let mut traversal = flow.traverse(&State::new()).unwrap();
        assert_eq!(traversal.step().await, Tick::Continue);
        stop.stop();
        assert_eq!(traversal.step().await, Tick::Finished(RunStatus::Stopped));

        let report = traversal.finish();
        assert_eq!(report.visited, vec!["Start"]);
        assert!(!stop.is_running());
        assert_eq!(sink.lines(), vec!["Start: ", "[System: Stopped]"]);
    }

    fn slow_chain() -> Flowchart {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let slow = flow
            .add_node(
                "Slow",
                SlowNode {
                    delay: Duration::from_millis(200),
                    output: "done".to_string(),
                },
            )
            .unwrap();
        let after = flow.add_node("After", FixedNode::output("z")).unwrap();
        flow.add_edge(&start, &slow).unwrap();
        flow.add_edge(&slow, &after).unwrap();
        flow
    }

    #[tokio::test]
    async fn test_dropped_step_resumes_the_running_node() {
        let mut flow = slow_chain();
        let mut traversal = flow.traverse(&State::new()).unwrap();
        assert_eq!(traversal.step().await, Tick::Continue);

        let timed_out = tokio::time::timeout(Duration::from_millis(10), traversal.step()).await;
        assert!(timed_out.is_err());
        assert!(traversal.state().snapshot.contains_key("Start"));
        assert!(!traversal.state().snapshot.contains_key("Slow"));

        assert_eq!(traversal.step().await, Tick::Continue);
        assert_eq!(&traversal.state()["Slow"], "done");
        assert_eq!(
            traversal.step().await,
            Tick::Finished(RunStatus::Completed)
        );

        let report = traversal.finish();
        assert_eq!(report.visited, vec!["Start", "Slow", "After"]);
        assert_eq!(report.state.result, "z");
    }

    #[tokio::test]
    async fn test_finish_during_running_node_keeps_settled_state() {
        let mut flow = slow_chain();
        let mut traversal = flow.traverse(&State::new()).unwrap();
        assert_eq!(traversal.step().await, Tick::Continue);
        let timed_out = tokio::time::timeout(Duration::from_millis(10), traversal.step()).await;
        assert!(timed_out.is_err());

        let report = traversal.finish();
        assert_eq!(report.status, RunStatus::Stopped);
        assert!(report.state.snapshot.contains_key("Start"));
        assert!(!report.state.snapshot.contains_key("Slow"));
        assert!(!flow.is_running());
    }

    #[tokio::test]
    async fn test_initialize_latches() {
        let sink = Arc::new(MemorySink::new());
        let mut flow = Flowchart::with_defaults().with_sink(sink.clone());
        let seed = State::with_result("seed");

        let first = flow.initialize(&seed).await.unwrap();
        assert_eq!(first.status, RunStatus::Completed);
        assert_eq!(first.visited, vec!["Init"]);
        assert_eq!(&first.state["Init"], "");

        let second = flow.initialize(&seed).await.unwrap();
        assert_eq!(second.status, RunStatus::AlreadyInitialized);
        assert!(second.visited.is_empty());
        assert_eq!(second.state.result, "seed");
        assert!(second.state.snapshot.is_empty());
        assert_eq!(
            sink.lines().last().map(String::as_str),
            Some("[System: Already initialized]")
        );
    }

    #[tokio::test]
    async fn test_initialize_without_init_node_is_noop() {
        let (mut flow, sink) = create_append_chain();
        let report = flow.initialize(&State::new()).await.unwrap();
        assert_eq!(report.status, RunStatus::AlreadyInitialized);
        assert_eq!(sink.lines(), vec!["[System: Already initialized]"]);
    }

    #[tokio::test]
    async fn test_missing_start_is_raised() {
        let mut flow = Flowchart::new();
        assert!(matches!(
            flow.run(&State::new()).await,
            Err(FlowError::MissingStart)
        ));
    }

    #[tokio::test]
    async fn test_run_from_explicit_queue() {
        let (mut flow, _) = create_append_chain();
        let two = flow.node_by_label("Two").unwrap().id.clone();

        let report = flow.run_from(State::with_result("a"), [two]).await.unwrap();
        assert_eq!(report.visited, vec!["Two"]);
        assert_eq!(report.state.result, "a2");

        assert!(matches!(
            flow.run_from(State::new(), ["nope".to_string()]).await,
            Err(FlowError::NodeNotFound(_))
        ));
    }
}

#[cfg(test)]
mod condition_tests {
    use super::*;

    #[tokio::test]
    async fn test_conditions_read_prior_outputs_by_label() {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let greeting = flow
            .add_node("Greeting", PromptNode::from_template("hello"))
            .unwrap();
        let yes = flow.add_node("Yes", FixedNode::output("y")).unwrap();
        let no = flow.add_node("No", FixedNode::output("n")).unwrap();
        flow.add_edge(&start, &greeting).unwrap();
        flow.add_conditional_edge(&greeting, &yes, Condition::returning("greeted", "Greeting == 'hello'"))
            .unwrap();
        flow.add_conditional_edge(&greeting, &no, Condition::returning("silent", "Greeting == ''"))
            .unwrap();

        let report = flow.run(&State::new()).await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.visited, vec!["Start", "Greeting", "Yes"]);
    }

    #[tokio::test]
    async fn test_true_conditions_queue_in_edge_order() {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let b = flow.add_node("B", FixedNode::output("b")).unwrap();
        let a = flow.add_node("A", FixedNode::output("a")).unwrap();
        flow.add_conditional_edge(&start, &b, Condition::returning("", "True"))
            .unwrap();
        flow.add_conditional_edge(&start, &a, Condition::returning("", "1"))
            .unwrap();

        let report = flow.run(&State::new()).await.unwrap();
        assert_eq!(report.visited, vec!["Start", "B", "A"]);
        assert_eq!(report.state.result, "a");
    }

    #[tokio::test]
    async fn test_condition_error_aborts_the_pass() {
        let (mut flow, sink) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let skipped = flow.add_node("Skipped", FixedNode::output("s")).unwrap();
        let broken = flow.add_node("Broken", FixedNode::output("b")).unwrap();
        flow.add_conditional_edge(&start, &skipped, Condition::returning("never", "False"))
            .unwrap();
        flow.add_conditional_edge(&start, &broken, Condition::new("bad", "return 1"))
            .unwrap();

        let report = flow.run(&State::new()).await.unwrap();

        match &report.status {
            RunStatus::Failed { label, .. } => assert_eq!(label, "Start"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.visited, vec!["Start"]);
        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("[ERROR]Start: "));
    }

    #[tokio::test]
    async fn test_oversized_string_in_condition_fails_the_pass() {
        let (mut flow, sink) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let target = flow.add_node("T", FixedNode::output("t")).unwrap();
        flow.add_conditional_edge(
            &start,
            &target,
            Condition::new(
                "huge",
                "def main(state):\n    n = 10000000000 * 10000000000\n    return len('ab' * n) > 0",
            ),
        )
        .unwrap();

        let report = flow.run(&State::new()).await.unwrap();

        match &report.status {
            RunStatus::Failed { label, message } => {
                assert_eq!(label, "Start");
                assert!(message.contains("byte limit"), "{}", message);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.visited, vec!["Start"]);
        assert!(sink.lines().last().unwrap().starts_with("[ERROR]Start: "));
    }

    #[tokio::test]
    async fn test_deeply_nested_condition_fails_the_pass() {
        let (mut flow, sink) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let target = flow.add_node("T", FixedNode::output("t")).unwrap();
        let nested = format!("{}1{}", "(".repeat(3000), ")".repeat(3000));
        flow.add_conditional_edge(&start, &target, Condition::returning("deep", &nested))
            .unwrap();

        let report = flow.run(&State::new()).await.unwrap();

        assert!(report.status.is_failure());
        assert_eq!(report.visited, vec!["Start"]);
        assert!(sink.lines().last().unwrap().starts_with("[ERROR]Start: "));
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_function_keeps_prior_snapshot() {
        let (mut flow, sink) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let first = flow
            .add_node("First", function(&flow, "def main(state):\n    return 'a'\n"))
            .unwrap();
        let broken = flow
            .add_node("Broken", function(&flow, "def main(state):\n    return 1 / 0\n"))
            .unwrap();
        let after = flow.add_node("After", FixedNode::output("z")).unwrap();
        flow.add_edge(&start, &first).unwrap();
        flow.add_edge(&first, &broken).unwrap();
        flow.add_edge(&broken, &after).unwrap();

        let report = flow.run(&State::new()).await.unwrap();

        assert!(report.status.is_failure());
        let mut labels: Vec<_> = report.state.snapshot.keys().cloned().collect();
        labels.sort();
        assert_eq!(labels, vec!["First", "Start"]);
        let errors: Vec<_> = sink
            .lines()
            .into_iter()
            .filter(|l| l.starts_with("[ERROR]"))
            .collect();
        assert_eq!(errors, vec!["[ERROR]Broken: Division by zero"]);
    }

    #[tokio::test]
    async fn test_flowchart_is_reusable_after_failure() {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let failing = flow
            .add_node("Failing", FailingNode("boom".to_string()))
            .unwrap();
        flow.add_edge(&start, &failing).unwrap();

        let first = flow.run(&State::new()).await.unwrap();
        assert_eq!(
            first.status,
            RunStatus::Failed {
                label: "Failing".to_string(),
                message: "boom".to_string()
            }
        );
        assert!(!flow.is_running());

        flow.remove_node(&failing).unwrap();
        let second = flow.run(&State::new()).await.unwrap();
        assert_eq!(second.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_panicking_node_is_a_failure() {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let panicking = flow.add_node("Panicky", PanickingNode).unwrap();
        flow.add_edge(&start, &panicking).unwrap();

        let report = flow.run(&State::new()).await.unwrap();
        match report.status {
            RunStatus::Failed { label, message } => {
                assert_eq!(label, "Panicky");
                assert!(message.contains("worker blew up"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(&report.state["Start"], "");
    }

    #[tokio::test]
    async fn test_cancelled_input_halts() {
        let registry = NodeRegistry::builder()
            .with_input_provider(Arc::new(QueuedInput::new(["first"])))
            .build();
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let ask = flow
            .add_shared_node(
                "ask".to_string(),
                "Ask",
                Arc::new(InputNode::new(registry.input_provider())),
            )
            .unwrap();
        flow.add_edge(&start, &ask).unwrap();

        let answered = flow.run(&State::new()).await.unwrap();
        assert_eq!(answered.status, RunStatus::Completed);
        assert_eq!(&answered.state["Ask"], "first");

        let cancelled = flow.run(&State::new()).await.unwrap();
        assert_eq!(
            cancelled.status,
            RunStatus::Halted {
                label: "Ask".to_string()
            }
        );
    }
}

#[cfg(test)]
mod cost_tests {
    use super::*;

    #[test]
    fn test_cost_is_additive() {
        let (mut flow, _) = recorded_flow();
        let start = flow.add_node("Start", StartNode).unwrap();
        let a = flow.add_node("A", CostNode(1.0)).unwrap();
        let b = flow.add_node("B", CostNode(2.0)).unwrap();
        let c = flow.add_node("C", CostNode(0.5)).unwrap();
        flow.add_edge(&start, &a).unwrap();
        flow.add_edge(&a, &b).unwrap();
        flow.add_edge(&b, &c).unwrap();

        let state = State::new();
        assert_eq!(flow.cost(&state), 3.5);
        assert!(state.snapshot.is_empty());
    }

    #[test]
    fn test_cost_makes_prior_labels_visible_to_prompts() {
        let (mut flow, _) = recorded_flow();
        flow.add_node("Start", StartNode).unwrap();
        flow.add_node("Prompt", PromptNode::from_template("{state[Start]}!"))
            .unwrap();
        assert_eq!(flow.cost(&State::new()), 0.0);
    }
}
