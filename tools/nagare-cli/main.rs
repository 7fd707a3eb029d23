use clap::Parser;
use nagare::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Prints console lines as they are produced.
struct StdoutSink;

impl LogSink for StdoutSink {
    fn append(&self, line: &LogLine) {
        println!("{}", line);
    }
}

/// Prompts on the terminal whenever an input node runs.
struct TerminalInput;

impl InputProvider for TerminalInput {
    fn read_line(&self, label: &str, _: &State) -> std::result::Result<Option<String>, NodeError> {
        dialoguer::Input::<String>::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
            .map(Some)
            .map_err(|e| NodeError::Input(e.to_string()))
    }
}

/// Runs a persisted flowchart from the command line
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the flowchart JSON file
    flow_path: PathBuf,

    /// Initial state as JSON ({"snapshot": {...}, "history": [...], "result": "..."})
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Engine configuration TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the init branch before the main pass
    #[arg(long)]
    init: bool,

    /// Print the cost estimate and exit
    #[arg(long)]
    cost: bool,

    /// Print the mermaid diagram and exit
    #[arg(long)]
    mermaid: bool,

    /// Write the final state as a binary checkpoint
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

/// An interrupt during the init pass must keep the main pass from starting, even though
/// the main pass resets the running flag.
fn interrupted_before_main(init: Option<&RunStatus>, interrupted: &AtomicBool) -> bool {
    init == Some(&RunStatus::Stopped) || interrupted.load(Ordering::SeqCst)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nagare=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(status) if status.is_failure() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nError: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> std::result::Result<RunStatus, FlowError> {
    let total_start = Instant::now();

    // --- 1. Loading ---
    let registry = NodeRegistry::builder()
        .with_input_provider(Arc::new(TerminalInput))
        .build();
    let record = FlowRecord::from_file(&cli.flow_path)?;
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let mut flow = Flowchart::from_record(record, &registry)?
        .with_sink(Arc::new(StdoutSink))
        .with_config(config);
    let state = match &cli.state {
        Some(path) => State::from_file(path)?,
        None => State::new(),
    };

    if cli.mermaid {
        print!("{}", flow.to_mermaid());
        return Ok(RunStatus::Completed);
    }
    if cli.cost {
        println!("Estimated cost: {}", flow.cost(&state));
        return Ok(RunStatus::Completed);
    }

    // The running flag is reset by every pass, so an interrupt is also latched here.
    let interrupted = Arc::new(AtomicBool::new(false));
    let stop = flow.stop_handle();
    let latch = Arc::clone(&interrupted);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            latch.store(true, Ordering::SeqCst);
            stop.stop();
        }
    });

    // --- 2. Initialization ---
    let (state, init_status) = if cli.init {
        let report = flow.initialize(&state).await?;
        (report.state, Some(report.status))
    } else {
        (state, None)
    };
    if let Some(status) = init_status.as_ref().filter(|status| status.is_failure()) {
        return Ok(status.clone());
    }
    if interrupted_before_main(init_status.as_ref(), &interrupted) {
        if init_status != Some(RunStatus::Stopped) {
            StdoutSink.append(&LogLine::Stopped);
        }
        return Ok(RunStatus::Stopped);
    }

    // --- 3. Main pass ---
    let run_start = Instant::now();
    let report = flow.run(&state).await?;
    let run_duration = run_start.elapsed();

    println!("\n--- Final State ---");
    println!("{}", report.state);

    if let Some(path) = &cli.checkpoint {
        report.state.save(path)?;
        println!("Checkpoint written to {}", path.display());
    }

    println!("\n--- Summary ---");
    println!("Status:          {:?}", report.status);
    println!("Nodes executed:  {}", report.ticks);
    println!("Run:             {:?}", run_duration);
    println!("Total:           {:?}", total_start.elapsed());

    Ok(report.status)
}
