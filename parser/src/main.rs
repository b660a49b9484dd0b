use anyhow::Context;
use clap::Parser;
use generator::profile::{GeneratorConfig, SyntheticSource};
use gui_bridge::bridge::{progress_bind_address, ProgressBridge};
use ingest::airports::load_airports;
use ingest::files::FileSource;
use log::warn;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use trajcore::batch::{CancellationToken, SampleSource, WorkItemId};
use trajcore::interface::airport::AirportLookup;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod ingest;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Batch ADS-B trajectory reconstruction driver")]
struct Args {
    /// Directory holding one JSON array of state vectors per aircraft
    #[arg(long)]
    input: Option<PathBuf>,
    /// JSON-lines file receiving one trajectory per line
    #[arg(long, default_value = "trajectories.jsonl")]
    output: PathBuf,
    /// YAML airport list used for the completeness score
    #[arg(long)]
    airports: Option<PathBuf>,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 4)]
    threads: usize,
    #[arg(long, default_value_t = 1000)]
    step_count: usize,
    #[arg(long, default_value_t = false)]
    no_redundancy_filtration: bool,
    /// Process this many generated flights instead of --input
    #[arg(long)]
    synthetic: Option<usize>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Serve batch progress on 127.0.0.1:9000/progress
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(
            args.threads,
            args.step_count,
            !args.no_redundancy_filtration,
        )
    };

    let airports: Option<Arc<dyn AirportLookup>> = match &args.airports {
        Some(path) => Some(Arc::new(load_airports(path)?)),
        None => None,
    };

    let (source, items): (Arc<dyn SampleSource>, Vec<WorkItemId>) =
        if let Some(flights) = args.synthetic {
            let generator = SyntheticSource::new(GeneratorConfig {
                flights,
                seed: args.seed,
                ..GeneratorConfig::default()
            });
            let items = generator.work_items();
            (Arc::new(generator), items)
        } else {
            let root = args
                .input
                .clone()
                .context("either --input or --synthetic is required")?;
            let files = FileSource::new(root);
            let items = files.discover()?;
            (Arc::new(files), items)
        };

    let cancellation = CancellationToken::new();
    watch_interrupt(cancellation.clone())?;

    let mut runner = Runner::new(workflow_config, source, airports, cancellation);
    let bridge = args
        .serve
        .then(|| ProgressBridge::serve(runner.progress_model(), progress_bind_address()));

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let file = File::create(&args.output)
        .with_context(|| format!("creating output {}", args.output.display()))?;
    let mut output = BufWriter::new(file);

    let summary = runner.execute(items, &mut output)?;
    println!(
        "Batch finished -> processed {}, degraded {}, failed {}, not run {}, written {}{}",
        summary.counts.processed,
        summary.counts.degraded,
        summary.counts.failed,
        summary.not_run,
        summary.written,
        if summary.cancelled { " (cancelled)" } else { "" }
    );

    if let Some(bridge) = bridge {
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}

/// Cancels the batch on the first Ctrl+C; in-flight trajectories still finish.
fn watch_interrupt(token: CancellationToken) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::spawn(move || {
        runtime.block_on(async {
            if signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after in-flight trajectories");
                token.cancel();
            }
        });
    });
    Ok(())
}
