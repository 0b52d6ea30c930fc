//! Run command implementation

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tw_core::{ActionStatus, CacheStateFile, RunResult, RunStatus};
use tw_db::{fetch_warehouse_state, Warehouse};
use tw_engine::{ExecutionOptions, Runner};

use crate::cli::{GlobalArgs, OutputFormat, RunArgs};
use crate::commands::common::{self, ExitCode};
use crate::commands::report;

/// Execute the run command
pub(crate) async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let project = common::load_project(global, &args.selection)?;
    common::check_graph_errors(&project)?;

    let warehouse = common::open_warehouse(&project, global)?;
    let cache_path = project.cache_state_path();
    let mut cache = CacheStateFile::load(&cache_path).context("Failed to load cache state")?;

    let mut run_config = common::run_config(&args.selection);
    run_config.timeout_millis = args.timeout_ms;
    run_config.disable_set_metadata = args.disable_set_metadata;
    run_config.use_run_cache =
        resolve_run_cache(args.run_cache, args.no_run_cache, project.config.use_run_cache);

    let graph = common::build_graph(&project, &warehouse, &run_config, &cache).await?;

    let mut options = ExecutionOptions::from(&project.config.execution);
    if let Some(retries) = args.retries {
        options.action_retry_limit = retries;
    }

    let run_result_path = project.run_result_path();
    let resume_from = if args.resume {
        let previous = RunResult::load(&run_result_path).context("Failed to load previous run")?;
        match previous {
            Some(previous) => {
                if global.verbose {
                    eprintln!(
                        "[verbose] Resuming run {} ({} action(s) recorded)",
                        previous.run_id,
                        previous.actions.len()
                    );
                }
                Some(previous)
            }
            None => {
                eprintln!(
                    "No previous run at {}, starting a new run",
                    run_result_path.display()
                );
                None
            }
        }
    } else {
        None
    };

    let json_mode = args.output == OutputFormat::Json;
    if !json_mode && !args.quiet {
        println!("Running {} action(s)...\n", graph.actions.len());
    }

    // Create progress bar if not in quiet mode
    let progress = if !args.quiet && !json_mode {
        let pb = ProgressBar::new(graph.actions.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let shared: Arc<dyn Warehouse> = warehouse.clone();
    let mut runner = Runner::new(shared, graph.clone(), options, resume_from);
    if let Some(pb) = &progress {
        let pb = pb.clone();
        runner = runner.on_change(move |result| update_progress(&pb, result));
    }
    let runner = runner.execute();

    let handle = runner.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling run...");
            handle.cancel();
        }
    });
    let outcome = runner.result().await;
    interrupt.abort();

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let result = outcome.context("Run did not complete")?;

    if let Err(e) = result.save(&run_result_path) {
        eprintln!("Warning: Failed to save run result: {}", e);
    }

    match fetch_warehouse_state(&*warehouse, &project.targets(), Vec::new()).await {
        Ok(state) => {
            cache.record_run(&graph, &result, &state.tables);
            if let Err(e) = cache.save(&cache_path) {
                eprintln!("Warning: Failed to save cache state: {}", e);
            }
        }
        Err(e) => eprintln!("Warning: Failed to refresh cache state: {}", e),
    }

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", report::render(&graph, &result));
    }

    match result.status {
        RunStatus::Failed => Err(ExitCode(1).into()),
        RunStatus::Cancelled | RunStatus::TimedOut => Err(ExitCode(2).into()),
        RunStatus::Successful | RunStatus::Running => Ok(()),
    }
}

/// Explicit flags win, then a project that turns caching on; otherwise the
/// compiled graph's own setting applies.
fn resolve_run_cache(run_cache: bool, no_run_cache: bool, project_default: bool) -> Option<bool> {
    if run_cache {
        Some(true)
    } else if no_run_cache {
        Some(false)
    } else if project_default {
        Some(true)
    } else {
        None
    }
}

/// Position is the number of finished actions; the message lists the ones
/// still running.
fn update_progress(pb: &ProgressBar, result: &RunResult) {
    let running: Vec<String> = result
        .actions
        .iter()
        .filter(|a| a.status == ActionStatus::Running)
        .map(|a| a.target.to_string())
        .collect();
    let finished = result.actions.len() - running.len();
    pb.set_position(finished as u64);
    pb.set_message(running.join(", "));
}
