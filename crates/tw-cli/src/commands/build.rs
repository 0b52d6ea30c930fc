//! Build command implementation

use anyhow::{Context, Result};
use std::path::Path;
use tw_core::CacheStateFile;

use crate::cli::{BuildArgs, GlobalArgs};
use crate::commands::common;

/// Execute the build command
pub(crate) async fn execute(args: &BuildArgs, global: &GlobalArgs) -> Result<()> {
    let project = common::load_project(global, &args.selection)?;

    common::check_graph_errors(&project)?;

    let warehouse = common::open_warehouse(&project, global)?;
    let cache = CacheStateFile::load(&project.cache_state_path())
        .context("Failed to load cache state")?;

    let mut run_config = common::run_config(&args.selection);
    if project.config.use_run_cache {
        run_config.use_run_cache = Some(true);
    }

    let graph = common::build_graph(&project, &warehouse, &run_config, &cache).await?;
    let json = serde_json::to_string_pretty(&graph)?;

    match &args.output {
        Some(path) => {
            std::fs::write(Path::new(path), &json)
                .with_context(|| format!("Failed to write {}", path))?;
            println!("Wrote {} action(s) to {}", graph.actions.len(), path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
