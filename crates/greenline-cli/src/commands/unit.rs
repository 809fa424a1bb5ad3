//! Build or deploy a single unit.

use anyhow::{Context, Result};
use greenline_core::{ChangeDetector, CommandRunner, GitChangeDetector, StaticChangeDetector};
use greenline_executor::{DryRunRunner, ShellRunner};
use greenline_planner::{BuildPlanner, UnitRequest, WorkflowAssembler};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::load_config;

/// Flags shared by `build-artifact` and `deploy-application`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOptions {
    pub current_sha: String,
    pub previous_sha: Option<String>,
    pub force: bool,
    pub dry_run: bool,
}

/// Pick how changes are detected. Without a previous commit every unit
/// counts as changed.
async fn change_detector(
    options: &UnitOptions,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn ChangeDetector> {
    if options.force {
        info!("Forced run, treating every unit as changed");
        return Arc::new(StaticChangeDetector::always_changed());
    }
    let detector = match &options.previous_sha {
        Some(sha) => GitChangeDetector::new(runner, sha.clone()),
        None => match GitChangeDetector::from_parent_commit(runner.clone()).await {
            Ok(detector) => detector,
            Err(e) => {
                warn!(error = %e, "Could not resolve previous commit");
                GitChangeDetector::new(runner, "")
            }
        },
    };
    Arc::new(detector)
}

pub async fn run(config_path: &Path, request: UnitRequest, options: UnitOptions) -> Result<()> {
    let config = Arc::new(load_config(config_path)?);
    let shell: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());

    let detector = change_detector(&options, shell.clone()).await;
    let planner = BuildPlanner::new(config.clone(), detector, options.current_sha.clone());
    let assembler = WorkflowAssembler::new(config, config_path.display().to_string());

    let runner: Arc<dyn CommandRunner> = if options.dry_run {
        Arc::new(DryRunRunner::new(shell))
    } else {
        shell
    };

    assembler
        .execute(&planner, &request, runner.as_ref())
        .await
        .with_context(|| format!("Failed to run {}", request))?;
    Ok(())
}
