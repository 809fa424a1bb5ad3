//! CLI command implementations.

pub mod unit;

use anyhow::{Context, Result};
use greenline_config::PipelineConfig;
use greenline_planner::{CliInvocation, WorkflowAssembler};
use std::path::Path;
use std::sync::Arc;

/// Load and validate the pipeline definition.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    greenline_config::load(path)
        .with_context(|| format!("Failed to load pipeline definition {}", path.display()))
}

pub fn validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!(
        "Configuration is valid: {} artifacts, {} applications",
        config.artifacts.len(),
        config.applications.len()
    );
    Ok(())
}

pub async fn generate(config_path: &Path, output: &Path, self_hosted: bool) -> Result<()> {
    let config = Arc::new(load_config(config_path)?);
    let invocation = if self_hosted {
        CliInvocation::SelfHosted
    } else {
        CliInvocation::current()
    };

    WorkflowAssembler::new(config, config_path.display().to_string())
        .with_invocation(invocation)
        .write_workflow(output)
        .await
        .with_context(|| format!("Failed to generate workflow {}", output.display()))?;

    println!("Wrote workflow to {}", output.display());
    Ok(())
}
