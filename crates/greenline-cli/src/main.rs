//! greenline CLI tool.

use clap::{Args, Parser, Subcommand, ValueEnum};
use greenline_planner::UnitRequest;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "greenline", version)]
#[command(about = "Incremental, dependency-aware build and deploy pipelines", long_about = None)]
struct Cli {
    /// Path to the pipeline definition
    #[arg(
        long,
        global = true,
        env = "GREENLINE_CONFIG",
        default_value = "pipeline.yaml"
    )]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, verify and push one artifact
    BuildArtifact(UnitArgs),
    /// Deploy one application
    DeployApplication(UnitArgs),
    /// Write a CI workflow covering every unit
    Generate {
        /// Where to write the workflow
        output: PathBuf,
        /// Run greenline from this workspace instead of installing it
        #[arg(long = "self")]
        self_hosted: bool,
    },
    /// Validate the pipeline definition
    Validate,
}

#[derive(Args, Debug, Clone)]
struct UnitArgs {
    /// Unit id
    id: String,

    /// Commit being built
    #[arg(long, env = "GITHUB_SHA")]
    current_sha: String,

    /// Commit to compare against [default: parent of HEAD]
    #[arg(long)]
    previous_sha: Option<String>,

    /// Treat every unit as changed
    #[arg(long)]
    force: bool,

    /// Print commands instead of running them
    #[arg(long)]
    dry_run: bool,
}

impl UnitArgs {
    fn options(&self) -> commands::unit::UnitOptions {
        commands::unit::UnitOptions {
            current_sha: self.current_sha.clone(),
            previous_sha: self.previous_sha.clone(),
            force: self.force,
            dry_run: self.dry_run,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::BuildArtifact(args) => {
            let request = UnitRequest::BuildArtifact(args.id.clone());
            commands::unit::run(&cli.config, request, args.options()).await?;
        }
        Commands::DeployApplication(args) => {
            let request = UnitRequest::DeployApplication(args.id.clone());
            commands::unit::run(&cli.config, request, args.options()).await?;
        }
        Commands::Generate {
            output,
            self_hosted,
        } => {
            commands::generate(&cli.config, &output, self_hosted).await?;
        }
        Commands::Validate => {
            commands::validate(&cli.config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_artifact() {
        let cli = Cli::try_parse_from([
            "greenline",
            "build-artifact",
            "api",
            "--current-sha",
            "abc123",
            "--force",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("pipeline.yaml"));
        let Commands::BuildArtifact(args) = cli.command else {
            panic!("expected build-artifact");
        };
        assert_eq!(args.id, "api");
        assert_eq!(args.current_sha, "abc123");
        assert!(args.force);
        assert!(!args.dry_run);
        assert_eq!(args.previous_sha, None);
    }

    #[test]
    fn test_parse_generate_self() {
        let cli = Cli::try_parse_from([
            "greenline",
            "--config",
            "ci/pipeline.yaml",
            "generate",
            ".github/workflows/build.yaml",
            "--self",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("ci/pipeline.yaml"));
        assert!(matches!(
            cli.command,
            Commands::Generate { self_hosted: true, .. }
        ));
    }

    #[test]
    fn test_parse_log_format() {
        let cli =
            Cli::try_parse_from(["greenline", "validate", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
