//! Side effects for a single unit, or a CI workflow for every unit.

use crate::PlanResult;
use crate::planner::BuildPlanner;
use greenline_config::PipelineConfig;
use greenline_core::workflow::{
    Job, Step, Workflow, checkout_step, install_cli_step, setup_helm_step, setup_rust_step,
    setup_terraform_step,
};
use greenline_core::{
    Application, ApplicationKind, Artifact, CommandRunner, Result, SideEffects,
    StaticChangeDetector,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// How generated jobs invoke greenline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliInvocation {
    /// Install a pinned release and run the `greenline` binary.
    Installed { version: String },
    /// Build and run from this workspace, for greenline's own pipeline.
    SelfHosted,
}

impl CliInvocation {
    /// Installed at the version of the running binary.
    pub fn current() -> Self {
        CliInvocation::Installed {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            CliInvocation::Installed { .. } => "greenline",
            CliInvocation::SelfHosted => "cargo run --quiet -p greenline-cli --",
        }
    }

    fn setup_steps(&self) -> Vec<Step> {
        match self {
            CliInvocation::Installed { version } => {
                vec![setup_rust_step(), install_cli_step(version)]
            }
            CliInvocation::SelfHosted => vec![setup_rust_step()],
        }
    }
}

/// A single-unit action requested from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitRequest {
    BuildArtifact(String),
    DeployApplication(String),
}

impl UnitRequest {
    pub fn id(&self) -> &str {
        match self {
            UnitRequest::BuildArtifact(id) | UnitRequest::DeployApplication(id) => id,
        }
    }

    /// The CLI subcommand performing this request.
    pub fn subcommand(&self) -> &'static str {
        match self {
            UnitRequest::BuildArtifact(_) => "build-artifact",
            UnitRequest::DeployApplication(_) => "deploy-application",
        }
    }
}

impl fmt::Display for UnitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.subcommand(), self.id())
    }
}

/// Assembles side effects and workflows from a validated pipeline.
pub struct WorkflowAssembler {
    config: Arc<PipelineConfig>,
    config_path: String,
    invocation: CliInvocation,
}

impl WorkflowAssembler {
    pub fn new(config: Arc<PipelineConfig>, config_path: impl Into<String>) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            invocation: CliInvocation::current(),
        }
    }

    pub fn with_invocation(mut self, invocation: CliInvocation) -> Self {
        self.invocation = invocation;
        self
    }

    /// Side effects of one unit, with change state decided by `planner`.
    pub async fn side_effects(
        &self,
        planner: &BuildPlanner,
        request: &UnitRequest,
    ) -> Result<SideEffects> {
        let build = match request {
            UnitRequest::BuildArtifact(id) => planner.artifact(id).await?.prepare_build(),
            UnitRequest::DeployApplication(id) => planner.application(id).await?.prepare_build(),
        };
        let effects = build.side_effects();
        info!(
            unit = %request.id(),
            strategy = build.name(),
            commands = effects.len(),
            "Planned side effects"
        );
        Ok(effects)
    }

    /// Plan one unit and run its side effects, stopping at the first failure.
    pub async fn execute(
        &self,
        planner: &BuildPlanner,
        request: &UnitRequest,
        runner: &dyn CommandRunner,
    ) -> Result<()> {
        let effects = self.side_effects(planner, request).await?;
        if effects.is_empty() {
            info!(unit = %request.id(), "Nothing to do");
            return Ok(());
        }
        effects.apply(runner).await
    }

    /// The full workflow: one job per unit, every unit treated as changed.
    pub async fn workflow(&self) -> Result<Workflow> {
        let planner = BuildPlanner::new(
            self.config.clone(),
            Arc::new(StaticChangeDetector::always_changed()),
            "",
        );

        let mut jobs = BTreeMap::new();
        for artifact in planner.artifacts().await? {
            jobs.insert(artifact.job_id(), self.artifact_job(&artifact));
        }
        for application in planner.applications().await? {
            jobs.insert(application.job_id(), self.application_job(&application));
        }
        info!(jobs = jobs.len(), "Assembled workflow");

        Ok(Workflow::on_trunk_push(self.config.name.clone(), jobs))
    }

    /// Render the workflow and write it to `path`.
    pub async fn write_workflow(&self, path: impl AsRef<Path>) -> PlanResult<()> {
        let path = path.as_ref();
        let rendered = render_workflow(&self.workflow().await?)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, rendered)?;
        info!(path = %path.display(), "Wrote workflow");
        Ok(())
    }

    /// Steps every job starts with: checkout, greenline itself, cloud auth.
    fn common_steps(&self) -> Vec<Step> {
        let mut steps = vec![checkout_step()];
        steps.extend(self.invocation.setup_steps());
        steps.extend(self.config.resources.cloud_provider.setup_steps());
        steps
    }

    fn invoke(&self, request: &UnitRequest) -> String {
        format!(
            "{} {} --config {} --current-sha $GITHUB_SHA",
            self.invocation.program(),
            request,
            self.config_path
        )
    }

    fn artifact_job(&self, artifact: &Artifact) -> Job {
        let mut steps = self.common_steps();
        steps.push(
            artifact
                .cloud_provider
                .registry_login_step(&artifact.repository.host),
        );
        steps.push(
            Step::named(format!("Build {}", artifact.id))
                .run(self.invoke(&UnitRequest::BuildArtifact(artifact.id.clone()))),
        );
        Job::new(format!("Build {}", artifact.id), artifact.needs.clone(), steps)
    }

    fn application_job(&self, application: &Application) -> Job {
        let mut steps = self.common_steps();
        steps.extend(
            self.config
                .resources
                .secret_providers
                .resolve_generation_steps(&application.secret_bindings),
        );
        match application.kind {
            ApplicationKind::Helm => {
                steps.push(
                    application
                        .cloud_provider
                        .cluster_credentials_step(&application.cluster),
                );
                steps.push(setup_helm_step());
            }
            ApplicationKind::Terraform => steps.push(setup_terraform_step()),
        }

        let deploy = application.runtime_args().fold(
            Step::named(format!("Deploy {}", application.id))
                .run(self.invoke(&UnitRequest::DeployApplication(application.id.clone()))),
            |step, arg| step.with_env(arg.env_key(), arg.value.clone()),
        );
        steps.push(deploy);

        Job::new(
            format!("Deploy {}", application.id),
            application.needs.clone(),
            steps,
        )
    }
}

/// Render a workflow as YAML.
pub fn render_workflow(workflow: &Workflow) -> PlanResult<String> {
    Ok(serde_yaml::to_string(workflow)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use greenline_core::command::{Command, command_failed};
    use greenline_core::Error;
    use std::sync::Mutex;

    const PIPELINE: &str = include_str!("../../greenline-config/fixtures/pipeline.yaml");
    const REPO: &str = "us-central1-docker.pkg.dev/my-project/repo-name";

    fn config() -> Arc<PipelineConfig> {
        Arc::new(greenline_config::parse_pipeline(PIPELINE).unwrap())
    }

    fn assembler() -> WorkflowAssembler {
        WorkflowAssembler::new(config(), "pipeline.yaml")
            .with_invocation(CliInvocation::Installed {
                version: "0.1.0".to_string(),
            })
    }

    fn planner(has_changed: bool) -> BuildPlanner {
        let detector = if has_changed {
            StaticChangeDetector::always_changed()
        } else {
            StaticChangeDetector::never_changed()
        };
        BuildPlanner::new(config(), Arc::new(detector), "abc123")
    }

    fn rendered(effects: &SideEffects) -> Vec<String> {
        effects.commands.iter().map(|c| c.to_string()).collect()
    }

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Command>>,
        fail_program: Option<&'static str>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &Command) -> Result<()> {
            self.calls.lock().unwrap().push(command.clone());
            if self.fail_program == Some(command.program.as_str()) {
                return Err(command_failed(command, "exit status: 1"));
            }
            Ok(())
        }

        async fn output(&self, _command: &Command) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_unit_request_display() {
        assert_eq!(
            UnitRequest::BuildArtifact("api".into()).to_string(),
            "build-artifact api"
        );
        assert_eq!(
            UnitRequest::DeployApplication("db".into()).to_string(),
            "deploy-application db"
        );
    }

    #[tokio::test]
    async fn test_changed_artifact_side_effects() {
        let effects = assembler()
            .side_effects(&planner(true), &UnitRequest::BuildArtifact("api".into()))
            .await
            .unwrap();

        assert_eq!(
            rendered(&effects),
            [
                format!(
                    "docker build -f packages/api/Dockerfile -t {}/api-test:abc123 --target test packages/api",
                    REPO
                ),
                format!("docker run --rm {}/api-test:abc123", REPO),
                format!(
                    "docker build -f packages/api/Dockerfile -t {}/api-app:abc123 --target app packages/api",
                    REPO
                ),
                format!(
                    "docker tag {0}/api-app:abc123 {0}/api-app:latest-green",
                    REPO
                ),
                format!("docker push --all-tags {}/api-app", REPO),
            ]
        );
    }

    #[tokio::test]
    async fn test_unchanged_artifact_side_effects() {
        let effects = assembler()
            .side_effects(&planner(false), &UnitRequest::BuildArtifact("api".into()))
            .await
            .unwrap();

        assert_eq!(
            rendered(&effects),
            [
                format!("docker pull {}/api-app:latest-green", REPO),
                format!(
                    "docker tag {0}/api-app:latest-green {0}/api-app:abc123",
                    REPO
                ),
                format!("docker push {}/api-app:abc123", REPO),
            ]
        );
    }

    #[tokio::test]
    async fn test_unchanged_helm_and_terraform() {
        let assembler = assembler();
        let planner = planner(false);

        let db = assembler
            .side_effects(&planner, &UnitRequest::DeployApplication("db".into()))
            .await
            .unwrap();
        assert!(db.is_empty());

        let infra = assembler
            .side_effects(&planner, &UnitRequest::DeployApplication("infra".into()))
            .await
            .unwrap();
        assert_eq!(infra.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_unit_runs_nothing() {
        let runner = RecordingRunner::default();
        let err = assembler()
            .execute(
                &planner(true),
                &UnitRequest::BuildArtifact("missing".into()),
                &runner,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownUnit(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_kind_is_rejected() {
        let err = assembler()
            .side_effects(&planner(true), &UnitRequest::BuildArtifact("db".into()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unit 'db' is not an artifact");
    }

    #[tokio::test]
    async fn test_execute_stops_at_first_failure() {
        let runner = RecordingRunner {
            fail_program: Some("docker"),
            ..Default::default()
        };
        let result = assembler()
            .execute(&planner(true), &UnitRequest::BuildArtifact("api".into()), &runner)
            .await;

        assert!(matches!(result, Err(Error::CommandFailed { .. })));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_helm_deploy() {
        let runner = RecordingRunner::default();
        assembler()
            .execute(
                &planner(true),
                &UnitRequest::DeployApplication("db".into()),
                &runner,
            )
            .await
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].to_string(), "helm dep update helm/db");
        assert_eq!(
            calls[1].to_string(),
            "helm upgrade db helm/db --install --atomic --namespace db-namespace \
             --set repo=us-central1-docker.pkg.dev/my-project/repo-name --set tag=abc123 \
             --set postgresql.dbName=$postgresql_dbName \
             --set postgresql.auth.password=$postgresql_auth_password \
             --set postgresql.auth.username=$postgresql_auth_username"
        );
    }

    async fn workflow() -> Workflow {
        assembler().workflow().await.unwrap()
    }

    #[tokio::test]
    async fn test_workflow_jobs_and_needs() {
        let workflow = workflow().await;

        let ids: Vec<_> = workflow.jobs.keys().map(String::as_str).collect();
        assert_eq!(
            ids,
            ["build-api", "build-shared", "deploy-db", "deploy-infra", "deploy-website"]
        );
        assert_eq!(workflow.jobs["deploy-db"].needs, ["deploy-infra"]);
        assert_eq!(
            workflow.jobs["deploy-website"].needs,
            ["build-api", "deploy-infra", "deploy-db"]
        );
        assert!(workflow.jobs["build-api"].needs.is_empty());
        assert_eq!(workflow.name, "My Build");
    }

    #[tokio::test]
    async fn test_artifact_job_steps() {
        let workflow = workflow().await;
        let job = &workflow.jobs["build-api"];

        let names: Vec<_> = job.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Checkout Repo",
                "Setup Rust",
                "Install greenline",
                "Authenticate to GCloud via Service Account",
                "Configure GCloud SDK",
                "Configure Docker",
                "Build api",
            ]
        );
        assert_eq!(
            job.steps.last().unwrap().run,
            "greenline build-artifact api --config pipeline.yaml --current-sha $GITHUB_SHA"
        );
    }

    #[tokio::test]
    async fn test_secret_fetch_step_in_deploy_job() {
        let workflow = workflow().await;
        let job = &workflow.jobs["deploy-db"];

        let fetch: Vec<_> = job
            .steps
            .iter()
            .filter(|s| s.uses == "google-github-actions/get-secretmanager-secrets@v1")
            .collect();
        assert_eq!(fetch.len(), 1);
        assert_eq!(fetch[0].id, "secrets-gcp-project");
        assert_eq!(fetch[0].with["secrets"], "pg-password:my-project/pg-password");

        let deploy = job.steps.last().unwrap();
        assert_eq!(
            deploy.run,
            "greenline deploy-application db --config pipeline.yaml --current-sha $GITHUB_SHA"
        );
        assert_eq!(deploy.env["postgresql_dbName"], "my-db");
        assert_eq!(
            deploy.env["postgresql_auth_password"],
            "${{ steps.secrets-gcp-project.outputs.pg-password }}"
        );
        assert_eq!(
            deploy.env["postgresql_auth_username"],
            "${{ secrets.pg-username }}"
        );
    }

    #[tokio::test]
    async fn test_every_deploy_job_fetches_batched_secrets() {
        // db reads nothing from gcp-project, yet still gets its fetch step
        let yaml = PIPELINE
            .replace("provider: gcp-project", "provider: github")
            .replace("secretNames: [pg-username]", "secretNames: [pg-username, pg-password]");
        let config = Arc::new(greenline_config::parse_pipeline(&yaml).unwrap());
        let workflow = WorkflowAssembler::new(config, "pipeline.yaml")
            .workflow()
            .await
            .unwrap();

        for job in ["deploy-db", "deploy-infra", "deploy-website"] {
            let fetch: Vec<_> = workflow.jobs[job]
                .steps
                .iter()
                .filter(|s| s.uses == "google-github-actions/get-secretmanager-secrets@v1")
                .collect();
            assert_eq!(fetch.len(), 1, "{}", job);
            assert_eq!(fetch[0].with["secrets"], "pg-password:my-project/pg-password");
        }
        assert!(
            workflow.jobs["build-api"]
                .steps
                .iter()
                .all(|s| s.id != "secrets-gcp-project")
        );
    }

    #[tokio::test]
    async fn test_kind_specific_setup() {
        let workflow = workflow().await;

        let db: Vec<_> = workflow.jobs["deploy-db"]
            .steps
            .iter()
            .map(|s| s.uses.as_str())
            .collect();
        assert!(db.contains(&"google-github-actions/get-gke-credentials@v1"));
        assert!(db.contains(&"azure/setup-helm@v3"));

        let infra: Vec<_> = workflow.jobs["deploy-infra"]
            .steps
            .iter()
            .map(|s| s.uses.as_str())
            .collect();
        assert!(infra.contains(&"hashicorp/setup-terraform@v2"));
        assert!(!infra.contains(&"azure/setup-helm@v3"));
    }

    #[tokio::test]
    async fn test_self_hosted_invocation() {
        let workflow = WorkflowAssembler::new(config(), "pipeline.yaml")
            .with_invocation(CliInvocation::SelfHosted)
            .workflow()
            .await
            .unwrap();
        let job = &workflow.jobs["build-api"];

        assert!(job.steps.iter().all(|s| s.name != "Install greenline"));
        assert!(
            job.steps
                .last()
                .unwrap()
                .run
                .starts_with("cargo run --quiet -p greenline-cli -- build-artifact api")
        );
    }

    #[tokio::test]
    async fn test_render_yaml() {
        let yaml = render_workflow(&workflow().await).unwrap();

        assert!(yaml.contains("name: My Build"));
        assert!(yaml.contains("runs-on: ubuntu-latest"));
        assert!(yaml.contains("- trunk"));
        assert!(yaml.contains("deploy-db:"));

        let parsed: Workflow = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.jobs["deploy-db"].needs, ["deploy-infra"]);
    }
}
