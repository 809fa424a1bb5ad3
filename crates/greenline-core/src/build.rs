//! Build strategies: the commands a unit's build or deploy would run.
//!
//! Strategies are a closed set. [`Build::side_effects`] is an exhaustive
//! match, so a new unit kind has to be handled here before it compiles.

use crate::command::{Command, SideEffects};
use crate::secret::RuntimeArg;

/// Rolling alias of the most recently verified app image.
pub const GREEN_TAG: &str = "latest-green";

/// Dockerfile target of the verify (test) image.
pub const VERIFY_TARGET: &str = "test";

/// Dockerfile target of the deployable image.
pub const APP_TARGET: &str = "app";

/// A build or deploy strategy for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Build {
    /// Verify an artifact without producing a deployable image.
    Verify(Verifier),
    /// Verify, then build and push the app image (or re-tag the green one).
    Image(ImageBuild),
    Helm(HelmRelease),
    Terraform(TerraformStack),
}

impl Build {
    pub fn side_effects(&self) -> SideEffects {
        match self {
            Build::Verify(verifier) => verifier.side_effects(),
            Build::Image(image) => image.side_effects(),
            Build::Helm(release) => release.side_effects(),
            Build::Terraform(stack) => stack.side_effects(),
        }
    }

    /// Short strategy name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Build::Verify(_) => "verify",
            Build::Image(_) => "image",
            Build::Helm(_) => "helm",
            Build::Terraform(_) => "terraform",
        }
    }
}

/// Dockerfile and build context of an artifact, shared by every image stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerContext {
    pub dockerfile: String,
    pub context: String,
}

impl DockerContext {
    /// `<path>/Dockerfile` built from `<path>`.
    pub fn for_path(path: &str) -> Self {
        Self {
            dockerfile: format!("{}/Dockerfile", path),
            context: path.to_string(),
        }
    }

    pub fn build(&self, tag: &str, target: &str) -> Command {
        Command::new(
            "docker",
            [
                "build",
                "-f",
                self.dockerfile.as_str(),
                "-t",
                tag,
                "--target",
                target,
                self.context.as_str(),
            ],
        )
    }
}

/// Builds the verify image and runs it as the test gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verifier {
    pub docker: DockerContext,
    /// Full tag of the verify image.
    pub image: String,
    pub has_changed: bool,
}

impl Verifier {
    pub fn side_effects(&self) -> SideEffects {
        if !self.has_changed {
            return SideEffects::none();
        }
        SideEffects::new(self.commands())
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            self.docker.build(&self.image, VERIFY_TARGET),
            Command::new("docker", ["run", "--rm", self.image.as_str()]),
        ]
    }
}

/// Produces the app image tagged with the current sha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuild {
    pub verifier: Verifier,
    /// App image name without a tag.
    pub image_base: String,
    pub current_sha: String,
}

impl ImageBuild {
    fn tagged(&self, tag: &str) -> String {
        format!("{}:{}", self.image_base, tag)
    }

    pub fn side_effects(&self) -> SideEffects {
        let commit_tag = self.tagged(&self.current_sha);
        let green_tag = self.tagged(GREEN_TAG);

        if self.verifier.has_changed {
            self.verifier.side_effects().then([
                self.verifier.docker.build(&commit_tag, APP_TARGET),
                Command::new("docker", ["tag", commit_tag.as_str(), green_tag.as_str()]),
                Command::new("docker", ["push", "--all-tags", self.image_base.as_str()]),
            ])
        } else {
            SideEffects::new(vec![
                Command::new("docker", ["pull", green_tag.as_str()]),
                Command::new("docker", ["tag", green_tag.as_str(), commit_tag.as_str()]),
                Command::new("docker", ["push", commit_tag.as_str()]),
            ])
        }
    }
}

/// `helm upgrade --install` of a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmRelease {
    pub release: String,
    pub chart: String,
    pub namespace: String,
    /// Image repository URL, passed to the chart as `repo`.
    pub repository: String,
    /// Image tag the chart deploys, passed as `tag`.
    pub tag: String,
    /// Literal values followed by secrets. Each is passed through an
    /// environment variable so no value appears on the command line.
    pub args: Vec<RuntimeArg>,
    pub has_changed: bool,
}

impl HelmRelease {
    pub fn side_effects(&self) -> SideEffects {
        if !self.has_changed {
            return SideEffects::none();
        }

        let repo = format!("repo={}", self.repository);
        let tag = format!("tag={}", self.tag);
        let upgrade = Command::new(
            "helm",
            [
                "upgrade",
                self.release.as_str(),
                self.chart.as_str(),
                "--install",
                "--atomic",
                "--namespace",
                self.namespace.as_str(),
                "--set",
                repo.as_str(),
                "--set",
                tag.as_str(),
            ],
        )
        .with_args(self.args.iter().flat_map(|arg| {
            [
                "--set".to_string(),
                format!("{}=${}", arg.key, arg.env_key()),
            ]
        }));

        SideEffects::new(vec![
            Command::new("helm", ["dep", "update", self.chart.as_str()]),
            upgrade,
        ])
    }
}

/// Terraform init/plan/apply of a root module. Always applied; the plan is
/// Terraform's own change check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformStack {
    pub path: String,
}

impl TerraformStack {
    pub fn side_effects(&self) -> SideEffects {
        let chdir = format!("-chdir={}", self.path);
        let terraform = |args: &[&str]| {
            Command::new("terraform", [chdir.as_str()]).with_args(args.iter().copied())
        };
        SideEffects::new(vec![
            terraform(&["init"]),
            terraform(&["plan", "-out=plan.out"]),
            terraform(&["apply", "plan.out"]),
        ])
    }
}
