//! Deployable units: Helm releases and Terraform stacks.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::build::{Build, HelmRelease, TerraformStack};
use crate::cloud::{ArtifactRepository, CloudProvider, KubernetesCluster};
use crate::secret::{RuntimeArg, SecretBinding};

/// How an application is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ApplicationKind {
    #[display("helm")]
    Helm,
    #[display("terraform")]
    Terraform,
}

impl ApplicationKind {
    pub const ALL: &'static [ApplicationKind] =
        &[ApplicationKind::Helm, ApplicationKind::Terraform];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.to_string() == value)
    }
}

/// A fully resolved application. `has_changed` is decided once by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub id: String,
    pub path: String,
    pub kind: ApplicationKind,
    /// Helm only.
    pub namespace: String,
    /// Literal runtime values, in declaration order.
    pub values: Vec<RuntimeArg>,
    pub secret_bindings: Vec<SecretBinding>,
    /// Secret references resolved from `secret_bindings`, sorted by key.
    pub secrets: Vec<RuntimeArg>,
    pub cluster: KubernetesCluster,
    /// Registry the deployed images are pulled from.
    pub repository: ArtifactRepository,
    pub cloud_provider: CloudProvider,
    /// Tag of the images this deploy references.
    pub current_sha: String,
    pub has_changed: bool,
    /// Job ids this application's job waits for.
    pub needs: Vec<String>,
}

impl Application {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        kind: ApplicationKind,
        repository: ArtifactRepository,
        cloud_provider: CloudProvider,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            kind,
            namespace: String::new(),
            values: Vec::new(),
            secret_bindings: Vec::new(),
            secrets: Vec::new(),
            cluster: KubernetesCluster::default(),
            repository,
            cloud_provider,
            current_sha: String::new(),
            has_changed: false,
            needs: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push(RuntimeArg::new(key, value));
        self
    }

    pub fn with_secret_bindings(mut self, bindings: Vec<SecretBinding>) -> Self {
        self.secret_bindings = bindings;
        self
    }

    pub fn with_secrets(mut self, secrets: Vec<RuntimeArg>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_cluster(mut self, cluster: KubernetesCluster) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.current_sha = sha.into();
        self
    }

    pub fn with_changed(mut self, has_changed: bool) -> Self {
        self.has_changed = has_changed;
        self
    }

    pub fn with_needs(mut self, needs: Vec<String>) -> Self {
        self.needs = needs;
        self
    }

    pub fn job_id(&self) -> String {
        format!("deploy-{}", self.id)
    }

    pub fn repository_url(&self) -> String {
        self.repository.url(self.cloud_provider.project())
    }

    /// Values then secrets: every argument handed to the deploy at run time.
    pub fn runtime_args(&self) -> impl Iterator<Item = &RuntimeArg> {
        self.values.iter().chain(&self.secrets)
    }

    /// Choose the deploy strategy for this application's kind.
    pub fn prepare_build(&self) -> Build {
        match self.kind {
            ApplicationKind::Helm => Build::Helm(HelmRelease {
                release: self.id.clone(),
                chart: self.path.clone(),
                namespace: self.namespace.clone(),
                repository: self.repository_url(),
                tag: self.current_sha.clone(),
                args: self.runtime_args().cloned().collect(),
                has_changed: self.has_changed,
            }),
            ApplicationKind::Terraform => Build::Terraform(TerraformStack {
                path: self.path.clone(),
            }),
        }
    }
}
