//! Buildable units producing container images.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::build::{APP_TARGET, Build, DockerContext, ImageBuild, VERIFY_TARGET, Verifier};
use crate::cloud::{ArtifactRepository, CloudProvider};

/// What an artifact produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ArtifactKind {
    /// A deployable image, verified first.
    #[default]
    #[display("app")]
    App,
    /// A package that is only verified.
    #[display("lib")]
    Lib,
}

impl ArtifactKind {
    pub const ALL: &'static [ArtifactKind] = &[ArtifactKind::App, ArtifactKind::Lib];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.to_string() == value)
    }
}

/// A fully resolved artifact. `has_changed` is decided once by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub path: String,
    pub kind: ArtifactKind,
    pub repository: ArtifactRepository,
    pub cloud_provider: CloudProvider,
    pub current_sha: String,
    pub has_changed: bool,
    /// Job ids this artifact's job waits for.
    pub needs: Vec<String>,
}

impl Artifact {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        repository: ArtifactRepository,
        cloud_provider: CloudProvider,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            kind: ArtifactKind::App,
            repository,
            cloud_provider,
            current_sha: String::new(),
            has_changed: false,
            needs: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = kind;
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
        format!("build-{}", self.id)
    }

    /// `<host>/<project>/<repository>`.
    pub fn repository_url(&self) -> String {
        self.repository.url(self.cloud_provider.project())
    }

    pub fn verify_image(&self) -> String {
        format!(
            "{}/{}-{}:{}",
            self.repository_url(),
            self.id,
            VERIFY_TARGET,
            self.current_sha
        )
    }

    /// App image name without a tag.
    pub fn app_image_base(&self) -> String {
        format!("{}/{}-{}", self.repository_url(), self.id, APP_TARGET)
    }

    pub fn app_image(&self, tag: &str) -> String {
        format!("{}:{}", self.app_image_base(), tag)
    }

    /// Choose the build strategy for this artifact's kind.
    pub fn prepare_build(&self) -> Build {
        let verifier = Verifier {
            docker: DockerContext::for_path(&self.path),
            image: self.verify_image(),
            has_changed: self.has_changed,
        };
        match self.kind {
            ArtifactKind::Lib => Build::Verify(verifier),
            ArtifactKind::App => Build::Image(ImageBuild {
                verifier,
                image_base: self.app_image_base(),
                current_sha: self.current_sha.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::GREEN_TAG;

    fn artifact() -> Artifact {
        Artifact::new(
            "api",
            "packages/api",
            ArtifactRepository {
                host: "us-central1-docker.pkg.dev".to_string(),
                name: "repo-name".to_string(),
            },
            CloudProvider::Gcp {
                project: "my-project".to_string(),
                service_account: "SA".to_string(),
                workload_identity_provider: "WIP".to_string(),
            },
        )
        .with_sha("abc123")
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(ArtifactKind::parse("lib"), Some(ArtifactKind::Lib));
        assert_eq!(ArtifactKind::parse("binary"), None);
        assert_eq!(ArtifactKind::default(), ArtifactKind::App);
    }

    #[test]
    fn test_image_names() {
        let api = artifact();
        assert_eq!(api.job_id(), "build-api");
        assert_eq!(
            api.verify_image(),
            "us-central1-docker.pkg.dev/my-project/repo-name/api-test:abc123"
        );
        assert_eq!(
            api.app_image(GREEN_TAG),
            "us-central1-docker.pkg.dev/my-project/repo-name/api-app:latest-green"
        );
    }

    #[test]
    fn test_prepare_build_by_kind() {
        let api = artifact().with_changed(true);
        assert!(matches!(api.prepare_build(), Build::Image(_)));
        assert_eq!(api.prepare_build().side_effects().len(), 5);

        let lib = api.with_kind(ArtifactKind::Lib);
        assert!(matches!(lib.prepare_build(), Build::Verify(_)));
        assert_eq!(lib.prepare_build().side_effects().len(), 2);
    }

    #[test]
    fn test_with_methods_return_new_values() {
        let original = artifact();
        let changed = original.clone().with_changed(true);
        assert!(!original.has_changed);
        assert!(changed.has_changed);
    }
}
