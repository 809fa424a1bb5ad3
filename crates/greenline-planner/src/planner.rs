//! Resolution of declared units into buildable artifacts and applications.

use greenline_config::PipelineConfig;
use greenline_core::{Application, Artifact, ChangeDetector, Error, Result, UnitKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Materializes declared units, deciding `has_changed` for each.
///
/// A unit counts as changed when any path in its upstream closure changed.
/// The detector is queried once per resolved unit.
pub struct BuildPlanner {
    config: Arc<PipelineConfig>,
    detector: Arc<dyn ChangeDetector>,
    current_sha: String,
}

impl BuildPlanner {
    pub fn new(
        config: Arc<PipelineConfig>,
        detector: Arc<dyn ChangeDetector>,
        current_sha: impl Into<String>,
    ) -> Self {
        Self {
            config,
            detector,
            current_sha: current_sha.into(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn current_sha(&self) -> &str {
        &self.current_sha
    }

    async fn has_changed(&self, id: &str) -> bool {
        let paths = self.config.graph().all_paths(id);
        let has_changed = self.detector.has_changed(&paths).await;
        debug!(unit = %id, paths = ?paths, has_changed, "Change detection");
        has_changed
    }

    /// The error for an id that is not a unit of `expected` kind.
    fn missing(&self, id: &str, expected: UnitKind) -> Error {
        match self.config.graph().get(id) {
            Some(node) if node.kind != expected => Error::KindMismatch {
                id: id.to_string(),
                expected: match expected {
                    UnitKind::Artifact => "an artifact",
                    UnitKind::Application => "an application",
                },
            },
            _ => Error::UnknownUnit(id.to_string()),
        }
    }

    pub async fn artifact(&self, id: &str) -> Result<Artifact> {
        let spec = self
            .config
            .artifact(id)
            .ok_or_else(|| self.missing(id, UnitKind::Artifact))?;
        let resources = &self.config.resources;
        let has_changed = self.has_changed(id).await;
        info!(unit = %id, has_changed, "Resolved artifact");

        Ok(Artifact::new(
            spec.id.clone(),
            spec.path.clone(),
            resources.artifact_repository.clone(),
            resources.cloud_provider.clone(),
        )
        .with_kind(spec.kind)
        .with_sha(self.current_sha.clone())
        .with_changed(has_changed)
        .with_needs(self.config.graph().upstream_job_ids(id)))
    }

    pub async fn application(&self, id: &str) -> Result<Application> {
        let spec = self
            .config
            .application(id)
            .ok_or_else(|| self.missing(id, UnitKind::Application))?;
        let resources = &self.config.resources;
        let has_changed = self.has_changed(id).await;
        info!(unit = %id, has_changed, "Resolved application");

        let application = spec.values.iter().fold(
            Application::new(
                spec.id.clone(),
                spec.path.clone(),
                spec.kind,
                resources.artifact_repository.clone(),
                resources.cloud_provider.clone(),
            ),
            |app, value| app.with_value(value.key.clone(), value.value.clone()),
        );

        Ok(application
            .with_namespace(spec.namespace.clone())
            .with_secrets(resources.secret_providers.resolve_runtime_args(&spec.secrets))
            .with_secret_bindings(spec.secrets.clone())
            .with_cluster(resources.kubernetes_cluster.clone())
            .with_sha(self.current_sha.clone())
            .with_changed(has_changed)
            .with_needs(self.config.graph().upstream_job_ids(id)))
    }

    /// Every declared artifact, in declaration order.
    pub async fn artifacts(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::with_capacity(self.config.artifacts.len());
        for spec in &self.config.artifacts {
            artifacts.push(self.artifact(&spec.id).await?);
        }
        Ok(artifacts)
    }

    /// Every declared application, in declaration order.
    pub async fn applications(&self) -> Result<Vec<Application>> {
        let mut applications = Vec::with_capacity(self.config.applications.len());
        for spec in &self.config.applications {
            applications.push(self.application(&spec.id).await?);
        }
        Ok(applications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use greenline_core::StaticChangeDetector;
    use std::sync::Mutex;

    const PIPELINE: &str = include_str!("../../greenline-config/fixtures/pipeline.yaml");

    /// Reports a change when any queried path is in `changed`.
    struct PathDetector {
        changed: Vec<&'static str>,
        queries: Mutex<Vec<Vec<String>>>,
    }

    impl PathDetector {
        fn new(changed: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                changed,
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChangeDetector for PathDetector {
        async fn has_changed(&self, paths: &[String]) -> bool {
            self.queries.lock().unwrap().push(paths.to_vec());
            paths
                .iter()
                .any(|p| self.changed.iter().any(|c| *c == p.as_str()))
        }
    }

    fn config() -> Arc<PipelineConfig> {
        Arc::new(greenline_config::parse_pipeline(PIPELINE).unwrap())
    }

    #[tokio::test]
    async fn test_artifact_resolution() {
        let planner = BuildPlanner::new(
            config(),
            Arc::new(StaticChangeDetector::always_changed()),
            "abc123",
        );

        let api = planner.artifact("api").await.unwrap();
        assert_eq!(api.current_sha, "abc123");
        assert!(api.has_changed);
        assert!(api.needs.is_empty());
        assert_eq!(
            api.app_image_base(),
            "us-central1-docker.pkg.dev/my-project/repo-name/api-app"
        );
    }

    #[tokio::test]
    async fn test_change_detection_covers_upstream_paths() {
        let detector = PathDetector::new(vec!["tf/main"]);
        let planner = BuildPlanner::new(config(), detector.clone(), "abc123");

        let db = planner.application("db").await.unwrap();
        assert!(db.has_changed);
        assert_eq!(db.needs, ["deploy-infra"]);

        let api = planner.artifact("api").await.unwrap();
        assert!(!api.has_changed);

        let queries = detector.queries.lock().unwrap();
        assert_eq!(queries[0], ["helm/db", "tf/main"]);
        assert_eq!(queries[1], ["packages/api"]);
    }

    #[tokio::test]
    async fn test_application_secrets_resolved_sorted() {
        let planner = BuildPlanner::new(
            config(),
            Arc::new(StaticChangeDetector::never_changed()),
            "abc123",
        );

        let db = planner.application("db").await.unwrap();
        let keys: Vec<_> = db.secrets.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["postgresql.auth.password", "postgresql.auth.username"]);
        assert_eq!(
            db.secrets[0].value,
            "${{ steps.secrets-gcp-project.outputs.pg-password }}"
        );
        assert_eq!(db.secrets[1].value, "${{ secrets.pg-username }}");
        assert_eq!(db.cluster.name, "cluster-name");
        assert_eq!(db.current_sha, "abc123");
        assert_eq!(
            db.repository_url(),
            "us-central1-docker.pkg.dev/my-project/repo-name"
        );
    }

    #[tokio::test]
    async fn test_unknown_and_mismatched_ids() {
        let planner = BuildPlanner::new(
            config(),
            Arc::new(StaticChangeDetector::always_changed()),
            "abc123",
        );

        assert!(matches!(
            planner.artifact("nope").await,
            Err(Error::UnknownUnit(ref id)) if id == "nope"
        ));
        assert!(matches!(
            planner.artifact("db").await,
            Err(Error::KindMismatch { expected: "an artifact", .. })
        ));
        assert!(matches!(
            planner.application("api").await,
            Err(Error::KindMismatch { expected: "an application", .. })
        ));
    }

    #[tokio::test]
    async fn test_all_units_in_declaration_order() {
        let planner = BuildPlanner::new(
            config(),
            Arc::new(StaticChangeDetector::always_changed()),
            "abc123",
        );

        let artifacts: Vec<_> = planner
            .artifacts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(artifacts, ["api", "shared"]);

        let applications: Vec<_> = planner
            .applications()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(applications, ["infra", "db", "website"]);
    }
}
