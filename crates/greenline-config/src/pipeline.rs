//! Pipeline definition parsing and validation.

use crate::raw::{
    RawApplication, RawArtifact, RawArtifactRepository, RawCloudProvider, RawKubernetesCluster,
    RawPipeline, RawSecretProvider,
};
use crate::{ConfigError, ConfigResult};
use greenline_core::{
    ApplicationKind, ArtifactKind, ArtifactRepository, CloudProvider, CloudProviderType,
    DependencyGraph, DependencyNode, KubernetesCluster, RuntimeArg, SecretBinding, SecretProvider,
    SecretProviderRegistry, SecretProviderType, ValidationErrors,
};
use greenline_core::workflow::env_key;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

/// A validated pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub name: String,
    pub resources: Resources,
    pub artifacts: Vec<ArtifactSpec>,
    pub applications: Vec<ApplicationSpec>,
    graph: DependencyGraph,
}

impl PipelineConfig {
    /// Dependency graph over every artifact and application.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn artifact(&self, id: &str) -> Option<&ArtifactSpec> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    pub fn application(&self, id: &str) -> Option<&ApplicationSpec> {
        self.applications.iter().find(|a| a.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resources {
    pub artifact_repository: ArtifactRepository,
    pub kubernetes_cluster: KubernetesCluster,
    pub cloud_provider: CloudProvider,
    pub secret_providers: SecretProviderRegistry,
}

/// An artifact as declared, before change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub id: String,
    pub path: String,
    pub kind: ArtifactKind,
    pub dependencies: Vec<String>,
}

/// An application as declared, before change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSpec {
    pub id: String,
    pub path: String,
    pub kind: ApplicationKind,
    pub namespace: String,
    pub artifacts: Vec<String>,
    pub dependencies: Vec<String>,
    pub values: Vec<RuntimeArg>,
    pub secrets: Vec<SecretBinding>,
}

impl ApplicationSpec {
    /// Artifacts first, then applications.
    pub fn upstreams(&self) -> impl Iterator<Item = &String> {
        self.artifacts.iter().chain(&self.dependencies)
    }
}

/// Read and validate the pipeline definition at `path`.
pub fn load(path: impl AsRef<Path>) -> ConfigResult<PipelineConfig> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading pipeline definition");
    let text = std::fs::read_to_string(path)?;
    parse_pipeline(&text)
}

/// Parse and validate a pipeline definition from YAML text.
pub fn parse_pipeline(yaml: &str) -> ConfigResult<PipelineConfig> {
    let raw: RawPipeline = serde_yaml::from_str(yaml)?;
    validate(raw).map_err(ConfigError::Invalid)
}

/// Convert a decoded definition into typed values, reporting every problem
/// found as one error tree. Nothing is returned unless the tree is empty.
pub fn validate(raw: RawPipeline) -> Result<PipelineConfig, ValidationErrors> {
    let mut errors = ValidationErrors::new("");
    if raw.name.is_empty() {
        errors = errors.require("name");
    }

    let needs_cluster = raw
        .applications
        .iter()
        .any(|a| a.application_type == ApplicationKind::Helm.to_string());
    let resources = collect(validate_resources(&raw, needs_cluster), &mut errors);

    let mut artifact_errors = ValidationErrors::new("artifacts");
    let artifacts: Vec<ArtifactSpec> = raw
        .artifacts
        .iter()
        .enumerate()
        .filter_map(|(i, a)| collect(validate_artifact(i, a), &mut artifact_errors))
        .collect();
    errors = errors.put_child(artifact_errors);

    let artifact_ids: HashSet<&str> = raw.artifacts.iter().map(|a| a.id.as_str()).collect();
    let mut application_errors = ValidationErrors::new("applications");
    let applications: Vec<ApplicationSpec> = raw
        .applications
        .iter()
        .enumerate()
        .filter_map(|(i, a)| {
            let result = validate_application(i, a, &artifact_ids).and_then(|app| {
                // Secret coverage needs a valid registry to check against.
                let Some(resources) = &resources else {
                    return Ok(app);
                };
                let coverage = resources.secret_providers.validate(&app.id, &app.secrets);
                if coverage.is_present() {
                    Err(coverage)
                } else {
                    Ok(app)
                }
            });
            collect(result, &mut application_errors)
        })
        .collect();
    errors = errors.put_child(application_errors);

    let graph = build_graph(&artifacts, &applications);
    if errors.child("artifacts").is_none() && errors.child("applications").is_none() {
        errors = errors.put_child(graph.validate());
    }

    match resources {
        Some(resources) if !errors.is_present() => Ok(PipelineConfig {
            name: raw.name,
            resources,
            artifacts,
            applications,
            graph,
        }),
        _ => Err(errors),
    }
}

/// Keep an `Ok` value, or attach the error to `parent`.
fn collect<T>(result: Result<T, ValidationErrors>, parent: &mut ValidationErrors) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(child) => {
            *parent = std::mem::take(parent).put_child(child);
            None
        }
    }
}

/// Key for the node of the `index`-th unit: its id, or its position when the id is missing.
fn unit_key(index: usize, id: &str) -> String {
    if id.is_empty() {
        format!("[{}]", index)
    } else {
        id.to_string()
    }
}

fn unknown_type<T: ToString>(kind: &str, value: &str, allowed: &[T]) -> String {
    let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
    format!(
        "unknown {} type '{}' (expected one of: {})",
        kind,
        value,
        allowed.join(", ")
    )
}

fn validate_resources(raw: &RawPipeline, needs_cluster: bool) -> Result<Resources, ValidationErrors> {
    let resources = &raw.resources;
    let mut errors = ValidationErrors::new("resources");

    let artifact_repository = match &resources.artifact_repository {
        Some(repo) => collect(validate_repository(repo), &mut errors),
        None => {
            errors = errors.require("artifactRepository");
            None
        }
    };

    let kubernetes_cluster = match &resources.kubernetes_cluster {
        Some(cluster) => collect(validate_cluster(cluster), &mut errors),
        None if needs_cluster => {
            errors = errors.put("kubernetesCluster", "required by helm applications");
            None
        }
        None => Some(KubernetesCluster::default()),
    };

    let cloud_provider = match &resources.cloud_provider {
        Some(provider) => collect(validate_cloud_provider(provider), &mut errors),
        None => {
            errors = errors.require("cloudProvider");
            None
        }
    };

    let secret_providers = collect(
        validate_secret_providers(&resources.secret_providers),
        &mut errors,
    );

    match (
        artifact_repository,
        kubernetes_cluster,
        cloud_provider,
        secret_providers,
    ) {
        (Some(artifact_repository), Some(kubernetes_cluster), Some(cloud_provider), Some(secret_providers))
            if !errors.is_present() =>
        {
            Ok(Resources {
                artifact_repository,
                kubernetes_cluster,
                cloud_provider,
                secret_providers,
            })
        }
        _ => Err(errors),
    }
}

fn validate_repository(raw: &RawArtifactRepository) -> Result<ArtifactRepository, ValidationErrors> {
    let mut errors = ValidationErrors::new("artifactRepository");
    if raw.host.is_empty() {
        errors = errors.require("host");
    }
    if raw.name.is_empty() {
        errors = errors.require("name");
    }
    if errors.is_present() {
        return Err(errors);
    }
    Ok(ArtifactRepository {
        host: raw.host.clone(),
        name: raw.name.clone(),
    })
}

fn validate_cluster(raw: &RawKubernetesCluster) -> Result<KubernetesCluster, ValidationErrors> {
    let mut errors = ValidationErrors::new("kubernetesCluster");
    if raw.name.is_empty() {
        errors = errors.require("name");
    }
    if raw.location.is_empty() {
        errors = errors.require("location");
    }
    if errors.is_present() {
        return Err(errors);
    }
    Ok(KubernetesCluster {
        name: raw.name.clone(),
        location: raw.location.clone(),
    })
}

/// Value of a required config key, recording an error when it is missing.
fn required_key(
    config: &BTreeMap<String, String>,
    key: &str,
    errors: &mut ValidationErrors,
) -> String {
    match config.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            *errors = std::mem::take(errors).require(key);
            String::new()
        }
    }
}

fn validate_cloud_provider(raw: &RawCloudProvider) -> Result<CloudProvider, ValidationErrors> {
    let mut errors = ValidationErrors::new("cloudProvider");

    let provider_type = if raw.provider_type.is_empty() {
        errors = errors.require("type");
        None
    } else {
        let parsed = CloudProviderType::parse(&raw.provider_type);
        if parsed.is_none() {
            errors = errors.put(
                "type",
                unknown_type("cloud provider", &raw.provider_type, CloudProviderType::ALL),
            );
        }
        parsed
    };

    let Some(config) = &raw.config else {
        return Err(errors.require("config"));
    };

    let provider = provider_type.map(|provider_type| match provider_type {
        CloudProviderType::Gcp => {
            let mut config_errors = ValidationErrors::new("config");
            let provider = CloudProvider::Gcp {
                project: required_key(config, "project", &mut config_errors),
                service_account: required_key(config, "serviceAccount", &mut config_errors),
                workload_identity_provider: required_key(
                    config,
                    "workloadIdentityProvider",
                    &mut config_errors,
                ),
            };
            errors = std::mem::take(&mut errors).put_child(config_errors);
            provider
        }
    });

    match provider {
        Some(provider) if !errors.is_present() => Ok(provider),
        _ => Err(errors),
    }
}

fn validate_secret_providers(
    raw: &[RawSecretProvider],
) -> Result<SecretProviderRegistry, ValidationErrors> {
    let mut errors = ValidationErrors::new("secretProviders");
    let mut seen = HashSet::new();
    let mut providers = Vec::new();

    for (i, provider) in raw.iter().enumerate() {
        if !provider.id.is_empty() && !seen.insert(provider.id.as_str()) {
            errors = errors.put(provider.id.clone(), "duplicate secret provider id");
            continue;
        }
        if let Some(provider) = collect(validate_secret_provider(i, provider), &mut errors) {
            providers.push(provider);
        }
    }

    if errors.is_present() {
        return Err(errors);
    }
    Ok(SecretProviderRegistry::new(providers))
}

fn validate_secret_provider(
    index: usize,
    raw: &RawSecretProvider,
) -> Result<SecretProvider, ValidationErrors> {
    let mut errors = ValidationErrors::new(unit_key(index, &raw.id));
    if raw.id.is_empty() {
        errors = errors.require("id");
    }

    let provider = if raw.provider_type.is_empty() {
        errors = errors.require("type");
        None
    } else {
        match SecretProviderType::parse(&raw.provider_type) {
            Some(SecretProviderType::Gcp) => {
                let mut config_errors = ValidationErrors::new("config");
                let project = required_key(&raw.config, "project", &mut config_errors);
                errors = errors.put_child(config_errors);
                Some(SecretProvider::gcp(raw.id.clone(), project))
            }
            Some(SecretProviderType::GithubActions) => {
                Some(SecretProvider::github_actions(raw.id.clone()))
            }
            None => {
                errors = errors.put(
                    "type",
                    unknown_type("secret provider", &raw.provider_type, SecretProviderType::ALL),
                );
                None
            }
        }
    };

    match provider {
        Some(provider) if !errors.is_present() => Ok(match &raw.secret_names {
            Some(names) => provider.allowing(names.iter().cloned()),
            None => provider,
        }),
        _ => Err(errors),
    }
}

fn validate_artifact(index: usize, raw: &RawArtifact) -> Result<ArtifactSpec, ValidationErrors> {
    let mut errors = ValidationErrors::new(unit_key(index, &raw.id));
    if raw.id.is_empty() {
        errors = errors.require("id");
    }
    if raw.path.is_empty() {
        errors = errors.require("path");
    }

    let kind = match raw.artifact_type.as_deref() {
        None => Some(ArtifactKind::default()),
        Some(value) => {
            let parsed = ArtifactKind::parse(value);
            if parsed.is_none() {
                errors = errors.put("type", unknown_type("artifact", value, ArtifactKind::ALL));
            }
            parsed
        }
    };

    match kind {
        Some(kind) if !errors.is_present() => Ok(ArtifactSpec {
            id: raw.id.clone(),
            path: raw.path.clone(),
            kind,
            dependencies: raw.dependencies.clone(),
        }),
        _ => Err(errors),
    }
}

fn validate_application(
    index: usize,
    raw: &RawApplication,
    artifact_ids: &HashSet<&str>,
) -> Result<ApplicationSpec, ValidationErrors> {
    let mut errors = ValidationErrors::new(unit_key(index, &raw.id));
    if raw.id.is_empty() {
        errors = errors.require("id");
    }
    if raw.path.is_empty() {
        errors = errors.require("path");
    }

    let kind = if raw.application_type.is_empty() {
        errors = errors.require("type");
        None
    } else {
        let parsed = ApplicationKind::parse(&raw.application_type);
        if parsed.is_none() {
            errors = errors.put(
                "type",
                unknown_type("application", &raw.application_type, ApplicationKind::ALL),
            );
        }
        parsed
    };

    if kind == Some(ApplicationKind::Helm) && raw.namespace.is_empty() {
        errors = errors.require("namespace");
    }

    for artifact in &raw.artifacts {
        if !artifact_ids.contains(artifact.as_str()) {
            errors = errors.put("artifacts", format!("unknown artifact '{}'", artifact));
        }
    }

    let mut value_errors = ValidationErrors::new("values");
    for (i, value) in raw.values.iter().enumerate() {
        if value.key.is_empty() {
            value_errors = value_errors.require(format!("[{}].key", i));
        }
    }
    errors = errors.put_child(value_errors);

    let mut secret_errors = ValidationErrors::new("secrets");
    for (i, secret) in raw.secrets.iter().enumerate() {
        let key = unit_key(i, &secret.key);
        if secret.key.is_empty() {
            secret_errors = secret_errors.require(format!("{}.key", key));
        }
        if secret.secret_name.is_empty() {
            secret_errors = secret_errors.require(format!("{}.secretName", key));
        }
        if secret.provider.is_empty() {
            secret_errors = secret_errors.require(format!("{}.provider", key));
        }
    }
    errors = errors.put_child(secret_errors);
    errors = errors.put_child(validate_env_keys(raw));

    match kind {
        Some(kind) if !errors.is_present() => Ok(ApplicationSpec {
            id: raw.id.clone(),
            path: raw.path.clone(),
            kind,
            namespace: raw.namespace.clone(),
            artifacts: raw.artifacts.clone(),
            dependencies: raw.dependencies.clone(),
            values: raw
                .values
                .iter()
                .map(|v| RuntimeArg::new(v.key.clone(), v.value.clone()))
                .collect(),
            secrets: raw
                .secrets
                .iter()
                .map(|s| SecretBinding::new(s.key.clone(), s.provider.clone(), s.secret_name.clone()))
                .collect(),
        }),
        _ => Err(errors),
    }
}

/// Runtime keys of one application must map to distinct environment
/// variables, otherwise one value would silently shadow another.
fn validate_env_keys(raw: &RawApplication) -> ValidationErrors {
    let mut errors = ValidationErrors::new("runtimeKeys");
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    let keys = raw
        .values
        .iter()
        .map(|v| v.key.as_str())
        .chain(raw.secrets.iter().map(|s| s.key.as_str()))
        .filter(|key| !key.is_empty());
    for key in keys {
        let env = env_key(key);
        match seen.get(env.as_str()) {
            Some(first) => {
                errors = errors.put(
                    key,
                    format!("reads the same environment variable ${} as '{}'", env, first),
                );
            }
            None => {
                seen.insert(env, key);
            }
        }
    }
    errors
}

fn build_graph(artifacts: &[ArtifactSpec], applications: &[ApplicationSpec]) -> DependencyGraph {
    let graph = artifacts.iter().fold(DependencyGraph::new(), |graph, a| {
        graph.add(DependencyNode::artifact(&a.id, &a.path).depends_on(a.dependencies.iter().cloned()))
    });
    applications.iter().fold(graph, |graph, a| {
        graph.add(DependencyNode::application(&a.id, &a.path).depends_on(a.upstreams().cloned()))
    })
}
