//! Secret providers and resolution of a unit's secret bindings.
//!
//! Every provider exposes the same two phases:
//! - setup steps that must run in the CI job before the secret is usable
//! - a runtime reference expression for each bound secret
//!
//! Batching providers (cloud secret stores) need exactly one fetch step per
//! unit covering all of its requested names; CI-native providers resolve
//! to a static reference and need no setup. Generated workflows fetch every
//! allowed name so their steps do not depend on which unit asks.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::validation::ValidationErrors;
use crate::workflow::{Step, env_key, secret_ref, step_output_ref};

/// Supported secret provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SecretProviderType {
    #[display("gcp")]
    Gcp,
    #[display("github-actions")]
    GithubActions,
}

impl SecretProviderType {
    pub const ALL: &'static [SecretProviderType] =
        &[SecretProviderType::Gcp, SecretProviderType::GithubActions];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.to_string() == value)
    }
}

/// Provider-specific settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretProviderKind {
    /// Google Secret Manager in `project`, fetched by a CI step.
    Gcp { project: String },
    /// Secrets stored natively in the CI system.
    GithubActions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretProvider {
    pub id: String,
    pub kind: SecretProviderKind,
    /// When set, only these secret names may be requested from the provider.
    pub allowed_secrets: Option<Vec<String>>,
}

impl SecretProvider {
    pub fn gcp(id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SecretProviderKind::Gcp {
                project: project.into(),
            },
            allowed_secrets: None,
        }
    }

    pub fn github_actions(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SecretProviderKind::GithubActions,
            allowed_secrets: None,
        }
    }

    /// Return a copy restricted to the given secret names.
    pub fn allowing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_secrets = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn provider_type(&self) -> SecretProviderType {
        match self.kind {
            SecretProviderKind::Gcp { .. } => SecretProviderType::Gcp,
            SecretProviderKind::GithubActions => SecretProviderType::GithubActions,
        }
    }

    pub fn allows(&self, secret_name: &str) -> bool {
        self.allowed_secrets
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == secret_name))
    }

    fn fetch_step_id(&self) -> String {
        format!("secrets-{}", self.id)
    }

    /// Reference expression for `secret_name` inside a CI job.
    pub fn reference(&self, secret_name: &str) -> String {
        match self.kind {
            SecretProviderKind::Gcp { .. } => step_output_ref(&self.fetch_step_id(), secret_name),
            SecretProviderKind::GithubActions => secret_ref(secret_name),
        }
    }

    /// The setup step fetching `secret_names`, if this provider needs one.
    pub fn setup_step(&self, secret_names: &[&str]) -> Option<Step> {
        if secret_names.is_empty() {
            return None;
        }
        match &self.kind {
            SecretProviderKind::Gcp { project } => {
                let secrets: Vec<String> = secret_names
                    .iter()
                    .map(|name| format!("{}:{}/{}", name, project, name))
                    .collect();
                Some(
                    Step::named(format!("Get Secrets from GCP Provider {}", self.id))
                        .with_id(self.fetch_step_id())
                        .uses("google-github-actions/get-secretmanager-secrets@v1")
                        .with_input("secrets", secrets.join("\n")),
                )
            }
            SecretProviderKind::GithubActions => None,
        }
    }
}

/// Links a unit-local runtime key to a named secret in a named provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBinding {
    pub runtime_key: String,
    pub provider_id: String,
    pub secret_name: String,
}

impl SecretBinding {
    pub fn new(
        runtime_key: impl Into<String>,
        provider_id: impl Into<String>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            runtime_key: runtime_key.into(),
            provider_id: provider_id.into(),
            secret_name: secret_name.into(),
        }
    }
}

/// A key/value pair handed to a build or deploy at run time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuntimeArg {
    pub key: String,
    pub value: String,
}

impl RuntimeArg {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Name of the environment variable carrying this value.
    pub fn env_key(&self) -> String {
        env_key(&self.key)
    }
}

/// All configured secret providers, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretProviderRegistry {
    providers: Vec<SecretProvider>,
}

impl SecretProviderRegistry {
    pub fn new(providers: Vec<SecretProvider>) -> Self {
        Self { providers }
    }

    pub fn get(&self, id: &str) -> Option<&SecretProvider> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn providers(&self) -> &[SecretProvider] {
        &self.providers
    }

    /// Check each binding names a configured provider that allows the secret.
    /// Errors are nested under `unit_id` > `secrets`, keyed by runtime key.
    pub fn validate(&self, unit_id: &str, bindings: &[SecretBinding]) -> ValidationErrors {
        let mut secrets = ValidationErrors::new("secrets");
        for binding in bindings {
            match self.get(&binding.provider_id) {
                None => {
                    secrets = secrets.put(
                        binding.runtime_key.clone(),
                        format!("unknown secret provider '{}'", binding.provider_id),
                    );
                }
                Some(provider) if !provider.allows(&binding.secret_name) => {
                    secrets = secrets.put(
                        binding.runtime_key.clone(),
                        format!(
                            "secret '{}' not configured in secret provider '{}'",
                            binding.secret_name, binding.provider_id
                        ),
                    );
                }
                Some(_) => {}
            }
        }
        ValidationErrors::new(unit_id).put_child(secrets)
    }

    /// Reference expressions for every resolvable binding, sorted by key.
    pub fn resolve_runtime_args(&self, bindings: &[SecretBinding]) -> Vec<RuntimeArg> {
        let mut args: Vec<RuntimeArg> = bindings
            .iter()
            .filter_map(|binding| {
                self.get(&binding.provider_id).map(|provider| {
                    RuntimeArg::new(
                        binding.runtime_key.clone(),
                        provider.reference(&binding.secret_name),
                    )
                })
            })
            .collect();
        args.sort();
        args
    }

    /// At most one setup step per provider, batching every name requested
    /// from it. Providers with nothing requested contribute no step.
    pub fn resolve_setup_steps(&self, bindings: &[SecretBinding]) -> Vec<Step> {
        self.providers
            .iter()
            .filter_map(|provider| {
                let mut seen = BTreeSet::new();
                let names: Vec<&str> = bindings
                    .iter()
                    .filter(|b| b.provider_id == provider.id)
                    .map(|b| b.secret_name.as_str())
                    .filter(|name| seen.insert(*name))
                    .collect();
                provider.setup_step(&names)
            })
            .collect()
    }

    /// Setup steps for a generated job: every batching provider fetches its
    /// whole allow-list, whether or not this unit requests from it. Names
    /// requested beyond the allow-list (providers without one) are added.
    pub fn resolve_generation_steps(&self, bindings: &[SecretBinding]) -> Vec<Step> {
        self.providers
            .iter()
            .filter_map(|provider| {
                let mut seen = BTreeSet::new();
                let names: Vec<&str> = provider
                    .allowed_secrets
                    .iter()
                    .flatten()
                    .map(String::as_str)
                    .chain(
                        bindings
                            .iter()
                            .filter(|b| b.provider_id == provider.id)
                            .map(|b| b.secret_name.as_str()),
                    )
                    .filter(|name| seen.insert(*name))
                    .collect();
                provider.setup_step(&names)
            })
            .collect()
    }
}
