//! Pipeline definition as written on disk.
//!
//! Everything is optional or defaulted here; required fields and type names
//! are checked when converting to [`crate::PipelineConfig`], so every problem
//! in a file is reported at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPipeline {
    pub name: String,
    pub resources: RawResources,
    pub artifacts: Vec<RawArtifact>,
    pub applications: Vec<RawApplication>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawResources {
    pub artifact_repository: Option<RawArtifactRepository>,
    pub kubernetes_cluster: Option<RawKubernetesCluster>,
    pub cloud_provider: Option<RawCloudProvider>,
    pub secret_providers: Vec<RawSecretProvider>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawArtifactRepository {
    pub host: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawKubernetesCluster {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCloudProvider {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub config: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSecretProvider {
    pub id: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub config: BTreeMap<String, String>,
    pub secret_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawArtifact {
    pub id: String,
    pub path: String,
    #[serde(rename = "type")]
    pub artifact_type: Option<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawApplication {
    pub id: String,
    pub path: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub application_type: String,
    pub artifacts: Vec<String>,
    pub dependencies: Vec<String>,
    pub values: Vec<RawValue>,
    pub secrets: Vec<RawSecret>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSecret {
    pub key: String,
    pub secret_name: String,
    pub provider: String,
}
