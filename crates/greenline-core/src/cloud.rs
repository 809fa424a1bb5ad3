//! Cloud provider bindings and the resources they authenticate against.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::workflow::{Step, secret_ref};

/// Supported cloud provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum CloudProviderType {
    #[display("gcp")]
    Gcp,
}

impl CloudProviderType {
    pub const ALL: &'static [CloudProviderType] = &[CloudProviderType::Gcp];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.to_string() == value)
    }
}

/// A configured cloud provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudProvider {
    /// Google Cloud authenticated via workload identity federation.
    /// `service_account` and `workload_identity_provider` name CI secrets.
    Gcp {
        project: String,
        service_account: String,
        workload_identity_provider: String,
    },
}

impl CloudProvider {
    pub fn provider_type(&self) -> CloudProviderType {
        match self {
            CloudProvider::Gcp { .. } => CloudProviderType::Gcp,
        }
    }

    /// Project that owns the artifact repository.
    pub fn project(&self) -> &str {
        match self {
            CloudProvider::Gcp { project, .. } => project,
        }
    }

    /// Steps that authenticate the CI runner and install the provider SDK.
    pub fn setup_steps(&self) -> Vec<Step> {
        match self {
            CloudProvider::Gcp {
                service_account,
                workload_identity_provider,
                ..
            } => vec![
                Step::named("Authenticate to GCloud via Service Account")
                    .uses("google-github-actions/auth@v1")
                    .with_input(
                        "workload_identity_provider",
                        secret_ref(workload_identity_provider),
                    )
                    .with_input("service_account", secret_ref(service_account)),
                Step::named("Configure GCloud SDK").uses("google-github-actions/setup-gcloud@v1"),
            ],
        }
    }

    /// Step letting docker push to and pull from the registry at `host`.
    pub fn registry_login_step(&self, host: &str) -> Step {
        match self {
            CloudProvider::Gcp { .. } => Step::named("Configure Docker")
                .run(format!("gcloud --quiet auth configure-docker {}", host)),
        }
    }

    /// Step fetching credentials for `cluster`.
    pub fn cluster_credentials_step(&self, cluster: &KubernetesCluster) -> Step {
        match self {
            CloudProvider::Gcp { .. } => Step::named("Authenticate to GKE Cluster")
                .uses("google-github-actions/get-gke-credentials@v1")
                .with_input("cluster_name", cluster.name.clone())
                .with_input("location", cluster.location.clone()),
        }
    }
}

/// Container registry coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRepository {
    pub host: String,
    pub name: String,
}

impl ArtifactRepository {
    /// `<host>/<project>/<name>`, the prefix of every image name.
    pub fn url(&self, project: &str) -> String {
        format!("{}/{}/{}", self.host, project, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesCluster {
    pub name: String,
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcp() -> CloudProvider {
        CloudProvider::Gcp {
            project: "my-project".to_string(),
            service_account: "SERVICE_ACCOUNT".to_string(),
            workload_identity_provider: "WORKLOAD_IDENTITY_PROVIDER".to_string(),
        }
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(CloudProviderType::parse("gcp"), Some(CloudProviderType::Gcp));
        assert_eq!(CloudProviderType::parse("aws"), None);
    }

    #[test]
    fn test_auth_step_references_secrets() {
        let steps = gcp().setup_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].uses, "google-github-actions/auth@v1");
        assert_eq!(
            steps[0].with["service_account"],
            "${{ secrets.SERVICE_ACCOUNT }}"
        );
    }

    #[test]
    fn test_repository_url() {
        let repo = ArtifactRepository {
            host: "us-central1-docker.pkg.dev".to_string(),
            name: "repo-name".to_string(),
        };
        assert_eq!(
            repo.url(gcp().project()),
            "us-central1-docker.pkg.dev/my-project/repo-name"
        );
    }

    #[test]
    fn test_registry_login() {
        let step = gcp().registry_login_step("us-central1-docker.pkg.dev");
        assert_eq!(
            step.run,
            "gcloud --quiet auth configure-docker us-central1-docker.pkg.dev"
        );
    }
}
