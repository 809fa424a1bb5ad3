//! CI job graph types, rendered to the GitHub Actions workflow dialect.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Branch whose pushes trigger the generated workflow.
pub const TRUNK_BRANCH: &str = "trunk";

/// A whole workflow document. Jobs are keyed by job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub on: BTreeMap<String, Trigger>,
    pub jobs: BTreeMap<String, Job>,
}

impl Workflow {
    /// A workflow triggered by pushes to the trunk branch.
    pub fn on_trunk_push(name: impl Into<String>, jobs: BTreeMap<String, Job>) -> Self {
        let mut on = BTreeMap::new();
        on.insert(
            "push".to_string(),
            Trigger {
                branches: vec![TRUNK_BRANCH.to_string()],
            },
        );
        Self {
            name: name.into(),
            on,
            jobs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub branches: Vec<String>,
}

/// One CI job: its steps and the jobs it waits for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(rename = "runs-on")]
    pub runs_on: String,
    pub permissions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    pub steps: Vec<Step>,
}

impl Job {
    /// A job on a hosted Ubuntu runner allowed to mint OIDC tokens.
    pub fn new(name: impl Into<String>, needs: Vec<String>, steps: Vec<Step>) -> Self {
        let permissions = [("contents", "read"), ("id-token", "write")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            name: name.into(),
            runs_on: "ubuntu-latest".to_string(),
            permissions,
            needs,
            steps,
        }
    }
}

/// One step of a job. Empty fields are omitted from the rendered document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uses: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run: String,
}

impl Step {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn uses(mut self, action: impl Into<String>) -> Self {
        self.uses = action.into();
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn run(mut self, script: impl Into<String>) -> Self {
        self.run = script.into();
        self
    }
}

/// Expression referencing a CI-native secret.
pub fn secret_ref(name: &str) -> String {
    format!("${{{{ secrets.{} }}}}", name)
}

/// Expression referencing the output of an earlier step in the same job.
pub fn step_output_ref(step_id: &str, output: &str) -> String {
    format!("${{{{ steps.{}.outputs.{} }}}}", step_id, output)
}

/// Environment variable name for a runtime key. Every character that is not
/// valid in a shell identifier becomes `_`, so `a.b-c` becomes `a_b_c`.
pub fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn checkout_step() -> Step {
    Step::named("Checkout Repo")
        .uses("actions/checkout@v4")
        .with_input("fetch-depth", 2)
}

pub fn setup_rust_step() -> Step {
    Step::named("Setup Rust").uses("dtolnay/rust-toolchain@stable")
}

/// Install a pinned release of the greenline CLI.
pub fn install_cli_step(version: &str) -> Step {
    Step::named("Install greenline").run(format!(
        "cargo install greenline-cli --locked --version {}",
        version
    ))
}

pub fn setup_helm_step() -> Step {
    Step::named("Setup Helm")
        .uses("azure/setup-helm@v3")
        .with_input("version", "v3.10.2")
}

pub fn setup_terraform_step() -> Step {
    Step::named("Setup Terraform")
        .uses("hashicorp/setup-terraform@v2")
        .with_input("terraform_version", "1.3.6")
}
