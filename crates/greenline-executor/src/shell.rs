//! Local process execution.

use async_trait::async_trait;
use greenline_core::Result;
use greenline_core::command::{Command, CommandRunner, command_failed};
use regex::{Captures, Regex};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

// Regex for matching $NAME and ${NAME} environment references
static ENV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Replace every `$NAME` or `${NAME}` in `value` using `lookup`. Unset names
/// expand to the empty string.
pub fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_REGEX
        .replace_all(value, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            lookup(name).unwrap_or_else(|| {
                warn!(variable = %name, "Environment variable not set");
                String::new()
            })
        })
        .into_owned()
}

/// Runs commands as child processes.
///
/// Arguments are expanded against the environment just before spawning, so
/// the command as built and logged only ever holds `$NAME` placeholders.
#[derive(Clone)]
pub struct ShellRunner {
    env: EnvLookup,
    working_dir: Option<PathBuf>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    /// Expand from the process environment, run in the current directory.
    pub fn new() -> Self {
        Self {
            env: Arc::new(|name| std::env::var(name).ok()),
            working_dir: None,
        }
    }

    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Arc::new(lookup);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn process(&self, command: &Command) -> tokio::process::Command {
        let args = command
            .arguments
            .iter()
            .map(|arg| expand_env(arg, |name| (self.env)(name)));

        let mut process = tokio::process::Command::new(&command.program);
        process.args(args).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            process.current_dir(dir);
        }
        process
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &Command) -> Result<()> {
        debug!(program = %command.program, "Spawning");
        let status = self
            .process(command)
            .status()
            .await
            .map_err(|e| command_failed(command, e.to_string()))?;

        if !status.success() {
            return Err(command_failed(command, status.to_string()));
        }
        Ok(())
    }

    async fn output(&self, command: &Command) -> Result<String> {
        debug!(program = %command.program, "Capturing output");
        let output = self
            .process(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| command_failed(command, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => output.status.to_string(),
                stderr => format!("{}: {}", output.status, stderr),
            };
            return Err(command_failed(command, message));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenline_core::{Error, RuntimeArg};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "postgresql_auth_password" => Some("s3cret".to_string()),
            "GITHUB_SHA" => Some("abc123".to_string()),
            "ingress_class_name" => Some("nginx".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_env() {
        assert_eq!(
            expand_env("postgresql.auth.password=$postgresql_auth_password", lookup),
            "postgresql.auth.password=s3cret"
        );
        assert_eq!(expand_env("--current-sha=$GITHUB_SHA", lookup), "--current-sha=abc123");
        assert_eq!(expand_env("plain", lookup), "plain");
    }

    #[test]
    fn test_expand_braced() {
        assert_eq!(expand_env("${GITHUB_SHA}-green", lookup), "abc123-green");
        assert_eq!(expand_env("${{ secrets.x }}", lookup), "${{ secrets.x }}");
    }

    #[test]
    fn test_expand_helm_key_with_hyphen() {
        let arg = RuntimeArg::new("ingress.class-name", "nginx");
        let set = format!("{}=${}", arg.key, arg.env_key());
        assert_eq!(expand_env(&set, lookup), "ingress.class-name=nginx");
    }

    #[test]
    fn test_unset_variable_expands_empty() {
        assert_eq!(expand_env("key=$MISSING", lookup), "key=");
    }

    #[tokio::test]
    async fn test_output_trims_stdout() {
        let runner = ShellRunner::new();
        let out = runner
            .output(&Command::new("echo", ["  hello  "]))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_output_expands_arguments() {
        let runner = ShellRunner::new().with_env_lookup(lookup);
        let out = runner
            .output(&Command::new("echo", ["$GITHUB_SHA"]))
            .await
            .unwrap();
        assert_eq!(out, "abc123");
    }

    #[tokio::test]
    async fn test_run_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new().with_working_dir(dir.path());

        runner
            .run(&Command::new("touch", ["marker"]))
            .await
            .unwrap();

        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let runner = ShellRunner::new();
        let err = runner
            .run(&Command::new("sh", ["-c", "exit 3"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CommandFailed { ref command, .. } if command == "sh -c exit 3"));
    }

    #[tokio::test]
    async fn test_output_failure_includes_stderr() {
        let runner = ShellRunner::new();
        let err = runner
            .output(&Command::new("sh", ["-c", "echo boom >&2; exit 1"]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let runner = ShellRunner::new();
        let result = runner
            .run(&Command::new("greenline-no-such-binary", Vec::<String>::new()))
            .await;
        assert!(matches!(result, Err(Error::CommandFailed { .. })));
    }
}
