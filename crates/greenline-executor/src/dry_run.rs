//! Dry-run execution: print side effects instead of running them.

use async_trait::async_trait;
use greenline_core::Result;
use greenline_core::command::{Command, CommandRunner};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Prints every command passed to [`CommandRunner::run`] and records it.
///
/// Read-only queries through [`CommandRunner::output`] (such as `git diff`
/// for change detection) still go to the wrapped runner.
pub struct DryRunRunner {
    inner: Arc<dyn CommandRunner>,
    printed: Mutex<Vec<Command>>,
}

impl DryRunRunner {
    pub fn new(inner: Arc<dyn CommandRunner>) -> Self {
        Self {
            inner,
            printed: Mutex::new(Vec::new()),
        }
    }

    /// Commands printed so far, in order.
    pub fn printed(&self) -> Vec<Command> {
        self.printed
            .lock()
            .map(|printed| printed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, command: &Command) -> Result<()> {
        info!(command = %command, "Dry run, not executing");
        println!("{}", command);
        if let Ok(mut printed) = self.printed.lock() {
            printed.push(command.clone());
        }
        Ok(())
    }

    async fn output(&self, command: &Command) -> Result<String> {
        self.inner.output(command).await
    }
}
