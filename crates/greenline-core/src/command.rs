//! External commands and the ordered side effects built from them.
//!
//! A build strategy never runs anything itself: it describes its work as
//! [`SideEffects`], which a [`CommandRunner`] applies strictly in order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

use crate::{Error, Result};

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub program: String,
    pub arguments: Vec<String>,
}

impl Command {
    pub fn new<I, S>(program: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }

    /// Return a copy with extra arguments appended.
    pub fn with_args<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.arguments {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// An ordered list of commands. Order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffects {
    pub commands: Vec<Command>,
}

impl SideEffects {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Return a copy with more commands appended.
    pub fn then(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Run every command in order, stopping at the first failure.
    pub async fn apply(&self, runner: &dyn CommandRunner) -> Result<()> {
        for command in &self.commands {
            info!(command = %command, "Running");
            if let Err(e) = runner.run(command).await {
                error!(command = %command, error = %e, "Command failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Process execution boundary.
///
/// `run` streams output to the console and fails on a non-zero exit;
/// `output` captures trimmed stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &Command) -> Result<()>;

    async fn output(&self, command: &Command) -> Result<String>;
}

/// Build the error returned when a command exits unsuccessfully.
pub fn command_failed(command: &Command, message: impl Into<String>) -> Error {
    Error::CommandFailed {
        command: command.to_string(),
        message: message.into(),
    }
}
