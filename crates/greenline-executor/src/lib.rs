//! Process execution backends for greenline side effects.
//!
//! - [`ShellRunner`] spawns real processes with tokio
//! - [`DryRunRunner`] prints commands instead of running them

pub mod dry_run;
pub mod shell;

pub use dry_run::DryRunRunner;
pub use greenline_core::command::{Command, CommandRunner, SideEffects};
pub use shell::{ShellRunner, expand_env};
