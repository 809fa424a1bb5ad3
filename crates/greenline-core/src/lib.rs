//! Core domain types for the greenline build/deploy planner.
//!
//! This crate contains:
//! - The dependency graph between artifacts and applications
//! - Change detection against a previous commit
//! - Secret and cloud providers
//! - Build strategies and the side effects they produce
//! - CI workflow types for generation mode

pub mod application;
pub mod artifact;
pub mod build;
pub mod change;
pub mod cloud;
pub mod command;
pub mod error;
pub mod graph;
pub mod secret;
pub mod validation;
pub mod workflow;

pub use application::{Application, ApplicationKind};
pub use artifact::{Artifact, ArtifactKind};
pub use build::Build;
pub use change::{ChangeDetector, GitChangeDetector, StaticChangeDetector};
pub use cloud::{ArtifactRepository, CloudProvider, CloudProviderType, KubernetesCluster};
pub use command::{Command, CommandRunner, SideEffects};
pub use error::{Error, Result};
pub use graph::{DependencyGraph, DependencyNode, UnitKind};
pub use secret::{
    RuntimeArg, SecretBinding, SecretProvider, SecretProviderKind, SecretProviderRegistry,
    SecretProviderType,
};
pub use validation::ValidationErrors;
