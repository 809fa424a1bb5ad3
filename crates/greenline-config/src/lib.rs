//! YAML pipeline definitions for greenline.
//!
//! This crate handles:
//! - Decoding the pipeline definition (`pipeline.yaml`)
//! - Validating it into typed core values and a dependency graph

pub mod error;
pub mod pipeline;
pub mod raw;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{
    ApplicationSpec, ArtifactSpec, PipelineConfig, Resources, load, parse_pipeline,
};
