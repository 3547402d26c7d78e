//! Pipeline configuration loading.

pub mod yaml;

pub use yaml::{ConfigError, PipelineConfig, RetryConfig, TaskConfig, YamlLoader};
