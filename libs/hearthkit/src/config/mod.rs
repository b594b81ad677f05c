//! Configuration loading: read bytes, expand environment references, parse
//! the document, then validate it against a live [`Registry`](crate::registry::Registry).

mod expand;
mod model;

use std::path::Path;

use thiserror::Error;

pub use expand::ExpansionError;
pub use model::{AgentConfig, Config, PluginConfig, PluginSecurityConfig, RoutingConfig, SecurityConfig};

use crate::registry::{ModuleDescriptor, Registry};

#[derive(Debug, Error)]
pub enum ConfigPipelineError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
    #[error("failed to parse config document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Validation(#[from] ConfigValidationError),
}

#[derive(Debug, Error)]
#[error("config validation failed:\n{}", .violations.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n"))]
pub struct ConfigValidationError {
    pub violations: Vec<String>,
}

pub struct ConfigPipeline;

impl ConfigPipeline {
    /// Loads, expands and parses a config document from disk, without
    /// validating it against a registry.
    pub fn load(path: &Path) -> Result<Config, ConfigPipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigPipelineError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_str(&raw)
    }

    /// Same as [`Self::load`] but takes the document text directly - useful
    /// for tests and for documents assembled in memory.
    pub fn load_str(raw: &str) -> Result<Config, ConfigPipelineError> {
        let expanded = expand::expand(raw)?;
        let config: Config = serde_yaml::from_str(&expanded)?;
        Ok(config)
    }

    /// Loads and validates a document against the modules actually
    /// registered, returning the resolved load order on success.
    pub fn load_and_resolve(path: &Path, registry: &Registry) -> Result<(Config, Vec<String>), ConfigPipelineError> {
        let config = Self::load(path)?;
        Self::validate_against(&config, registry)?;
        let order = config.resolve();
        Ok((config, order))
    }

    pub fn validate_against(config: &Config, registry: &Registry) -> Result<(), ConfigValidationError> {
        let known_ids: Vec<String> = registry.all().into_iter().map(|d| d.id.clone()).collect();
        let violations = config.validate(&known_ids);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigValidationError { violations })
        }
    }
}
