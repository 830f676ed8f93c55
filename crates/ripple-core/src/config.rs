//! Configuration loading and typed config structures for a ripple run.
//!
//! The canonical configuration lives in `ripple-config.yaml`. This module
//! mirrors its `run`, `protocol` and `stop` sections; the engine binary reads
//! its own `network` section separately.

use std::path::Path;

use serde::Deserialize;

use crate::catalog::{self, CatalogParams, ProtocolName};
use crate::mechanisms::{
    ExpirationMechanism, PropagationMechanism, SelectionMechanism, SightMechanism,
    UpdateMechanism,
};
use crate::protocol::{Protocol, ProtocolError};
use crate::stop::StopCondition;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configured protocol is invalid.
    #[error("invalid protocol: {source}")]
    Protocol {
        /// The underlying protocol error.
        #[from]
        source: ProtocolError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Seed and run bounds.
    #[serde(default)]
    pub run: RunConfig,

    /// The protocol to run.
    pub protocol: ProtocolConfig,

    /// Extra conditions that end the run early.
    #[serde(default)]
    pub stop: Vec<StopCondition>,
}

impl SimulationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }
}

/// Seed and run bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Seed of every random draw in the run.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Maximum iterations (0 = unlimited).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,

    /// Maximum wall-clock seconds (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,

    /// Worker threads (0 = one per core).
    #[serde(default)]
    pub threads: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_iterations: default_max_iterations(),
            max_real_time_seconds: 0,
            threads: 0,
        }
    }
}

const fn default_seed() -> u64 {
    42
}

const fn default_max_iterations() -> u64 {
    1000
}

/// A protocol picked from the catalog or spelled out policy by policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolConfig {
    /// A catalog entry.
    Preconfigured {
        /// Catalog name.
        name: ProtocolName,
        /// Catalog knobs.
        #[serde(default)]
        params: CatalogParams,
    },
    /// Five explicit policies.
    Custom {
        /// Selection policy.
        selection: SelectionMechanism,
        /// Expiration policy.
        expiration: ExpirationMechanism,
        /// Update policy.
        update: UpdateMechanism,
        /// Propagation policy.
        propagation: PropagationMechanism,
        /// Sight policy.
        sight: SightMechanism,
    },
}

impl ProtocolConfig {
    /// Name used in logs and reports: the catalog name, or `custom`.
    pub fn label(&self) -> String {
        match self {
            Self::Preconfigured { name, .. } => name.to_string(),
            Self::Custom { .. } => String::from("custom"),
        }
    }

    /// Assemble and validate the protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if a policy parameter is invalid.
    pub fn build(&self) -> Result<Protocol, ProtocolError> {
        match self {
            Self::Preconfigured { name, params } => catalog::build(*name, params),
            Self::Custom {
                selection,
                expiration,
                update,
                propagation,
                sight,
            } => Protocol::new(
                selection.clone(),
                expiration.clone(),
                update.clone(),
                propagation.clone(),
                sight.clone(),
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ripple_types::Orientation;

    use super::*;
    use crate::mechanisms::Limit;
    use crate::mechanisms::selection::{OwnSelector, ReceivedSelector};

    #[test]
    fn parse_preconfigured_protocol() {
        let yaml = r"
run:
  seed: 7
protocol:
  type: preconfigured
  name: threshold-model
  params:
    threshold: 2
stop:
  - type: no_more_propagated
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.run.seed, 7);
        assert_eq!(config.run.max_iterations, 1000);
        assert_eq!(config.stop, vec![StopCondition::NoMorePropagated]);
        assert_eq!(config.protocol.label(), "threshold-model");
        let protocol = config.protocol.build().unwrap();
        assert_eq!(*protocol.expiration(), ExpirationMechanism::Never);
    }

    #[test]
    fn parse_custom_protocol() {
        let yaml = r"
protocol:
  type: custom
  selection:
    own: { type: count, limit: 1 }
    received: { type: count, limit: all }
  expiration: { type: all_not_propagated }
  update: { type: newest }
  propagation: { type: all_neighbors, orientation: out }
  sight: { type: count, num_sight: 3 }
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.run, RunConfig::default());
        assert_eq!(config.protocol.label(), "custom");
        let protocol = config.protocol.build().unwrap();
        assert_eq!(
            protocol.selection().own,
            OwnSelector::Count {
                limit: Limit::AtMost(1)
            }
        );
        assert_eq!(
            protocol.selection().received,
            ReceivedSelector::Count { limit: Limit::All }
        );
        assert_eq!(
            *protocol.propagation(),
            PropagationMechanism::AllNeighbors {
                orientation: Orientation::Out
            }
        );
    }

    #[test]
    fn negative_counts_are_rejected_at_load() {
        let yaml = r"
protocol:
  type: custom
  selection:
    own: { type: count, limit: -2 }
  expiration: { type: never }
  update: { type: older }
  propagation: { type: all_followers }
  sight: { type: all_sight }
";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn missing_catalog_parameter_fails_build() {
        let yaml = "protocol:\n  type: preconfigured\n  name: threshold-model\n";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert!(matches!(
            config.protocol.build(),
            Err(ProtocolError::MissingParameter { .. })
        ));
    }
}
