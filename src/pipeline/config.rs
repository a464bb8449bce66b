// Engine configuration
// All tunables of one comparison, loadable from JSON

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::audio::{AnalysisConfig, OnsetConfig, PitchConfig};
use crate::compare::{AlignConfig, ClassifierConfig};
use crate::error::AnalysisError;
use crate::events::{QuantizerConfig, ResolverConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] AnalysisError),
}

/// Settings for every stage; missing sections and fields take their defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub pitch: PitchConfig,
    pub onset: OnsetConfig,
    pub quantizer: QuantizerConfig,
    pub resolver: ResolverConfig,
    pub align: AlignConfig,
    pub classifier: ClassifierConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON config
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Self::from_json_bytes(&bytes)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.analysis.validate()?;
        self.pitch.validate()?;
        self.onset.validate()?;
        self.classifier.validate()?;

        if !(0.0..=1.0).contains(&self.quantizer.voicing_threshold) {
            return Err(AnalysisError::InvalidConfig(format!(
                "voicing_threshold {} is outside [0, 1]",
                self.quantizer.voicing_threshold
            )));
        }
        if self.resolver.lookahead_frames == 0 {
            return Err(AnalysisError::InvalidConfig(
                "lookahead_frames must be at least 1".to_string(),
            ));
        }

        let weights = [self.align.diagonal_weight, self.align.axis_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "alignment step weights must be finite and non-negative".to_string(),
            ));
        }

        Ok(())
    }
}
