//! Analysis configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use splitcheck_tests::{SignificanceConfig, SimulationConfig};

use crate::error::{AnalysisError, Result};
use crate::integrity::DuplicatePolicy;
use crate::loader::LoaderConfig;

/// Everything that parameterizes one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub loader: LoaderConfig,
    pub duplicate_policy: DuplicatePolicy,
    /// Fail when filtered rows still have a page that contradicts their
    /// condition. When false those rows are dropped with a warning.
    pub strict_alignment: bool,
    pub significance: SignificanceConfig,
    pub confound_check: bool,
    /// Run the null simulation when set.
    pub simulation: Option<SimulationConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            duplicate_policy: DuplicatePolicy::DropAll,
            strict_alignment: true,
            significance: SignificanceConfig::default(),
            confound_check: false,
            simulation: None,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        self.loader.validate()?;
        self.significance
            .validate()
            .map_err(|e| AnalysisError::Config(e.to_string()))?;
        if let Some(sim) = &self.simulation {
            if sim.iterations == 0 {
                return Err(AnalysisError::Config(
                    "simulation.iterations must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Load and validate an [`AnalysisConfig`] from a JSON file. Missing keys take
/// their defaults.
pub fn load_config_from_path(path: &Path) -> Result<AnalysisConfig> {
    let raw = std::fs::read_to_string(path)?;
    let cfg: AnalysisConfig = serde_json::from_str(&raw).map_err(|e| {
        AnalysisError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    cfg.validate()?;
    Ok(cfg)
}
