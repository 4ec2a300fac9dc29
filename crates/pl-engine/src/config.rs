//! Static engine configuration.

use std::path::Path;

use pl_optimizer::OptimizerSettings;
use pl_types::{AnalysisWindows, PlError, PlResult, Resolution, RiskThresholds};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "PORTLENS_CONFIG";

/// Everything the engine reads besides its collaborators. Missing fields in
/// a JSON document fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: RiskThresholds,
    pub windows: AnalysisWindows,
    pub optimizer: OptimizerSettings,
    /// Bar resolution of the supplied history; sets annualization.
    pub resolution: Resolution,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> PlResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PlResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Config from the file named by `PORTLENS_CONFIG`, or defaults when the
    /// variable is unset.
    pub fn from_env() -> PlResult<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> PlResult<()> {
        self.thresholds.validate()?;
        self.windows.validate()?;
        self.optimizer.validate()?;
        if (self.optimizer.periods_per_year - self.resolution.periods_per_year()).abs() > f64::EPSILON {
            return Err(PlError::Config(format!(
                "optimizer.periods_per_year {} does not match {} bars ({} per year)",
                self.optimizer.periods_per_year,
                self.resolution,
                self.resolution.periods_per_year()
            )));
        }
        Ok(())
    }
}
