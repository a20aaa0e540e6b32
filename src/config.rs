// src/config.rs
use crate::classifier::Posture;
use crate::error::ConfigError;
use crate::sequence::SequencePolicy;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub total_rakaats: u32,
    pub policy: SequencePolicy,
    pub smoothing: SmoothingConfig,
    pub landmarks: LandmarkConfig,
    pub dwell: DwellConfig,
    /// Settle period between the last phase of the final rakaat and completion.
    pub final_unlock_delay_ms: u64,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    /// Landmarks at or below this visibility are treated as missing.
    pub min_visibility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    pub standing_ms: u64,
    pub bowing_ms: u64,
    pub sitting_ms: u64,
    pub prostration_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            total_rakaats: 2,
            policy: SequencePolicy::SimplifiedThreePhase,
            smoothing: SmoothingConfig::default(),
            landmarks: LandmarkConfig::default(),
            dwell: DwellConfig::default(),
            final_unlock_delay_ms: 25_000,
            output_dir: directories::UserDirs::new()
                .and_then(|dirs| dirs.document_dir().map(|p| p.join("RakaatTracker")))
                .unwrap_or_else(|| PathBuf::from("./output")),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { alpha: 0.3 }
    }
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self { min_visibility: 0.3 }
    }
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            standing_ms: 3000,
            bowing_ms: 1000,
            sitting_ms: 2000,
            prostration_ms: 2000,
        }
    }
}

impl DwellConfig {
    /// Minimum hold time for a phase. `Unknown` is never an expected posture.
    pub fn required_for(&self, posture: Posture) -> u64 {
        match posture {
            Posture::Standing => self.standing_ms,
            Posture::Bowing => self.bowing_ms,
            Posture::Sitting => self.sitting_ms,
            Posture::Prostration => self.prostration_ms,
            Posture::Unknown => u64::MAX,
        }
    }
}

impl TrackerConfig {
    pub fn with_total_rakaats(mut self, total_rakaats: u32) -> Self {
        self.total_rakaats = total_rakaats;
        self
    }

    pub fn with_policy(mut self, policy: SequencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_rakaats == 0 {
            return Err(ConfigError::ZeroRakaats);
        }
        let alpha = self.smoothing.alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        let visibility = self.landmarks.min_visibility;
        if !(0.0..1.0).contains(&visibility) {
            return Err(ConfigError::InvalidVisibility(visibility));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.dwell.required_for(Posture::Standing), 3000);
        assert_eq!(config.dwell.required_for(Posture::Bowing), 1000);
        assert_eq!(config.dwell.required_for(Posture::Sitting), 2000);
        assert_eq!(config.final_unlock_delay_ms, 25_000);
        assert!((config.smoothing.alpha - 0.3).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_rakaats() {
        let config = TrackerConfig::default().with_total_rakaats(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRakaats)));
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let mut config = TrackerConfig::default();
        config.smoothing.alpha = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlpha(_))));
        config.smoothing.alpha = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlpha(_))));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "total_rakaats": 4, "dwell": { "standing_ms": 1500 } }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.total_rakaats, 4);
        assert_eq!(config.dwell.standing_ms, 1500);
        assert_eq!(config.dwell.bowing_ms, 1000);
        assert_eq!(config.policy, SequencePolicy::SimplifiedThreePhase);
    }

    #[test]
    fn test_policy_from_json() {
        let json = r#"{ "policy": "full_seven_phase" }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.policy, SequencePolicy::FullSevenPhase);
    }
}
