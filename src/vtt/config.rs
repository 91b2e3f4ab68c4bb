//! Engine configuration, posted once by the host at boot.
//!
//! Every field has a default so a partial (or empty) JSON object is valid.

use serde::{Deserialize, Serialize};

use crate::vtt::error::VttError;
use crate::vtt::map::DEFAULT_MAP_BYTE_BUDGET;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Game distance covered by one grid cell (5 ft in most tabletop systems).
    pub units_per_cell: f64,
    /// Suffix for measurement labels.
    pub unit_label: String,
    /// Zoom change per wheel notch.
    pub zoom_step: f64,
    /// Default token layout wraps to a new row after this many tokens.
    pub tokens_per_row: usize,
    /// Largest accepted map image, in decoded bytes.
    pub map_byte_budget: usize,
    /// Player-facing view: hidden and fogged tokens are not drawn.
    pub player_view: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            units_per_cell: 5.0,
            unit_label: "ft".to_string(),
            zoom_step: 0.1,
            tokens_per_row: 8,
            map_byte_budget: DEFAULT_MAP_BYTE_BUDGET,
            player_view: false,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a config object sent by the host.
    pub fn from_json(json: &str) -> Result<Self, VttError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| VttError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VttError> {
        if !(self.units_per_cell.is_finite() && self.units_per_cell > 0.0) {
            return Err(VttError::InvalidConfig(format!(
                "unitsPerCell must be positive, got {}",
                self.units_per_cell
            )));
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            return Err(VttError::InvalidConfig(format!(
                "zoomStep must be positive, got {}",
                self.zoom_step
            )));
        }
        if self.tokens_per_row == 0 {
            return Err(VttError::InvalidConfig(
                "tokensPerRow must be at least 1".to_string(),
            ));
        }
        if self.map_byte_budget == 0 {
            return Err(VttError::InvalidConfig(
                "mapByteBudget must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.units_per_cell, 5.0);
        assert_eq!(config.map_byte_budget, 4 * 1024 * 1024);
    }

    #[test]
    fn partial_object_overrides_fields() {
        let config = EngineConfig::from_json(r#"{"unitsPerCell":10,"playerView":true}"#).unwrap();
        assert_eq!(config.units_per_cell, 10.0);
        assert!(config.player_view);
        assert_eq!(config.tokens_per_row, 8);
    }

    #[test]
    fn rejects_non_positive_step() {
        let result = EngineConfig::from_json(r#"{"zoomStep":0}"#);
        assert!(matches!(result, Err(VttError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_tokens_per_row() {
        assert!(EngineConfig::from_json(r#"{"tokensPerRow":0}"#).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(EngineConfig::from_json("not json").is_err());
    }
}
