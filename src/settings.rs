// src/settings.rs
// Persisted session settings: region mappings, strategy parameters, provider credentials

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::RegionMapping;
use crate::types::{Choice, Strategy, Window};

/// Display the regions were calibrated against. Used to re-find the same
/// monitor when the session starts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MonitorInfo {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

/// Bet-sizing knobs, updatable between sessions via `update_settings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub strategy: Strategy,
    pub base_bet: u64,
    pub max_bet: u64,
    /// Consecutive losses before ColorAlternating flips the choice.
    #[serde(default = "default_loss_threshold")]
    pub color_switch_threshold: u32,
    #[serde(default = "default_starting_color")]
    pub starting_color: Choice,
    #[serde(default = "default_starting_window")]
    pub starting_window: Window,
}

fn default_loss_threshold() -> u32 {
    2
}

fn default_starting_color() -> Choice {
    Choice::Red
}

fn default_starting_window() -> Window {
    Window::Left
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            strategy: Strategy::LossDouble,
            base_bet: 20,
            max_bet: 30_000,
            color_switch_threshold: default_loss_threshold(),
            starting_color: default_starting_color(),
            starting_window: default_starting_window(),
        }
    }
}

/// Which remote analyzer to use, if any. Absent config means local-only
/// recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// "openai" or "claude"
    pub provider: String,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub left_region: RegionMapping,
    pub right_region: RegionMapping,
    #[serde(default)]
    pub monitor: Option<MonitorInfo>,
    #[serde(default)]
    pub strategy_params: StrategyParams,
    #[serde(default)]
    pub remote_provider: Option<ProviderConfig>,
}

impl Settings {
    pub fn region_for(&self, window: Window) -> &RegionMapping {
        match window {
            Window::Left => &self.left_region,
            Window::Right => &self.right_region,
        }
    }

    /// Load settings from a JSON file written by the calibration UI.
    pub fn load(path: &Path) -> Result<Settings> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: Settings =
            serde_json::from_str(&json).context("failed to parse settings JSON")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create settings dir {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let params = &self.strategy_params;
        if params.base_bet == 0 {
            bail!("baseBet must be positive");
        }
        if params.max_bet < params.base_bet {
            bail!(
                "maxBet {} is below baseBet {}",
                params.max_bet,
                params.base_bet
            );
        }
        for (name, region) in [("left", &self.left_region), ("right", &self.right_region)] {
            if region.width <= 0.0 || region.height <= 0.0 {
                bail!("{name} region has a non-positive size");
            }
            if region.stake_buttons.is_empty() {
                bail!("{name} region has no stake buttons mapped");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RelPoint;

    fn test_region(x: f64) -> RegionMapping {
        RegionMapping {
            x,
            y: 0.1,
            width: 0.4,
            height: 0.8,
            stake_buttons: vec![
                RelPoint { x: 0.1, y: 0.9 },
                RelPoint { x: 0.2, y: 0.9 },
            ],
            red_button: RelPoint { x: 0.3, y: 0.8 },
            orange_button: RelPoint { x: 0.7, y: 0.8 },
            confirm_button: RelPoint { x: 0.5, y: 0.95 },
        }
    }

    fn test_settings() -> Settings {
        Settings {
            left_region: test_region(0.05),
            right_region: test_region(0.55),
            monitor: None,
            strategy_params: StrategyParams::default(),
            remote_provider: None,
        }
    }

    #[test]
    fn json_round_trip() {
        let settings = test_settings();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("strategyParams"), "wire format is camelCase");

        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.strategy_params.base_bet, 20);
        assert_eq!(back.strategy_params.strategy, Strategy::LossDouble);
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let json = r#"{
            "leftRegion": {"x":0.0,"y":0.0,"width":0.5,"height":1.0,
                "stakeButtons":[{"x":0.1,"y":0.9}],
                "redButton":{"x":0.3,"y":0.8},
                "orangeButton":{"x":0.7,"y":0.8},
                "confirmButton":{"x":0.5,"y":0.95}},
            "rightRegion": {"x":0.5,"y":0.0,"width":0.5,"height":1.0,
                "stakeButtons":[{"x":0.1,"y":0.9}],
                "redButton":{"x":0.3,"y":0.8},
                "orangeButton":{"x":0.7,"y":0.8},
                "confirmButton":{"x":0.5,"y":0.95}}
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(settings.remote_provider.is_none());
        assert_eq!(settings.strategy_params.color_switch_threshold, 2);
        assert_eq!(settings.strategy_params.starting_window, Window::Left);
    }

    #[test]
    fn validation_rejects_inverted_bet_bounds() {
        let mut settings = test_settings();
        settings.strategy_params.max_bet = 5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validation_rejects_unmapped_stake_buttons() {
        let mut settings = test_settings();
        settings.left_region.stake_buttons.clear();
        assert!(settings.validate().is_err());
    }
}
