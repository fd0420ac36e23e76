//! Simulation configuration.
//!
//! Tunable parameters for AI cadence, navigation grid construction, projectile
//! resolution and faction hostility. Loaded from and saved to TOML.

use serde::{Deserialize, Serialize};
use skirmish_common::{FactionId, MonsterTypeId};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::nav::{DEFAULT_CELL_SIZE, DEFAULT_MAX_STEP_HEIGHT};

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// File contents are not valid configuration TOML
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Configuration could not be serialized
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// AI engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Minimum time between AI decision passes
    pub decision_interval_ms: u64,
    /// Delay between death and entity removal
    pub corpse_delay_ms: u64,
    /// Maximum age of a cached path
    pub repath_interval_ms: u64,
    /// Advance to the next waypoint within this many cell sizes
    pub waypoint_advance_factor: f32,
    /// Returning NPCs snap home inside this distance
    pub return_snap_distance: f32,
    /// Attacking NPCs resume the chase beyond this multiple of attack range
    pub attack_break_factor: f32,
    /// Fraction of missing health regenerated per decision while returning
    pub return_regen_fraction: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            decision_interval_ms: 500,
            corpse_delay_ms: 5000,
            repath_interval_ms: 3000,
            waypoint_advance_factor: 0.75,
            return_snap_distance: 3.0,
            attack_break_factor: 1.5,
            return_regen_fraction: 0.1,
        }
    }
}

impl AiConfig {
    /// Decision interval in seconds.
    #[must_use]
    pub fn decision_interval_secs(&self) -> f32 {
        self.decision_interval_ms as f32 / 1000.0
    }
}

/// Navigation grid construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Cell edge length
    pub cell_size: f32,
    /// Maximum walkable height difference between neighbours
    pub max_step_height: f32,
    /// Radius covered around the area centre
    pub build_radius: f32,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            max_step_height: DEFAULT_MAX_STEP_HEIGHT,
            build_radius: 64.0,
        }
    }
}

/// Projectile resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Ammo at or above this speed resolves instantly
    pub hitscan_speed_threshold: f32,
    /// Range used when the weapon has none
    pub default_weapon_range: f32,
    /// Damage used when the source has no weapon
    pub default_weapon_damage: i32,
    /// Splash floor when the ammo does not set one
    pub default_min_damage_fraction: f32,
    /// Hits at or above this fraction of collision height are headshots
    pub headshot_height_fraction: f32,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            hitscan_speed_threshold: 500.0,
            default_weapon_range: 500.0,
            default_weapon_damage: 100,
            default_min_damage_fraction: 0.25,
            headshot_height_fraction: 0.85,
        }
    }
}

/// Faction hostility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactionConfig {
    /// Factions whose NPCs run combat AI
    pub hostile: Vec<FactionId>,
    /// Monster type used when no hostile monster records exist
    pub fallback_monster_type: MonsterTypeId,
}

impl Default for FactionConfig {
    fn default() -> Self {
        Self {
            hostile: vec![FactionId::new(2), FactionId::new(3), FactionId::new(4)],
            fallback_monster_type: MonsterTypeId::new(356),
        }
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// AI engine
    pub ai: AiConfig,
    /// Navigation grid
    pub nav: NavConfig,
    /// Projectiles
    pub projectiles: ProjectileConfig,
    /// Factions
    pub factions: FactionConfig,
}

impl SimConfig {
    /// Load configuration from a file, falling back to defaults on any failure.
    #[must_use]
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to load config file: {e}");
                Self::default()
            },
        }
    }

    /// Load and validate configuration from a file.
    pub fn try_load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // AI
        self.ai.decision_interval_ms = self.ai.decision_interval_ms.clamp(50, 10_000);
        self.ai.repath_interval_ms = self.ai.repath_interval_ms.max(self.ai.decision_interval_ms);
        self.ai.waypoint_advance_factor = self.ai.waypoint_advance_factor.clamp(0.1, 2.0);
        self.ai.return_snap_distance = self.ai.return_snap_distance.clamp(0.1, 50.0);
        self.ai.attack_break_factor = self.ai.attack_break_factor.clamp(1.0, 10.0);
        self.ai.return_regen_fraction = self.ai.return_regen_fraction.clamp(0.0, 1.0);

        // Navigation
        self.nav.cell_size = self.nav.cell_size.clamp(0.25, 32.0);
        self.nav.max_step_height = self.nav.max_step_height.clamp(0.0, 100.0);
        self.nav.build_radius = self.nav.build_radius.clamp(self.nav.cell_size, 4096.0);

        // Projectiles
        self.projectiles.hitscan_speed_threshold = self.projectiles.hitscan_speed_threshold.max(1.0);
        self.projectiles.default_weapon_range = self.projectiles.default_weapon_range.max(1.0);
        self.projectiles.default_weapon_damage = self.projectiles.default_weapon_damage.max(0);
        self.projectiles.default_min_damage_fraction =
            self.projectiles.default_min_damage_fraction.clamp(0.0, 1.0);
        self.projectiles.headshot_height_fraction = self.projectiles.headshot_height_fraction.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.ai.decision_interval_ms, 500);
        assert_eq!(config.ai.corpse_delay_ms, 5000);
        assert_eq!(config.ai.repath_interval_ms, 3000);
        assert!((config.nav.cell_size - 2.0).abs() < f32::EPSILON);
        assert!((config.projectiles.hitscan_speed_threshold - 500.0).abs() < f32::EPSILON);
        assert_eq!(config.factions.fallback_monster_type, MonsterTypeId::new(356));
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimConfig::default();
        config.ai.decision_interval_ms = 1;
        config.nav.cell_size = -4.0;
        config.projectiles.default_min_damage_fraction = 3.0;

        config.validate();

        assert_eq!(config.ai.decision_interval_ms, 50);
        assert!((config.nav.cell_size - 0.25).abs() < 0.001);
        assert!((config.projectiles.default_min_damage_fraction - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("skirmish.toml");

        let mut config = SimConfig::default();
        config.ai.decision_interval_ms = 250;
        config.factions.hostile = vec![FactionId::new(9)];

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded.ai.decision_interval_ms, 250);
        assert_eq!(loaded.factions.hostile, vec![FactionId::new(9)]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "[nav]\ncell_size = 4.0\n").expect("write");

        let loaded = SimConfig::try_load_from(&config_path).expect("load");
        assert!((loaded.nav.cell_size - 4.0).abs() < f32::EPSILON);
        assert_eq!(loaded.ai, AiConfig::default());
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = SimConfig::load_from("/nonexistent/path/skirmish.toml");
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_malformed_file_reports_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("bad.toml");
        fs::write(&config_path, "ai = [not toml").expect("write");

        assert!(matches!(SimConfig::try_load_from(&config_path), Err(ConfigError::Parse(_))));
        assert_eq!(SimConfig::load_from(&config_path), SimConfig::default());
    }
}
