//! TOML-based scenario configuration and scale presets.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the `small` preset. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or build one with the named-preset
/// constructors ([`ScenarioConfig::small`], [`ScenarioConfig::medium`],
/// [`ScenarioConfig::large`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Park dimensions and charging station layout.
    #[serde(default)]
    pub park: ParkConfig,
    /// Fleet scale: a named preset or a `[scale.custom]` override.
    #[serde(default)]
    pub scale: ScaleConfig,
    /// Dispatch policy name (§4.5/§4.8).
    #[serde(default = "default_policy")]
    pub policy: String,
    /// Simulation horizon, in minutes.
    #[serde(default = "default_horizon")]
    pub horizon_minutes: u32,
    /// Master RNG seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Emits a line to stderr for every arrival, assignment, completion,
    /// failure, and battery swap as the kernel runs.
    #[serde(default)]
    pub verbose: bool,
}

fn default_policy() -> String {
    "nearest_first".to_string()
}

fn default_horizon() -> u32 {
    300 * 60
}

fn default_seed() -> u64 {
    42
}

/// Park dimensions and charging station layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParkConfig {
    /// Park width, in distance units.
    pub width: f64,
    /// Park height, in distance units.
    pub height: f64,
    /// Explicit station coordinates. When empty, the canonical five-point
    /// layout (§6) is scaled to `(width, height)`.
    pub stations: Vec<(f64, f64)>,
}

impl Default for ParkConfig {
    fn default() -> Self {
        Self { width: 1000.0, height: 1000.0, stations: Vec::new() }
    }
}

impl ParkConfig {
    /// Materializes the park geometry, applying the default station layout
    /// when none was given explicitly.
    pub fn to_park(&self) -> crate::geo::Park {
        if self.stations.is_empty() {
            crate::geo::Park::with_default_stations(self.width, self.height)
        } else {
            crate::geo::Park {
                width: self.width,
                height: self.height,
                stations: self.stations.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            }
        }
    }
}

/// The fleet-scale parameters a scenario resolves to: robot and battery
/// fleet sizes plus the arrival generator's base rate.
#[derive(Debug, Clone, Copy)]
pub struct ScaleParams {
    pub robots_count: usize,
    pub batteries_count: usize,
    pub vehicles_per_hour: f64,
}

/// Named scale presets (§6).
pub const SMALL: ScaleParams = ScaleParams { robots_count: 8, batteries_count: 20, vehicles_per_hour: 10.0 };
pub const MEDIUM: ScaleParams = ScaleParams { robots_count: 25, batteries_count: 50, vehicles_per_hour: 30.0 };
pub const LARGE: ScaleParams = ScaleParams { robots_count: 60, batteries_count: 120, vehicles_per_hour: 60.0 };

/// Fleet-scale selector: a named preset (`"small"`, `"medium"`, `"large"`) or
/// `"custom"` paired with an explicit `[scale.custom]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleConfig {
    pub preset: String,
    pub custom: Option<CustomScale>,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { preset: "small".to_string(), custom: None }
    }
}

/// An explicit fleet-scale override, used when `scale.preset = "custom"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomScale {
    pub robots_count: usize,
    pub batteries_count: usize,
    pub vehicles_per_hour: f64,
}

impl ScaleConfig {
    /// Resolves this selector to concrete fleet-scale parameters.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `preset` names neither a known preset nor
    /// `"custom"`, or if `"custom"` is chosen without a `[scale.custom]` table.
    pub fn resolve(&self) -> Result<ScaleParams, ConfigError> {
        match self.preset.as_str() {
            "small" => Ok(SMALL),
            "medium" => Ok(MEDIUM),
            "large" => Ok(LARGE),
            "custom" => self.custom.as_ref().map(|c| ScaleParams {
                robots_count: c.robots_count,
                batteries_count: c.batteries_count,
                vehicles_per_hour: c.vehicles_per_hour,
            }).ok_or_else(|| ConfigError {
                field: "scale.custom".into(),
                message: "preset \"custom\" requires a [scale.custom] table".into(),
            }),
            other => Err(ConfigError {
                field: "scale.preset".into(),
                message: format!("must be \"small\", \"medium\", \"large\", or \"custom\", got \"{other}\""),
            }),
        }
    }
}

/// Dispatch policy names §6 accepts.
pub const POLICIES: &[&str] = &[
    "nearest_first",
    "max_charge_need_first",
    "earliest_deadline_first",
    "most_urgent_first",
    "hybrid_strategy",
    "rl",
];

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"scale.preset"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl ScenarioConfig {
    fn with_scale_preset(preset: &str) -> Self {
        Self {
            park: ParkConfig::default(),
            scale: ScaleConfig { preset: preset.to_string(), custom: None },
            policy: default_policy(),
            horizon_minutes: default_horizon(),
            seed: default_seed(),
            verbose: false,
        }
    }

    /// The `small` preset: 8 robots, 20 batteries, 10 vehicles/hour.
    pub fn small() -> Self {
        Self::with_scale_preset("small")
    }

    /// The `medium` preset: 25 robots, 50 batteries, 30 vehicles/hour.
    pub fn medium() -> Self {
        Self::with_scale_preset("medium")
    }

    /// The `large` preset: 60 robots, 120 batteries, 60 vehicles/hour.
    pub fn large() -> Self {
        Self::with_scale_preset("large")
    }

    /// Available named scale presets.
    pub const PRESETS: &[&str] = &["small", "medium", "large"];

    /// Loads a scenario from a named scale preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "small" => Ok(Self::small()),
            "medium" => Ok(Self::medium()),
            "large" => Ok(Self::large()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!("unknown preset \"{name}\", available: {}", Self::PRESETS.join(", ")),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError { field: "scenario".to_string(), message: format!("cannot read \"{}\": {e}", path.display()) })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError { field: "toml".to_string(), message: e.to_string() })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.park.width <= 0.0 {
            errors.push(ConfigError { field: "park.width".into(), message: "must be > 0".into() });
        }
        if self.park.height <= 0.0 {
            errors.push(ConfigError { field: "park.height".into(), message: "must be > 0".into() });
        }
        for &(x, y) in &self.park.stations {
            if x < 0.0 || x > self.park.width || y < 0.0 || y > self.park.height {
                errors.push(ConfigError {
                    field: "park.stations".into(),
                    message: format!("station ({x}, {y}) lies outside the park"),
                });
                break;
            }
        }

        if let Err(e) = self.scale.resolve() {
            errors.push(e);
        }

        if !POLICIES.contains(&self.policy.as_str()) {
            errors.push(ConfigError {
                field: "policy".into(),
                message: format!("must be one of {:?}, got \"{}\"", POLICIES, self.policy),
            });
        }

        if self.horizon_minutes == 0 {
            errors.push(ConfigError { field: "horizon_minutes".into(), message: "must be > 0".into() });
        }

        errors
    }
}
