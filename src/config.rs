//! Presets and process-wide settings.
//!
//! Settings are read once at startup (TOML or JSON, picked by extension) and
//! treated as read-only afterwards. CLI flags are layered on top by `main`.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File looked up in the working directory by [`Settings::discover`].
pub const SETTINGS_FILE: &str = "mandelbench.toml";
pub const DEFAULT_LOG_FILE: &str = "mandelbrot.log";
pub const DEFAULT_SELECTION_EPSILON: f64 = 1e-6;

// ------------------------- Presets -------------------------

/// Names are matched case-insensitively in settings files, on the command
/// line and through [`FromStr`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Preset {
    Easy,
    Medium,
    Hard,
}

impl Default for Preset {
    fn default() -> Self {
        Preset::Medium
    }
}

/// Raster resolution and iteration bound named by a preset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresetConfig {
    pub width: u32,
    pub height: u32,
    pub max_iter: u32,
}

impl Preset {
    /// Canonical report order.
    pub const ALL: [Preset; 3] = [Preset::Easy, Preset::Medium, Preset::Hard];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Easy => "easy",
            Preset::Medium => "medium",
            Preset::Hard => "hard",
        }
    }

    pub fn config(&self) -> PresetConfig {
        match self {
            Preset::Easy => PresetConfig {
                width: 800,
                height: 600,
                max_iter: 100,
            },
            Preset::Medium => PresetConfig {
                width: 1200,
                height: 900,
                max_iter: 150,
            },
            Preset::Hard => PresetConfig {
                width: 2000,
                height: 1500,
                max_iter: 2000,
            },
        }
    }

    /// Position in the canonical order, `None` for names outside the table.
    pub fn rank_of(name: &str) -> Option<usize> {
        Preset::ALL.iter().position(|p| p.name() == name)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

impl TryFrom<String> for Preset {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ------------------------- Settings -------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub preset: Preset,
    pub log_file: PathBuf,
    /// Drag distance below which a selection counts as a click (reset).
    pub selection_epsilon: f64,
    /// Band worker count for the multi-process backend; `None` = cores - 1.
    pub workers: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            selection_epsilon: DEFAULT_SELECTION_EPSILON,
            workers: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
            "json" => Ok(serde_json::from_str(&data)?),
            "toml" => Ok(toml::from_str(&data)?),
            _ => match serde_json::from_str(&data) {
                Ok(settings) => Ok(settings),
                Err(_) => Ok(toml::from_str(&data)?),
            },
        }
    }

    /// Reads [`SETTINGS_FILE`] from the working directory if it exists.
    pub fn discover() -> Result<Self, ConfigError> {
        let path = Path::new(SETTINGS_FILE);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_table() {
        assert_eq!(
            Preset::Easy.config(),
            PresetConfig {
                width: 800,
                height: 600,
                max_iter: 100
            }
        );
        assert_eq!(Preset::Medium.config().max_iter, 150);
        assert_eq!(Preset::Hard.config().width, 2000);
        assert_eq!(Preset::Hard.config().height, 1500);
    }

    #[test]
    fn test_preset_parse_is_case_insensitive() {
        assert_eq!("HARD".parse::<Preset>().unwrap(), Preset::Hard);
        assert_eq!(" easy ".parse::<Preset>().unwrap(), Preset::Easy);
        assert!(matches!(
            "extreme".parse::<Preset>(),
            Err(ConfigError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_rank_follows_canonical_order() {
        assert_eq!(Preset::rank_of("easy"), Some(0));
        assert_eq!(Preset::rank_of("hard"), Some(2));
        assert_eq!(Preset::rank_of("custom"), None);
    }

    #[test]
    fn test_settings_from_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        fs::write(&path, "preset = \"easy\"\nworkers = 3\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.preset, Preset::Easy);
        assert_eq!(settings.workers, Some(3));
        assert_eq!(settings.log_file, PathBuf::from(DEFAULT_LOG_FILE));
        assert_eq!(settings.selection_epsilon, DEFAULT_SELECTION_EPSILON);
    }

    #[test]
    fn test_settings_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        fs::write(&path, r#"{"preset":"hard","log_file":"runs.log"}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.preset, Preset::Hard);
        assert_eq!(settings.log_file, PathBuf::from("runs.log"));
    }

    #[test]
    fn test_settings_rejects_unknown_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        fs::write(&path, "preset = \"extreme\"\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_settings_preset_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("bench.toml");
        fs::write(&toml_path, "preset = \"Easy\"\n").unwrap();
        assert_eq!(Settings::load(&toml_path).unwrap().preset, Preset::Easy);

        let json_path = dir.path().join("bench.json");
        fs::write(&json_path, r#"{"preset":"HARD"}"#).unwrap();
        assert_eq!(Settings::load(&json_path).unwrap().preset, Preset::Hard);
    }

    #[test]
    fn test_preset_serializes_lowercase() {
        let json = serde_json::to_string(&Preset::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        let back: Preset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Preset::Medium);
    }
}
