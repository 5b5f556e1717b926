//! Persistent application settings.
//!
//! Stored as a TOML file under the data directory. Every field has a default
//! so a missing or partial file never blocks startup.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub analysis: AnalysisSettings,
    pub practice: PracticeSettings,
    pub appearance: AppearanceSettings,
    pub general: GeneralSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Explicit engine binary path; overrides auto-discovery.
    pub path: Option<PathBuf>,
    pub threads: u32,
    pub hash_mb: u32,
    pub depth: u32,
    /// Seconds per evaluation. Takes precedence over depth when set.
    pub time_per_move: Option<f64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            path: None,
            threads: 1,
            hash_mb: 128,
            depth: 20,
            time_per_move: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub auto_analyze: bool,
    /// Plies from the start treated as reference theory.
    pub book_plies: usize,
    pub threshold_excellent: i32,
    pub threshold_good: i32,
    pub threshold_inaccuracy: i32,
    pub threshold_mistake: i32,
    pub add_to_practice: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            auto_analyze: true,
            book_plies: 12,
            threshold_excellent: 15,
            threshold_good: 50,
            threshold_inaccuracy: 100,
            threshold_mistake: 200,
            add_to_practice: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSettings {
    /// Plies before the mistake at which a practice position starts.
    pub offset_plies: usize,
    pub target_line_plies: usize,
    pub include_inaccuracies: bool,
    pub difficulty: Difficulty,
    pub spaced_repetition: bool,
    pub session_length: usize,
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            offset_plies: 2,
            target_line_plies: 1,
            include_inaccuracies: false,
            difficulty: Difficulty::Lenient,
            spaced_repetition: true,
            session_length: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceSettings {
    pub theme: String,
    pub board_light: String,
    pub board_dark: String,
    pub show_coordinates: bool,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            board_light: "#f0d9b5".to_string(),
            board_dark: "#b58863".to_string(),
            show_coordinates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub username: String,
    pub auto_dedupe: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            username: "You".to_string(),
            auto_dedupe: true,
        }
    }
}

impl Settings {
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("settings.toml")
    }

    /// Load settings from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let settings = toml::from_str(&text)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        info!("Settings saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.engine.depth, 20);
        assert_eq!(settings.analysis.book_plies, 12);
        assert_eq!(settings.analysis.threshold_excellent, 15);
        assert_eq!(settings.analysis.threshold_mistake, 200);
        assert_eq!(settings.practice.offset_plies, 2);
        assert_eq!(settings.practice.session_length, 10);
        assert_eq!(settings.practice.difficulty, Difficulty::Lenient);
        assert!(settings.general.auto_dedupe);
    }

    #[test]
    fn roundtrips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.engine.threads = 4;
        settings.practice.include_inaccuracies = true;
        settings.general.username = "magnus".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.engine.threads, 4);
        assert!(loaded.practice.include_inaccuracies);
        assert_eq!(loaded.general.username, "magnus");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.engine.hash_mb, 128);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[engine]\nthreads = 8\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.engine.threads, 8);
        assert_eq!(settings.engine.hash_mb, 128);
        assert_eq!(settings.practice.session_length, 10);
    }
}
