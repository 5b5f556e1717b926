//! Offline chess game analysis and training.
//!
//! The crate ingests games (PGN text/files or the Chess.com archive API),
//! analyses every move against a UCI engine, derives accuracy, performance
//! Elo and per-game analytics, extracts practice positions from mistakes and
//! schedules them for spaced-repetition training.

pub mod analysis;
pub mod db;
pub mod engine;
pub mod error;
pub mod import;
pub mod opening;
pub mod practice;
pub mod settings;

use std::fs;
use std::path::{Path, PathBuf};

pub use error::Error;

use db::Database;
use settings::Settings;

/// Composition root: the handles every pipeline stage needs, constructed
/// once at startup and passed down explicitly.
pub struct Services {
    pub settings: Settings,
    pub db: Database,
    pub data_dir: PathBuf,
}

impl Services {
    /// Initialize the data directory, settings and database.
    pub fn init(data_dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(data_dir)?;
        let settings = Settings::load(&Settings::default_path(data_dir))?;
        let db = Database::open_default(data_dir)?;
        Ok(Self {
            settings,
            db,
            data_dir: data_dir.to_path_buf(),
        })
    }
}
