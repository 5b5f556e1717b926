//! Embedded SQLite persistence.
//!
//! The database file lives under `data/db/`; a legacy file at the data root
//! is migrated on first start when the new location is empty. Schema creation
//! is idempotent, and lightweight `ALTER TABLE` migrations add columns that
//! older files are missing.

pub mod models;
pub mod ops;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rusqlite::Connection;

use crate::error::Error;

pub const DB_FILE_NAME: &str = "coach.db";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the database at an explicit path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        bootstrap(&conn)?;
        auto_migrate(&conn)?;
        Ok(Self { conn, path })
    }

    /// Open the database at its conventional location, `<data_dir>/db/coach.db`,
    /// migrating a legacy `<data_dir>/coach.db` file if the new location is
    /// still empty.
    pub fn open_default(data_dir: &Path) -> Result<Self, Error> {
        let db_dir = data_dir.join("db");
        fs::create_dir_all(&db_dir)?;
        let path = db_dir.join(DB_FILE_NAME);
        migrate_legacy_db(&data_dir.join(DB_FILE_NAME), &path);
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn migrate_legacy_db(legacy: &Path, target: &Path) {
    if !legacy.exists() {
        return;
    }
    let target_empty = match fs::metadata(target) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };
    if !target_empty {
        return;
    }
    match fs::copy(legacy, target) {
        Ok(_) => info!("Migrated legacy database to {:?}", target),
        Err(e) => warn!("Failed to migrate legacy database: {}", e),
    }
}

fn bootstrap(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            event TEXT NOT NULL DEFAULT '',
            site TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL DEFAULT '',
            round TEXT NOT NULL DEFAULT '',
            white TEXT NOT NULL DEFAULT '',
            black TEXT NOT NULL DEFAULT '',
            result TEXT NOT NULL DEFAULT '*',
            white_elo INTEGER,
            black_elo INTEGER,
            time_control TEXT NOT NULL DEFAULT '',
            termination TEXT NOT NULL DEFAULT '',
            eco_code TEXT,
            opening_name TEXT,
            opening_variation TEXT,
            pgn_text TEXT NOT NULL,
            moves_san TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_game_white ON games(white);
        CREATE INDEX IF NOT EXISTS idx_game_black ON games(black);
        CREATE INDEX IF NOT EXISTS idx_game_date ON games(date);
        CREATE INDEX IF NOT EXISTS idx_game_source ON games(source);

        CREATE TABLE IF NOT EXISTS analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id INTEGER NOT NULL UNIQUE REFERENCES games(id),
            engine_version TEXT NOT NULL DEFAULT '',
            depth INTEGER NOT NULL DEFAULT 0,
            time_per_move REAL,
            accuracy_white REAL NOT NULL DEFAULT 0,
            accuracy_black REAL NOT NULL DEFAULT 0,
            perf_elo_white INTEGER NOT NULL DEFAULT 1500,
            perf_elo_black INTEGER NOT NULL DEFAULT 1500,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS moves (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id INTEGER NOT NULL REFERENCES games(id),
            ply_index INTEGER NOT NULL,
            san TEXT NOT NULL,
            uci TEXT NOT NULL,
            fen_before TEXT NOT NULL,
            fen_after TEXT NOT NULL,
            eval_before_cp INTEGER,
            eval_best_cp INTEGER,
            eval_after_cp INTEGER,
            best_uci TEXT,
            classification TEXT NOT NULL,
            is_book INTEGER NOT NULL DEFAULT 0,
            is_critical INTEGER NOT NULL DEFAULT 0,
            is_brilliant INTEGER NOT NULL DEFAULT 0,
            cpl INTEGER,
            color TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_move_game_ply ON moves(game_id, ply_index);
        CREATE INDEX IF NOT EXISTS idx_move_classification ON moves(classification);

        CREATE TABLE IF NOT EXISTS game_analytics (
            game_id INTEGER PRIMARY KEY REFERENCES games(id),
            acpl_overall REAL,
            acpl_opening REAL,
            acpl_middlegame REAL,
            acpl_endgame REAL,
            opening_blunders INTEGER NOT NULL DEFAULT 0,
            opening_mistakes INTEGER NOT NULL DEFAULT 0,
            opening_inaccuracies INTEGER NOT NULL DEFAULT 0,
            middlegame_blunders INTEGER NOT NULL DEFAULT 0,
            middlegame_mistakes INTEGER NOT NULL DEFAULT 0,
            middlegame_inaccuracies INTEGER NOT NULL DEFAULT 0,
            endgame_blunders INTEGER NOT NULL DEFAULT 0,
            endgame_mistakes INTEGER NOT NULL DEFAULT 0,
            endgame_inaccuracies INTEGER NOT NULL DEFAULT 0,
            cpl_0_20 INTEGER NOT NULL DEFAULT 0,
            cpl_20_50 INTEGER NOT NULL DEFAULT 0,
            cpl_50_100 INTEGER NOT NULL DEFAULT 0,
            cpl_100_200 INTEGER NOT NULL DEFAULT 0,
            cpl_200_plus INTEGER NOT NULL DEFAULT 0,
            cpl_total INTEGER NOT NULL DEFAULT 0,
            critical_faced INTEGER NOT NULL DEFAULT 0,
            critical_solved INTEGER NOT NULL DEFAULT 0,
            critical_failed INTEGER NOT NULL DEFAULT 0,
            critical_rate REAL,
            acpl_critical REAL,
            acpl_white REAL,
            acpl_black REAL,
            white_blunders INTEGER NOT NULL DEFAULT 0,
            white_mistakes INTEGER NOT NULL DEFAULT 0,
            white_inaccuracies INTEGER NOT NULL DEFAULT 0,
            black_blunders INTEGER NOT NULL DEFAULT 0,
            black_mistakes INTEGER NOT NULL DEFAULT 0,
            black_inaccuracies INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS practice_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_game_id INTEGER NOT NULL REFERENCES games(id),
            source_ply_index INTEGER NOT NULL,
            fen_start TEXT NOT NULL,
            side_to_move TEXT NOT NULL,
            target_line_uci TEXT NOT NULL,
            target_line_san TEXT NOT NULL,
            category TEXT NOT NULL,
            motif_tags TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_practice_category ON practice_items(category);
        CREATE INDEX IF NOT EXISTS idx_practice_game ON practice_items(source_game_id);

        CREATE TABLE IF NOT EXISTS practice_progress (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            practice_item_id INTEGER NOT NULL UNIQUE REFERENCES practice_items(id),
            due_date TEXT NOT NULL,
            interval_days REAL NOT NULL DEFAULT 1.0,
            ease_factor REAL NOT NULL DEFAULT 2.5,
            repetitions INTEGER NOT NULL DEFAULT 0,
            lapses INTEGER NOT NULL DEFAULT 0,
            last_result TEXT,
            attempts_total INTEGER NOT NULL DEFAULT 0,
            attempts_first_try_correct INTEGER NOT NULL DEFAULT 0,
            consecutive_first_try INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_progress_due ON practice_progress(due_date);",
    )?;
    Ok(())
}

/// Lightweight migrations for database files created by older builds.
fn auto_migrate(conn: &Connection) -> Result<(), Error> {
    let games_cols = table_columns(conn, "games")?;
    if !games_cols.contains("eco_code") {
        conn.execute_batch("ALTER TABLE games ADD COLUMN eco_code TEXT")?;
    }
    if !games_cols.contains("opening_name") {
        conn.execute_batch("ALTER TABLE games ADD COLUMN opening_name TEXT")?;
    }
    if !games_cols.contains("opening_variation") {
        conn.execute_batch("ALTER TABLE games ADD COLUMN opening_variation TEXT")?;
    }

    let moves_cols = table_columns(conn, "moves")?;
    if !moves_cols.contains("cpl") {
        conn.execute_batch("ALTER TABLE moves ADD COLUMN cpl INTEGER")?;
    }
    // Normalize classification values to their uppercase canonical form.
    conn.execute_batch("UPDATE moves SET classification = UPPER(classification)")?;

    let progress_cols = table_columns(conn, "practice_progress")?;
    if !progress_cols.contains("consecutive_first_try") {
        conn.execute_batch(
            "ALTER TABLE practice_progress ADD COLUMN consecutive_first_try INTEGER NOT NULL DEFAULT 0",
        )?;
    }

    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(cols)
}
