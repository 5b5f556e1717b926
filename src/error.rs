//! Crate-wide error type.
//!
//! One `thiserror` enum covers every failure surface: I/O, the database,
//! HTTP, chess parsing, the engine subprocess and configuration.

use std::path::PathBuf;

use shakmaty::fen::ParseFenError;
use shakmaty::san::ParseSanError;
use shakmaty::uci::ParseUciMoveError;
use shakmaty::{Chess, PositionError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("FEN parsing error: {0}")]
    FenParsing(#[from] ParseFenError),

    #[error("position setup error: {0}")]
    PositionSetup(#[from] PositionError<Chess>),

    #[error("UCI move parsing error: {0}")]
    UciMoveParsing(#[from] ParseUciMoveError),

    #[error("SAN parsing error: {0}")]
    SanParsing(#[from] ParseSanError),

    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("game {0} not found")]
    GameNotFound(i64),

    #[error(
        "no UCI engine found. Searched:\n{}\n\n\
         Install Stockfish (https://stockfishchess.org/download/), then either\n\
         place the binary on your PATH or point `engine.path` in the settings\n\
         file at it.",
        format_searched(.searched)
    )]
    EngineNotFound { searched: Vec<PathBuf> },

    #[error("engine failed to initialize: {0}")]
    EngineInitFailed(String),

    #[error("engine timed out: {0}")]
    EngineTimeout(String),

    #[error("engine process died: {0}")]
    EngineDied(String),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("no stdin handle available")]
    NoStdin,

    #[error("no stdout handle available")]
    NoStdout,

    #[error("settings error: {0}")]
    Settings(String),
}

fn format_searched(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<shakmaty::uci::IllegalUciMoveError> for Error {
    fn from(err: shakmaty::uci::IllegalUciMoveError) -> Self {
        Error::IllegalMove(err.to_string())
    }
}

impl From<shakmaty::san::SanError> for Error {
    fn from(err: shakmaty::san::SanError) -> Self {
        Error::IllegalMove(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Settings(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Settings(err.to_string())
    }
}
