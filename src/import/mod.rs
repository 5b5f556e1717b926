//! Game ingestion: PGN text/files and the Chess.com archive API.

pub mod chesscom;
pub mod pgn;

pub use chesscom::{ArchiveFilters, ChesscomImporter};
pub use pgn::{import_pgn_file, import_pgn_text, parse_games, parse_single_game, ParsedGame};
