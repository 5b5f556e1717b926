//! PGN import: parsing, normalization and duplicate-aware storage.
//!
//! Games are read with a streaming visitor, their mainlines replayed for
//! validation and SAN normalization, and stored with a space-joined move
//! list used by duplicate detection (same players, same date, same first
//! ten plies).

use std::fs;
use std::path::Path;

use log::info;
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use rusqlite::Connection;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Position};

use crate::db::models::{GameSource, NewGame};
use crate::db::ops;
use crate::error::Error;

/// A parsed, validated game ready for storage or analysis.
#[derive(Debug, Clone, Default)]
pub struct ParsedGame {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
    pub result: String,
    pub white_elo: Option<i32>,
    pub black_elo: Option<i32>,
    pub time_control: String,
    pub termination: String,
    /// Set when the game starts from a position given in a FEN header.
    pub initial_fen: Option<String>,
    /// Normalized SAN mainline.
    pub san_moves: Vec<String>,
}

impl ParsedGame {
    pub fn initial_position(&self) -> Result<Chess, Error> {
        match &self.initial_fen {
            Some(fen) => {
                let fen: Fen = fen.parse()?;
                Ok(fen.into_position(CastlingMode::Standard)?)
            }
            None => Ok(Chess::default()),
        }
    }

    /// First ten plies, the comparison key for duplicate detection.
    pub fn dedupe_prefix(&self) -> String {
        self.san_moves
            .iter()
            .take(10)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render the game back to PGN for storage.
    pub fn render_pgn(&self) -> String {
        let mut out = String::new();
        let headers = [
            ("Event", self.event.as_str()),
            ("Site", self.site.as_str()),
            ("Date", self.date.as_str()),
            ("Round", self.round.as_str()),
            ("White", self.white.as_str()),
            ("Black", self.black.as_str()),
            ("Result", self.result.as_str()),
        ];
        for (key, value) in headers {
            let value = if value.is_empty() { "?" } else { value };
            out.push_str(&format!("[{} \"{}\"]\n", key, value));
        }
        if let Some(elo) = self.white_elo {
            out.push_str(&format!("[WhiteElo \"{}\"]\n", elo));
        }
        if let Some(elo) = self.black_elo {
            out.push_str(&format!("[BlackElo \"{}\"]\n", elo));
        }
        if !self.time_control.is_empty() {
            out.push_str(&format!("[TimeControl \"{}\"]\n", self.time_control));
        }
        if !self.termination.is_empty() {
            out.push_str(&format!("[Termination \"{}\"]\n", self.termination));
        }
        if let Some(fen) = &self.initial_fen {
            out.push_str("[SetUp \"1\"]\n");
            out.push_str(&format!("[FEN \"{}\"]\n", fen));
        }
        out.push('\n');

        let mut movetext = String::new();
        for (i, san) in self.san_moves.iter().enumerate() {
            if i % 2 == 0 {
                movetext.push_str(&format!("{}. ", i / 2 + 1));
            }
            movetext.push_str(san);
            movetext.push(' ');
        }
        let result = if self.result.is_empty() {
            "*"
        } else {
            self.result.as_str()
        };
        movetext.push_str(result);
        out.push_str(&movetext);
        out.push('\n');
        out
    }

    pub fn to_new_game(&self, source: GameSource) -> NewGame {
        NewGame {
            source,
            event: self.event.clone(),
            site: self.site.clone(),
            date: self.date.clone(),
            round: self.round.clone(),
            white: self.white.clone(),
            black: self.black.clone(),
            result: self.result.clone(),
            white_elo: self.white_elo,
            black_elo: self.black_elo,
            time_control: self.time_control.clone(),
            termination: self.termination.clone(),
            pgn_text: self.render_pgn(),
            moves_san: self.san_moves.join(" "),
        }
    }
}

/// Raw game as collected by the visitor, before validation.
#[derive(Default)]
struct RawGame {
    headers: Vec<(String, String)>,
    sans: Vec<SanPlus>,
}

#[derive(Default)]
struct GameCollector {
    current: RawGame,
}

impl Visitor for GameCollector {
    type Result = RawGame;

    fn begin_game(&mut self) {
        self.current = RawGame::default();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = value.decode_utf8_lossy().into_owned();
        self.current.headers.push((key, value));
    }

    fn san(&mut self, san_plus: SanPlus) {
        self.current.sans.push(san_plus);
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {
        std::mem::take(&mut self.current)
    }
}

fn header_value(raw: &RawGame, key: &str) -> String {
    raw.headers
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

fn parse_elo(value: &str) -> Option<i32> {
    if value.is_empty() || value == "?" {
        return None;
    }
    value.parse().ok()
}

/// Validate a raw game: replay its mainline and normalize the SAN strings.
fn finish_game(raw: RawGame) -> Result<ParsedGame, Error> {
    let initial_fen = {
        let fen = header_value(&raw, "FEN");
        if fen.is_empty() {
            None
        } else {
            Some(fen)
        }
    };

    let mut game = ParsedGame {
        event: header_value(&raw, "Event"),
        site: header_value(&raw, "Site"),
        date: header_value(&raw, "Date"),
        round: header_value(&raw, "Round"),
        white: header_value(&raw, "White"),
        black: header_value(&raw, "Black"),
        result: header_value(&raw, "Result"),
        white_elo: parse_elo(&header_value(&raw, "WhiteElo")),
        black_elo: parse_elo(&header_value(&raw, "BlackElo")),
        time_control: header_value(&raw, "TimeControl"),
        termination: header_value(&raw, "Termination"),
        initial_fen,
        san_moves: Vec::new(),
    };

    let mut pos = game.initial_position()?;
    for (ply, san_plus) in raw.sans.iter().enumerate() {
        let mv = san_plus.san.to_move(&pos).map_err(|e| {
            Error::InvalidPgn(format!(
                "{} vs {}: illegal move {} at ply {}: {}",
                game.white, game.black, san_plus, ply, e
            ))
        })?;
        let normalized = SanPlus::from_move_and_play_unchecked(&mut pos, &mv);
        game.san_moves.push(normalized.to_string());
    }

    Ok(game)
}

/// Parse all games in a PGN text. Malformed games are reported as error
/// entries and never abort the rest of the batch.
pub fn parse_games(pgn_text: &str) -> (Vec<ParsedGame>, Vec<String>) {
    let mut games = Vec::new();
    let mut errors = Vec::new();
    let mut reader = BufferedReader::new_cursor(pgn_text.as_bytes());
    let mut collector = GameCollector::default();

    loop {
        match reader.read_game(&mut collector) {
            Ok(Some(raw)) => match finish_game(raw) {
                Ok(game) => games.push(game),
                Err(e) => errors.push(e.to_string()),
            },
            Ok(None) => break,
            Err(e) => {
                errors.push(format!("error reading PGN: {}", e));
                break;
            }
        }
    }

    (games, errors)
}

/// Parse exactly one game from a PGN text.
pub fn parse_single_game(pgn_text: &str) -> Result<ParsedGame, Error> {
    let (games, errors) = parse_games(pgn_text);
    match games.into_iter().next() {
        Some(game) => Ok(game),
        None => Err(Error::InvalidPgn(
            errors
                .into_iter()
                .next()
                .unwrap_or_else(|| "no game found".to_string()),
        )),
    }
}

/// Result of an import run.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub imported: Vec<i64>,
    pub errors: Vec<String>,
}

/// Import all games from a PGN text, optionally skipping duplicates.
pub fn import_pgn_text(
    conn: &Connection,
    pgn_text: &str,
    source: GameSource,
    skip_duplicates: bool,
) -> Result<ImportOutcome, Error> {
    let (games, mut errors) = parse_games(pgn_text);
    let mut imported = Vec::new();

    for game in games {
        if skip_duplicates {
            let duplicate = ops::find_duplicate(
                conn,
                &game.white,
                &game.black,
                &game.date,
                &game.dedupe_prefix(),
            )?;
            if duplicate.is_some() {
                errors.push(format!(
                    "skipped duplicate: {} vs {} on {}",
                    game.white, game.black, game.date
                ));
                continue;
            }
        }
        let id = ops::insert_game(conn, &game.to_new_game(source))?;
        imported.push(id);
    }

    info!(
        "Imported {} games ({} errors)",
        imported.len(),
        errors.len()
    );
    Ok(ImportOutcome { imported, errors })
}

/// Import games from a PGN file.
pub fn import_pgn_file(
    conn: &Connection,
    path: &Path,
    source: GameSource,
    skip_duplicates: bool,
) -> Result<ImportOutcome, Error> {
    let pgn_text = fs::read_to_string(path)?;
    import_pgn_text(conn, &pgn_text, source, skip_duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    const SAMPLE: &str = r#"[Event "Test Match"]
[Site "Internet"]
[Date "2024.01.15"]
[Round "1"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]
[WhiteElo "1500"]
[BlackElo "1400"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 1-0

[Event "Test Match"]
[Site "Internet"]
[Date "2024.01.16"]
[Round "2"]
[White "Bob"]
[Black "Alice"]
[Result "0-1"]

1. d4 d5 2. c4 e6 0-1
"#;

    #[test]
    fn parses_multiple_games_with_headers() {
        let (games, errors) = parse_games(SAMPLE);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].white, "Alice");
        assert_eq!(games[0].white_elo, Some(1500));
        assert_eq!(games[0].san_moves.len(), 6);
        assert_eq!(games[1].san_moves, vec!["d4", "d5", "c4", "e6"]);
    }

    #[test]
    fn illegal_moves_are_reported_not_fatal() {
        let text = r#"[White "A"]
[Black "B"]

1. e4 e5 2. Nxe4 d5 1-0

[White "C"]
[Black "D"]

1. Nf3 d5 *
"#;
        let (games, errors) = parse_games(text);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].white, "C");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("illegal move"));
    }

    #[test]
    fn duplicate_detection_uses_players_date_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("coach.db")).unwrap();

        let first = import_pgn_text(db.conn(), SAMPLE, GameSource::PgnImport, true).unwrap();
        assert_eq!(first.imported.len(), 2);

        // Re-importing the same text skips both games.
        let second = import_pgn_text(db.conn(), SAMPLE, GameSource::PgnImport, true).unwrap();
        assert!(second.imported.is_empty());
        assert_eq!(second.errors.len(), 2);
        assert!(second.errors[0].contains("duplicate"));

        // With deduplication off, both import again.
        let third = import_pgn_text(db.conn(), SAMPLE, GameSource::PgnImport, false).unwrap();
        assert_eq!(third.imported.len(), 2);
    }

    #[test]
    fn rendered_pgn_reparses_to_the_same_moves() {
        let (games, _) = parse_games(SAMPLE);
        let rendered = games[0].render_pgn();
        let reparsed = parse_single_game(&rendered).unwrap();
        assert_eq!(reparsed.san_moves, games[0].san_moves);
        assert_eq!(reparsed.white, "Alice");
        assert_eq!(reparsed.result, "1-0");
    }

    #[test]
    fn unknown_elo_markers_become_none() {
        assert_eq!(parse_elo("?"), None);
        assert_eq!(parse_elo(""), None);
        assert_eq!(parse_elo("2400"), Some(2400));
        assert_eq!(parse_elo("abc"), None);
    }
}
