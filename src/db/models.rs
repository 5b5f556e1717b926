//! Record types mirroring the database schema.

use chrono::{DateTime, Utc};
use shakmaty::Color;

/// Where a game came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameSource {
    PgnImport,
    Chesscom,
}

impl GameSource {
    pub fn as_str(self) -> &'static str {
        match self {
            GameSource::PgnImport => "PGN_IMPORT",
            GameSource::Chesscom => "CHESSCOM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PGN_IMPORT" => Some(GameSource::PgnImport),
            "CHESSCOM" => Some(GameSource::Chesscom),
            _ => None,
        }
    }
}

/// The nine move classification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveClass {
    Book,
    Best,
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
    Critical,
    Brilliant,
}

impl MoveClass {
    /// Canonical uppercase form used in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            MoveClass::Book => "BOOK",
            MoveClass::Best => "BEST",
            MoveClass::Excellent => "EXCELLENT",
            MoveClass::Good => "GOOD",
            MoveClass::Inaccuracy => "INACCURACY",
            MoveClass::Mistake => "MISTAKE",
            MoveClass::Blunder => "BLUNDER",
            MoveClass::Critical => "CRITICAL",
            MoveClass::Brilliant => "BRILLIANT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BOOK" => Some(MoveClass::Book),
            "BEST" => Some(MoveClass::Best),
            "EXCELLENT" => Some(MoveClass::Excellent),
            "GOOD" => Some(MoveClass::Good),
            "INACCURACY" => Some(MoveClass::Inaccuracy),
            "MISTAKE" => Some(MoveClass::Mistake),
            "BLUNDER" => Some(MoveClass::Blunder),
            "CRITICAL" => Some(MoveClass::Critical),
            "BRILLIANT" => Some(MoveClass::Brilliant),
            _ => None,
        }
    }
}

/// Categories a practice item can be generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeCategory {
    Blunder,
    Mistake,
    Inaccuracy,
    Critical,
}

impl PracticeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PracticeCategory::Blunder => "BLUNDER",
            PracticeCategory::Mistake => "MISTAKE",
            PracticeCategory::Inaccuracy => "INACCURACY",
            PracticeCategory::Critical => "CRITICAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BLUNDER" => Some(PracticeCategory::Blunder),
            "MISTAKE" => Some(PracticeCategory::Mistake),
            "INACCURACY" => Some(PracticeCategory::Inaccuracy),
            "CRITICAL" => Some(PracticeCategory::Critical),
            _ => None,
        }
    }

    /// The practice category a classification maps to, if any. Book and
    /// brilliant moves never become practice material.
    pub fn from_class(class: MoveClass) -> Option<Self> {
        match class {
            MoveClass::Blunder => Some(PracticeCategory::Blunder),
            MoveClass::Mistake => Some(PracticeCategory::Mistake),
            MoveClass::Inaccuracy => Some(PracticeCategory::Inaccuracy),
            MoveClass::Critical => Some(PracticeCategory::Critical),
            _ => None,
        }
    }
}

/// Outcome of a single practice attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeResult {
    PassFirstTry,
    Pass,
    Fail,
}

impl PracticeResult {
    pub fn as_str(self) -> &'static str {
        match self {
            PracticeResult::PassFirstTry => "PASS_FIRST_TRY",
            PracticeResult::Pass => "PASS",
            PracticeResult::Fail => "FAIL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PASS_FIRST_TRY" => Some(PracticeResult::PassFirstTry),
            "PASS" => Some(PracticeResult::Pass),
            "FAIL" => Some(PracticeResult::Fail),
            _ => None,
        }
    }
}

/// A stored chess game.
#[derive(Debug, Clone)]
pub struct Game {
    pub id: i64,
    pub source: GameSource,
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
    pub eco_code: Option<String>,
    pub opening_name: Option<String>,
    pub opening_variation: Option<String>,
    pub pgn_text: String,
    pub moves_san: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new game.
#[derive(Debug, Clone)]
pub struct NewGame {
    pub source: GameSource,
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
    pub pgn_text: String,
    pub moves_san: String,
}

/// Per-game analysis summary (1:1 with games).
#[derive(Debug, Clone)]
pub struct Analysis {
    pub id: i64,
    pub game_id: i64,
    pub engine_version: String,
    pub depth: u32,
    pub time_per_move: Option<f64>,
    pub accuracy_white: f64,
    pub accuracy_black: f64,
    pub perf_elo_white: i32,
    pub perf_elo_black: i32,
    pub created_at: DateTime<Utc>,
}

/// A persisted, classified move.
#[derive(Debug, Clone)]
pub struct MoveRow {
    pub id: i64,
    pub game_id: i64,
    pub ply_index: usize,
    pub san: String,
    pub uci: String,
    pub fen_before: String,
    pub fen_after: String,
    pub eval_before_cp: Option<i32>,
    pub eval_best_cp: Option<i32>,
    pub eval_after_cp: Option<i32>,
    pub best_uci: Option<String>,
    pub classification: MoveClass,
    pub is_book: bool,
    pub is_critical: bool,
    pub is_brilliant: bool,
    pub cpl: Option<i32>,
    pub color: Color,
}

/// Per-game aggregate metrics (1:1 with games).
#[derive(Debug, Clone, Default)]
pub struct GameAnalytics {
    pub game_id: i64,
    pub acpl_overall: Option<f64>,
    pub acpl_opening: Option<f64>,
    pub acpl_middlegame: Option<f64>,
    pub acpl_endgame: Option<f64>,
    pub opening_blunders: i64,
    pub opening_mistakes: i64,
    pub opening_inaccuracies: i64,
    pub middlegame_blunders: i64,
    pub middlegame_mistakes: i64,
    pub middlegame_inaccuracies: i64,
    pub endgame_blunders: i64,
    pub endgame_mistakes: i64,
    pub endgame_inaccuracies: i64,
    pub cpl_0_20: i64,
    pub cpl_20_50: i64,
    pub cpl_50_100: i64,
    pub cpl_100_200: i64,
    pub cpl_200_plus: i64,
    pub cpl_total: i64,
    pub critical_faced: i64,
    pub critical_solved: i64,
    pub critical_failed: i64,
    pub critical_rate: Option<f64>,
    pub acpl_critical: Option<f64>,
    pub acpl_white: Option<f64>,
    pub acpl_black: Option<f64>,
    pub white_blunders: i64,
    pub white_mistakes: i64,
    pub white_inaccuracies: i64,
    pub black_blunders: i64,
    pub black_mistakes: i64,
    pub black_inaccuracies: i64,
}

/// A training position extracted from a game.
#[derive(Debug, Clone)]
pub struct PracticeItem {
    pub id: i64,
    pub source_game_id: i64,
    pub source_ply_index: usize,
    pub fen_start: String,
    pub side_to_move: Color,
    pub target_line_uci: Vec<String>,
    pub target_line_san: Vec<String>,
    pub category: PracticeCategory,
    pub motif_tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new practice item; the game id is supplied at
/// persist time.
#[derive(Debug, Clone)]
pub struct NewPracticeItem {
    pub source_ply_index: usize,
    pub fen_start: String,
    pub side_to_move: Color,
    pub target_line_uci: Vec<String>,
    pub target_line_san: Vec<String>,
    pub category: PracticeCategory,
    pub motif_tags: Option<Vec<String>>,
}

/// Spaced-repetition state for one practice item (1:1).
#[derive(Debug, Clone)]
pub struct PracticeProgress {
    pub id: i64,
    pub practice_item_id: i64,
    pub due_date: DateTime<Utc>,
    pub interval_days: f64,
    pub ease_factor: f64,
    pub repetitions: i32,
    pub lapses: i32,
    pub last_result: Option<PracticeResult>,
    pub attempts_total: i32,
    pub attempts_first_try_correct: i32,
    pub consecutive_first_try: i32,
    pub updated_at: DateTime<Utc>,
}

impl PracticeProgress {
    /// Fresh progress for a newly created item: due immediately, one-day
    /// interval, default ease.
    pub fn new_for(item_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            practice_item_id: item_id,
            due_date: now,
            interval_days: 1.0,
            ease_factor: 2.5,
            repetitions: 0,
            lapses: 0,
            last_result: None,
            attempts_total: 0,
            attempts_first_try_correct: 0,
            consecutive_first_try: 0,
            updated_at: now,
        }
    }
}

pub fn color_as_str(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

pub fn color_from_str(s: &str) -> Option<Color> {
    match s.to_ascii_lowercase().as_str() {
        "white" => Some(Color::White),
        "black" => Some(Color::Black),
        _ => None,
    }
}
