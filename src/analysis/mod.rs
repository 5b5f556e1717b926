//! The analysis pipeline: per-move classification, accuracy and Elo
//! estimation, per-game analytics, and batch orchestration.

pub mod accuracy;
pub mod analytics;
pub mod analyzer;
pub mod batch;
pub mod classification;

use shakmaty::Color;

pub use accuracy::{compute_accuracy, estimate_performance_elo};
pub use analytics::compute_game_analytics;
pub use analyzer::{AnalyzerConfig, GameAnalyzer};
pub use batch::{spawn_batch, BatchEvent, BatchHandle};
pub use classification::{Classifier, Thresholds};

use crate::db::models::{MoveClass, MoveRow, NewPracticeItem};
use crate::db::{ops, Database};
use crate::engine::EngineSession;
use crate::error::Error;
use crate::import::pgn::parse_single_game;
use crate::practice::generator::{build_practice_items, GeneratorConfig};
use crate::settings::Settings;

/// One fully analysed ply.
#[derive(Debug, Clone)]
pub struct AnalyzedMove {
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

impl From<MoveRow> for AnalyzedMove {
    fn from(row: MoveRow) -> Self {
        Self {
            ply_index: row.ply_index,
            san: row.san,
            uci: row.uci,
            fen_before: row.fen_before,
            fen_after: row.fen_after,
            eval_before_cp: row.eval_before_cp,
            eval_best_cp: row.eval_best_cp,
            eval_after_cp: row.eval_after_cp,
            best_uci: row.best_uci,
            classification: row.classification,
            is_book: row.is_book,
            is_critical: row.is_critical,
            is_brilliant: row.is_brilliant,
            cpl: row.cpl,
            color: row.color,
        }
    }
}

/// Complete analysis of one game.
#[derive(Debug, Clone)]
pub struct GameAnalysisReport {
    pub moves: Vec<AnalyzedMove>,
    pub accuracy_white: f64,
    pub accuracy_black: f64,
    pub perf_elo_white: i32,
    pub perf_elo_black: i32,
    pub engine_version: String,
    pub depth: u32,
    pub time_per_move: Option<f64>,
    pub eco_code: Option<String>,
    pub opening_name: Option<String>,
    pub opening_variation: Option<String>,
}

/// Analyse a stored game and persist the result.
///
/// The whole persistence step is one transaction: old analysis rows are
/// deleted, new moves/analysis/analytics/practice items are inserted, and
/// the game's opening tags are updated. Practice items are generated before
/// the transaction opens so engine traffic never holds the database.
pub async fn analyze_game_into_db(
    db: &mut Database,
    session: &mut EngineSession,
    settings: &Settings,
    game_id: i64,
) -> Result<GameAnalysisReport, Error> {
    let game = ops::get_game(db.conn(), game_id)?;
    let parsed = parse_single_game(&game.pgn_text)?;

    let config = AnalyzerConfig::from_settings(settings);
    let mut analyzer = GameAnalyzer::new(session, config);
    let report = analyzer.analyze(&parsed).await?;

    let analytics = compute_game_analytics(&report.moves);

    let items: Vec<NewPracticeItem> = if settings.analysis.add_to_practice {
        let generator_config = GeneratorConfig::from_settings(settings);
        build_practice_items(session, &report.moves, &generator_config).await?
    } else {
        Vec::new()
    };

    ops::persist_analysis(db.conn_mut(), game_id, &report, &analytics, &items)?;
    Ok(report)
}
