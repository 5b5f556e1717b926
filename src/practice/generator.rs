//! Practice item generation from analysed mistakes.
//!
//! Each qualifying mistake becomes a training position a couple of plies
//! before the error, with the engine's principal variation from that point
//! as the target line. Generation is idempotent per game: persisting always
//! replaces the previous item set.

use log::debug;
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Position};

use crate::analysis::AnalyzedMove;
use crate::db::models::{NewPracticeItem, PracticeCategory};
use crate::db::{ops, Database};
use crate::engine::{EngineSession, EvalLimit};
use crate::error::Error;
use crate::settings::Settings;

pub const DEFAULT_OFFSET_PLIES: usize = 2;
pub const DEFAULT_TARGET_LINE_PLIES: usize = 1;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub categories: Vec<PracticeCategory>,
    pub offset_plies: usize,
    pub target_line_plies: usize,
    pub limit: EvalLimit,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            categories: vec![
                PracticeCategory::Blunder,
                PracticeCategory::Mistake,
                PracticeCategory::Critical,
            ],
            offset_plies: DEFAULT_OFFSET_PLIES,
            target_line_plies: DEFAULT_TARGET_LINE_PLIES,
            limit: EvalLimit::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut categories = vec![
            PracticeCategory::Blunder,
            PracticeCategory::Mistake,
            PracticeCategory::Critical,
        ];
        if settings.practice.include_inaccuracies {
            categories.push(PracticeCategory::Inaccuracy);
        }
        Self {
            categories,
            offset_plies: settings.practice.offset_plies,
            target_line_plies: settings.practice.target_line_plies,
            limit: EvalLimit::default(),
        }
    }
}

/// Build practice items from a game's analysed moves.
///
/// Book and brilliant moves never qualify. A mistake with no usable engine
/// PV at the start position is skipped silently.
pub async fn build_practice_items(
    session: &mut EngineSession,
    moves: &[AnalyzedMove],
    config: &GeneratorConfig,
) -> Result<Vec<NewPracticeItem>, Error> {
    let mut items = Vec::new();

    for mv in moves {
        let Some(category) = PracticeCategory::from_class(mv.classification) else {
            continue;
        };
        if !config.categories.contains(&category) {
            continue;
        }
        if mv.is_book || mv.is_brilliant {
            continue;
        }

        let start_ply = mv.ply_index.saturating_sub(config.offset_plies);
        let Some(start_move) = moves.get(start_ply) else {
            continue;
        };
        let fen_start = start_move.fen_before.clone();
        let fen: Fen = fen_start.parse()?;
        let start_pos: Chess = fen.into_position(CastlingMode::Standard)?;
        let side_to_move = start_pos.turn();

        let eval = session.evaluate(&start_pos, &config.limit).await?;
        let Some((target_uci, target_san)) =
            build_target_line(&start_pos, &eval.pv_lines, config.target_line_plies)
        else {
            debug!(
                "no usable PV at ply {} of game position, skipping practice item",
                mv.ply_index
            );
            continue;
        };

        items.push(NewPracticeItem {
            source_ply_index: mv.ply_index,
            fen_start,
            side_to_move,
            target_line_uci: target_uci,
            target_line_san: target_san,
            category,
            motif_tags: None,
        });
    }

    Ok(items)
}

/// Regenerate the practice items of an already-analysed game from its stored
/// move rows, replacing the previous set in one transaction.
pub async fn regenerate_for_game(
    db: &mut Database,
    session: &mut EngineSession,
    game_id: i64,
    config: &GeneratorConfig,
) -> Result<usize, Error> {
    let rows = ops::moves_for_game(db.conn(), game_id)?;
    let moves: Vec<AnalyzedMove> = rows.into_iter().map(AnalyzedMove::from).collect();
    let items = build_practice_items(session, &moves, config).await?;
    ops::replace_practice_items(db.conn_mut(), game_id, &items)
}

/// Truncate the first PV to the target length, producing parallel UCI and
/// SAN move lists. Returns `None` when the PV is empty or unplayable.
fn build_target_line(
    start: &Chess,
    pv_lines: &[Vec<String>],
    max_plies: usize,
) -> Option<(Vec<String>, Vec<String>)> {
    let pv = pv_lines.first()?;
    let mut uci_moves = Vec::new();
    let mut san_moves = Vec::new();
    let mut board = start.clone();

    for token in pv.iter().take(max_plies) {
        let Ok(uci) = UciMove::from_ascii(token.as_bytes()) else {
            break;
        };
        let Ok(mv) = uci.to_move(&board) else {
            break;
        };
        let san = SanPlus::from_move_and_play_unchecked(&mut board, &mv);
        san_moves.push(san.to_string());
        uci_moves.push(token.clone());
    }

    if uci_moves.is_empty() {
        None
    } else {
        Some((uci_moves, san_moves))
    }
}
