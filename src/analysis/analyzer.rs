//! Move-by-move game analysis against a UCI engine.
//!
//! For each ply the analyser needs three evaluations: the position before
//! the move (reused from the previous ply's after-evaluation whenever
//! possible), the position after the engine's best move, and the position
//! after the played move. The triple feeds the classifier; the resulting
//! records feed accuracy, Elo and analytics derivation.

use log::{debug, info};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position, Square};

use crate::db::models::MoveClass;
use crate::engine::{EngineSession, EvalLimit, Evaluation};
use crate::error::Error;
use crate::import::pgn::ParsedGame;
use crate::opening::detect_opening;
use crate::settings::Settings;

use super::accuracy::{compute_accuracy, estimate_performance_elo};
use super::classification::{cp_loss, Classifier, MoveContext, Thresholds};
use super::{AnalyzedMove, GameAnalysisReport};

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub limit: EvalLimit,
    pub book_plies: usize,
    pub thresholds: Thresholds,
}

impl AnalyzerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            limit: EvalLimit {
                depth: Some(settings.engine.depth),
                time: settings.engine.time_per_move,
            },
            book_plies: settings.analysis.book_plies,
            thresholds: Thresholds {
                excellent: settings.analysis.threshold_excellent,
                good: settings.analysis.threshold_good,
                inaccuracy: settings.analysis.threshold_inaccuracy,
                mistake: settings.analysis.threshold_mistake,
            },
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            limit: EvalLimit::default(),
            book_plies: 12,
            thresholds: Thresholds::default(),
        }
    }
}

pub struct GameAnalyzer<'s> {
    session: &'s mut EngineSession,
    config: AnalyzerConfig,
    classifier: Classifier,
}

impl<'s> GameAnalyzer<'s> {
    pub fn new(session: &'s mut EngineSession, config: AnalyzerConfig) -> Self {
        let classifier = Classifier::new(config.thresholds);
        Self {
            session,
            config,
            classifier,
        }
    }

    /// Analyse every mainline move of a parsed game.
    pub async fn analyze(&mut self, game: &ParsedGame) -> Result<GameAnalysisReport, Error> {
        let mut pos = game.initial_position()?;
        let mut prev_after: Option<Evaluation> = None;
        let mut last_capture_square: Option<Square> = None;
        let mut moves: Vec<AnalyzedMove> = Vec::with_capacity(game.san_moves.len());

        info!(
            "Analyzing game {} vs {} ({} plies)",
            game.white,
            game.black,
            game.san_moves.len()
        );

        for (ply_index, san_text) in game.san_moves.iter().enumerate() {
            let san: SanPlus = san_text
                .parse()
                .map_err(|e| Error::InvalidPgn(format!("ply {}: {}", ply_index, e)))?;
            let played = san
                .san
                .to_move(&pos)
                .map_err(|e| Error::IllegalMove(format!("{} at ply {}", e, ply_index)))?;

            let fen_before = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();

            // The previous ply's after-evaluation is this position's
            // before-evaluation; the first ply has to ask the engine.
            let before = match prev_after.take() {
                Some(eval) => eval,
                None => self.session.evaluate(&pos, &self.config.limit).await?,
            };

            let best = self.evaluate_best_line(&pos, &before).await?;

            let mover = pos.turn();
            let mut pos_next = pos.clone();
            pos_next.play_unchecked(&played);
            let after = self.session.evaluate(&pos_next, &self.config.limit).await?;

            let is_book = ply_index < self.config.book_plies;
            let ctx = MoveContext {
                pos_before: &pos,
                played: &played,
                ply_index,
                is_book,
                last_capture_square,
                limit: self.config.limit,
            };
            let classification = self
                .classifier
                .classify(&mut *self.session, &ctx, &before, &best, &after)
                .await?;
            debug!(
                "ply {}: {} -> {:?}",
                ply_index,
                san_text,
                classification
            );

            moves.push(AnalyzedMove {
                ply_index,
                san: san_text.clone(),
                uci: played.to_uci(CastlingMode::Standard).to_string(),
                fen_before,
                fen_after: Fen::from_position(pos_next.clone(), EnPassantMode::Legal).to_string(),
                eval_before_cp: before.cp_equivalent(),
                eval_best_cp: best.cp_equivalent(),
                eval_after_cp: after.cp_equivalent(),
                best_uci: before.best_move.clone(),
                classification,
                is_book,
                is_critical: classification == MoveClass::Critical,
                is_brilliant: classification == MoveClass::Brilliant,
                cpl: cp_loss(&best, &after, mover),
                color: mover,
            });

            last_capture_square = if played.is_capture() {
                Some(played.to())
            } else {
                None
            };
            prev_after = Some(after);
            pos = pos_next;
        }

        let white_moves: Vec<AnalyzedMove> = moves
            .iter()
            .filter(|m| m.color == Color::White)
            .cloned()
            .collect();
        let black_moves: Vec<AnalyzedMove> = moves
            .iter()
            .filter(|m| m.color == Color::Black)
            .cloned()
            .collect();

        let total_plies = moves.len();
        let opening = detect_opening(&game.san_moves);

        Ok(GameAnalysisReport {
            accuracy_white: compute_accuracy(&white_moves),
            accuracy_black: compute_accuracy(&black_moves),
            perf_elo_white: estimate_performance_elo(&white_moves, total_plies, game.black_elo),
            perf_elo_black: estimate_performance_elo(&black_moves, total_plies, game.white_elo),
            engine_version: self.session.engine_name().to_string(),
            depth: self.config.limit.depth.unwrap_or(0),
            time_per_move: self.config.limit.time,
            eco_code: opening.map(|o| o.code.clone()),
            opening_name: opening.map(|o| o.name.clone()),
            opening_variation: opening.and_then(|o| o.variation.clone()),
            moves,
        })
    }

    /// Evaluate the position reached by the engine's preferred move. Falls
    /// back to the before-evaluation when there is no usable best move.
    async fn evaluate_best_line(
        &mut self,
        pos: &Chess,
        before: &Evaluation,
    ) -> Result<Evaluation, Error> {
        let Some(best_uci) = before.best_move.as_deref() else {
            return Ok(before.clone());
        };
        let Ok(uci) = UciMove::from_ascii(best_uci.as_bytes()) else {
            return Ok(before.clone());
        };
        let Ok(best_move) = uci.to_move(pos) else {
            return Ok(before.clone());
        };
        let mut candidate = pos.clone();
        candidate.play_unchecked(&best_move);
        self.session.evaluate(&candidate, &self.config.limit).await
    }
}
