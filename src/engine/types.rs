//! Core types for engine configuration and evaluation results.

use std::path::PathBuf;
use std::time::Duration;

use shakmaty::{Chess, Color, Position};

use crate::settings::Settings;

/// Timeout for the `uci` -> `uciok` handshake.
pub const ENGINE_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the `isready` -> `readyok` handshake.
pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Centipawn equivalent of a forced mate; mate-in-N maps to `±(MATE_SCORE_CP - N)`.
pub const MATE_SCORE_CP: i32 = 10_000;

/// Default number of principal variations requested per evaluation.
pub const DEFAULT_MULTIPV: u16 = 3;

/// Engine session configuration, applied once at process startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: Option<PathBuf>,
    pub threads: u32,
    pub hash_mb: u32,
    /// UCI `Skill Level` (0-20). `None` leaves the engine at full strength.
    pub skill_level: Option<u8>,
    pub depth: u32,
    pub time_per_move: Option<f64>,
    pub multipv: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            threads: 1,
            hash_mb: 128,
            skill_level: None,
            depth: 20,
            time_per_move: None,
            multipv: DEFAULT_MULTIPV,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            path: settings.engine.path.clone(),
            threads: settings.engine.threads,
            hash_mb: settings.engine.hash_mb,
            skill_level: None,
            depth: settings.engine.depth,
            time_per_move: settings.engine.time_per_move,
            multipv: DEFAULT_MULTIPV,
        }
    }
}

/// Search limit for a single evaluation. When both are set, time wins.
/// With neither set, the session falls back to its configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalLimit {
    pub depth: Option<u32>,
    pub time: Option<f64>,
}

impl EvalLimit {
    pub fn depth(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            time: None,
        }
    }

    pub fn time(seconds: f64) -> Self {
        Self {
            depth: None,
            time: Some(seconds),
        }
    }
}

/// Result of evaluating a single position.
///
/// Centipawn and mate scores are always from White's perspective, regardless
/// of the side to move. `best_move` is the first move of the first principal
/// variation; `pv_lines` holds up to MultiPV variations as UCI move lists.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub score_cp: Option<i32>,
    pub score_mate: Option<i32>,
    pub best_move: Option<String>,
    pub pv_lines: Vec<Vec<String>>,
    pub depth: u32,
}

impl Evaluation {
    /// The score as a single centipawn number, mate scores converted to
    /// `±(MATE_SCORE_CP - N)`.
    pub fn cp_equivalent(&self) -> Option<i32> {
        if let Some(mate) = self.score_mate {
            return Some(if mate > 0 {
                MATE_SCORE_CP - mate
            } else {
                -(MATE_SCORE_CP + mate)
            });
        }
        self.score_cp
    }

    /// Centipawn-equivalent score from the given side's perspective.
    pub fn mover_cp(&self, mover: Color) -> Option<i32> {
        self.cp_equivalent()
            .map(|cp| if mover == Color::White { cp } else { -cp })
    }

    /// Whether the evaluation promises a forced mate in favor of `side`.
    pub fn is_mate_for(&self, side: Color) -> bool {
        let white = side == Color::White;
        if let Some(mate) = self.score_mate {
            return if white { mate > 0 } else { mate < 0 };
        }
        match self.score_cp {
            Some(cp) if cp.abs() >= MATE_SCORE_CP => {
                if white {
                    cp > 0
                } else {
                    cp < 0
                }
            }
            _ => false,
        }
    }

    pub fn is_mate_against(&self, side: Color) -> bool {
        self.is_mate_for(!side)
    }
}

/// Evaluate a finished position without consulting the engine.
///
/// Returns `None` for positions with legal moves.
pub fn terminal_evaluation(pos: &Chess) -> Option<Evaluation> {
    if pos.is_checkmate() {
        let winner = !pos.turn();
        let cp = if winner == Color::White {
            MATE_SCORE_CP
        } else {
            -MATE_SCORE_CP
        };
        Some(Evaluation {
            score_cp: Some(cp),
            ..Default::default()
        })
    } else if pos.is_game_over() {
        Some(Evaluation {
            score_cp: Some(0),
            ..Default::default()
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::fen::Fen;
    use shakmaty::CastlingMode;

    #[test]
    fn mate_scores_convert_to_centipawns() {
        let eval = Evaluation {
            score_mate: Some(2),
            ..Default::default()
        };
        assert_eq!(eval.cp_equivalent(), Some(MATE_SCORE_CP - 2));
        assert!(eval.is_mate_for(Color::White));
        assert!(eval.is_mate_against(Color::Black));

        let eval = Evaluation {
            score_mate: Some(-3),
            ..Default::default()
        };
        assert_eq!(eval.cp_equivalent(), Some(-(MATE_SCORE_CP - 3)));
        assert!(eval.is_mate_for(Color::Black));
    }

    #[test]
    fn mover_perspective_flips_for_black() {
        let eval = Evaluation {
            score_cp: Some(150),
            ..Default::default()
        };
        assert_eq!(eval.mover_cp(Color::White), Some(150));
        assert_eq!(eval.mover_cp(Color::Black), Some(-150));
    }

    #[test]
    fn checkmated_position_is_terminal() {
        // Fool's mate: black queen mates on h4, white to move.
        let fen: Fen = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3"
            .parse()
            .unwrap();
        let pos: Chess = fen.into_position(CastlingMode::Standard).unwrap();
        let eval = terminal_evaluation(&pos).unwrap();
        assert_eq!(eval.score_cp, Some(-MATE_SCORE_CP));
        assert!(eval.is_mate_for(Color::Black));
    }

    #[test]
    fn open_position_is_not_terminal() {
        assert!(terminal_evaluation(&Chess::default()).is_none());
    }
}
