//! Per-game analytics aggregation over classified moves.
//!
//! Runs after a game's moves are classified: phase and per-colour error
//! counts, CPL histogram, and critical-position statistics. Book moves are
//! excluded from CPL sums and the histogram but still count toward phase
//! totals.

use shakmaty::Color;

use crate::db::models::{GameAnalytics, MoveClass};

use super::AnalyzedMove;

/// Game phase boundaries by 1-based ply number: 1-12 opening, 13-60
/// middlegame, 61+ endgame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Opening,
    Middlegame,
    Endgame,
}

pub fn phase_of(ply_index: usize) -> Phase {
    let ply = ply_index + 1;
    if ply <= 12 {
        Phase::Opening
    } else if ply <= 60 {
        Phase::Middlegame
    } else {
        Phase::Endgame
    }
}

#[derive(Default)]
struct CplAccumulator {
    sum: i64,
    count: i64,
}

impl CplAccumulator {
    fn add(&mut self, cpl: i32) {
        self.sum += i64::from(cpl);
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }
}

/// Compute the analytics row for a game from its classified moves.
pub fn compute_game_analytics(moves: &[AnalyzedMove]) -> GameAnalytics {
    let mut analytics = GameAnalytics::default();
    let mut overall = CplAccumulator::default();
    let mut opening = CplAccumulator::default();
    let mut middlegame = CplAccumulator::default();
    let mut endgame = CplAccumulator::default();
    let mut critical = CplAccumulator::default();
    let mut white = CplAccumulator::default();
    let mut black = CplAccumulator::default();

    for mv in moves {
        let phase = phase_of(mv.ply_index);

        match mv.classification {
            MoveClass::Blunder => {
                match phase {
                    Phase::Opening => analytics.opening_blunders += 1,
                    Phase::Middlegame => analytics.middlegame_blunders += 1,
                    Phase::Endgame => analytics.endgame_blunders += 1,
                }
                match mv.color {
                    Color::White => analytics.white_blunders += 1,
                    Color::Black => analytics.black_blunders += 1,
                }
            }
            MoveClass::Mistake => {
                match phase {
                    Phase::Opening => analytics.opening_mistakes += 1,
                    Phase::Middlegame => analytics.middlegame_mistakes += 1,
                    Phase::Endgame => analytics.endgame_mistakes += 1,
                }
                match mv.color {
                    Color::White => analytics.white_mistakes += 1,
                    Color::Black => analytics.black_mistakes += 1,
                }
            }
            MoveClass::Inaccuracy => {
                match phase {
                    Phase::Opening => analytics.opening_inaccuracies += 1,
                    Phase::Middlegame => analytics.middlegame_inaccuracies += 1,
                    Phase::Endgame => analytics.endgame_inaccuracies += 1,
                }
                match mv.color {
                    Color::White => analytics.white_inaccuracies += 1,
                    Color::Black => analytics.black_inaccuracies += 1,
                }
            }
            _ => {}
        }

        if mv.is_critical {
            analytics.critical_faced += 1;
            match mv.cpl {
                Some(0) => analytics.critical_solved += 1,
                Some(_) => analytics.critical_failed += 1,
                None => {}
            }
            if let Some(cpl) = mv.cpl {
                critical.add(cpl);
            }
        }

        // Book moves contribute nothing to CPL sums or the histogram.
        if mv.is_book {
            continue;
        }
        let Some(cpl) = mv.cpl else { continue };

        overall.add(cpl);
        match phase {
            Phase::Opening => opening.add(cpl),
            Phase::Middlegame => middlegame.add(cpl),
            Phase::Endgame => endgame.add(cpl),
        }
        match mv.color {
            Color::White => white.add(cpl),
            Color::Black => black.add(cpl),
        }

        if cpl < 20 {
            analytics.cpl_0_20 += 1;
        } else if cpl < 50 {
            analytics.cpl_20_50 += 1;
        } else if cpl < 100 {
            analytics.cpl_50_100 += 1;
        } else if cpl < 200 {
            analytics.cpl_100_200 += 1;
        } else {
            analytics.cpl_200_plus += 1;
        }
        analytics.cpl_total += 1;
    }

    analytics.acpl_overall = overall.mean();
    analytics.acpl_opening = opening.mean();
    analytics.acpl_middlegame = middlegame.mean();
    analytics.acpl_endgame = endgame.mean();
    analytics.acpl_critical = critical.mean();
    analytics.acpl_white = white.mean();
    analytics.acpl_black = black.mean();
    analytics.critical_rate = if analytics.critical_faced > 0 {
        Some(analytics.critical_solved as f64 / analytics.critical_faced as f64)
    } else {
        None
    };

    analytics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(
        ply_index: usize,
        cpl: Option<i32>,
        class: MoveClass,
        is_book: bool,
        is_critical: bool,
    ) -> AnalyzedMove {
        AnalyzedMove {
            ply_index,
            san: "e4".to_string(),
            uci: "e2e4".to_string(),
            fen_before: String::new(),
            fen_after: String::new(),
            eval_before_cp: Some(0),
            eval_best_cp: Some(0),
            eval_after_cp: cpl.map(|c| -c),
            best_uci: None,
            classification: class,
            is_book,
            is_critical,
            is_brilliant: false,
            cpl,
            color: if ply_index % 2 == 0 {
                Color::White
            } else {
                Color::Black
            },
        }
    }

    #[test]
    fn phase_boundaries() {
        assert_eq!(phase_of(0), Phase::Opening);
        assert_eq!(phase_of(11), Phase::Opening);
        assert_eq!(phase_of(12), Phase::Middlegame);
        assert_eq!(phase_of(59), Phase::Middlegame);
        assert_eq!(phase_of(60), Phase::Endgame);
    }

    #[test]
    fn histogram_buckets_sum_to_total() {
        let moves = vec![
            mv(12, Some(5), MoveClass::Best, false, false),
            mv(13, Some(30), MoveClass::Good, false, false),
            mv(14, Some(75), MoveClass::Inaccuracy, false, false),
            mv(15, Some(150), MoveClass::Mistake, false, false),
            mv(16, Some(400), MoveClass::Blunder, false, false),
            mv(17, None, MoveClass::Good, false, false),
            mv(0, Some(999), MoveClass::Book, true, false),
        ];
        let analytics = compute_game_analytics(&moves);
        let bucket_sum = analytics.cpl_0_20
            + analytics.cpl_20_50
            + analytics.cpl_50_100
            + analytics.cpl_100_200
            + analytics.cpl_200_plus;
        assert_eq!(bucket_sum, analytics.cpl_total);
        assert_eq!(analytics.cpl_total, 5);
        assert_eq!(analytics.cpl_0_20, 1);
        assert_eq!(analytics.cpl_200_plus, 1);
    }

    #[test]
    fn book_moves_do_not_touch_cpl_sums() {
        let moves = vec![
            mv(0, Some(500), MoveClass::Book, true, false),
            mv(12, Some(10), MoveClass::Best, false, false),
        ];
        let analytics = compute_game_analytics(&moves);
        assert_eq!(analytics.acpl_overall, Some(10.0));
        assert_eq!(analytics.cpl_total, 1);
        assert_eq!(analytics.opening_blunders, 0);
    }

    #[test]
    fn phase_error_counts_land_in_their_phase() {
        let moves = vec![
            mv(5, Some(300), MoveClass::Blunder, false, false),
            mv(20, Some(150), MoveClass::Mistake, false, false),
            mv(64, Some(80), MoveClass::Inaccuracy, false, false),
        ];
        let analytics = compute_game_analytics(&moves);
        assert_eq!(analytics.opening_blunders, 1);
        assert_eq!(analytics.middlegame_mistakes, 1);
        assert_eq!(analytics.endgame_inaccuracies, 1);
        assert_eq!(analytics.middlegame_blunders, 0);
    }

    #[test]
    fn critical_counters_split_on_cpl() {
        let moves = vec![
            mv(14, Some(0), MoveClass::Critical, false, true),
            mv(18, Some(90), MoveClass::Critical, false, true),
            mv(22, Some(0), MoveClass::Critical, false, true),
        ];
        let analytics = compute_game_analytics(&moves);
        assert_eq!(analytics.critical_faced, 3);
        assert_eq!(analytics.critical_solved, 2);
        assert_eq!(analytics.critical_failed, 1);
        assert_eq!(analytics.acpl_critical, Some(30.0));
        let rate = analytics.critical_rate.unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn per_color_accumulators_mirror_phases() {
        let moves = vec![
            mv(12, Some(40), MoveClass::Good, false, false),
            mv(13, Some(220), MoveClass::Blunder, false, false),
            mv(14, Some(20), MoveClass::Good, false, false),
        ];
        let analytics = compute_game_analytics(&moves);
        assert_eq!(analytics.acpl_white, Some(30.0));
        assert_eq!(analytics.acpl_black, Some(220.0));
        assert_eq!(analytics.black_blunders, 1);
        assert_eq!(analytics.white_blunders, 0);
    }
}
