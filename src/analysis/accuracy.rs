//! Accuracy and performance-Elo derivation from centipawn losses.

use crate::db::models::MoveClass;

use super::AnalyzedMove;

/// Decay constant of the CPL-to-score curve.
pub const ACCURACY_DECAY_K: f64 = 28.85;

/// Games shorter than this (total plies) get the uncertain default rating.
const MIN_PLIES_FOR_ELO: usize = 20;
const ELO_FLOOR: f64 = 500.0;
const ELO_CEILING: f64 = 3000.0;
const OPPONENT_CAP_MARGIN: i32 = 400;
const UNCERTAIN_ELO: i32 = 1500;

/// Map a single move's centipawn loss to a 0-100 score.
pub fn cpl_to_score(cpl: i32) -> f64 {
    if cpl <= 0 {
        return 100.0;
    }
    (100.0 - ACCURACY_DECAY_K * (1.0 + f64::from(cpl)).log10()).clamp(0.0, 100.0)
}

/// Accuracy for one side's moves: the mean move score over non-book moves
/// with a defined CPL, rounded to two decimals. An all-book (or empty)
/// selection scores 100.
pub fn compute_accuracy(moves: &[AnalyzedMove]) -> f64 {
    let scores: Vec<f64> = moves
        .iter()
        .filter(|m| !m.is_book)
        .filter_map(|m| m.cpl)
        .map(cpl_to_score)
        .collect();

    if scores.is_empty() {
        return 100.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 100.0).round() / 100.0
}

/// Average centipawn loss over non-book moves with a defined CPL.
pub fn average_cpl(moves: &[AnalyzedMove]) -> Option<f64> {
    let losses: Vec<i32> = moves
        .iter()
        .filter(|m| !m.is_book)
        .filter_map(|m| m.cpl)
        .collect();
    if losses.is_empty() {
        return None;
    }
    Some(f64::from(losses.iter().sum::<i32>()) / losses.len() as f64)
}

/// Estimate a performance Elo for one side.
///
/// An ACPL base curve is penalised by blunder and mistake rates normalised
/// to 40 plies, clamped to [500, 3000] and capped at 400 points above a
/// known opponent rating. Games under 20 total plies return 1500.
pub fn estimate_performance_elo(
    side_moves: &[AnalyzedMove],
    total_plies: usize,
    opponent_elo: Option<i32>,
) -> i32 {
    if total_plies < MIN_PLIES_FOR_ELO {
        return UNCERTAIN_ELO;
    }
    let Some(acpl) = average_cpl(side_moves) else {
        return UNCERTAIN_ELO;
    };

    let move_count = side_moves.len();
    if move_count == 0 {
        return UNCERTAIN_ELO;
    }
    let blunders = side_moves
        .iter()
        .filter(|m| m.classification == MoveClass::Blunder)
        .count() as f64;
    let mistakes = side_moves
        .iter()
        .filter(|m| m.classification == MoveClass::Mistake)
        .count() as f64;
    let blunders_per_40 = blunders / move_count as f64 * 40.0;
    let mistakes_per_40 = mistakes / move_count as f64 * 40.0;

    let penalty = blunders_per_40 * 150.0 + mistakes_per_40 * 50.0;
    let mut estimated = (base_elo(acpl) - penalty).clamp(ELO_FLOOR, ELO_CEILING);

    if let Some(opponent) = opponent_elo {
        estimated = estimated.min(f64::from(opponent + OPPONENT_CAP_MARGIN));
    }
    estimated as i32
}

fn base_elo(acpl: f64) -> f64 {
    if acpl <= 10.0 {
        2600.0 - acpl * 30.0
    } else if acpl <= 30.0 {
        2300.0 - (acpl - 10.0) * 15.0
    } else if acpl <= 50.0 {
        2000.0 - (acpl - 30.0) * 15.0
    } else if acpl <= 100.0 {
        1700.0 - (acpl - 50.0) * 10.0
    } else {
        1200.0 - (acpl - 100.0) * 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Color;

    fn side_moves(specs: &[(Option<i32>, MoveClass, bool)]) -> Vec<AnalyzedMove> {
        specs
            .iter()
            .enumerate()
            .map(|(i, (cpl, class, is_book))| AnalyzedMove {
                ply_index: i * 2,
                san: "e4".to_string(),
                uci: "e2e4".to_string(),
                fen_before: String::new(),
                fen_after: String::new(),
                eval_before_cp: Some(0),
                eval_best_cp: Some(0),
                eval_after_cp: cpl.map(|c| -c),
                best_uci: None,
                classification: *class,
                is_book: *is_book,
                is_critical: false,
                is_brilliant: false,
                cpl: *cpl,
                color: Color::White,
            })
            .collect()
    }

    #[test]
    fn perfect_play_scores_hundred() {
        // S5: twenty non-book moves with zero loss.
        let moves = side_moves(&[(Some(0), MoveClass::Best, false); 20]);
        assert_eq!(compute_accuracy(&moves), 100.0);
    }

    #[test]
    fn uniform_hundred_cp_loss_matches_curve() {
        // S5: CPL 100 on every move gives about 42.2.
        let moves = side_moves(&[(Some(100), MoveClass::Inaccuracy, false); 20]);
        let accuracy = compute_accuracy(&moves);
        assert!((accuracy - 42.2).abs() < 0.1, "got {}", accuracy);
    }

    #[test]
    fn all_book_game_is_perfect() {
        let moves = side_moves(&[(Some(0), MoveClass::Book, true); 6]);
        assert_eq!(compute_accuracy(&moves), 100.0);
    }

    #[test]
    fn book_and_undefined_moves_are_skipped() {
        let moves = side_moves(&[
            (Some(1000), MoveClass::Book, true),
            (None, MoveClass::Good, false),
            (Some(0), MoveClass::Best, false),
        ]);
        assert_eq!(compute_accuracy(&moves), 100.0);
        assert_eq!(average_cpl(&moves), Some(0.0));
    }

    #[test]
    fn accuracy_stays_in_bounds() {
        let moves = side_moves(&[(Some(100_000), MoveClass::Blunder, false); 5]);
        let accuracy = compute_accuracy(&moves);
        assert!((0.0..=100.0).contains(&accuracy));
    }

    #[test]
    fn flawless_side_earns_strong_elo() {
        // S5: zero ACPL puts the base curve at 2600 with no penalties.
        let moves = side_moves(&[(Some(0), MoveClass::Best, false); 20]);
        let elo = estimate_performance_elo(&moves, 40, None);
        assert_eq!(elo, 2600);
        assert!(elo >= 2000);
    }

    #[test]
    fn short_games_are_uncertain() {
        let moves = side_moves(&[(Some(0), MoveClass::Best, false); 8]);
        assert_eq!(estimate_performance_elo(&moves, 16, None), 1500);
    }

    #[test]
    fn undefined_acpl_is_uncertain() {
        let moves = side_moves(&[(None, MoveClass::Good, false); 15]);
        assert_eq!(estimate_performance_elo(&moves, 30, None), 1500);
    }

    #[test]
    fn blunders_drag_the_estimate_down() {
        let clean = side_moves(&[(Some(20), MoveClass::Good, false); 20]);
        let mut sloppy = side_moves(&[(Some(20), MoveClass::Good, false); 18]);
        sloppy.extend(side_moves(&[(Some(250), MoveClass::Blunder, false); 2]));
        let clean_elo = estimate_performance_elo(&clean, 40, None);
        let sloppy_elo = estimate_performance_elo(&sloppy, 40, None);
        assert!(sloppy_elo < clean_elo);
    }

    #[test]
    fn estimate_is_bounded_and_capped() {
        let awful = side_moves(&[(Some(900), MoveClass::Blunder, false); 20]);
        assert_eq!(estimate_performance_elo(&awful, 40, None), 500);

        let strong = side_moves(&[(Some(0), MoveClass::Best, false); 20]);
        assert_eq!(estimate_performance_elo(&strong, 40, Some(1200)), 1600);
    }

    #[test]
    fn cpl_score_curve_shape() {
        assert_eq!(cpl_to_score(0), 100.0);
        assert!(cpl_to_score(50) > cpl_to_score(100));
        assert!(cpl_to_score(100) > 42.0 && cpl_to_score(100) < 42.4);
    }
}
