//! Move classification.
//!
//! Every played move is classified into one of nine categories from three
//! engine evaluations (position before the move, after the engine's best
//! move, after the played move). The decision order is: book signal,
//! mate handling, best-move gates (critical position, brilliant sacrifice),
//! then centipawn-loss thresholds. The brilliant gate may also upgrade a
//! move inside the excellent threshold.

use log::{debug, warn};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, Move, Position, Square};

use crate::db::models::MoveClass;
use crate::engine::{EngineSession, EvalLimit, Evaluation};
use crate::error::Error;

/// Deeper re-score must stay within this margin of the best line.
pub const BRILLIANT_MARGIN_CP: i32 = 30;
/// Minimum persistent material deficit (in points) for a sacrifice.
pub const BRILLIANT_MIN_SACRIFICE: i32 = 2;
/// E1 - E2 uniqueness gap.
pub const UNIQUE_GAP_CP: i32 = 120;
/// E1 - median(E2..E5) breadth-collapse gap.
pub const BREADTH_GAP_CP: i32 = 150;
/// E1 - E5 worst-alternative gap.
pub const WORST_GAP_CP: i32 = 250;
/// Positions already decided beyond this are not critical (mate excepted).
pub const DECIDED_SUPPRESS_CP: i32 = 600;
/// Plies of engine PV played out when verifying that a sacrifice persists.
pub const PV_HORIZON_PLIES: usize = 8;
/// The sacrifice playout needs this many plies before the trade rule applies.
const PV_MIN_PLIES: usize = 4;
/// MultiPV count for the critical-position probe.
const CRITICAL_MULTIPV: u16 = 5;

/// Centipawn-loss boundaries between classification categories.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub excellent: i32,
    pub good: i32,
    pub inaccuracy: i32,
    pub mistake: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            excellent: 15,
            good: 50,
            inaccuracy: 100,
            mistake: 200,
        }
    }
}

/// Per-ply inputs that do not come from the engine.
pub struct MoveContext<'a> {
    pub pos_before: &'a Chess,
    pub played: &'a Move,
    pub ply_index: usize,
    pub is_book: bool,
    /// Destination square of the previous move, when it was a capture.
    pub last_capture_square: Option<Square>,
    pub limit: EvalLimit,
}

pub struct Classifier {
    pub thresholds: Thresholds,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Classify one move from the three evaluation probes. The critical and
    /// brilliant gates issue further engine queries through `session`.
    pub async fn classify(
        &self,
        session: &mut EngineSession,
        ctx: &MoveContext<'_>,
        before: &Evaluation,
        best: &Evaluation,
        after: &Evaluation,
    ) -> Result<MoveClass, Error> {
        if ctx.is_book {
            return Ok(MoveClass::Book);
        }

        let mover = ctx.pos_before.turn();
        let cpl = cp_loss(best, after, mover);

        if let Some(class) = mate_adjustment(best, after, mover) {
            return Ok(class);
        }

        let played_uci = ctx.played.to_uci(CastlingMode::Standard).to_string();
        let is_best = before.best_move.as_deref() == Some(played_uci.as_str());

        if is_best {
            if self.is_critical_position(session, ctx, before).await {
                return Ok(MoveClass::Critical);
            }
            if self
                .is_brilliant_move(session, ctx, best, after, cpl, true)
                .await
            {
                return Ok(MoveClass::Brilliant);
            }
            return Ok(MoveClass::Best);
        }

        let Some(cpl_value) = cpl else {
            // No usable scalars on either side of the comparison.
            return Ok(MoveClass::Good);
        };

        if cpl_value <= self.thresholds.excellent {
            if self
                .is_brilliant_move(session, ctx, best, after, cpl, false)
                .await
            {
                return Ok(MoveClass::Brilliant);
            }
            Ok(MoveClass::Excellent)
        } else {
            Ok(self.class_for_loss(cpl_value))
        }
    }

    /// Threshold classification for a non-best move with known loss.
    pub fn class_for_loss(&self, cpl: i32) -> MoveClass {
        if cpl <= self.thresholds.excellent {
            MoveClass::Excellent
        } else if cpl <= self.thresholds.good {
            MoveClass::Good
        } else if cpl <= self.thresholds.inaccuracy {
            MoveClass::Inaccuracy
        } else if cpl <= self.thresholds.mistake {
            MoveClass::Mistake
        } else {
            MoveClass::Blunder
        }
    }

    /// Critical-position detection via a fresh MultiPV=5 probe.
    ///
    /// The session's MultiPV is raised for the probe and restored on every
    /// exit path; a failed probe simply means "not critical".
    async fn is_critical_position(
        &self,
        session: &mut EngineSession,
        ctx: &MoveContext<'_>,
        before: &Evaluation,
    ) -> bool {
        let saved = session.multipv();
        session.set_multipv(CRITICAL_MULTIPV);
        let verdict = self.critical_probe(session, ctx, before).await;
        session.set_multipv(saved);

        match verdict {
            Ok(critical) => critical,
            Err(e) => {
                warn!(
                    "critical probe failed at ply {}: {}, treating as not critical",
                    ctx.ply_index, e
                );
                false
            }
        }
    }

    async fn critical_probe(
        &self,
        session: &mut EngineSession,
        ctx: &MoveContext<'_>,
        before: &Evaluation,
    ) -> Result<bool, Error> {
        let probe_limit = EvalLimit::depth(before.depth.max(1));
        let probe = session.evaluate(ctx.pos_before, &probe_limit).await?;
        if probe.pv_lines.len() < 2 {
            return Ok(false);
        }

        let mover = ctx.pos_before.turn();
        let line_limit = EvalLimit::depth(before.depth.saturating_sub(2).max(15));
        let mut scalars = Vec::with_capacity(CRITICAL_MULTIPV as usize);

        for line in probe.pv_lines.iter().take(CRITICAL_MULTIPV as usize) {
            let Some(first) = line.first() else { continue };
            let uci = UciMove::from_ascii(first.as_bytes())?;
            let mv = uci.to_move(ctx.pos_before)?;
            let mut candidate = ctx.pos_before.clone();
            candidate.play_unchecked(&mv);
            let eval = session.evaluate(&candidate, &line_limit).await?;
            if let Some(cp) = eval.mover_cp(mover) {
                scalars.push(cp);
            }
        }

        Ok(critical_from_scalars(&scalars, probe.score_mate.is_some()))
    }

    /// Brilliant-sacrifice detection.
    ///
    /// Candidate moves are the best move or those within the excellent
    /// threshold; the sacrifice must persist through the engine's principal
    /// variation and survive a deeper re-score.
    async fn is_brilliant_move(
        &self,
        session: &mut EngineSession,
        ctx: &MoveContext<'_>,
        best: &Evaluation,
        after: &Evaluation,
        cpl: Option<i32>,
        is_best: bool,
    ) -> bool {
        if !is_best && !matches!(cpl, Some(c) if c <= self.thresholds.excellent) {
            return false;
        }
        if is_recapture(ctx.played, ctx.last_capture_square) {
            return false;
        }
        if ctx.pos_before.legal_moves().len() <= 1 {
            return false;
        }

        let mut pos_after = ctx.pos_before.clone();
        pos_after.play_unchecked(ctx.played);
        if pos_after.is_check() {
            return false;
        }

        let mover = ctx.pos_before.turn();
        let material_before = material_points(ctx.pos_before, mover);
        let material_immediate = material_points(&pos_after, mover);
        if material_immediate >= material_before {
            return false;
        }

        let (material_horizon, plies_played) =
            play_out_pv(&pos_after, after.pv_lines.first(), mover);
        if !sacrifice_persists(
            material_before,
            material_immediate,
            material_horizon,
            plies_played,
        ) {
            return false;
        }

        // Deeper confirmation: the sacrifice must hold up under extra depth.
        let deeper_limit = EvalLimit::depth(after.depth + 5);
        match session.evaluate(&pos_after, &deeper_limit).await {
            Ok(deeper) => match (deeper.mover_cp(mover), best.mover_cp(mover)) {
                (Some(rescored), Some(best_cp)) => {
                    if rescored < best_cp - BRILLIANT_MARGIN_CP {
                        debug!(
                            "sacrifice at ply {} fails deeper re-score ({} vs {})",
                            ctx.ply_index, rescored, best_cp
                        );
                        false
                    } else {
                        true
                    }
                }
                _ => true,
            },
            Err(e) => {
                warn!("deeper re-score failed at ply {}: {}", ctx.ply_index, e);
                false
            }
        }
    }
}

/// Centipawn loss of the played move: `max(0, best - after)` from the
/// mover's perspective. `None` when either scalar is undefined.
pub fn cp_loss(best: &Evaluation, after: &Evaluation, mover: Color) -> Option<i32> {
    let best_cp = best.mover_cp(mover)?;
    let after_cp = after.mover_cp(mover)?;
    Some((best_cp - after_cp).max(0))
}

/// Mate-situation override, applied before the best-move gates.
///
/// A forced mate for the mover that the played move lets slip is a missed
/// mate (`Critical`); a position that now promises the opponent a forced
/// mate is a `Blunder`.
pub fn mate_adjustment(
    best: &Evaluation,
    after: &Evaluation,
    mover: Color,
) -> Option<MoveClass> {
    if best.is_mate_for(mover) && !after.is_mate_for(mover) {
        return Some(MoveClass::Critical);
    }
    if after.is_mate_against(mover) {
        return Some(MoveClass::Blunder);
    }
    None
}

/// The pure part of the critical gate: `scalars` are the mover-perspective
/// evaluations E1..E5 of the top candidate moves.
pub fn critical_from_scalars(scalars: &[i32], mate_related: bool) -> bool {
    if scalars.len() < 2 {
        return false;
    }
    let e1 = scalars[0];
    let e2 = scalars[1];

    if e1.abs() >= DECIDED_SUPPRESS_CP && !mate_related {
        return false;
    }
    if e1 - e2 < UNIQUE_GAP_CP {
        return false;
    }
    if scalars.len() >= 3 {
        let rest = &scalars[1..scalars.len().min(5)];
        if f64::from(e1) - median(rest) < f64::from(BREADTH_GAP_CP) {
            return false;
        }
    }
    if scalars.len() >= 5 && e1 - scalars[4] < WORST_GAP_CP {
        return false;
    }
    true
}

fn median(values: &[i32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 0 {
        f64::from(sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        f64::from(sorted[n / 2])
    }
}

/// Trade-proofing: with at least four plies of continuation, material
/// recovering to within one point of the pre-move value was a trade, and the
/// remaining deficit must still reach the sacrifice minimum. With a shorter
/// playout, the immediate loss alone must reach it.
pub fn sacrifice_persists(
    material_before: i32,
    material_immediate: i32,
    material_horizon: i32,
    plies_played: usize,
) -> bool {
    if plies_played >= PV_MIN_PLIES {
        if material_horizon >= material_before - 1 {
            return false;
        }
        material_before - material_horizon >= BRILLIANT_MIN_SACRIFICE
    } else {
        material_before - material_immediate >= BRILLIANT_MIN_SACRIFICE
    }
}

/// Play up to `PV_HORIZON_PLIES` of the engine PV from the position after the
/// move; returns the mover's material at the horizon and the plies played.
pub fn play_out_pv(
    pos_after: &Chess,
    pv: Option<&Vec<String>>,
    mover: Color,
) -> (i32, usize) {
    let mut board = pos_after.clone();
    let mut played = 0;
    if let Some(pv) = pv {
        for token in pv.iter().take(PV_HORIZON_PLIES) {
            if board.is_game_over() {
                break;
            }
            let Ok(uci) = UciMove::from_ascii(token.as_bytes()) else {
                break;
            };
            let Ok(mv) = uci.to_move(&board) else {
                break;
            };
            board.play_unchecked(&mv);
            played += 1;
        }
    }
    (material_points(&board, mover), played)
}

/// Total material of one side in pawn points (P=1, N=B=3, R=5, Q=9).
pub fn material_points(pos: &Chess, side: Color) -> i32 {
    let material = pos.board().material_side(side);
    i32::from(material.pawn)
        + 3 * (i32::from(material.knight) + i32::from(material.bishop))
        + 5 * i32::from(material.rook)
        + 9 * i32::from(material.queen)
}

/// A move is a recapture iff the previous move captured on a square and this
/// move captures on the same square.
pub fn is_recapture(mv: &Move, last_capture_square: Option<Square>) -> bool {
    match last_capture_square {
        Some(square) => mv.is_capture() && mv.to() == square,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MATE_SCORE_CP;
    use shakmaty::fen::Fen;
    use shakmaty::san::San;

    fn pos(fen: &str) -> Chess {
        let fen: Fen = fen.parse().unwrap();
        fen.into_position(CastlingMode::Standard).unwrap()
    }

    fn cp(value: i32) -> Evaluation {
        Evaluation {
            score_cp: Some(value),
            ..Default::default()
        }
    }

    fn mate(value: i32) -> Evaluation {
        Evaluation {
            score_mate: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn cp_loss_is_clamped_and_mover_relative() {
        assert_eq!(cp_loss(&cp(50), &cp(20), Color::White), Some(30));
        // A better-than-best outcome clamps to zero.
        assert_eq!(cp_loss(&cp(50), &cp(80), Color::White), Some(0));
        // Black's perspective flips the frame.
        assert_eq!(cp_loss(&cp(-120), &cp(-40), Color::Black), Some(80));
        assert_eq!(cp_loss(&Evaluation::default(), &cp(0), Color::White), None);
    }

    #[test]
    fn missed_mate_is_critical() {
        // S1: White had mate in one, played a quiet move into +3 cp.
        let best = mate(1);
        let after = cp(3);
        assert_eq!(
            mate_adjustment(&best, &after, Color::White),
            Some(MoveClass::Critical)
        );
        let loss = cp_loss(&best, &after, Color::White).unwrap();
        assert_eq!(loss, MATE_SCORE_CP - 1 - 3);
    }

    #[test]
    fn allowing_opponent_mate_is_blunder() {
        let best = cp(-50);
        let after = mate(2); // white mates, black just moved
        assert_eq!(
            mate_adjustment(&best, &after, Color::Black),
            Some(MoveClass::Blunder)
        );
    }

    #[test]
    fn executed_mate_is_not_adjusted() {
        // Both the best line and the played move keep the forced mate.
        assert_eq!(mate_adjustment(&mate(2), &mate(3), Color::White), None);
    }

    #[test]
    fn threshold_boundaries() {
        let classifier = Classifier::new(Thresholds::default());
        assert_eq!(classifier.class_for_loss(0), MoveClass::Excellent);
        assert_eq!(classifier.class_for_loss(15), MoveClass::Excellent);
        assert_eq!(classifier.class_for_loss(16), MoveClass::Good);
        assert_eq!(classifier.class_for_loss(50), MoveClass::Good);
        assert_eq!(classifier.class_for_loss(100), MoveClass::Inaccuracy);
        assert_eq!(classifier.class_for_loss(200), MoveClass::Mistake);
        assert_eq!(classifier.class_for_loss(201), MoveClass::Blunder);
    }

    #[test]
    fn critical_scalars_from_spec_probe() {
        // S4: E1..E5 = {+150, -30, -80, -140, -220}.
        assert!(critical_from_scalars(&[150, -30, -80, -140, -220], false));
    }

    #[test]
    fn critical_requires_uniqueness_gap() {
        assert!(!critical_from_scalars(&[150, 60, -80, -140, -220], false));
    }

    #[test]
    fn critical_suppressed_in_decided_positions() {
        assert!(!critical_from_scalars(&[700, 100, 0, -100, -200], false));
        // Mate-related positions escape the suppression.
        assert!(critical_from_scalars(&[700, 100, 0, -100, -450], true));
    }

    #[test]
    fn critical_needs_at_least_two_lines() {
        assert!(!critical_from_scalars(&[150], false));
        assert!(!critical_from_scalars(&[], false));
    }

    #[test]
    fn sacrifice_persistence_rules() {
        // S2: material 39 -> 36, still 36 after the horizon.
        assert!(sacrifice_persists(39, 36, 36, 8));
        // S3: material recovers to 39 after four plies; just a trade.
        assert!(!sacrifice_persists(39, 36, 39, 4));
        // Recovery to within one point also counts as a trade.
        assert!(!sacrifice_persists(39, 36, 38, 6));
        // A single point down at the horizon is below the sacrifice minimum.
        assert!(!sacrifice_persists(39, 38, 37, 8));
        // Short playouts fall back to the immediate deficit.
        assert!(sacrifice_persists(39, 36, 39, 2));
        assert!(!sacrifice_persists(39, 38, 30, 2));
    }

    #[test]
    fn material_count_from_start_position() {
        assert_eq!(material_points(&Chess::default(), Color::White), 39);
        assert_eq!(material_points(&Chess::default(), Color::Black), 39);
    }

    #[test]
    fn pv_playout_tracks_material() {
        // Queen takes a defended pawn and gets captured in the PV.
        let board = pos("rnb1kbnr/ppp1pppp/8/3q4/8/2N5/PPPP1PPP/R1BQKBNR w KQkq - 0 3");
        let mut after = board.clone();
        let mv = "Nxd5".parse::<San>().unwrap().to_move(&after).unwrap();
        after.play_unchecked(&mv);
        let pv = vec!["g8f6".to_string(), "g2g3".to_string(), "f6d5".to_string()];
        let (material, played) = play_out_pv(&after, Some(&pv), Color::White);
        assert_eq!(played, 3);
        // White lost the knight back after the recapture on d5.
        assert_eq!(material, material_points(&board, Color::White) - 3);
    }

    #[test]
    fn recapture_detection() {
        let board = pos("rnbqkbnr/pppp1ppp/8/4p3/3P4/8/PPP1PPPP/RNBQKBNR w KQkq - 0 2");
        let take = "dxe5".parse::<San>().unwrap().to_move(&board).unwrap();
        assert!(is_recapture(&take, Some(take.to())));
        assert!(!is_recapture(&take, None));
        let other: Square = "d4".parse().unwrap();
        assert!(!is_recapture(&take, Some(other)));
    }
}
