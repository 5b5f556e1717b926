//! Spaced-repetition scheduling (SM-2 derived).
//!
//! Selection returns due, non-mastered items for a session, falling back to
//! the wider non-mastered set (and finally to mastered items) so a session
//! is always possible when any item exists. Per-attempt updates adjust the
//! interval, ease factor and streak counters; attempts on unknown items are
//! ignored.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use log::debug;
use rand::seq::SliceRandom;
use rusqlite::Connection;

use crate::db::models::{PracticeCategory, PracticeItem, PracticeProgress, PracticeResult};
use crate::db::ops;
use crate::error::Error;

/// Consecutive first-try passes after which an item counts as mastered.
pub const MASTERY_STREAK: i32 = 3;

const MIN_EASE_FACTOR: f64 = 1.3;

/// Select up to `limit` items for a practice session, shuffled.
///
/// Mastered items are excluded while any other item qualifies. With
/// `due_only`, items are first restricted to those due now; an empty due set
/// falls back to the unrestricted non-mastered set.
pub fn select_practice_items(
    conn: &Connection,
    categories: &[PracticeCategory],
    limit: usize,
    due_only: bool,
) -> Result<Vec<PracticeItem>, Error> {
    let now = Utc::now();
    let mut items = ops::select_candidates(
        conn,
        categories,
        due_only.then_some(now),
        false,
        MASTERY_STREAK,
    )?;
    if items.is_empty() && due_only {
        items = ops::select_candidates(conn, categories, None, false, MASTERY_STREAK)?;
    }
    if items.is_empty() {
        // Nothing unmastered left; better to repeat mastered material than
        // to offer an empty session.
        items = ops::select_candidates(conn, categories, None, true, MASTERY_STREAK)?;
    }

    items.shuffle(&mut rand::thread_rng());
    items.truncate(limit);
    Ok(items)
}

/// Apply one attempt to a progress record.
///
/// Quality maps as pass-first-try 5, pass 3, fail 1. Failure resets the
/// repetition ladder and costs 0.2 ease; success walks the 1/6/interval*ease
/// ladder and earns 0.1 ease. Ease never drops below 1.3.
pub fn apply_attempt(
    progress: &mut PracticeProgress,
    result: PracticeResult,
    now: DateTime<Utc>,
) {
    progress.attempts_total += 1;
    if result == PracticeResult::PassFirstTry {
        progress.attempts_first_try_correct += 1;
    }

    let quality = match result {
        PracticeResult::PassFirstTry => 5,
        PracticeResult::Pass => 3,
        PracticeResult::Fail => 1,
    };

    if quality < 3 {
        progress.repetitions = 0;
        progress.interval_days = 1.0;
        progress.ease_factor = (progress.ease_factor - 0.2).max(MIN_EASE_FACTOR);
        progress.lapses += 1;
        progress.consecutive_first_try = 0;
    } else {
        progress.repetitions += 1;
        progress.interval_days = match progress.repetitions {
            1 => 1.0,
            2 => 6.0,
            _ => progress.interval_days * progress.ease_factor,
        };
        progress.ease_factor = (progress.ease_factor + 0.1).max(MIN_EASE_FACTOR);
        if result == PracticeResult::PassFirstTry {
            progress.consecutive_first_try += 1;
        } else {
            progress.consecutive_first_try = 0;
        }
    }

    progress.last_result = Some(result);
    progress.due_date = now + Duration::seconds((progress.interval_days * 86_400.0) as i64);
    progress.updated_at = now;
}

/// Record an attempt against the database. Attempts on items that no longer
/// exist are ignored; the user has simply moved on.
pub fn record_attempt(
    conn: &Connection,
    item_id: i64,
    result: PracticeResult,
) -> Result<(), Error> {
    let Some(mut progress) = ops::progress_for_item(conn, item_id)? else {
        debug!("ignoring attempt on unknown practice item {}", item_id);
        return Ok(());
    };
    apply_attempt(&mut progress, result, Utc::now());
    ops::update_progress(conn, &progress)
}

/// A session over a selected slice of items.
///
/// Items the user did not solve first-try are re-appended to the queue, at
/// most once per session each.
pub struct PracticeSession {
    queue: VecDeque<PracticeItem>,
    requeued: HashSet<i64>,
}

impl PracticeSession {
    pub fn new(items: Vec<PracticeItem>) -> Self {
        Self {
            queue: items.into(),
            requeued: HashSet::new(),
        }
    }

    pub fn next_item(&mut self) -> Option<PracticeItem> {
        self.queue.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Note the outcome of an attempt; a miss re-queues the item once.
    pub fn note_result(&mut self, item: &PracticeItem, first_try_correct: bool) {
        if !first_try_correct && self.requeued.insert(item.id) {
            self.queue.push_back(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Color;

    fn fresh_progress() -> PracticeProgress {
        PracticeProgress::new_for(1, Utc::now())
    }

    fn item(id: i64) -> PracticeItem {
        PracticeItem {
            id,
            source_game_id: 1,
            source_ply_index: 10,
            fen_start: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            side_to_move: Color::White,
            target_line_uci: vec!["e2e4".to_string()],
            target_line_san: vec!["e4".to_string()],
            category: PracticeCategory::Blunder,
            motif_tags: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn three_first_try_passes_walk_the_interval_ladder() {
        // From (repetitions=0, interval=1, ease=2.5): intervals go 1, 6,
        // then 6 * the accumulated ease of 2.7; ease finishes at 2.8.
        let mut progress = fresh_progress();
        let now = Utc::now();

        apply_attempt(&mut progress, PracticeResult::PassFirstTry, now);
        assert_eq!(progress.interval_days, 1.0);
        assert!((progress.ease_factor - 2.6).abs() < 1e-9);

        apply_attempt(&mut progress, PracticeResult::PassFirstTry, now);
        assert_eq!(progress.interval_days, 6.0);
        assert!((progress.ease_factor - 2.7).abs() < 1e-9);

        apply_attempt(&mut progress, PracticeResult::PassFirstTry, now);
        assert!((progress.interval_days - 6.0 * 2.7).abs() < 1e-9);
        assert!(progress.ease_factor >= 2.5 + 0.3 - 1e-9);
        assert_eq!(progress.consecutive_first_try, 3);
        assert_eq!(progress.attempts_first_try_correct, 3);
    }

    #[test]
    fn fail_resets_from_any_state() {
        let mut progress = fresh_progress();
        let now = Utc::now();
        for _ in 0..4 {
            apply_attempt(&mut progress, PracticeResult::PassFirstTry, now);
        }
        let lapses_before = progress.lapses;

        apply_attempt(&mut progress, PracticeResult::Fail, now);
        assert_eq!(progress.repetitions, 0);
        assert_eq!(progress.interval_days, 1.0);
        assert!(progress.ease_factor >= 1.3);
        assert_eq!(progress.consecutive_first_try, 0);
        assert_eq!(progress.lapses, lapses_before + 1);
        assert_eq!(progress.last_result, Some(PracticeResult::Fail));
    }

    #[test]
    fn ease_factor_never_drops_below_floor() {
        let mut progress = fresh_progress();
        let now = Utc::now();
        for _ in 0..20 {
            apply_attempt(&mut progress, PracticeResult::Fail, now);
        }
        assert!((progress.ease_factor - 1.3).abs() < 1e-9);
    }

    #[test]
    fn pass_without_first_try_breaks_the_streak() {
        let mut progress = fresh_progress();
        let now = Utc::now();
        apply_attempt(&mut progress, PracticeResult::PassFirstTry, now);
        apply_attempt(&mut progress, PracticeResult::Pass, now);
        assert_eq!(progress.consecutive_first_try, 0);
        // Pass still advances the repetition ladder.
        assert_eq!(progress.repetitions, 2);
        assert_eq!(progress.attempts_first_try_correct, 1);
    }

    #[test]
    fn due_date_moves_out_with_the_interval() {
        let mut progress = fresh_progress();
        let now = Utc::now();
        apply_attempt(&mut progress, PracticeResult::PassFirstTry, now);
        assert_eq!(progress.due_date, now + Duration::seconds(86_400));
    }

    #[test]
    fn session_requeues_missed_items_once() {
        let mut session = PracticeSession::new(vec![item(1), item(2)]);
        let first = session.next_item().unwrap();
        assert_eq!(first.id, 1);

        session.note_result(&first, false);
        assert_eq!(session.remaining(), 2);

        // A second miss on the same item does not re-queue it again.
        session.note_result(&first, true);
        session.note_result(&first, false);
        assert_eq!(session.remaining(), 2);

        let second = session.next_item().unwrap();
        session.note_result(&second, true);
        assert_eq!(session.remaining(), 1);
        assert_eq!(session.next_item().unwrap().id, 1);
    }
}
