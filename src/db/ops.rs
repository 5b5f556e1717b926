//! Database operations for games, analyses, analytics and practice items.
//!
//! Re-analysis is one transaction: every row derived from the previous
//! analysis (moves, analysis, analytics, practice items and their progress)
//! is deleted before the new rows are inserted, so a failure rolls the whole
//! game back to its pre-analysis state.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::analysis::GameAnalysisReport;
use crate::error::Error;

use super::models::{
    color_as_str, color_from_str, Analysis, Game, GameAnalytics, GameSource, MoveClass, MoveRow,
    NewGame, NewPracticeItem, PracticeCategory, PracticeItem, PracticeProgress, PracticeResult,
};

fn conversion_error(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown {}: {}", what, value).into(),
    )
}

fn json_list(idx: usize, text: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

pub fn insert_game(conn: &Connection, game: &NewGame) -> Result<i64, Error> {
    conn.execute(
        "INSERT INTO games (source, event, site, date, round, white, black, result,
            white_elo, black_elo, time_control, termination, pgn_text, moves_san, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            game.source.as_str(),
            game.event,
            game.site,
            game.date,
            game.round,
            game.white,
            game.black,
            game.result,
            game.white_elo,
            game.black_elo,
            game.time_control,
            game.termination,
            game.pgn_text,
            game.moves_san,
            Utc::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    let source: String = row.get(1)?;
    Ok(Game {
        id: row.get(0)?,
        source: GameSource::from_str(&source)
            .ok_or_else(|| conversion_error(1, "game source", &source))?,
        event: row.get(2)?,
        site: row.get(3)?,
        date: row.get(4)?,
        round: row.get(5)?,
        white: row.get(6)?,
        black: row.get(7)?,
        result: row.get(8)?,
        white_elo: row.get(9)?,
        black_elo: row.get(10)?,
        time_control: row.get(11)?,
        termination: row.get(12)?,
        eco_code: row.get(13)?,
        opening_name: row.get(14)?,
        opening_variation: row.get(15)?,
        pgn_text: row.get(16)?,
        moves_san: row.get(17)?,
        created_at: row.get(18)?,
    })
}

const GAME_COLUMNS: &str = "id, source, event, site, date, round, white, black, result,
    white_elo, black_elo, time_control, termination, eco_code, opening_name,
    opening_variation, pgn_text, moves_san, created_at";

pub fn get_game(conn: &Connection, id: i64) -> Result<Game, Error> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM games WHERE id = ?1", GAME_COLUMNS))?;
    stmt.query_row(params![id], game_from_row)
        .optional()?
        .ok_or(Error::GameNotFound(id))
}

pub fn list_games(conn: &Connection) -> Result<Vec<Game>, Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM games ORDER BY id ASC",
        GAME_COLUMNS
    ))?;
    let games = stmt
        .query_map([], game_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(games)
}

pub fn unanalyzed_game_ids(conn: &Connection) -> Result<Vec<i64>, Error> {
    let mut stmt = conn.prepare(
        "SELECT g.id FROM games g
         LEFT JOIN analyses a ON a.game_id = g.id
         WHERE a.id IS NULL ORDER BY g.id ASC",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Duplicate detection: same White, Black and Date, and the same first ten
/// SAN plies.
pub fn find_duplicate(
    conn: &Connection,
    white: &str,
    black: &str,
    date: &str,
    san_prefix: &str,
) -> Result<Option<i64>, Error> {
    if white.is_empty() || black.is_empty() || date.is_empty() {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT id, moves_san FROM games WHERE white = ?1 AND black = ?2 AND date = ?3",
    )?;
    let rows = stmt
        .query_map(params![white, black, date], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (id, moves_san) in rows {
        if let Some(moves_san) = moves_san {
            let existing_prefix = moves_san
                .split_whitespace()
                .take(10)
                .collect::<Vec<_>>()
                .join(" ");
            if existing_prefix == san_prefix {
                return Ok(Some(id));
            }
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Analysis persistence
// ---------------------------------------------------------------------------

/// Persist a complete game analysis atomically.
///
/// Deletes all rows from any previous analysis of this game (moves, analysis,
/// analytics, practice progress, practice items — in that order), then
/// inserts the new analysis, move rows, analytics, practice items and their
/// initial progress, and updates the game's opening tags.
pub fn persist_analysis(
    conn: &mut Connection,
    game_id: i64,
    report: &GameAnalysisReport,
    analytics: &GameAnalytics,
    items: &[NewPracticeItem],
) -> Result<(), Error> {
    let now = Utc::now();
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM moves WHERE game_id = ?1", params![game_id])?;
    tx.execute("DELETE FROM analyses WHERE game_id = ?1", params![game_id])?;
    tx.execute(
        "DELETE FROM game_analytics WHERE game_id = ?1",
        params![game_id],
    )?;
    delete_practice_rows(&tx, game_id)?;

    tx.execute(
        "INSERT INTO analyses (game_id, engine_version, depth, time_per_move,
            accuracy_white, accuracy_black, perf_elo_white, perf_elo_black, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            game_id,
            report.engine_version,
            report.depth as i64,
            report.time_per_move,
            report.accuracy_white,
            report.accuracy_black,
            report.perf_elo_white,
            report.perf_elo_black,
            now,
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO moves (game_id, ply_index, san, uci, fen_before, fen_after,
                eval_before_cp, eval_best_cp, eval_after_cp, best_uci, classification,
                is_book, is_critical, is_brilliant, cpl, color)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )?;
        for mv in &report.moves {
            stmt.execute(params![
                game_id,
                mv.ply_index as i64,
                mv.san,
                mv.uci,
                mv.fen_before,
                mv.fen_after,
                mv.eval_before_cp,
                mv.eval_best_cp,
                mv.eval_after_cp,
                mv.best_uci,
                mv.classification.as_str(),
                mv.is_book,
                mv.is_critical,
                mv.is_brilliant,
                mv.cpl,
                color_as_str(mv.color),
            ])?;
        }
    }

    insert_analytics(&tx, game_id, analytics)?;
    insert_practice_items(&tx, game_id, items, now)?;

    tx.execute(
        "UPDATE games SET eco_code = ?2, opening_name = ?3, opening_variation = ?4 WHERE id = ?1",
        params![
            game_id,
            report.eco_code,
            report.opening_name,
            report.opening_variation,
        ],
    )?;

    tx.commit()?;
    Ok(())
}

fn insert_analytics(
    tx: &rusqlite::Transaction<'_>,
    game_id: i64,
    a: &GameAnalytics,
) -> Result<(), Error> {
    tx.execute(
        "INSERT INTO game_analytics (game_id, acpl_overall, acpl_opening, acpl_middlegame,
            acpl_endgame, opening_blunders, opening_mistakes, opening_inaccuracies,
            middlegame_blunders, middlegame_mistakes, middlegame_inaccuracies,
            endgame_blunders, endgame_mistakes, endgame_inaccuracies,
            cpl_0_20, cpl_20_50, cpl_50_100, cpl_100_200, cpl_200_plus, cpl_total,
            critical_faced, critical_solved, critical_failed, critical_rate, acpl_critical,
            acpl_white, acpl_black, white_blunders, white_mistakes, white_inaccuracies,
            black_blunders, black_mistakes, black_inaccuracies)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31,
            ?32, ?33)",
        params![
            game_id,
            a.acpl_overall,
            a.acpl_opening,
            a.acpl_middlegame,
            a.acpl_endgame,
            a.opening_blunders,
            a.opening_mistakes,
            a.opening_inaccuracies,
            a.middlegame_blunders,
            a.middlegame_mistakes,
            a.middlegame_inaccuracies,
            a.endgame_blunders,
            a.endgame_mistakes,
            a.endgame_inaccuracies,
            a.cpl_0_20,
            a.cpl_20_50,
            a.cpl_50_100,
            a.cpl_100_200,
            a.cpl_200_plus,
            a.cpl_total,
            a.critical_faced,
            a.critical_solved,
            a.critical_failed,
            a.critical_rate,
            a.acpl_critical,
            a.acpl_white,
            a.acpl_black,
            a.white_blunders,
            a.white_mistakes,
            a.white_inaccuracies,
            a.black_blunders,
            a.black_mistakes,
            a.black_inaccuracies,
        ],
    )?;
    Ok(())
}

pub fn analysis_for_game(conn: &Connection, game_id: i64) -> Result<Option<Analysis>, Error> {
    let mut stmt = conn.prepare(
        "SELECT id, game_id, engine_version, depth, time_per_move, accuracy_white,
            accuracy_black, perf_elo_white, perf_elo_black, created_at
         FROM analyses WHERE game_id = ?1",
    )?;
    let analysis = stmt
        .query_row(params![game_id], |row| {
            Ok(Analysis {
                id: row.get(0)?,
                game_id: row.get(1)?,
                engine_version: row.get(2)?,
                depth: row.get::<_, i64>(3)? as u32,
                time_per_move: row.get(4)?,
                accuracy_white: row.get(5)?,
                accuracy_black: row.get(6)?,
                perf_elo_white: row.get(7)?,
                perf_elo_black: row.get(8)?,
                created_at: row.get(9)?,
            })
        })
        .optional()?;
    Ok(analysis)
}

pub fn moves_for_game(conn: &Connection, game_id: i64) -> Result<Vec<MoveRow>, Error> {
    let mut stmt = conn.prepare(
        "SELECT id, game_id, ply_index, san, uci, fen_before, fen_after, eval_before_cp,
            eval_best_cp, eval_after_cp, best_uci, classification, is_book, is_critical,
            is_brilliant, cpl, color
         FROM moves WHERE game_id = ?1 ORDER BY ply_index ASC",
    )?;
    let moves = stmt
        .query_map(params![game_id], |row| {
            let classification: String = row.get(11)?;
            let color: String = row.get(16)?;
            Ok(MoveRow {
                id: row.get(0)?,
                game_id: row.get(1)?,
                ply_index: row.get::<_, i64>(2)? as usize,
                san: row.get(3)?,
                uci: row.get(4)?,
                fen_before: row.get(5)?,
                fen_after: row.get(6)?,
                eval_before_cp: row.get(7)?,
                eval_best_cp: row.get(8)?,
                eval_after_cp: row.get(9)?,
                best_uci: row.get(10)?,
                classification: MoveClass::from_str(&classification)
                    .ok_or_else(|| conversion_error(11, "classification", &classification))?,
                is_book: row.get(12)?,
                is_critical: row.get(13)?,
                is_brilliant: row.get(14)?,
                cpl: row.get(15)?,
                color: color_from_str(&color)
                    .ok_or_else(|| conversion_error(16, "color", &color))?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(moves)
}

pub fn analytics_for_game(conn: &Connection, game_id: i64) -> Result<Option<GameAnalytics>, Error> {
    let mut stmt = conn.prepare(
        "SELECT game_id, acpl_overall, acpl_opening, acpl_middlegame, acpl_endgame,
            opening_blunders, opening_mistakes, opening_inaccuracies,
            middlegame_blunders, middlegame_mistakes, middlegame_inaccuracies,
            endgame_blunders, endgame_mistakes, endgame_inaccuracies,
            cpl_0_20, cpl_20_50, cpl_50_100, cpl_100_200, cpl_200_plus, cpl_total,
            critical_faced, critical_solved, critical_failed, critical_rate, acpl_critical,
            acpl_white, acpl_black, white_blunders, white_mistakes, white_inaccuracies,
            black_blunders, black_mistakes, black_inaccuracies
         FROM game_analytics WHERE game_id = ?1",
    )?;
    let analytics = stmt
        .query_row(params![game_id], |row| {
            Ok(GameAnalytics {
                game_id: row.get(0)?,
                acpl_overall: row.get(1)?,
                acpl_opening: row.get(2)?,
                acpl_middlegame: row.get(3)?,
                acpl_endgame: row.get(4)?,
                opening_blunders: row.get(5)?,
                opening_mistakes: row.get(6)?,
                opening_inaccuracies: row.get(7)?,
                middlegame_blunders: row.get(8)?,
                middlegame_mistakes: row.get(9)?,
                middlegame_inaccuracies: row.get(10)?,
                endgame_blunders: row.get(11)?,
                endgame_mistakes: row.get(12)?,
                endgame_inaccuracies: row.get(13)?,
                cpl_0_20: row.get(14)?,
                cpl_20_50: row.get(15)?,
                cpl_50_100: row.get(16)?,
                cpl_100_200: row.get(17)?,
                cpl_200_plus: row.get(18)?,
                cpl_total: row.get(19)?,
                critical_faced: row.get(20)?,
                critical_solved: row.get(21)?,
                critical_failed: row.get(22)?,
                critical_rate: row.get(23)?,
                acpl_critical: row.get(24)?,
                acpl_white: row.get(25)?,
                acpl_black: row.get(26)?,
                white_blunders: row.get(27)?,
                white_mistakes: row.get(28)?,
                white_inaccuracies: row.get(29)?,
                black_blunders: row.get(30)?,
                black_mistakes: row.get(31)?,
                black_inaccuracies: row.get(32)?,
            })
        })
        .optional()?;
    Ok(analytics)
}

// ---------------------------------------------------------------------------
// Practice items and progress
// ---------------------------------------------------------------------------

fn delete_practice_rows(tx: &rusqlite::Transaction<'_>, game_id: i64) -> Result<(), Error> {
    tx.execute(
        "DELETE FROM practice_progress WHERE practice_item_id IN
            (SELECT id FROM practice_items WHERE source_game_id = ?1)",
        params![game_id],
    )?;
    tx.execute(
        "DELETE FROM practice_items WHERE source_game_id = ?1",
        params![game_id],
    )?;
    Ok(())
}

fn insert_practice_items(
    tx: &rusqlite::Transaction<'_>,
    game_id: i64,
    items: &[NewPracticeItem],
    now: DateTime<Utc>,
) -> Result<usize, Error> {
    let mut created = 0;
    for item in items {
        tx.execute(
            "INSERT INTO practice_items (source_game_id, source_ply_index, fen_start,
                side_to_move, target_line_uci, target_line_san, category, motif_tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                game_id,
                item.source_ply_index as i64,
                item.fen_start,
                color_as_str(item.side_to_move),
                serde_json::to_string(&item.target_line_uci)?,
                serde_json::to_string(&item.target_line_san)?,
                item.category.as_str(),
                item.motif_tags
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                now,
            ],
        )?;
        let item_id = tx.last_insert_rowid();
        let progress = PracticeProgress::new_for(item_id, now);
        tx.execute(
            "INSERT INTO practice_progress (practice_item_id, due_date, interval_days,
                ease_factor, repetitions, lapses, last_result, attempts_total,
                attempts_first_try_correct, consecutive_first_try, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                progress.practice_item_id,
                progress.due_date,
                progress.interval_days,
                progress.ease_factor,
                progress.repetitions,
                progress.lapses,
                progress.last_result.map(|r| r.as_str()),
                progress.attempts_total,
                progress.attempts_first_try_correct,
                progress.consecutive_first_try,
                progress.updated_at,
            ],
        )?;
        created += 1;
    }
    Ok(created)
}

/// Replace all practice items of a game in one transaction: progress rows are
/// deleted first, then the items, then the new set is inserted with fresh
/// progress.
pub fn replace_practice_items(
    conn: &mut Connection,
    game_id: i64,
    items: &[NewPracticeItem],
) -> Result<usize, Error> {
    let now = Utc::now();
    let tx = conn.transaction()?;
    delete_practice_rows(&tx, game_id)?;
    let created = insert_practice_items(&tx, game_id, items, now)?;
    tx.commit()?;
    Ok(created)
}

fn practice_item_from_row(row: &Row<'_>) -> rusqlite::Result<PracticeItem> {
    let side: String = row.get(4)?;
    let uci: String = row.get(5)?;
    let san: String = row.get(6)?;
    let category: String = row.get(7)?;
    let motifs: Option<String> = row.get(8)?;
    Ok(PracticeItem {
        id: row.get(0)?,
        source_game_id: row.get(1)?,
        source_ply_index: row.get::<_, i64>(2)? as usize,
        fen_start: row.get(3)?,
        side_to_move: color_from_str(&side).ok_or_else(|| conversion_error(4, "color", &side))?,
        target_line_uci: json_list(5, &uci)?,
        target_line_san: json_list(6, &san)?,
        category: PracticeCategory::from_str(&category)
            .ok_or_else(|| conversion_error(7, "practice category", &category))?,
        motif_tags: motifs.as_deref().map(|m| json_list(8, m)).transpose()?,
        created_at: row.get(9)?,
    })
}

const ITEM_COLUMNS: &str = "i.id, i.source_game_id, i.source_ply_index, i.fen_start,
    i.side_to_move, i.target_line_uci, i.target_line_san, i.category, i.motif_tags,
    i.created_at";

pub fn practice_items_for_game(
    conn: &Connection,
    game_id: i64,
) -> Result<Vec<PracticeItem>, Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM practice_items i WHERE i.source_game_id = ?1 ORDER BY i.source_ply_index",
        ITEM_COLUMNS
    ))?;
    let items = stmt
        .query_map(params![game_id], practice_item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Query practice items by category, optionally restricted to items due
/// before a cutoff and optionally including mastered items.
pub fn select_candidates(
    conn: &Connection,
    categories: &[PracticeCategory],
    due_before: Option<DateTime<Utc>>,
    include_mastered: bool,
    mastery_streak: i32,
) -> Result<Vec<PracticeItem>, Error> {
    if categories.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = (1..=categories.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "SELECT {} FROM practice_items i
         JOIN practice_progress p ON p.practice_item_id = i.id
         WHERE i.category IN ({})",
        ITEM_COLUMNS, placeholders
    );
    if !include_mastered {
        sql.push_str(&format!(
            " AND p.consecutive_first_try < {}",
            mastery_streak
        ));
    }

    let mut bound: Vec<Value> = categories
        .iter()
        .map(|c| Value::Text(c.as_str().to_string()))
        .collect();
    if let Some(cutoff) = due_before {
        sql.push_str(&format!(" AND p.due_date <= ?{}", bound.len() + 1));
        // Same encoding the chrono ToSql impl uses for stored due dates, so
        // the TEXT comparison is chronological.
        bound.push(Value::Text(
            cutoff.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string(),
        ));
    }

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params_from_iter(bound), practice_item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn progress_for_item(
    conn: &Connection,
    item_id: i64,
) -> Result<Option<PracticeProgress>, Error> {
    let mut stmt = conn.prepare(
        "SELECT id, practice_item_id, due_date, interval_days, ease_factor, repetitions,
            lapses, last_result, attempts_total, attempts_first_try_correct,
            consecutive_first_try, updated_at
         FROM practice_progress WHERE practice_item_id = ?1",
    )?;
    let progress = stmt
        .query_row(params![item_id], |row| {
            let last_result: Option<String> = row.get(7)?;
            Ok(PracticeProgress {
                id: row.get(0)?,
                practice_item_id: row.get(1)?,
                due_date: row.get(2)?,
                interval_days: row.get(3)?,
                ease_factor: row.get(4)?,
                repetitions: row.get(5)?,
                lapses: row.get(6)?,
                last_result: match last_result {
                    Some(s) => Some(
                        PracticeResult::from_str(&s)
                            .ok_or_else(|| conversion_error(7, "practice result", &s))?,
                    ),
                    None => None,
                },
                attempts_total: row.get(8)?,
                attempts_first_try_correct: row.get(9)?,
                consecutive_first_try: row.get(10)?,
                updated_at: row.get(11)?,
            })
        })
        .optional()?;
    Ok(progress)
}

pub fn update_progress(conn: &Connection, progress: &PracticeProgress) -> Result<(), Error> {
    conn.execute(
        "UPDATE practice_progress SET due_date = ?2, interval_days = ?3, ease_factor = ?4,
            repetitions = ?5, lapses = ?6, last_result = ?7, attempts_total = ?8,
            attempts_first_try_correct = ?9, consecutive_first_try = ?10, updated_at = ?11
         WHERE practice_item_id = ?1",
        params![
            progress.practice_item_id,
            progress.due_date,
            progress.interval_days,
            progress.ease_factor,
            progress.repetitions,
            progress.lapses,
            progress.last_result.map(|r| r.as_str()),
            progress.attempts_total,
            progress.attempts_first_try_correct,
            progress.consecutive_first_try,
            progress.updated_at,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzedMove;
    use crate::db::Database;
    use crate::practice::scheduler::{record_attempt, select_practice_items};
    use shakmaty::Color;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("coach.db")).unwrap();
        (dir, db)
    }

    fn sample_game() -> NewGame {
        NewGame {
            source: GameSource::PgnImport,
            event: "Test".to_string(),
            site: "?".to_string(),
            date: "2024.01.15".to_string(),
            round: "1".to_string(),
            white: "Alice".to_string(),
            black: "Bob".to_string(),
            result: "1-0".to_string(),
            white_elo: Some(1500),
            black_elo: Some(1400),
            time_control: "600".to_string(),
            termination: "normal".to_string(),
            pgn_text: "1. e4 e5 *".to_string(),
            moves_san: "e4 e5".to_string(),
        }
    }

    fn analyzed_move(ply_index: usize, class: MoveClass, cpl: Option<i32>) -> AnalyzedMove {
        AnalyzedMove {
            ply_index,
            san: "e4".to_string(),
            uci: "e2e4".to_string(),
            fen_before: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            fen_after: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".to_string(),
            eval_before_cp: Some(20),
            eval_best_cp: Some(30),
            eval_after_cp: cpl.map(|c| 30 - c),
            best_uci: Some("e2e4".to_string()),
            classification: class,
            is_book: class == MoveClass::Book,
            is_critical: class == MoveClass::Critical,
            is_brilliant: false,
            cpl,
            color: if ply_index % 2 == 0 {
                Color::White
            } else {
                Color::Black
            },
        }
    }

    fn sample_report(moves: Vec<AnalyzedMove>) -> GameAnalysisReport {
        GameAnalysisReport {
            moves,
            accuracy_white: 91.5,
            accuracy_black: 84.25,
            perf_elo_white: 2100,
            perf_elo_black: 1900,
            engine_version: "Stockfish 16".to_string(),
            depth: 18,
            time_per_move: None,
            eco_code: Some("C20".to_string()),
            opening_name: Some("King's Pawn Game".to_string()),
            opening_variation: None,
        }
    }

    fn sample_item(ply: usize) -> NewPracticeItem {
        NewPracticeItem {
            source_ply_index: ply,
            fen_start: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            side_to_move: Color::White,
            target_line_uci: vec!["e2e4".to_string()],
            target_line_san: vec!["e4".to_string()],
            category: PracticeCategory::Mistake,
            motif_tags: None,
        }
    }

    #[test]
    fn persist_analysis_roundtrips() {
        let (_dir, mut db) = test_db();
        let game_id = insert_game(db.conn(), &sample_game()).unwrap();

        let report = sample_report(vec![
            analyzed_move(0, MoveClass::Book, Some(0)),
            analyzed_move(1, MoveClass::Mistake, Some(150)),
        ]);
        let analytics = crate::analysis::compute_game_analytics(&report.moves);
        let items = vec![sample_item(1)];
        persist_analysis(db.conn_mut(), game_id, &report, &analytics, &items).unwrap();

        let stored = analysis_for_game(db.conn(), game_id).unwrap().unwrap();
        assert_eq!(stored.engine_version, "Stockfish 16");
        assert_eq!(stored.accuracy_white, 91.5);
        assert_eq!(stored.perf_elo_black, 1900);

        let moves = moves_for_game(db.conn(), game_id).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[1].classification, MoveClass::Mistake);
        assert_eq!(moves[1].cpl, Some(150));
        assert_eq!(moves[1].color, Color::Black);

        let game = get_game(db.conn(), game_id).unwrap();
        assert_eq!(game.eco_code.as_deref(), Some("C20"));

        // Every item has exactly one progress row.
        let items = practice_items_for_game(db.conn(), game_id).unwrap();
        assert_eq!(items.len(), 1);
        assert!(progress_for_item(db.conn(), items[0].id)
            .unwrap()
            .is_some());
    }

    #[test]
    fn reanalysis_destroys_all_previous_rows() {
        let (_dir, mut db) = test_db();
        let game_id = insert_game(db.conn(), &sample_game()).unwrap();

        let report = sample_report(vec![analyzed_move(0, MoveClass::Blunder, Some(300))]);
        let analytics = crate::analysis::compute_game_analytics(&report.moves);
        persist_analysis(
            db.conn_mut(),
            game_id,
            &report,
            &analytics,
            &[sample_item(0), sample_item(0)],
        )
        .unwrap();
        let old_items = practice_items_for_game(db.conn(), game_id).unwrap();
        assert_eq!(old_items.len(), 2);

        // Re-analysis with a different move set and one item.
        let report = sample_report(vec![
            analyzed_move(0, MoveClass::Best, Some(0)),
            analyzed_move(1, MoveClass::Good, Some(40)),
        ]);
        let analytics = crate::analysis::compute_game_analytics(&report.moves);
        persist_analysis(db.conn_mut(), game_id, &report, &analytics, &[sample_item(1)]).unwrap();

        let moves = moves_for_game(db.conn(), game_id).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].classification, MoveClass::Best);

        let new_items = practice_items_for_game(db.conn(), game_id).unwrap();
        assert_eq!(new_items.len(), 1);
        for old in &old_items {
            assert!(new_items.iter().all(|i| i.id != old.id));
            assert!(progress_for_item(db.conn(), old.id).unwrap().is_none());
        }

        // Exactly one analysis and one analytics row remain.
        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM analyses WHERE game_id = ?1",
                params![game_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn regeneration_with_identical_inputs_is_stable() {
        let (_dir, mut db) = test_db();
        let game_id = insert_game(db.conn(), &sample_game()).unwrap();

        let items = vec![sample_item(4), sample_item(9)];
        replace_practice_items(db.conn_mut(), game_id, &items).unwrap();
        let first: Vec<_> = practice_items_for_game(db.conn(), game_id)
            .unwrap()
            .into_iter()
            .map(|i| (i.source_ply_index, i.fen_start, i.target_line_uci))
            .collect();

        replace_practice_items(db.conn_mut(), game_id, &items).unwrap();
        let second: Vec<_> = practice_items_for_game(db.conn(), game_id)
            .unwrap()
            .into_iter()
            .map(|i| (i.source_ply_index, i.fen_start, i.target_line_uci))
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn mastered_items_are_excluded_while_others_remain() {
        let (_dir, mut db) = test_db();
        let game_id = insert_game(db.conn(), &sample_game()).unwrap();
        replace_practice_items(db.conn_mut(), game_id, &[sample_item(2), sample_item(6)]).unwrap();
        let items = practice_items_for_game(db.conn(), game_id).unwrap();
        let categories = [PracticeCategory::Mistake];

        // Master the first item with three first-try passes.
        for _ in 0..3 {
            record_attempt(db.conn(), items[0].id, PracticeResult::PassFirstTry).unwrap();
        }

        let selected = select_practice_items(db.conn(), &categories, 10, false).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, items[1].id);

        // Due-only selection also never surfaces the mastered item while the
        // other exists (its due date is in the future after the passes, so
        // the fallback to the unrestricted non-mastered set kicks in).
        let selected = select_practice_items(db.conn(), &categories, 10, true).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, items[1].id);

        // With every item mastered, the final fallback still offers material.
        for _ in 0..3 {
            record_attempt(db.conn(), items[1].id, PracticeResult::PassFirstTry).unwrap();
        }
        let selected = select_practice_items(db.conn(), &categories, 10, false).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn attempts_on_unknown_items_are_ignored() {
        let (_dir, db) = test_db();
        record_attempt(db.conn(), 424242, PracticeResult::Fail).unwrap();
    }

    #[test]
    fn select_respects_categories_and_limit() {
        let (_dir, mut db) = test_db();
        let game_id = insert_game(db.conn(), &sample_game()).unwrap();
        let mut blunder = sample_item(3);
        blunder.category = PracticeCategory::Blunder;
        replace_practice_items(
            db.conn_mut(),
            game_id,
            &[sample_item(1), sample_item(5), blunder],
        )
        .unwrap();

        let only_blunders =
            select_practice_items(db.conn(), &[PracticeCategory::Blunder], 10, false).unwrap();
        assert_eq!(only_blunders.len(), 1);
        assert_eq!(only_blunders[0].category, PracticeCategory::Blunder);

        let limited =
            select_practice_items(db.conn(), &[PracticeCategory::Mistake], 1, false).unwrap();
        assert_eq!(limited.len(), 1);

        let none = select_practice_items(db.conn(), &[], 10, false).unwrap();
        assert!(none.is_empty());
    }
}
