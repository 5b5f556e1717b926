//! Scoped UCI engine session.
//!
//! An `EngineSession` owns at most one engine subprocess and exposes a single
//! `evaluate` operation. The session is configured once (threads, hash,
//! optional skill level) when the process starts; MultiPV is a session
//! property that callers may raise temporarily. A process that dies mid-query
//! is restarted once per query; a second failure propagates as
//! engine-unavailable.

use std::path::PathBuf;

use log::{debug, warn};
use shakmaty::fen::Fen;
use shakmaty::{Chess, Color, EnPassantMode, Position};
use vampirc_uci::{parse_one, UciMessage};

use crate::error::Error;

use super::process::{locate_engine, parse_info_attrs, EngineProcess, PvLine};
use super::types::{terminal_evaluation, EngineConfig, EvalLimit, Evaluation};

pub struct EngineSession {
    path: PathBuf,
    config: EngineConfig,
    process: Option<EngineProcess>,
    multipv: u16,
    engine_name: String,
}

impl EngineSession {
    /// Resolve the engine binary and prepare a session. The process itself is
    /// spawned lazily on the first evaluation.
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        let path = locate_engine(config.path.as_deref())?;
        let multipv = config.multipv.max(1);
        Ok(Self {
            path,
            config,
            process: None,
            multipv,
            engine_name: String::new(),
        })
    }

    /// The engine's self-reported identity, available once a process has run.
    pub fn engine_name(&self) -> &str {
        if self.engine_name.is_empty() {
            "unknown engine"
        } else {
            &self.engine_name
        }
    }

    pub fn multipv(&self) -> u16 {
        self.multipv
    }

    /// Change the MultiPV count for subsequent evaluations. Callers raising
    /// this temporarily must restore the previous value on every exit path.
    pub fn set_multipv(&mut self, multipv: u16) {
        self.multipv = multipv.max(1);
    }

    async fn ensure_process(&mut self) -> Result<(), Error> {
        if self.process.is_some() {
            return Ok(());
        }
        let mut process = EngineProcess::spawn(&self.path).await?;
        process.set_option("Threads", self.config.threads).await?;
        process.set_option("Hash", self.config.hash_mb).await?;
        if let Some(skill) = self.config.skill_level {
            process.set_option("Skill Level", skill.min(20)).await?;
        }
        self.engine_name = process.name().to_string();
        self.process = Some(process);
        Ok(())
    }

    /// Evaluate a position under the given limit.
    ///
    /// Finished positions (checkmate, stalemate) are scored without the
    /// engine. Scores in the result are from White's perspective.
    pub async fn evaluate(&mut self, pos: &Chess, limit: &EvalLimit) -> Result<Evaluation, Error> {
        if let Some(terminal) = terminal_evaluation(pos) {
            return Ok(terminal);
        }

        let fen = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
        let turn = pos.turn();

        self.ensure_process().await?;
        match self.run_query(&fen, turn, limit).await {
            Ok(eval) => Ok(eval),
            Err(e) if is_process_failure(&e) => {
                warn!("Engine died mid-query ({}), restarting once", e);
                self.process = None;
                self.ensure_process()
                    .await
                    .map_err(|e| Error::EngineUnavailable(e.to_string()))?;
                self.run_query(&fen, turn, limit)
                    .await
                    .map_err(|e| Error::EngineUnavailable(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn run_query(
        &mut self,
        fen: &str,
        turn: Color,
        limit: &EvalLimit,
    ) -> Result<Evaluation, Error> {
        let multipv = self.multipv;
        let Some(process) = self.process.as_mut() else {
            return Err(Error::EngineUnavailable(
                "no engine process".to_string(),
            ));
        };

        process.set_option("MultiPV", multipv).await?;
        process.set_position(fen).await?;

        // Time wins over depth when both are set; with neither, fall back to
        // the session defaults.
        if let Some(seconds) = limit.time {
            process.go_movetime(seconds).await?;
        } else if let Some(depth) = limit.depth {
            process.go_depth(depth).await?;
        } else if let Some(seconds) = self.config.time_per_move {
            process.go_movetime(seconds).await?;
        } else {
            process.go_depth(self.config.depth).await?;
        }

        let mut slots: Vec<Option<PvLine>> = vec![None; multipv as usize];
        let mut bestmove_token: Option<String> = None;

        loop {
            match process.read_line().await? {
                None => {
                    return Err(Error::EngineDied(
                        "engine closed stdout before bestmove".to_string(),
                    ))
                }
                Some(line) => {
                    if line.starts_with("bestmove") {
                        let token = line.split_whitespace().nth(1).unwrap_or("(none)");
                        if token != "(none)" {
                            bestmove_token = Some(token.to_string());
                        }
                        break;
                    }
                    if let UciMessage::Info(attrs) = parse_one(&line) {
                        if let Some(pv) = parse_info_attrs(attrs, turn) {
                            let idx = pv.multipv.max(1) as usize - 1;
                            if idx < slots.len() {
                                slots[idx] = Some(pv);
                            }
                        }
                    }
                }
            }
        }

        let mut eval = Evaluation::default();
        if let Some(first) = slots[0].as_ref() {
            eval.score_cp = first.score_cp;
            eval.score_mate = first.score_mate;
            eval.depth = first.depth;
            eval.best_move = first.moves.first().cloned();
        }
        eval.pv_lines = slots
            .into_iter()
            .flatten()
            .map(|line| line.moves)
            .filter(|moves| !moves.is_empty())
            .collect();
        if eval.best_move.is_none() {
            eval.best_move = bestmove_token;
        }

        debug!(
            "Evaluated {} -> cp={:?} mate={:?} depth={} lines={}",
            fen,
            eval.score_cp,
            eval.score_mate,
            eval.depth,
            eval.pv_lines.len()
        );
        Ok(eval)
    }

    /// Shut down the engine process, if any. Dropping the session also kills
    /// the child, so this is for tidy exits.
    pub async fn shutdown(&mut self) {
        if let Some(process) = self.process.take() {
            process.shutdown().await;
        }
    }
}

fn is_process_failure(error: &Error) -> bool {
    matches!(error, Error::Io(_) | Error::EngineDied(_))
}
