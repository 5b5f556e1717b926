//! Batch analysis worker.
//!
//! One spawned worker owns its own database handle and engine session and
//! analyses games sequentially. Progress and completion are delivered as
//! events over an unbounded channel; a cooperative cancel flag is observed
//! between games. Mid-game cancellation is not supported, so a cancelled
//! batch never leaves partial analysis behind.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::Database;
use crate::engine::{EngineConfig, EngineSession};
use crate::settings::Settings;

use super::analyze_game_into_db;

#[derive(Debug)]
pub enum BatchEvent {
    Progress {
        done: usize,
        total: usize,
        current: i64,
    },
    Finished {
        analyzed: usize,
        errors: Vec<String>,
    },
}

pub struct BatchHandle {
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    pub cancel: Arc<AtomicBool>,
    pub task: JoinHandle<()>,
}

impl BatchHandle {
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Spawn a worker that analyses `game_ids` sequentially.
pub fn spawn_batch(db_path: PathBuf, settings: Settings, game_ids: Vec<i64>) -> BatchHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();

    let task = tokio::spawn(async move {
        let total = game_ids.len();
        let mut analyzed = 0;
        let mut errors = Vec::new();

        let mut db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(e) => {
                errors.push(format!("failed to open database: {}", e));
                let _ = tx.send(BatchEvent::Finished { analyzed, errors });
                return;
            }
        };
        let mut session = match EngineSession::new(EngineConfig::from_settings(&settings)) {
            Ok(session) => session,
            Err(e) => {
                errors.push(e.to_string());
                let _ = tx.send(BatchEvent::Finished { analyzed, errors });
                return;
            }
        };

        for (done, game_id) in game_ids.iter().enumerate() {
            if cancel_flag.load(Ordering::Relaxed) {
                info!("Batch analysis cancelled after {} games", analyzed);
                break;
            }
            let _ = tx.send(BatchEvent::Progress {
                done,
                total,
                current: *game_id,
            });

            match analyze_game_into_db(&mut db, &mut session, &settings, *game_id).await {
                Ok(report) => {
                    analyzed += 1;
                    info!(
                        "Analyzed game {}: accuracy {:.2}/{:.2}",
                        game_id, report.accuracy_white, report.accuracy_black
                    );
                }
                Err(e) => {
                    // A bad game never aborts the batch.
                    warn!("Skipping game {}: {}", game_id, e);
                    errors.push(format!("game {}: {}", game_id, e));
                }
            }
        }

        session.shutdown().await;
        let _ = tx.send(BatchEvent::Finished { analyzed, errors });
    });

    BatchHandle {
        events: rx,
        cancel,
        task,
    }
}
