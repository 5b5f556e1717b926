//! UCI engine integration: subprocess management, evaluation queries and the
//! scoped session used by the analysis pipeline.

mod process;
mod session;
mod types;

pub use process::locate_engine;
pub use session::EngineSession;
pub use types::{
    terminal_evaluation, EngineConfig, EvalLimit, Evaluation, DEFAULT_MULTIPV, MATE_SCORE_CP,
};
