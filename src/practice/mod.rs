//! Practice item generation and spaced-repetition scheduling.

pub mod generator;
pub mod scheduler;

pub use generator::{build_practice_items, regenerate_for_game, GeneratorConfig};
pub use scheduler::{
    apply_attempt, record_attempt, select_practice_items, PracticeSession, MASTERY_STREAK,
};
