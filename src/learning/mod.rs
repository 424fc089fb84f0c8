//! Tabular Q-learning system.
//!
//! This module implements the learning side of the engine: a Q-table keyed by
//! board strings, an epsilon-greedy agent with a shaped per-move reward, the
//! game session and self-play orchestration, and the persistent learning
//! history with its multi-slot store.
//!
//! # Architecture
//!
//! ```text
//! SelfPlayRunner / ReversiEngine
//!     |-- GameSession (board, side to move, passes, terminal)
//!     |-- QAgent (EpsilonSchedule + RewardShaper + TD update)
//!     |       |-- QTable (borrowed mutably per step)
//!     |-- RunStats (cumulative counters)
//!     |-- LearningHistory (bounded ring, JSON document)
//!     |-- SlotStore (qtable_<name>.blob + learning_history_<name>.doc)
//!     |-- SelfPlayLogger
//! ```
//!
//! # Example
//!
//! ```
//! use reversi_qlearn::config::EngineConfig;
//! use reversi_qlearn::learning::{LearningHistory, QAgent, QTable, RunStats, SelfPlayRunner};
//!
//! let mut config = EngineConfig::default();
//! config.operational.seed = Some(1);
//!
//! let mut agent = QAgent::new(&config);
//! let mut qtable = QTable::new();
//! let mut history = LearningHistory::new(config.operational.history_len);
//! let mut stats = RunStats::default();
//!
//! let summary = SelfPlayRunner::new(&mut agent, &mut qtable, &mut history, &mut stats, &config.operational)
//!     .run(2, |_| {})
//!     .unwrap();
//! assert_eq!(summary.games_played, 2);
//! assert_eq!(history.len(), 2);
//! ```

use thiserror::Error;

pub mod agent;
pub mod history;
pub mod logger;
mod persist;
pub mod qtable;
pub mod reward;
pub mod self_play;
pub mod session;
pub mod slots;
pub mod stats;

pub use agent::{AgentStep, EpsilonSchedule, MoveChoice, PlayMode, QAgent};
pub use history::{CumulativeStats, GameType, LearningHistory, LearningRecord};
pub use logger::{SelfPlayBatch, SelfPlayLogger};
pub use qtable::{QTABLE_MAGIC, QTable, QTableHeader};
pub use reward::{RewardBreakdown, RewardShaper};
pub use self_play::{CancelToken, GameEnd, SelfPlayProgress, SelfPlayRunner, SelfPlaySummary};
pub use session::{AiOutcome, GameSession, PlaceOutcome, Winner};
pub use slots::{SlotStore, validate_slot_name};
pub use stats::{AiLevel, RunStats};

/// Learning system error type.
///
/// Persistence failures are reported through this type from explicit save and
/// load calls only; game logic never sees them.
///
/// # Recovery Strategies
///
/// | Variant | Recovery |
/// |---------|----------|
/// | `Io` | Report, keep in-memory state |
/// | `InvalidBlob` | Report, start from an empty table |
/// | `InvalidHistory` | Report, start from an empty history |
/// | `InvalidSlotName` | Reject before touching the filesystem |
/// | `UnknownSlot` | Report, no state mutation |
/// | `Config` | Report configuration issue, abort |
/// | `Interrupted` | Save Q-table, stop between games |
#[derive(Error, Debug)]
pub enum LearningError {
    /// I/O errors (blob, history document, log file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Q-table blob with a bad header, checksum or payload.
    #[error("Invalid Q-table blob: {0}")]
    InvalidBlob(String),

    /// History document that does not parse.
    #[error("Invalid learning history: {0}")]
    InvalidHistory(String),

    /// Slot name outside `[A-Za-z0-9_]+`.
    #[error("Invalid slot name: {0:?}")]
    InvalidSlotName(String),

    /// Slot not present on disk.
    #[error("Unknown slot: {0}")]
    UnknownSlot(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Self-play cancelled between games.
    #[error("Self-play interrupted")]
    Interrupted,
}
