//! Engine configuration.
//!
//! All reward constants, Q-learning hyperparameters, the exploration schedule
//! and the operational limits live here rather than in the algorithms. Every
//! struct has a `Default` carrying the standard values, and because each one
//! is `#[serde(default)]` a JSON file only needs to name the fields it
//! overrides:
//!
//! ```json
//! { "q_learning": { "alpha": 0.2 }, "operational": { "seed": 7 } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::learning::LearningError;
use crate::state_key::KeyMode;

/// Default per-game half-move cap for self-play.
pub const DEFAULT_MOVE_CAP: u32 = 200;

/// Default number of records kept in the learning history ring.
pub const DEFAULT_HISTORY_LEN: usize = 50;

/// Default upper bound on games per self-play run.
pub const DEFAULT_MAX_SELF_PLAY_GAMES: u64 = 100_000;

/// Default games between self-play batch log lines.
pub const DEFAULT_LOG_INTERVAL: u64 = 100;

/// Reward constants used by the shaped per-move reward and the game outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Per flipped stone.
    pub flip: f64,
    /// Outcome bonus when the mover wins.
    pub win: f64,
    /// Outcome bonus when the mover loses.
    pub lose: f64,
    /// Outcome bonus on a draw.
    pub draw: f64,
    /// Penalty applied when an illegal move is played.
    pub invalid: f64,
    /// Placement on a corner.
    pub corner: f64,
    /// Placement on an edge cell next to a corner.
    pub edge: f64,
    /// Placement on one of the stable-ish cells near a corner.
    pub stable: f64,
    /// Placement on one of the four centre cells.
    pub territory: f64,
    /// Weight of the distance from the nearest edge.
    pub positional: f64,
    /// Weight of the reduction in opponent mobility.
    pub mobility: f64,
    /// Bonus when the opponent is left without a legal move.
    pub pass_force: f64,
    /// Per own-coloured neighbour of the placed stone.
    pub own_neighbor: f64,
    /// Per opponent-coloured neighbour of the placed stone.
    pub opponent_neighbor: f64,
    /// Weight of the post-move stone dominance ratio.
    pub dominance: f64,
    /// Weight of the stone difference on a non-terminal move.
    pub parity: f64,
    /// Stone count above which the endgame multiplier applies.
    pub endgame_threshold: u32,
    /// Endgame multiplier.
    pub endgame_multiplier: f64,
    /// Stone count above which the late multiplier applies.
    pub late_threshold: u32,
    /// Late multiplier.
    pub late_multiplier: f64,
    /// Stone count above which the mid multiplier applies (when not late).
    pub mid_threshold: u32,
    /// Mid multiplier.
    pub mid_multiplier: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            flip: 1.0,
            win: 100.0,
            lose: -100.0,
            draw: 50.0,
            invalid: -50.0,
            corner: 25.0,
            edge: -10.0,
            stable: 5.0,
            territory: 2.0,
            positional: 0.5,
            mobility: 0.5,
            pass_force: 15.0,
            own_neighbor: 0.5,
            opponent_neighbor: 1.0,
            dominance: 2.0,
            parity: 0.1,
            endgame_threshold: 50,
            endgame_multiplier: 1.3,
            late_threshold: 55,
            late_multiplier: 1.5,
            mid_threshold: 45,
            mid_multiplier: 1.2,
        }
    }
}

/// Temporal-difference learning parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    /// Learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Whether the side to move is part of the state key.
    pub key_mode: KeyMode,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            key_mode: KeyMode::BoardOnly,
        }
    }
}

/// Exploration schedule parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsilonConfig {
    /// Epsilon before any learning.
    pub initial: f64,
    /// Floor of the exponential decay.
    pub min: f64,
    /// Per-update decay factor.
    pub decay: f64,
    /// Multiplier applied during self-play.
    pub self_play_multiplier: f64,
    /// Learn count above which `step_factor_high` applies.
    pub step_threshold_high: u64,
    /// Step factor after `step_threshold_high` updates.
    pub step_factor_high: f64,
    /// Learn count above which `step_factor_low` applies.
    pub step_threshold_low: u64,
    /// Step factor after `step_threshold_low` updates.
    pub step_factor_low: f64,
    /// Replaces the whole schedule when set.
    pub fixed: Option<f64>,
}

impl Default for EpsilonConfig {
    fn default() -> Self {
        Self {
            initial: 0.3,
            min: 0.05,
            decay: 0.999,
            self_play_multiplier: 0.8,
            step_threshold_high: 1000,
            step_factor_high: 0.9,
            step_threshold_low: 500,
            step_factor_low: 0.95,
            fixed: None,
        }
    }
}

/// Run limits, file locations and logging cadence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationalConfig {
    /// Upper bound on games per self-play run.
    pub max_self_play_games: u64,
    /// Half-move cap per self-play game.
    pub move_cap: u32,
    /// Learning history ring length.
    pub history_len: usize,
    /// Active Q-table blob.
    pub qtable_path: PathBuf,
    /// Active learning history document.
    pub history_path: PathBuf,
    /// Directory holding slot files.
    pub slot_dir: PathBuf,
    /// Directory for self-play log files; no file log when unset.
    pub log_dir: Option<PathBuf>,
    /// Games between self-play batch log lines.
    pub log_interval: u64,
    /// Seed for the agent's random number generator.
    pub seed: Option<u64>,
    /// Whether Q-table blobs are gzip-compressed.
    pub compress_qtable: bool,
}

impl Default for OperationalConfig {
    fn default() -> Self {
        Self {
            max_self_play_games: DEFAULT_MAX_SELF_PLAY_GAMES,
            move_cap: DEFAULT_MOVE_CAP,
            history_len: DEFAULT_HISTORY_LEN,
            qtable_path: PathBuf::from("qtable.blob"),
            history_path: PathBuf::from("learning_history.doc"),
            slot_dir: PathBuf::from("."),
            log_dir: None,
            log_interval: DEFAULT_LOG_INTERVAL,
            seed: None,
            compress_qtable: true,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reward: RewardConfig,
    pub q_learning: QLearningConfig,
    pub epsilon: EpsilonConfig,
    pub operational: OperationalConfig,
}

impl EngineConfig {
    /// Load overrides from a JSON file and validate the result.
    ///
    /// # Errors
    ///
    /// - `LearningError::Io` if the file cannot be read
    /// - `LearningError::Config` if it does not parse or fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, LearningError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Parse overrides from a JSON string and validate the result.
    pub fn from_json_str(text: &str) -> Result<Self, LearningError> {
        let config: EngineConfig = serde_json::from_str(text)
            .map_err(|e| LearningError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Same configuration with every file location moved under `dir`.
    ///
    /// Relative paths are joined onto `dir`; absolute ones are kept.
    pub fn rooted_at<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        let op = &mut self.operational;
        op.qtable_path = dir.join(&op.qtable_path);
        op.history_path = dir.join(&op.history_path);
        op.slot_dir = dir.join(&op.slot_dir);
        op.log_dir = op.log_dir.take().map(|p| dir.join(p));
        self
    }

    /// Check hyperparameter ranges.
    ///
    /// # Errors
    ///
    /// `LearningError::Config` naming the first offending value.
    pub fn validate(&self) -> Result<(), LearningError> {
        let q = &self.q_learning;
        if !(q.alpha > 0.0 && q.alpha <= 1.0) {
            return Err(LearningError::Config(format!(
                "alpha must be in (0, 1], got {}",
                q.alpha
            )));
        }
        if !(0.0..=1.0).contains(&q.gamma) {
            return Err(LearningError::Config(format!(
                "gamma must be in [0, 1], got {}",
                q.gamma
            )));
        }

        let e = &self.epsilon;
        let unit_values = [
            ("epsilon.initial", e.initial),
            ("epsilon.min", e.min),
            ("epsilon.self_play_multiplier", e.self_play_multiplier),
            ("epsilon.step_factor_high", e.step_factor_high),
            ("epsilon.step_factor_low", e.step_factor_low),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(LearningError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if let Some(fixed) = e.fixed
            && !(0.0..=1.0).contains(&fixed)
        {
            return Err(LearningError::Config(format!(
                "epsilon.fixed must be in [0, 1], got {}",
                fixed
            )));
        }
        if !(e.decay > 0.0 && e.decay <= 1.0) {
            return Err(LearningError::Config(format!(
                "epsilon.decay must be in (0, 1], got {}",
                e.decay
            )));
        }

        let op = &self.operational;
        if op.move_cap == 0 {
            return Err(LearningError::Config("move_cap must be positive".to_string()));
        }
        if op.history_len == 0 {
            return Err(LearningError::Config(
                "history_len must be positive".to_string(),
            ));
        }
        if op.log_interval == 0 {
            return Err(LearningError::Config(
                "log_interval must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
