//! Epsilon-greedy tabular Q-learning agent.
//!
//! # Overview
//!
//! One call to [`QAgent::choose_and_learn`] does the whole per-move cycle:
//! 1. Compute epsilon from the learn count ([`EpsilonSchedule`])
//! 2. Pick a move: uniform random with probability epsilon, otherwise the
//!    legal move with the highest Q-value (first seen in row-major order wins)
//! 3. Apply it to the board and compute the shaped reward ([`RewardShaper`])
//! 4. TD update of the chosen action:
//!    `Q(s,a) <- Q(s,a) + alpha * (r + gamma * max Q(s',a') - Q(s,a))`
//!
//! The Q-table is borrowed per call, never owned, so the same agent can
//! train both colours against one table in self-play.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::board::{Board, Color, Position, apply_move, is_legal, is_terminal, legal_moves};
use crate::config::{EngineConfig, EpsilonConfig};
use crate::learning::qtable::QTable;
use crate::learning::reward::RewardShaper;
use crate::state_key::{KeyMode, action_key};

/// Whether the agent is playing a human or itself.
///
/// Self-play scales epsilon down by `self_play_multiplier`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayMode {
    #[default]
    Interactive,
    SelfPlay,
}

/// Decaying exploration rate.
///
/// # Schedule
///
/// | Step | Value |
/// |------|-------|
/// | base | `max(min, initial * decay^learn_count)` |
/// | self-play | `* self_play_multiplier` |
/// | `learn_count > step_threshold_high` | `* step_factor_high` |
/// | else `learn_count > step_threshold_low` | `* step_factor_low` |
///
/// A `fixed` value in the configuration replaces the whole schedule.
#[derive(Clone, Debug, Default)]
pub struct EpsilonSchedule {
    config: EpsilonConfig,
}

impl EpsilonSchedule {
    pub fn new(config: EpsilonConfig) -> Self {
        Self { config }
    }

    /// Epsilon after `learn_count` TD updates.
    ///
    /// # Examples
    ///
    /// ```
    /// use reversi_qlearn::config::EpsilonConfig;
    /// use reversi_qlearn::learning::{EpsilonSchedule, PlayMode};
    ///
    /// let schedule = EpsilonSchedule::new(EpsilonConfig::default());
    /// assert_eq!(schedule.epsilon(0, PlayMode::Interactive), 0.3);
    /// assert!((schedule.epsilon(0, PlayMode::SelfPlay) - 0.24).abs() < 1e-12);
    /// ```
    pub fn epsilon(&self, learn_count: u64, mode: PlayMode) -> f64 {
        let cfg = &self.config;
        if let Some(fixed) = cfg.fixed {
            return fixed;
        }

        let exponent = learn_count.min(i32::MAX as u64) as i32;
        let mut epsilon = (cfg.initial * cfg.decay.powi(exponent)).max(cfg.min);
        if mode == PlayMode::SelfPlay {
            epsilon *= cfg.self_play_multiplier;
        }
        if learn_count > cfg.step_threshold_high {
            epsilon *= cfg.step_factor_high;
        } else if learn_count > cfg.step_threshold_low {
            epsilon *= cfg.step_factor_low;
        }
        epsilon
    }
}

/// Move decided by the agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveChoice {
    Place(Position),
    /// No legal move for the side to play.
    Pass,
}

impl MoveChoice {
    pub fn position(self) -> Option<Position> {
        match self {
            MoveChoice::Place(pos) => Some(pos),
            MoveChoice::Pass => None,
        }
    }
}

/// Result of one agent move.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentStep {
    pub choice: MoveChoice,
    /// Stones turned by the move (empty on a pass or an illegal move).
    pub flipped: Vec<Position>,
    /// Reward credited to the move; 0 on a pass.
    pub reward: f64,
    /// Learn count after this step.
    pub learn_count: u64,
    /// Whether the move was drawn at random.
    pub explored: bool,
    /// Whether the move was legal. Always true for chosen moves.
    pub legal: bool,
    /// Whether the board is terminal after the move.
    pub terminal: bool,
}

impl AgentStep {
    fn pass(learn_count: u64, terminal: bool) -> Self {
        Self {
            choice: MoveChoice::Pass,
            flipped: Vec::new(),
            reward: 0.0,
            learn_count,
            explored: false,
            legal: true,
            terminal,
        }
    }

    /// Whether a TD update was issued.
    pub fn learned(&self, learn_count_before: u64) -> bool {
        self.learn_count > learn_count_before
    }
}

/// Tabular Q-learning agent.
///
/// Holds the hyperparameters, the reward shaper and its own RNG; the
/// Q-table and the learn count are supplied by the caller.
#[derive(Debug)]
pub struct QAgent {
    rng: StdRng,
    schedule: EpsilonSchedule,
    shaper: RewardShaper,
    alpha: f64,
    gamma: f64,
    key_mode: KeyMode,
}

impl QAgent {
    /// Create an agent from the engine configuration.
    ///
    /// The RNG is seeded from `operational.seed` when set, otherwise from the
    /// operating system.
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.operational.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }

    /// Create an agent with an explicit RNG.
    pub fn with_rng(config: &EngineConfig, rng: StdRng) -> Self {
        Self {
            rng,
            schedule: EpsilonSchedule::new(config.epsilon.clone()),
            shaper: RewardShaper::new(config.reward.clone()),
            alpha: config.q_learning.alpha,
            gamma: config.q_learning.gamma,
            key_mode: config.q_learning.key_mode,
        }
    }

    /// Reset the RNG to a fixed seed.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn schedule(&self) -> &EpsilonSchedule {
        &self.schedule
    }

    pub fn shaper(&self) -> &RewardShaper {
        &self.shaper
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    /// Q-table key of playing `pos` for `side` on `board`.
    pub fn action_key(&self, board: &Board, side: Color, pos: Position) -> String {
        action_key(&self.key_mode.state_key(board, side), pos)
    }

    /// Select a move with the epsilon-greedy policy.
    ///
    /// # Returns
    ///
    /// `None` if `side` has no legal move, otherwise the move and whether it
    /// was an exploration draw.
    pub fn select_move(
        &mut self,
        qtable: &QTable,
        board: &Board,
        side: Color,
        learn_count: u64,
        mode: PlayMode,
    ) -> Option<(Position, bool)> {
        let moves = legal_moves(board, side);
        if moves.is_empty() {
            return None;
        }

        let epsilon = self.schedule.epsilon(learn_count, mode);
        if self.rng.random::<f64>() < epsilon {
            let pos = moves[self.rng.random_range(0..moves.len())];
            return Some((pos, true));
        }
        Some((self.greedy_among(qtable, board, side, &moves), false))
    }

    /// Highest-Q legal move; ties keep the first in row-major order.
    ///
    /// Falls back to a uniform random legal move when none of the legal moves
    /// has an entry in the table yet.
    pub fn greedy_move(&mut self, qtable: &QTable, board: &Board, side: Color) -> Option<Position> {
        let moves = legal_moves(board, side);
        if moves.is_empty() {
            return None;
        }
        Some(self.greedy_among(qtable, board, side, &moves))
    }

    fn greedy_among(
        &mut self,
        qtable: &QTable,
        board: &Board,
        side: Color,
        moves: &[Position],
    ) -> Position {
        let state = self.key_mode.state_key(board, side);
        let mut best: Option<(Position, f64)> = None;
        let mut any_known = false;
        for &pos in moves {
            let key = action_key(&state, pos);
            any_known |= qtable.contains_key(&key);
            let q = qtable.get(&key);
            match best {
                Some((_, best_q)) if q <= best_q => {}
                _ => best = Some((pos, q)),
            }
        }

        match best {
            Some((pos, _)) if any_known => pos,
            _ => moves[self.rng.random_range(0..moves.len())],
        }
    }

    /// Choose a move for `side`, apply it to `board` and learn from it.
    ///
    /// # Arguments
    ///
    /// * `qtable` - Table read for selection and written by the TD update
    /// * `board` - Position before the move; updated in place
    /// * `side` - Colour the agent plays this move
    /// * `learn` - Whether to issue the TD update
    /// * `learn_count` - Current number of TD updates (drives epsilon)
    /// * `mode` - Interactive or self-play
    ///
    /// # Returns
    ///
    /// The step taken. When `side` has no legal move this is a pass with zero
    /// reward and no update.
    pub fn choose_and_learn(
        &mut self,
        qtable: &mut QTable,
        board: &mut Board,
        side: Color,
        learn: bool,
        learn_count: u64,
        mode: PlayMode,
    ) -> AgentStep {
        match self.select_move(qtable, board, side, learn_count, mode) {
            Some((pos, explored)) => {
                let mut step = self.play_move(qtable, board, pos, side, learn, learn_count);
                step.explored = explored;
                step
            }
            None => AgentStep::pass(learn_count, is_terminal(board)),
        }
    }

    /// Play `pos` for `side` and learn from it.
    ///
    /// An illegal move leaves the board untouched; with `learn` set, its
    /// action is pulled towards the invalid-move penalty instead.
    pub fn play_move(
        &mut self,
        qtable: &mut QTable,
        board: &mut Board,
        pos: Position,
        side: Color,
        learn: bool,
        learn_count: u64,
    ) -> AgentStep {
        let key = self.action_key(board, side, pos);

        if !is_legal(board, pos, side) {
            let reward = self.shaper.invalid();
            let mut learn_count = learn_count;
            if learn {
                self.td_update(qtable, key, reward, 0.0);
                learn_count += 1;
            }
            log::debug!("Illegal agent move {} for {}", pos, side);
            return AgentStep {
                choice: MoveChoice::Place(pos),
                flipped: Vec::new(),
                reward,
                learn_count,
                explored: false,
                legal: false,
                terminal: is_terminal(board),
            };
        }

        let before = *board;
        let flipped = apply_move(board, pos, side);
        let terminal = is_terminal(board);
        let reward = self
            .shaper
            .reward(&before, board, pos, side, flipped.len(), terminal);

        let mut learn_count = learn_count;
        if learn {
            let max_next = if terminal {
                0.0
            } else {
                self.max_next_q(qtable, board, side.opposite())
            };
            self.td_update(qtable, key, reward, max_next);
            learn_count += 1;
        }

        AgentStep {
            choice: MoveChoice::Place(pos),
            flipped,
            reward,
            learn_count,
            explored: false,
            legal: true,
            terminal,
        }
    }

    /// Maximum Q-value over `next_side`'s legal moves, 0 when it has none.
    pub fn max_next_q(&self, qtable: &QTable, board: &Board, next_side: Color) -> f64 {
        let state = self.key_mode.state_key(board, next_side);
        legal_moves(board, next_side)
            .into_iter()
            .map(|pos| qtable.get(&action_key(&state, pos)))
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// Apply one TD update to `key` and return the new value.
    pub fn td_update(&self, qtable: &mut QTable, key: String, reward: f64, max_next: f64) -> f64 {
        let old_q = qtable.get(&key);
        let new_q = old_q + self.alpha * (reward + self.gamma * max_next - old_q);
        qtable.set(key, new_q);
        new_q
    }
}
