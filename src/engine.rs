//! Engine facade.
//!
//! `ReversiEngine` owns everything a front end needs for one run: the current
//! game, the agent, the Q-table, the run statistics, the learning history and
//! the slot store. A UI only calls the methods below and renders what they
//! return; it never touches the learning types directly.
//!
//! | Area | Methods |
//! |------|---------|
//! | Game | `new_game`, `reset_game`, `human_place`, `ai_step`, `score`, `winner`, `game_over`, `current_side`, `last_ai_move`, `message` |
//! | Self-play | `start_self_play`, `cancel_self_play`, `cancel_token` |
//! | Slots | `save_slot`, `overwrite_slot`, `load_slot`, `delete_slot`, `list_slots`, `create_slot` |
//! | Stats | `current_stats`, `cumulative_stats`, `ai_level` |
//! | Active files | `save_active`, `load_active` |
//!
//! Persistence errors come back as `Err` from the slot and active-file
//! calls and leave the in-memory state untouched.

use crate::board::{Board, Color, Position};
use crate::config::EngineConfig;
use crate::learning::{
    AiLevel, AiOutcome, CancelToken, CumulativeStats, GameSession, GameType, LearningError,
    LearningHistory, PlaceOutcome, QAgent, QTable, RunStats, SelfPlayProgress, SelfPlayRunner,
    SelfPlaySummary, SlotStore, Winner,
};

/// Core engine behind a human-vs-AI front end.
#[derive(Debug)]
pub struct ReversiEngine {
    config: EngineConfig,
    agent: QAgent,
    qtable: QTable,
    history: LearningHistory,
    stats: RunStats,
    session: GameSession,
    slots: SlotStore,
    cancel: CancelToken,
    /// Whether the active files are written (set by `open`).
    persistent: bool,
    /// Whether the current game already has its history record.
    recorded: bool,
}

impl ReversiEngine {
    /// Create an engine with an empty Q-table and history, without touching
    /// the active files.
    ///
    /// # Errors
    ///
    /// `LearningError::Config` if the configuration fails validation.
    pub fn new(config: EngineConfig) -> Result<Self, LearningError> {
        config.validate()?;
        let op = &config.operational;
        let slots = SlotStore::new(&op.slot_dir).with_compression(op.compress_qtable);
        Ok(Self {
            agent: QAgent::new(&config),
            qtable: QTable::new(),
            history: LearningHistory::new(op.history_len),
            stats: RunStats::default(),
            session: GameSession::new(),
            slots,
            cancel: CancelToken::new(),
            persistent: false,
            recorded: false,
            config,
        })
    }

    /// Create an engine backed by the active Q-table and history files.
    ///
    /// Missing or unreadable files start empty (and are logged); the history
    /// is written through on every record and the Q-table is saved at the
    /// end of each self-play run.
    pub fn open(config: EngineConfig) -> Result<Self, LearningError> {
        let mut engine = Self::new(config)?;
        let op = &engine.config.operational;
        engine.qtable = QTable::load_or_empty(&op.qtable_path);
        engine.history = LearningHistory::load_or_empty(&op.history_path, op.history_len);
        engine.stats = engine.history.run_stats();
        engine.persistent = true;
        log::info!(
            "Engine opened: {} Q entries, {} history records, learn count {}",
            engine.qtable.len(),
            engine.history.len(),
            engine.stats.ai_learn_count
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ===== Game =====

    /// Start a new game from the initial position.
    pub fn new_game(&mut self) {
        self.session.reset();
        self.recorded = false;
    }

    /// Same as [`ReversiEngine::new_game`].
    pub fn reset_game(&mut self) {
        self.new_game();
    }

    /// Human (black) move at `(row, col)`.
    ///
    /// Off-board coordinates are reported as illegal.
    pub fn human_place(&mut self, row: usize, col: usize) -> PlaceOutcome {
        let Some(pos) = Position::try_new(row, col) else {
            return PlaceOutcome::Illegal;
        };
        let outcome = self.session.human_place(pos);
        self.record_if_finished();
        outcome
    }

    /// AI (white) move, learning from it.
    pub fn ai_step(&mut self) -> AiOutcome {
        let outcome = self.session.ai_step(
            &mut self.agent,
            &mut self.qtable,
            true,
            self.stats.ai_learn_count,
        );
        if let AiOutcome::Placed(step) = &outcome
            && step.learned(self.stats.ai_learn_count)
        {
            self.stats.record_learning(step.learn_count, step.reward);
        }
        self.record_if_finished();
        outcome
    }

    fn record_if_finished(&mut self) {
        if self.recorded || !self.session.is_game_over() {
            return;
        }
        let (black, white) = self.session.score();
        self.stats.record_outcome(white, black);
        self.history.record_game(
            &self.stats,
            self.qtable.len(),
            (black, white),
            GameType::HumanVsAi,
        );
        self.recorded = true;
        log::info!(
            "Game finished: Black {} - White {} ({} games)",
            black,
            white,
            self.stats.game_count
        );
    }

    pub fn score(&self) -> (u32, u32) {
        self.session.score()
    }

    pub fn winner(&self) -> Winner {
        self.session.winner()
    }

    pub fn game_over(&self) -> bool {
        self.session.is_game_over()
    }

    pub fn current_side(&self) -> Color {
        self.session.side()
    }

    pub fn last_ai_move(&self) -> Option<Position> {
        self.session.last_ai_move()
    }

    pub fn message(&self) -> &str {
        self.session.message()
    }

    pub fn board(&self) -> &Board {
        self.session.board()
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    // ===== Self-play =====

    /// Run `num_games` self-play games, calling `on_progress` after each.
    ///
    /// Clears any earlier cancellation first. A persistent engine saves the
    /// Q-table to the active path when the run ends or is cancelled.
    pub fn start_self_play<F>(
        &mut self,
        num_games: u64,
        on_progress: F,
    ) -> Result<SelfPlaySummary, LearningError>
    where
        F: FnMut(&SelfPlayProgress),
    {
        self.cancel.reset();
        let mut runner = SelfPlayRunner::new(
            &mut self.agent,
            &mut self.qtable,
            &mut self.history,
            &mut self.stats,
            &self.config.operational,
        )
        .with_cancel(self.cancel.clone());
        if self.persistent {
            runner = runner.with_save_path(self.config.operational.qtable_path.clone());
        }
        runner.run(num_games, on_progress)
    }

    /// Request cancellation of the running self-play (checked between games).
    pub fn cancel_self_play(&self) {
        self.cancel.cancel();
    }

    /// Shared cancellation flag, e.g. for a Ctrl-C handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // ===== Slots =====

    pub fn save_slot(&self, name: &str) -> Result<(), LearningError> {
        self.slots.save(name, &self.qtable, &self.history)
    }

    pub fn overwrite_slot(&self, name: &str) -> Result<(), LearningError> {
        self.slots.overwrite(name, &self.qtable, &self.history)
    }

    /// Replace the Q-table, history and run statistics with slot `name`.
    ///
    /// Nothing changes unless both slot files load.
    pub fn load_slot(&mut self, name: &str) -> Result<(), LearningError> {
        let (qtable, mut history) = self
            .slots
            .load(name, self.config.operational.history_len)?;
        history.set_path(self.history.path().map(|p| p.to_path_buf()));
        self.install(qtable, history);
        Ok(())
    }

    /// Best-effort removal of both slot files.
    pub fn delete_slot(&self, name: &str) -> Result<(), LearningError> {
        self.slots.delete(name)
    }

    pub fn list_slots(&self) -> Result<Vec<String>, LearningError> {
        self.slots.list()
    }

    /// Save an empty Q-table and history as slot `name` and make them active.
    pub fn create_slot(&mut self, name: &str) -> Result<(), LearningError> {
        let (qtable, mut history) = self
            .slots
            .create_new(name, self.config.operational.history_len)?;
        history.set_path(self.history.path().map(|p| p.to_path_buf()));
        self.install(qtable, history);
        Ok(())
    }

    fn install(&mut self, qtable: QTable, history: LearningHistory) {
        self.qtable = qtable;
        self.history = history;
        self.stats = self.history.run_stats();
    }

    pub fn slot_store(&self) -> &SlotStore {
        &self.slots
    }

    // ===== Stats =====

    pub fn current_stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn cumulative_stats(&self) -> CumulativeStats {
        self.history.cumulative_stats()
    }

    pub fn ai_level(&self) -> AiLevel {
        self.history.ai_level()
    }

    pub fn qtable(&self) -> &QTable {
        &self.qtable
    }

    pub fn history(&self) -> &LearningHistory {
        &self.history
    }

    // ===== Active files =====

    /// Write the Q-table and history to the active paths.
    pub fn save_active(&self) -> Result<(), LearningError> {
        let op = &self.config.operational;
        self.qtable.save_with(&op.qtable_path, op.compress_qtable)?;
        self.history.save(&op.history_path)?;
        Ok(())
    }

    /// Reload the Q-table and history from the active paths.
    ///
    /// Both files must load; otherwise nothing changes.
    pub fn load_active(&mut self) -> Result<(), LearningError> {
        let op = &self.config.operational;
        let qtable = QTable::load(&op.qtable_path)?;
        let mut history = LearningHistory::load(&op.history_path, op.history_len)?;
        if self.persistent {
            history.set_path(Some(op.history_path.clone()));
        }
        self.install(qtable, history);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine_in(dir: &std::path::Path) -> ReversiEngine {
        let mut config = EngineConfig::default().rooted_at(dir);
        config.operational.seed = Some(21);
        ReversiEngine::new(config).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.q_learning.gamma = 2.0;
        assert!(matches!(
            ReversiEngine::new(config),
            Err(LearningError::Config(_))
        ));
    }

    #[test]
    fn test_human_then_ai() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());

        assert!(matches!(engine.human_place(2, 3), PlaceOutcome::Placed { .. }));
        assert_eq!(engine.score(), (4, 1));
        assert_eq!(engine.current_side(), Color::White);

        assert!(matches!(engine.ai_step(), AiOutcome::Placed(_)));
        assert!(engine.last_ai_move().is_some());
        assert_eq!(engine.current_stats().ai_learn_count, 1);
        assert_eq!(engine.qtable().len(), 1);
    }

    #[test]
    fn test_off_board_is_illegal() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        assert_eq!(engine.human_place(8, 0), PlaceOutcome::Illegal);
        assert_eq!(engine.score(), (2, 2));
    }

    #[test]
    fn test_full_game_records_once() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());

        // 人間側は常に行優先で最初の合法手を打つ
        let mut guard = 0;
        while !engine.game_over() && guard < 200 {
            guard += 1;
            if engine.current_side() == Color::Black {
                let pos = crate::board::legal_moves(engine.board(), Color::Black)[0];
                engine.human_place(pos.row as usize, pos.col as usize);
            } else {
                engine.ai_step();
            }
        }
        assert!(engine.game_over());
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history().latest().unwrap().game_type, GameType::HumanVsAi);
        assert_eq!(engine.current_stats().game_count, 1);

        // 終局後の呼び出しでは記録しない
        engine.ai_step();
        assert_eq!(engine.history().len(), 1);

        engine.new_game();
        assert!(!engine.game_over());
        assert_eq!(engine.score(), (2, 2));
    }

    #[test]
    fn test_slot_load_restores_stats() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        engine.start_self_play(2, |_| {}).unwrap();
        let saved_stats = engine.current_stats().clone();
        engine.save_slot("alpha").unwrap();

        engine.start_self_play(2, |_| {}).unwrap();
        assert_ne!(engine.current_stats(), &saved_stats);

        engine.load_slot("alpha").unwrap();
        assert_eq!(engine.current_stats(), &saved_stats);
    }

    #[test]
    fn test_failed_slot_load_keeps_state() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        engine.start_self_play(1, |_| {}).unwrap();
        let before = engine.qtable().clone();

        assert!(matches!(
            engine.load_slot("missing"),
            Err(LearningError::UnknownSlot(_))
        ));
        assert!(matches!(
            engine.load_slot("bad name"),
            Err(LearningError::InvalidSlotName(_))
        ));
        assert_eq!(engine.qtable(), &before);
    }

    #[test]
    fn test_create_slot_clears_state() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        engine.start_self_play(1, |_| {}).unwrap();

        engine.create_slot("fresh").unwrap();
        assert!(engine.qtable().is_empty());
        assert!(engine.history().is_empty());
        assert_eq!(engine.current_stats(), &RunStats::default());
        assert_eq!(engine.list_slots().unwrap(), vec!["fresh"]);
    }

    #[test]
    fn test_in_memory_engine_writes_no_active_files() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        engine.start_self_play(1, |_| {}).unwrap();
        assert!(!dir.path().join("qtable.blob").exists());
        assert!(!dir.path().join("learning_history.doc").exists());
    }

    #[test]
    fn test_open_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let mut config = EngineConfig::default().rooted_at(dir.path());
        config.operational.seed = Some(5);

        let (size, stats) = {
            let mut engine = ReversiEngine::open(config.clone()).unwrap();
            engine.start_self_play(2, |_| {}).unwrap();
            (engine.qtable().len(), engine.current_stats().clone())
        };
        assert!(dir.path().join("qtable.blob").exists());
        assert!(dir.path().join("learning_history.doc").exists());

        let engine = ReversiEngine::open(config).unwrap();
        assert_eq!(engine.qtable().len(), size);
        assert_eq!(engine.current_stats(), &stats);
        assert_eq!(engine.history().len(), 2);
    }

    #[test]
    fn test_save_and_load_active() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        engine.start_self_play(1, |_| {}).unwrap();
        engine.save_active().unwrap();
        let snapshot = engine.qtable().clone();

        engine.start_self_play(1, |_| {}).unwrap();
        engine.load_active().unwrap();
        assert_eq!(engine.qtable(), &snapshot);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        let token = engine.cancel_token();

        let summary = engine
            .start_self_play(5, |p| {
                if p.current_game == 1 {
                    token.cancel();
                }
            })
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.games_played, 1);

        // 次の実行ではキャンセルが解除される
        let summary = engine.start_self_play(1, |_| {}).unwrap();
        assert!(!summary.cancelled);
    }
}
