//! 自己対戦ランナー
//!
//! 同じQテーブルを共有したエージェントに黒白両方を打たせ、N局を連続で実行する。
//!
//! # 概要
//!
//! - 1局ごとに新しい`GameSession`を作成し、終局または手数上限まで打つ
//! - 手番側に合法手がなければ自動パス（手数には数えない）
//! - 終局ごとに白をAIとして勝敗を集計し、`ai_vs_ai`の履歴レコードを1件追加
//! - 1局ごとに進捗イベントを呼び出し側へ通知する
//! - キャンセルは局と局の間でのみ確認する
//! - 実行終了時（キャンセル時を含む）にQテーブルを保存する（失敗はログのみ）

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::board::{Board, has_legal_move};
use crate::config::OperationalConfig;
use crate::learning::LearningError;
use crate::learning::agent::{PlayMode, QAgent};
use crate::learning::history::{GameType, LearningHistory};
use crate::learning::logger::{SelfPlayBatch, SelfPlayLogger};
use crate::learning::qtable::QTable;
use crate::learning::session::{AiOutcome, GameSession, Winner};
use crate::learning::stats::RunStats;

/// 自己対戦のキャンセルフラグ
///
/// クローンは同じフラグを共有する。Ctrl-Cハンドラなど別スレッドから
/// `cancel`を呼んでよい。
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// キャンセルを要求する
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 次の実行のためにフラグを戻す
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 1局の終わり方
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameEnd {
    /// 両者合法手なし、または盤面が埋まった
    Terminal,
    /// 手数上限に到達（現在の盤面で採点）
    MoveCap,
}

/// 1局ごとの進捗イベント
#[derive(Clone, Debug, PartialEq)]
pub struct SelfPlayProgress {
    /// 今回の実行での局番号（1から）
    pub current_game: u64,
    /// 今回の実行の総局数
    pub total: u64,
    /// 黒勝ち数（今回の実行）
    pub win_black: u64,
    /// 白勝ち数（今回の実行）
    pub win_white: u64,
    /// 引き分け数（今回の実行）
    pub draws: u64,
    /// 累積TD更新回数
    pub learn_count: u64,
    /// 累積報酬
    pub total_reward: f64,
    /// 累積平均報酬
    pub avg_reward: f64,
    /// Qテーブルのエントリ数
    pub qtable_size: usize,
    /// この局の最終スコア `(黒, 白)`
    pub final_score: (u32, u32),
    /// この局の終わり方
    pub end: GameEnd,
    /// この局で置いた石の数
    pub moves: u32,
    /// この局の最終盤面
    pub board: Board,
}

/// 自己対戦の実行結果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelfPlaySummary {
    /// 実際に打った局数
    pub games_played: u64,
    /// 要求局数（`max_self_play_games`で頭打ち）
    pub requested: u64,
    /// キャンセルで途中終了したか
    pub cancelled: bool,
    pub black_wins: u64,
    pub white_wins: u64,
    pub draws: u64,
    /// 手数上限で終わった局数
    pub move_cap_games: u64,
    /// 実行終了時の累積TD更新回数
    pub learn_count: u64,
    /// 実行終了時のQテーブルのエントリ数
    pub qtable_size: usize,
    /// 各局の最終スコア `(黒, 白)`
    pub final_scores: Vec<(u32, u32)>,
    pub elapsed_secs: f64,
}

/// 1局分の結果
struct GameOutcome {
    end: GameEnd,
    board: Board,
    score: (u32, u32),
    moves: u32,
}

/// 自己対戦ランナー
///
/// エージェント・Qテーブル・履歴・累積統計はすべて呼び出し側から借用する。
pub struct SelfPlayRunner<'a> {
    agent: &'a mut QAgent,
    qtable: &'a mut QTable,
    history: &'a mut LearningHistory,
    stats: &'a mut RunStats,
    max_games: u64,
    move_cap: u32,
    log_interval: u64,
    log_dir: Option<PathBuf>,
    compress: bool,
    learn: bool,
    cancel: CancelToken,
    logger: Option<SelfPlayLogger>,
    save_path: Option<PathBuf>,
}

impl<'a> SelfPlayRunner<'a> {
    /// 運用設定（局数上限・手数上限・ログ）からランナーを作成
    pub fn new(
        agent: &'a mut QAgent,
        qtable: &'a mut QTable,
        history: &'a mut LearningHistory,
        stats: &'a mut RunStats,
        config: &OperationalConfig,
    ) -> Self {
        Self {
            agent,
            qtable,
            history,
            stats,
            max_games: config.max_self_play_games,
            move_cap: config.move_cap,
            log_interval: config.log_interval.max(1),
            log_dir: config.log_dir.clone(),
            compress: config.compress_qtable,
            learn: true,
            cancel: CancelToken::new(),
            logger: None,
            save_path: None,
        }
    }

    /// 外部から共有するキャンセルフラグを使う
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 指定したロガーに書き出す（`log_dir`より優先）
    pub fn with_logger(mut self, logger: SelfPlayLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 実行終了時にQテーブルを`path`へ保存する
    pub fn with_save_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// TD更新の有無（既定は学習あり）
    pub fn with_learning(mut self, learn: bool) -> Self {
        self.learn = learn;
        self
    }

    /// `num_games`局を実行する
    ///
    /// `on_progress`は1局終わるごとに呼ばれる。
    ///
    /// # エラー
    ///
    /// `log_dir`が設定されていてログファイルを開けない場合
    pub fn run<F>(mut self, num_games: u64, mut on_progress: F) -> Result<SelfPlaySummary, LearningError>
    where
        F: FnMut(&SelfPlayProgress),
    {
        if self.logger.is_none()
            && let Some(dir) = &self.log_dir
        {
            self.logger = Some(SelfPlayLogger::new(dir)?);
        }

        let total = num_games.min(self.max_games);
        if total < num_games {
            log::warn!(
                "Self-play request of {} games capped at {}",
                num_games,
                self.max_games
            );
        }
        log::info!(
            "Self-play started: {} games (Q-table {} entries, learn count {})",
            total,
            self.qtable.len(),
            self.stats.ai_learn_count
        );
        self.log_file_info(&format!("Self-play started: {} games", total));

        let start_time = Instant::now();
        let mut summary = SelfPlaySummary {
            requested: total,
            ..Default::default()
        };
        let mut batch_diffs: Vec<i32> = Vec::new();
        let mut batch_moves: Vec<u32> = Vec::new();

        for game in 1..=total {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                log::info!("Self-play cancelled after {} games", summary.games_played);
                self.log_file_warning(&format!(
                    "Cancelled after {} games",
                    summary.games_played
                ));
                break;
            }

            let outcome = self.play_game();
            let (black, white) = outcome.score;

            // AIは白として集計
            self.stats.record_outcome(white, black);
            match Winner::from_score(black, white) {
                Winner::Black => summary.black_wins += 1,
                Winner::White => summary.white_wins += 1,
                Winner::Draw => summary.draws += 1,
            }
            if outcome.end == GameEnd::MoveCap {
                summary.move_cap_games += 1;
            }
            summary.games_played += 1;
            summary.final_scores.push(outcome.score);

            self.history
                .record_game(self.stats, self.qtable.len(), outcome.score, GameType::AiVsAi);

            on_progress(&SelfPlayProgress {
                current_game: game,
                total,
                win_black: summary.black_wins,
                win_white: summary.white_wins,
                draws: summary.draws,
                learn_count: self.stats.ai_learn_count,
                total_reward: self.stats.ai_total_reward,
                avg_reward: self.stats.avg_reward(),
                qtable_size: self.qtable.len(),
                final_score: outcome.score,
                end: outcome.end,
                moves: outcome.moves,
                board: outcome.board,
            });

            batch_diffs.push(black as i32 - white as i32);
            batch_moves.push(outcome.moves);
            if game % self.log_interval == 0 {
                let batch = SelfPlayBatch::from_games(
                    game,
                    &batch_diffs,
                    &batch_moves,
                    self.stats.ai_learn_count,
                    self.stats.avg_reward(),
                    self.qtable.len(),
                    start_time.elapsed().as_secs_f64(),
                );
                log::debug!(
                    "Self-play {}/{}: black {:.1}% white {:.1}% draw {:.1}%, Q-table {} entries",
                    game,
                    total,
                    batch.black_win_rate * 100.0,
                    batch.white_win_rate * 100.0,
                    batch.draw_rate * 100.0,
                    batch.qtable_size
                );
                if let Some(logger) = self.logger.as_mut()
                    && let Err(e) = logger.log_batch(&batch)
                {
                    log::warn!("Failed to write self-play log: {}", e);
                }
                batch_diffs.clear();
                batch_moves.clear();
            }
        }

        if let Some(path) = &self.save_path
            && let Err(e) = self.qtable.save_with(path, self.compress)
        {
            log::warn!("Failed to save Q-table to {}: {}", path.display(), e);
        }

        summary.learn_count = self.stats.ai_learn_count;
        summary.qtable_size = self.qtable.len();
        summary.elapsed_secs = start_time.elapsed().as_secs_f64();

        log::info!(
            "Self-play finished: {} games (black {}, white {}, draw {}), Q-table {} entries",
            summary.games_played,
            summary.black_wins,
            summary.white_wins,
            summary.draws,
            summary.qtable_size
        );
        if let Some(logger) = self.logger.as_mut()
            && let Err(e) = logger.log_summary(&summary)
        {
            log::warn!("Failed to write self-play log: {}", e);
        }

        Ok(summary)
    }

    /// 1局を打つ
    fn play_game(&mut self) -> GameOutcome {
        let mut session = GameSession::new();
        let mut moves = 0u32;

        while !session.is_game_over() && moves < self.move_cap {
            if !has_legal_move(session.board(), session.side()) {
                session.switch_side();
                continue;
            }

            let outcome = session.agent_step(
                self.agent,
                self.qtable,
                self.learn,
                self.stats.ai_learn_count,
                PlayMode::SelfPlay,
            );
            if let AiOutcome::Placed(step) = outcome {
                moves += 1;
                if self.learn {
                    self.stats.record_learning(step.learn_count, step.reward);
                }
            }
        }

        let end = if session.is_game_over() {
            GameEnd::Terminal
        } else {
            session.force_game_over("Move cap reached");
            GameEnd::MoveCap
        };

        GameOutcome {
            end,
            board: *session.board(),
            score: session.score(),
            moves,
        }
    }

    fn log_file_info(&mut self, message: &str) {
        if let Some(logger) = self.logger.as_mut()
            && let Err(e) = logger.log_info(message)
        {
            log::warn!("Failed to write self-play log: {}", e);
        }
    }

    fn log_file_warning(&mut self, message: &str) {
        if let Some(logger) = self.logger.as_mut()
            && let Err(e) = logger.log_warning(message)
        {
            log::warn!("Failed to write self-play log: {}", e);
        }
    }
}
