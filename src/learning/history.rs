//! 学習履歴
//!
//! 終局ごとに1件の`LearningRecord`を追加する上限付きリング。
//! 追加のたびにリング全体をJSON文書として書き出す（設定されていれば）。
//!
//! # 保存形式
//!
//! ```json
//! [
//!   {
//!     "timestamp": "2026-01-01T12:00:00+09:00",
//!     "game_count": 1,
//!     "ai_learn_count": 30,
//!     ...
//!     "game_type": "ai_vs_ai"
//!   }
//! ]
//! ```
//!
//! 最新のレコードが末尾。レコードは書き込み後に変更しない。

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::learning::LearningError;
use crate::learning::persist;
use crate::learning::stats::{AiLevel, RunStats};

/// 対局の種類
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// 人間対AI
    HumanVsAi,
    /// 自己対戦
    AiVsAi,
    /// 不明（古い文書など）
    #[default]
    Unknown,
}

/// 1ゲーム分の履歴レコード
///
/// カウンタはすべてそのゲーム終了時点の累積値。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    /// ISO 8601形式のタイムスタンプ
    pub timestamp: String,
    pub game_count: u64,
    pub ai_learn_count: u64,
    pub ai_win_count: u64,
    pub ai_lose_count: u64,
    pub ai_draw_count: u64,
    pub ai_total_reward: f64,
    /// `ai_total_reward / ai_learn_count`（学習回数0なら0）
    pub ai_avg_reward: f64,
    pub qtable_size: u64,
    pub black_stones: u32,
    pub white_stones: u32,
    /// 勝率（%）
    pub win_rate: f64,
    /// 勝敗引き分けの合計
    pub total_games: u64,
    #[serde(default)]
    pub game_type: GameType,
}

impl LearningRecord {
    /// 累積統計と終局盤面からレコードを作成（派生値を計算する）
    pub fn new(
        stats: &RunStats,
        qtable_size: usize,
        final_score: (u32, u32),
        game_type: GameType,
    ) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            game_count: stats.game_count,
            ai_learn_count: stats.ai_learn_count,
            ai_win_count: stats.ai_win_count,
            ai_lose_count: stats.ai_lose_count,
            ai_draw_count: stats.ai_draw_count,
            ai_total_reward: stats.ai_total_reward,
            ai_avg_reward: stats.avg_reward(),
            qtable_size: qtable_size as u64,
            black_stones: final_score.0,
            white_stones: final_score.1,
            win_rate: stats.win_rate(),
            total_games: stats.total_games(),
            game_type,
        }
    }
}

/// 履歴全体から計算した累積統計
///
/// 連続するレコード間の増分を`max(0, 現在 - 直前)`で合算するため、
/// スロット読み込みなどでカウンタが巻き戻っても減少しない。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CumulativeStats {
    pub learn_count: u64,
    pub win_count: u64,
    pub lose_count: u64,
    pub draw_count: u64,
    pub total_reward: f64,
    /// `win_count + lose_count + draw_count`
    pub total_games: u64,
    pub avg_reward: f64,
    /// 勝率（%）
    pub win_rate: f64,
    /// 最新レコードのQテーブルサイズ
    pub qtable_size: u64,
}

impl CumulativeStats {
    /// 累積統計から判定したAIレベル
    pub fn level(&self) -> AiLevel {
        AiLevel::from_progress(self.learn_count, self.win_rate)
    }
}

/// 上限付きの学習履歴
#[derive(Clone, Debug)]
pub struct LearningHistory {
    records: VecDeque<LearningRecord>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl LearningHistory {
    /// メモリ上のみの空の履歴
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            path: None,
        }
    }

    /// 追加のたびに`path`へ書き出す空の履歴
    pub fn with_path<P: Into<PathBuf>>(capacity: usize, path: P) -> Self {
        let mut history = Self::new(capacity);
        history.path = Some(path.into());
        history
    }

    /// 書き出し先を変更（`None`で書き出し停止）
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 古い順のレコード
    pub fn records(&self) -> impl Iterator<Item = &LearningRecord> {
        self.records.iter()
    }

    /// 最新のレコード
    pub fn latest(&self) -> Option<&LearningRecord> {
        self.records.back()
    }

    /// 全レコードを削除
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// レコードを追加し、上限を超えた古いレコードを捨てる
    ///
    /// 書き出し先が設定されていればリング全体を書き出す。
    /// 書き出しの失敗はログに残すだけでゲーム側には返さない。
    pub fn add_record(&mut self, record: LearningRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }

        if let Some(path) = self.path.clone()
            && let Err(e) = self.save(&path)
        {
            log::warn!("Failed to write learning history {}: {}", path.display(), e);
        }
    }

    /// 累積統計からレコードを作って追加する
    pub fn record_game(
        &mut self,
        stats: &RunStats,
        qtable_size: usize,
        final_score: (u32, u32),
        game_type: GameType,
    ) {
        self.add_record(LearningRecord::new(stats, qtable_size, final_score, game_type));
    }

    pub fn win_rate_history(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.win_rate).collect()
    }

    pub fn avg_reward_history(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.ai_avg_reward).collect()
    }

    pub fn qtable_size_history(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.qtable_size).collect()
    }

    pub fn learn_count_history(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.ai_learn_count).collect()
    }

    /// 増分合算による累積統計
    pub fn cumulative_stats(&self) -> CumulativeStats {
        let mut stats = CumulativeStats::default();
        let mut prev: Option<&LearningRecord> = None;

        for record in &self.records {
            let (learn, win, lose, draw, reward) = match prev {
                Some(p) => (
                    record.ai_learn_count.saturating_sub(p.ai_learn_count),
                    record.ai_win_count.saturating_sub(p.ai_win_count),
                    record.ai_lose_count.saturating_sub(p.ai_lose_count),
                    record.ai_draw_count.saturating_sub(p.ai_draw_count),
                    (record.ai_total_reward - p.ai_total_reward).max(0.0),
                ),
                None => (
                    record.ai_learn_count,
                    record.ai_win_count,
                    record.ai_lose_count,
                    record.ai_draw_count,
                    record.ai_total_reward.max(0.0),
                ),
            };
            stats.learn_count += learn;
            stats.win_count += win;
            stats.lose_count += lose;
            stats.draw_count += draw;
            stats.total_reward += reward;
            prev = Some(record);
        }

        stats.total_games = stats.win_count + stats.lose_count + stats.draw_count;
        stats.avg_reward = if stats.learn_count > 0 {
            stats.total_reward / stats.learn_count as f64
        } else {
            0.0
        };
        stats.win_rate = if stats.total_games > 0 {
            stats.win_count as f64 / stats.total_games as f64 * 100.0
        } else {
            0.0
        };
        stats.qtable_size = self.latest().map_or(0, |r| r.qtable_size);
        stats
    }

    /// 累積統計から判定したAIレベル
    pub fn ai_level(&self) -> AiLevel {
        self.cumulative_stats().level()
    }

    /// 最新レコードから復元した累積カウンタ
    pub fn run_stats(&self) -> RunStats {
        self.latest().map(RunStats::from_record).unwrap_or_default()
    }

    /// JSON文書に変換
    pub fn to_json(&self) -> Result<String, LearningError> {
        serde_json::to_string_pretty(&self.records)
            .map_err(|e| LearningError::InvalidHistory(e.to_string()))
    }

    /// JSON文書から読み込む（上限を超える分は古い方から捨てる）
    pub fn from_json(text: &str, capacity: usize) -> Result<Self, LearningError> {
        let records: Vec<LearningRecord> =
            serde_json::from_str(text).map_err(|e| LearningError::InvalidHistory(e.to_string()))?;
        let mut history = Self::new(capacity);
        let skip = records.len().saturating_sub(history.capacity);
        history.records.extend(records.into_iter().skip(skip));
        Ok(history)
    }

    /// リング全体を`path`へ書き出す（一時ファイル経由）
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LearningError> {
        let json = self.to_json()?;
        persist::write_atomic(path.as_ref(), json.as_bytes())?;
        log::debug!(
            "Saved learning history: {} ({} records)",
            path.as_ref().display(),
            self.records.len()
        );
        Ok(())
    }

    /// `path`から読み込む。書き出し先は設定しない。
    pub fn load<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self, LearningError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text, capacity)
    }

    /// 読み込めなければ空の履歴を返す（書き出し先は`path`）
    pub fn load_or_empty<P: AsRef<Path>>(path: P, capacity: usize) -> Self {
        let path = path.as_ref();
        let mut history = match Self::load(path, capacity) {
            Ok(history) => {
                log::info!(
                    "Loaded learning history: {} ({} records)",
                    path.display(),
                    history.len()
                );
                history
            }
            Err(LearningError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No learning history at {}, starting empty", path.display());
                Self::new(capacity)
            }
            Err(e) => {
                log::warn!(
                    "Failed to load learning history {}: {}; starting empty",
                    path.display(),
                    e
                );
                Self::new(capacity)
            }
        };
        history.path = Some(path.to_path_buf());
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stats(learn: u64, win: u64, lose: u64, draw: u64, reward: f64) -> RunStats {
        RunStats {
            game_count: win + lose + draw,
            ai_learn_count: learn,
            ai_win_count: win,
            ai_lose_count: lose,
            ai_draw_count: draw,
            ai_total_reward: reward,
        }
    }

    fn record(learn: u64, win: u64, lose: u64, draw: u64, reward: f64) -> LearningRecord {
        LearningRecord::new(
            &stats(learn, win, lose, draw, reward),
            learn as usize,
            (30, 34),
            GameType::AiVsAi,
        )
    }

    // ===== レコード =====

    #[test]
    fn test_record_derived_fields() {
        let r = record(10, 1, 1, 0, 25.0);
        assert_eq!(r.ai_avg_reward, 2.5);
        assert_eq!(r.win_rate, 50.0);
        assert_eq!(r.total_games, 2);
        assert_eq!(r.game_type, GameType::AiVsAi);
        assert!(chrono::DateTime::parse_from_rfc3339(&r.timestamp).is_ok());
    }

    #[test]
    fn test_record_json_field_names() {
        let json = serde_json::to_value(record(1, 1, 0, 0, 1.0)).unwrap();
        let obj = json.as_object().unwrap();
        for field in [
            "timestamp",
            "game_count",
            "ai_learn_count",
            "ai_win_count",
            "ai_lose_count",
            "ai_draw_count",
            "ai_total_reward",
            "ai_avg_reward",
            "qtable_size",
            "black_stones",
            "white_stones",
            "win_rate",
            "total_games",
            "game_type",
        ] {
            assert!(obj.contains_key(field), "missing {}", field);
        }
        assert_eq!(obj.len(), 14);
        assert_eq!(obj["game_type"], "ai_vs_ai");
    }

    // ===== リング =====

    #[test]
    fn test_ring_evicts_oldest() {
        let mut history = LearningHistory::new(3);
        for i in 1..=5 {
            history.add_record(record(i, i, 0, 0, 0.0));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.learn_count_history(), vec![3, 4, 5]);
        assert_eq!(history.latest().unwrap().ai_learn_count, 5);
    }

    #[test]
    fn test_series_views() {
        let mut history = LearningHistory::new(10);
        history.add_record(record(4, 1, 0, 0, 8.0));
        history.add_record(record(8, 1, 1, 0, 8.0));
        assert_eq!(history.win_rate_history(), vec![100.0, 50.0]);
        assert_eq!(history.avg_reward_history(), vec![2.0, 1.0]);
        assert_eq!(history.qtable_size_history(), vec![4, 8]);
    }

    // ===== 累積統計 =====

    #[test]
    fn test_cumulative_stats_empty() {
        let c = LearningHistory::new(5).cumulative_stats();
        assert_eq!(c, CumulativeStats::default());
        assert_eq!(c.level(), AiLevel::Beginner);
    }

    #[test]
    fn test_cumulative_stats_absorbs_resets() {
        let mut history = LearningHistory::new(10);
        history.add_record(record(10, 1, 0, 0, 20.0));
        history.add_record(record(20, 1, 1, 0, 30.0));
        // カウンタの巻き戻り（スロット読み込み相当）
        history.add_record(record(5, 0, 0, 1, 5.0));
        history.add_record(record(15, 1, 0, 1, 15.0));

        let c = history.cumulative_stats();
        assert_eq!(c.learn_count, 10 + 10 + 0 + 10);
        assert_eq!(c.win_count, 1 + 0 + 0 + 1);
        assert_eq!(c.lose_count, 1);
        assert_eq!(c.draw_count, 1);
        assert_eq!(c.total_games, c.win_count + c.lose_count + c.draw_count);
        assert_eq!(c.total_reward, 20.0 + 10.0 + 0.0 + 10.0);
        assert_eq!(c.avg_reward, c.total_reward / c.learn_count as f64);
        assert_eq!(c.win_rate, 50.0);
        assert_eq!(c.qtable_size, 15);
    }

    #[test]
    fn test_run_stats_from_latest() {
        let mut history = LearningHistory::new(10);
        assert_eq!(history.run_stats(), RunStats::default());
        history.add_record(record(12, 2, 1, 0, 6.0));
        assert_eq!(history.run_stats(), stats(12, 2, 1, 0, 6.0));
    }

    // ===== 永続化 =====

    #[test]
    fn test_write_through_on_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("learning_history.doc");
        let mut history = LearningHistory::with_path(5, &path);

        history.add_record(record(1, 1, 0, 0, 1.0));
        history.add_record(record(2, 1, 1, 0, 1.5));

        let loaded = LearningHistory::load(&path, 5).unwrap();
        assert_eq!(loaded.records().collect::<Vec<_>>(), history.records().collect::<Vec<_>>());
        assert!(loaded.path().is_none());
    }

    #[test]
    fn test_from_json_truncates_to_capacity() {
        let mut history = LearningHistory::new(10);
        for i in 1..=6 {
            history.add_record(record(i, 0, i, 0, 0.0));
        }
        let json = history.to_json().unwrap();
        let loaded = LearningHistory::from_json(&json, 4).unwrap();
        assert_eq!(loaded.learn_count_history(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_missing_game_type_is_unknown() {
        let json = r#"[{
            "timestamp": "2026-01-01T00:00:00+00:00",
            "game_count": 1, "ai_learn_count": 3,
            "ai_win_count": 1, "ai_lose_count": 0, "ai_draw_count": 0,
            "ai_total_reward": 3.0, "ai_avg_reward": 1.0, "qtable_size": 3,
            "black_stones": 20, "white_stones": 44,
            "win_rate": 100.0, "total_games": 1
        }]"#;
        let history = LearningHistory::from_json(json, 5).unwrap();
        assert_eq!(history.latest().unwrap().game_type, GameType::Unknown);
    }

    #[test]
    fn test_invalid_document() {
        let err = LearningHistory::from_json("{ not json", 5);
        assert!(matches!(err, Err(LearningError::InvalidHistory(_))));
    }

    #[test]
    fn test_load_or_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.doc");
        let history = LearningHistory::load_or_empty(&missing, 5);
        assert!(history.is_empty());
        assert_eq!(history.path(), Some(missing.as_path()));

        let corrupt = dir.path().join("corrupt.doc");
        fs::write(&corrupt, "garbage").unwrap();
        assert!(LearningHistory::load_or_empty(&corrupt, 5).is_empty());
    }
}
