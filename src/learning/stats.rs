//! 実行中の累積統計とAIレベル
//!
//! ゲーム数・学習回数・勝敗数・累積報酬はグローバル変数ではなく、
//! オーケストレータ（エンジンまたは自己対戦ランナー）が所有する
//! `RunStats`にまとめる。エージェントはε計算のために学習回数を読むだけ。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::learning::history::LearningRecord;

/// AIレベル判定の学習回数しきい値
const BEGINNER_LEARN_LIMIT: u64 = 1_000;
const NOVICE_LEARN_LIMIT: u64 = 10_000;
const INTERMEDIATE_LEARN_LIMIT: u64 = 50_000;
const ADVANCED_LEARN_LIMIT: u64 = 200_000;

/// AIレベル判定の勝率しきい値（%）
const INTERMEDIATE_WIN_RATE: f64 = 40.0;
const ADVANCED_WIN_RATE: f64 = 55.0;

/// 累積統計
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// 終局したゲーム数
    pub game_count: u64,
    /// TD更新回数
    pub ai_learn_count: u64,
    /// AI勝利数
    pub ai_win_count: u64,
    /// AI敗北数
    pub ai_lose_count: u64,
    /// 引き分け数
    pub ai_draw_count: u64,
    /// 累積報酬
    pub ai_total_reward: f64,
}

impl RunStats {
    /// 平均報酬（学習回数0なら0）
    pub fn avg_reward(&self) -> f64 {
        if self.ai_learn_count > 0 {
            self.ai_total_reward / self.ai_learn_count as f64
        } else {
            0.0
        }
    }

    /// 勝敗引き分けの合計
    pub fn total_games(&self) -> u64 {
        self.ai_win_count + self.ai_lose_count + self.ai_draw_count
    }

    /// 勝率（%、対局0なら0）
    pub fn win_rate(&self) -> f64 {
        let total = self.total_games();
        if total > 0 {
            self.ai_win_count as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }

    /// AI視点の終局結果を加算する
    ///
    /// `ai_stones`と`opponent_stones`はAI側と相手側の最終石数。
    pub fn record_outcome(&mut self, ai_stones: u32, opponent_stones: u32) {
        self.game_count += 1;
        match ai_stones.cmp(&opponent_stones) {
            std::cmp::Ordering::Greater => self.ai_win_count += 1,
            std::cmp::Ordering::Less => self.ai_lose_count += 1,
            std::cmp::Ordering::Equal => self.ai_draw_count += 1,
        }
    }

    /// 1回分の学習報酬を加算する
    #[inline]
    pub fn record_learning(&mut self, learn_count: u64, reward: f64) {
        self.ai_learn_count = learn_count;
        self.ai_total_reward += reward;
    }

    /// 履歴レコードから累積カウンタを復元する
    pub fn from_record(record: &LearningRecord) -> Self {
        Self {
            game_count: record.game_count,
            ai_learn_count: record.ai_learn_count,
            ai_win_count: record.ai_win_count,
            ai_lose_count: record.ai_lose_count,
            ai_draw_count: record.ai_draw_count,
            ai_total_reward: record.ai_total_reward,
        }
    }

    /// 現在の統計から判定したAIレベル
    pub fn level(&self) -> AiLevel {
        AiLevel::from_progress(self.ai_learn_count, self.win_rate())
    }
}

/// AIの強さの目安
///
/// | レベル | 条件 |
/// |--------|------|
/// | Beginner | 学習回数 < 1,000 |
/// | Novice | 学習回数 < 10,000 |
/// | Intermediate | 学習回数 < 50,000 または勝率 < 40% |
/// | Advanced | 学習回数 < 200,000 または勝率 < 55% |
/// | Expert | それ以外 |
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiLevel {
    Beginner,
    Novice,
    Intermediate,
    Advanced,
    Expert,
}

impl AiLevel {
    /// 学習回数と勝率（%）からレベルを判定
    ///
    /// # Examples
    ///
    /// ```
    /// use reversi_qlearn::learning::AiLevel;
    ///
    /// assert_eq!(AiLevel::from_progress(0, 100.0), AiLevel::Beginner);
    /// assert_eq!(AiLevel::from_progress(60_000, 30.0), AiLevel::Intermediate);
    /// assert_eq!(AiLevel::from_progress(250_000, 60.0), AiLevel::Expert);
    /// ```
    pub fn from_progress(learn_count: u64, win_rate: f64) -> Self {
        if learn_count < BEGINNER_LEARN_LIMIT {
            AiLevel::Beginner
        } else if learn_count < NOVICE_LEARN_LIMIT {
            AiLevel::Novice
        } else if learn_count < INTERMEDIATE_LEARN_LIMIT || win_rate < INTERMEDIATE_WIN_RATE {
            AiLevel::Intermediate
        } else if learn_count < ADVANCED_LEARN_LIMIT || win_rate < ADVANCED_WIN_RATE {
            AiLevel::Advanced
        } else {
            AiLevel::Expert
        }
    }
}

impl fmt::Display for AiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AiLevel::Beginner => "Beginner",
            AiLevel::Novice => "Novice",
            AiLevel::Intermediate => "Intermediate",
            AiLevel::Advanced => "Advanced",
            AiLevel::Expert => "Expert",
        };
        f.write_str(name)
    }
}
