//! Self-play log file.
//!
//! Writes one `BATCH` line every `log_interval` games plus `INFO`/`WARNING`
//! lines and a closing summary to `<log_dir>/selfplay_YYYYMMDD_HHMMSS.log`.
//!
//! ```text
//! [2026-01-01 12:00:00] BATCH     100 | Black:  48.0% | White:  47.0% | Draw:   5.0% | Moves:  58.3 | Learn:     5830 | AvgR:  +3.412 | Q:     5790 | 120.5 g/s
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::learning::LearningError;
use crate::learning::self_play::SelfPlaySummary;

/// Statistics for one batch of self-play games.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelfPlayBatch {
    /// Games completed in the run so far.
    pub games_completed: u64,
    /// Black win rate (0.0 to 1.0) in this batch.
    pub black_win_rate: f64,
    /// White win rate (0.0 to 1.0) in this batch.
    pub white_win_rate: f64,
    /// Draw rate (0.0 to 1.0) in this batch.
    pub draw_rate: f64,
    /// Average placed stones per game in this batch.
    pub avg_move_count: f64,
    /// Cumulative TD updates.
    pub learn_count: u64,
    /// Cumulative average reward.
    pub avg_reward: f64,
    /// Q-table entries.
    pub qtable_size: usize,
    /// Games per second since the run started.
    pub games_per_sec: f64,
}

impl SelfPlayBatch {
    /// Build batch stats from per-game results.
    ///
    /// # Arguments
    ///
    /// * `games_completed` - Games completed in the run so far
    /// * `stone_diffs` - Black minus white stones, one per game in the batch
    /// * `move_counts` - Placed stones, one per game in the batch
    /// * `learn_count` - Cumulative TD updates
    /// * `avg_reward` - Cumulative average reward
    /// * `qtable_size` - Current Q-table entries
    /// * `elapsed_secs` - Time since the run started
    pub fn from_games(
        games_completed: u64,
        stone_diffs: &[i32],
        move_counts: &[u32],
        learn_count: u64,
        avg_reward: f64,
        qtable_size: usize,
        elapsed_secs: f64,
    ) -> Self {
        let games_per_sec = if elapsed_secs > 0.0 {
            games_completed as f64 / elapsed_secs
        } else {
            0.0
        };

        let batch_size = stone_diffs.len() as f64;
        if batch_size == 0.0 {
            return Self {
                games_completed,
                learn_count,
                avg_reward,
                qtable_size,
                games_per_sec,
                ..Default::default()
            };
        }

        let black_wins = stone_diffs.iter().filter(|&&d| d > 0).count() as f64;
        let white_wins = stone_diffs.iter().filter(|&&d| d < 0).count() as f64;
        let draws = stone_diffs.iter().filter(|&&d| d == 0).count() as f64;
        let avg_move_count = move_counts.iter().map(|&m| m as f64).sum::<f64>() / batch_size;

        Self {
            games_completed,
            black_win_rate: black_wins / batch_size,
            white_win_rate: white_wins / batch_size,
            draw_rate: draws / batch_size,
            avg_move_count,
            learn_count,
            avg_reward,
            qtable_size,
            games_per_sec,
        }
    }
}

enum LogMessage<'a> {
    Batch(&'a SelfPlayBatch),
    Summary(&'a SelfPlaySummary),
    Info(&'a str),
    Warning(&'a str),
}

/// Buffered self-play log file.
pub struct SelfPlayLogger {
    writer: BufWriter<File>,
    log_path: PathBuf,
}

impl SelfPlayLogger {
    /// Create `log_dir` if needed and open a new timestamped log file in it.
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self, LearningError> {
        let log_dir = log_dir.as_ref();
        if !log_dir.exists() {
            fs::create_dir_all(log_dir)?;
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("selfplay_{}.log", timestamp));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            log_path,
        })
    }

    pub fn log_batch(&mut self, batch: &SelfPlayBatch) -> Result<(), LearningError> {
        Self::write_message(&mut self.writer, &LogMessage::Batch(batch))
    }

    pub fn log_summary(&mut self, summary: &SelfPlaySummary) -> Result<(), LearningError> {
        Self::write_message(&mut self.writer, &LogMessage::Summary(summary))
    }

    pub fn log_info(&mut self, message: &str) -> Result<(), LearningError> {
        Self::write_message(&mut self.writer, &LogMessage::Info(message))
    }

    pub fn log_warning(&mut self, message: &str) -> Result<(), LearningError> {
        Self::write_message(&mut self.writer, &LogMessage::Warning(message))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn flush(&mut self) -> Result<(), LearningError> {
        self.writer.flush()?;
        Ok(())
    }

    fn write_message<W: Write>(writer: &mut W, msg: &LogMessage<'_>) -> Result<(), LearningError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

        match msg {
            LogMessage::Batch(b) => {
                writeln!(
                    writer,
                    "[{}] BATCH {:>7} | Black: {:>5.1}% | White: {:>5.1}% | Draw: {:>5.1}% | Moves: {:>5.1} | Learn: {:>8} | AvgR: {:+7.3} | Q: {:>8} | {:.1} g/s",
                    timestamp,
                    b.games_completed,
                    b.black_win_rate * 100.0,
                    b.white_win_rate * 100.0,
                    b.draw_rate * 100.0,
                    b.avg_move_count,
                    b.learn_count,
                    b.avg_reward,
                    b.qtable_size,
                    b.games_per_sec
                )?;
            }
            LogMessage::Summary(s) => {
                writeln!(writer, "[{}] ========== SUMMARY ==========", timestamp)?;
                writeln!(
                    writer,
                    "  Games: {}/{}{}",
                    s.games_played,
                    s.requested,
                    if s.cancelled { " (cancelled)" } else { "" }
                )?;
                writeln!(
                    writer,
                    "  Results: Black {} | White {} | Draw {} | Move cap {}",
                    s.black_wins, s.white_wins, s.draws, s.move_cap_games
                )?;
                writeln!(writer, "  Learn count: {}", s.learn_count)?;
                writeln!(writer, "  Q-table entries: {}", s.qtable_size)?;
                writeln!(writer, "  Elapsed: {:.1}s", s.elapsed_secs)?;
                writeln!(writer, "[{}] =============================", timestamp)?;
            }
            LogMessage::Info(m) => {
                writeln!(writer, "[{}] INFO: {}", timestamp, m)?;
            }
            LogMessage::Warning(m) => {
                writeln!(writer, "[{}] WARNING: {}", timestamp, m)?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}
