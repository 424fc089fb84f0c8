//! reversi-qlearn - オセロのルールエンジンと表形式Q学習
//!
//! 盤面ルール、状態キー、Qテーブル、ε-greedyエージェント、自己対戦、
//! 学習履歴とセーブスロットを提供する。UIは`engine::ReversiEngine`だけを使う。

pub mod board;
pub mod config;
pub mod engine;
pub mod learning;
pub mod state_key;

pub use board::{Board, Color, Position};
pub use config::EngineConfig;
pub use engine::ReversiEngine;
pub use learning::LearningError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_size() {
        // 2つのu64ビットマスクで16バイト
        assert_eq!(std::mem::size_of::<Board>(), 16);
    }

    #[test]
    fn test_color_opposite() {
        // 白の反対は黒
        assert_eq!(Color::White.opposite(), Color::Black);
        // 黒の反対は白
        assert_eq!(Color::Black.opposite(), Color::White);
    }

    #[test]
    fn test_board_traits() {
        // Clone, Copy, Debug, PartialEq, Eqトレイトが実装されていること
        let board1 = Board::new();
        let board2 = board1; // Copy
        let board3 = board1;

        assert_eq!(board1, board2);
        assert_eq!(board2, board3);

        let debug_str = format!("{:?}", board1);
        assert!(!debug_str.is_empty());
    }

    #[test]
    fn test_engine_starts_black_to_move() {
        let engine = ReversiEngine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.current_side(), Color::Black);
        assert_eq!(engine.score(), (2, 2));
    }
}
