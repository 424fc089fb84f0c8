//! 状態キーと行動キー
//!
//! Qテーブルの検索キーとして使う決定的な文字列表現を生成する。
//! 状態キーは64マスのセルコード（空=0、黒=1、白=2）を行優先で連結したもの。
//! 行動キーは`"<state_key>_<row>_<col>"`。
//!
//! 対称形（回転・反転）の正規化は行わない。

use serde::{Deserialize, Serialize};

use crate::board::{Board, Color, Position};

/// 状態キーに手番を含めるかどうか
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// 盤面のみ（64文字）
    #[default]
    BoardOnly,
    /// 盤面 + 手番コード（65文字）
    WithSide,
}

impl KeyMode {
    /// このモードで状態キーを生成する
    #[inline]
    pub fn state_key(self, board: &Board, side: Color) -> String {
        match self {
            KeyMode::BoardOnly => state_key(board),
            KeyMode::WithSide => state_key_with_side(board, side),
        }
    }
}

/// 64文字の状態キー
///
/// # Examples
///
/// ```
/// use reversi_qlearn::board::Board;
/// use reversi_qlearn::state_key::state_key;
///
/// let key = state_key(&Board::new());
/// assert_eq!(key.len(), 64);
/// assert_eq!(&key[24..40], "0002100000012000");
/// ```
pub fn state_key(board: &Board) -> String {
    board
        .cells()
        .map(|(_, cell)| match cell {
            None => '0',
            Some(color) => char::from(b'0' + color.code()),
        })
        .collect()
}

/// 手番コードを末尾に付けた65文字の状態キー
pub fn state_key_with_side(board: &Board, side: Color) -> String {
    let mut key = state_key(board);
    key.push(char::from(b'0' + side.code()));
    key
}

/// Qテーブルの実際のキー `"<state_key>_<row>_<col>"`
#[inline]
pub fn action_key(state_key: &str, pos: Position) -> String {
    format!("{}_{}_{}", state_key, pos.row, pos.col)
}
