//! 盤面表現とオセロのルール
//!
//! 8×8盤面を黒石・白石の2つの`u64`ビットマスクで表現し、
//! 合法手生成、着手（石の反転）、スコア計算、終局判定を提供する。
//!
//! ビット配置はA1=bit 0, B1=bit 1, ..., H8=bit 63（行優先）。
//! 内部座標は`(row, col)`で左上が原点。A〜H / 1〜8 の表記は表示専用。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 盤面の一辺のマス数
pub const BOARD_SIZE: usize = 8;

/// 盤面のマス総数
pub const NUM_CELLS: usize = BOARD_SIZE * BOARD_SIZE;

/// 8方向の移動量 `(d_row, d_col)`
static DIRECTIONS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// 石の色を表す列挙型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Color {
    /// 黒石（先手、通常は人間）
    Black = 1,
    /// 白石（後手、通常はAI）
    White = 2,
}

impl Color {
    /// 反対の色を返す
    ///
    /// # Examples
    ///
    /// ```
    /// use reversi_qlearn::board::Color;
    ///
    /// assert_eq!(Color::Black.opposite(), Color::White);
    /// assert_eq!(Color::White.opposite(), Color::Black);
    /// ```
    #[inline]
    pub fn opposite(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// 状態キーで使うセルコード（黒=1、白=2）
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => f.write_str("Black"),
            Color::White => f.write_str("White"),
        }
    }
}

/// 盤上の座標
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// 行（0-7）
    pub row: u8,
    /// 列（0-7）
    pub col: u8,
}

impl Position {
    /// 座標を生成する
    ///
    /// # パニック
    ///
    /// `row`または`col`が8以上の場合
    #[inline]
    pub const fn new(row: u8, col: u8) -> Self {
        assert!((row as usize) < BOARD_SIZE && (col as usize) < BOARD_SIZE);
        Self { row, col }
    }

    /// 範囲チェック付きで座標を生成する
    #[inline]
    pub fn try_new(row: usize, col: usize) -> Option<Self> {
        (row < BOARD_SIZE && col < BOARD_SIZE).then(|| Self {
            row: row as u8,
            col: col as u8,
        })
    }

    /// 行優先インデックス（0-63）から座標を生成する
    #[inline]
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < NUM_CELLS);
        Self {
            row: (index / BOARD_SIZE) as u8,
            col: (index % BOARD_SIZE) as u8,
        }
    }

    /// 行優先インデックス（0-63）
    #[inline]
    pub fn index(self) -> usize {
        self.row as usize * BOARD_SIZE + self.col as usize
    }

    /// この座標のビットマスク
    #[inline]
    pub fn bit(self) -> u64 {
        1u64 << self.index()
    }

    /// 盤端からの距離 `min(r, 7-r, c, 7-c)`
    #[inline]
    pub fn distance_from_edge(self) -> u8 {
        let last = (BOARD_SIZE - 1) as u8;
        self.row.min(last - self.row).min(self.col).min(last - self.col)
    }

    /// 指定方向に1マス進んだ座標（盤外ならNone）
    #[inline]
    fn step(self, d_row: i8, d_col: i8) -> Option<Self> {
        let row = self.row as i8 + d_row;
        let col = self.col as i8 + d_col;
        if (0..BOARD_SIZE as i8).contains(&row) && (0..BOARD_SIZE as i8).contains(&col) {
            Some(Self {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    /// 周囲8マスの座標
    pub fn neighbors(self) -> impl Iterator<Item = Position> {
        DIRECTIONS
            .iter()
            .filter_map(move |&(d_row, d_col)| self.step(d_row, d_col))
    }
}

impl fmt::Display for Position {
    /// 表示用の表記（列A〜H、行1〜8）
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.col) as char, self.row + 1)
    }
}

/// 8×8のオセロ盤面
///
/// 黒石と白石をそれぞれ`u64`ビットマスクで保持する。
/// 手番は盤面に含めず、呼び出し側（ゲームセッション）が管理する。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    black: u64,
    white: u64,
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("black", &format_args!("{:#018x}", self.black))
            .field("white", &format_args!("{:#018x}", self.white))
            .finish()
    }
}

impl Board {
    /// 初期盤面を生成
    ///
    /// (3,3)白、(3,4)黒、(4,3)黒、(4,4)白の標準配置。
    ///
    /// # Examples
    ///
    /// ```
    /// use reversi_qlearn::board::{Board, Color};
    ///
    /// let board = Board::new();
    /// assert_eq!(board.count(Color::Black), 2);
    /// assert_eq!(board.count(Color::White), 2);
    /// ```
    pub fn new() -> Self {
        let black = Position::new(3, 4).bit() | Position::new(4, 3).bit();
        let white = Position::new(3, 3).bit() | Position::new(4, 4).bit();
        Self { black, white }
    }

    /// 石のない盤面
    pub fn empty() -> Self {
        Self { black: 0, white: 0 }
    }

    /// ビットマスクから盤面を生成（重なったマスは黒を優先）
    pub fn from_masks(black: u64, white: u64) -> Self {
        Self {
            black,
            white: white & !black,
        }
    }

    /// 指定色のビットマスク
    #[inline]
    pub fn mask(&self, color: Color) -> u64 {
        match color {
            Color::Black => self.black,
            Color::White => self.white,
        }
    }

    /// 石が置かれているマスのビットマスク
    #[inline]
    pub fn occupied(&self) -> u64 {
        self.black | self.white
    }

    /// 指定マスの状態（空ならNone）
    #[inline]
    pub fn cell(&self, pos: Position) -> Option<Color> {
        let bit = pos.bit();
        if self.black & bit != 0 {
            Some(Color::Black)
        } else if self.white & bit != 0 {
            Some(Color::White)
        } else {
            None
        }
    }

    /// 指定マスの状態を書き換える
    pub fn set(&mut self, pos: Position, cell: Option<Color>) {
        let bit = pos.bit();
        self.black &= !bit;
        self.white &= !bit;
        match cell {
            Some(Color::Black) => self.black |= bit,
            Some(Color::White) => self.white |= bit,
            None => {}
        }
    }

    /// 指定色の石数
    #[inline]
    pub fn count(&self, color: Color) -> u32 {
        self.mask(color).count_ones()
    }

    /// 盤上の石の総数
    #[inline]
    pub fn stone_count(&self) -> u32 {
        self.occupied().count_ones()
    }

    /// 全マスが埋まっているか
    #[inline]
    pub fn is_full(&self) -> bool {
        self.occupied() == u64::MAX
    }

    /// 行優先で全マスを走査する
    pub fn cells(&self) -> impl Iterator<Item = (Position, Option<Color>)> + '_ {
        (0..NUM_CELLS).map(move |i| {
            let pos = Position::from_index(i);
            (pos, self.cell(pos))
        })
    }

    /// 1方向について反転対象となる相手石のマスク
    ///
    /// 相手石が1個以上連続し、その先が自石で終わる場合のみ非0を返す。
    fn flips_in_direction(&self, pos: Position, side: Color, d_row: i8, d_col: i8) -> u64 {
        let own = self.mask(side);
        let opp = self.mask(side.opposite());
        let mut candidates = 0u64;
        let mut cursor = pos.step(d_row, d_col);

        while let Some(p) = cursor {
            let bit = p.bit();
            if opp & bit != 0 {
                candidates |= bit;
            } else if own & bit != 0 {
                return candidates;
            } else {
                return 0;
            }
            cursor = p.step(d_row, d_col);
        }
        0
    }

    /// 着手した場合に反転する全石のマスク（非合法なら0）
    fn flip_mask(&self, pos: Position, side: Color) -> u64 {
        if self.occupied() & pos.bit() != 0 {
            return 0;
        }
        DIRECTIONS
            .iter()
            .fold(0u64, |acc, &(d_row, d_col)| {
                acc | self.flips_in_direction(pos, side, d_row, d_col)
            })
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// 盤面文字列のパースエラー
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BoardParseError {
    /// 行数が8でない
    #[error("expected 8 rows, found {0}")]
    RowCount(usize),
    /// 列数が8でない
    #[error("row {row} has {len} cells, expected 8")]
    RowLength { row: usize, len: usize },
    /// 未知の文字
    #[error("invalid cell character {0:?}")]
    InvalidCell(char),
}

impl FromStr for Board {
    type Err = BoardParseError;

    /// 8行の文字列から盤面を生成する
    ///
    /// `.`=空、`B`/`X`=黒、`W`/`O`=白。空白は無視する。
    ///
    /// # Examples
    ///
    /// ```
    /// use reversi_qlearn::board::Board;
    ///
    /// let board: Board = "
    ///     ........
    ///     ........
    ///     ........
    ///     ...WB...
    ///     ...BW...
    ///     ........
    ///     ........
    ///     ........
    /// ".parse().unwrap();
    /// assert_eq!(board, Board::new());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows: Vec<Vec<char>> = s
            .lines()
            .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect::<Vec<_>>())
            .filter(|row| !row.is_empty())
            .collect();

        if rows.len() != BOARD_SIZE {
            return Err(BoardParseError::RowCount(rows.len()));
        }

        let mut board = Board::empty();
        for (r, row) in rows.iter().enumerate() {
            if row.len() != BOARD_SIZE {
                return Err(BoardParseError::RowLength {
                    row: r,
                    len: row.len(),
                });
            }
            for (c, ch) in row.iter().enumerate() {
                let cell = match ch {
                    '.' | '-' | '0' => None,
                    'B' | 'X' | '1' => Some(Color::Black),
                    'W' | 'O' | '2' => Some(Color::White),
                    other => return Err(BoardParseError::InvalidCell(*other)),
                };
                board.set(Position::new(r as u8, c as u8), cell);
            }
        }
        Ok(board)
    }
}

/// 合法手のビットマスクを返す
#[inline]
pub fn legal_moves_mask(board: &Board, side: Color) -> u64 {
    let mut mask = 0u64;
    let mut empties = !board.occupied();
    while empties != 0 {
        let index = empties.trailing_zeros() as usize;
        empties &= empties - 1;
        let pos = Position::from_index(index);
        if is_legal(board, pos, side) {
            mask |= pos.bit();
        }
    }
    mask
}

/// 合法手の一覧を行優先順で返す
///
/// # Examples
///
/// ```
/// use reversi_qlearn::board::{Board, Color, Position, legal_moves};
///
/// let moves = legal_moves(&Board::new(), Color::Black);
/// assert_eq!(
///     moves,
///     vec![
///         Position::new(2, 3),
///         Position::new(3, 2),
///         Position::new(4, 5),
///         Position::new(5, 4),
///     ]
/// );
/// ```
pub fn legal_moves(board: &Board, side: Color) -> Vec<Position> {
    let mut mask = legal_moves_mask(board, side);
    let mut moves = Vec::with_capacity(mask.count_ones() as usize);
    while mask != 0 {
        moves.push(Position::from_index(mask.trailing_zeros() as usize));
        mask &= mask - 1;
    }
    moves
}

/// 合法手が1つ以上あるか
#[inline]
pub fn has_legal_move(board: &Board, side: Color) -> bool {
    legal_moves_mask(board, side) != 0
}

/// 単一マスの合法性判定（最初に見つかった方向で打ち切る）
pub fn is_legal(board: &Board, pos: Position, side: Color) -> bool {
    if board.occupied() & pos.bit() != 0 {
        return false;
    }
    DIRECTIONS
        .iter()
        .any(|&(d_row, d_col)| board.flips_in_direction(pos, side, d_row, d_col) != 0)
}

/// 着手を実行し、反転した石の座標を返す
///
/// 非合法手の場合は盤面を変更せず空のリストを返す。
/// 返すリストに着手マス自身は含まない。
pub fn apply_move(board: &mut Board, pos: Position, side: Color) -> Vec<Position> {
    let flips = board.flip_mask(pos, side);
    if flips == 0 {
        return Vec::new();
    }

    let placed = flips | pos.bit();
    match side {
        Color::Black => {
            board.black |= placed;
            board.white &= !flips;
        }
        Color::White => {
            board.white |= placed;
            board.black &= !flips;
        }
    }

    let mut flipped = Vec::with_capacity(flips.count_ones() as usize);
    let mut rest = flips;
    while rest != 0 {
        flipped.push(Position::from_index(rest.trailing_zeros() as usize));
        rest &= rest - 1;
    }
    flipped
}

/// `(黒石数, 白石数)`
#[inline]
pub fn score(board: &Board) -> (u32, u32) {
    (board.count(Color::Black), board.count(Color::White))
}

/// 終局判定：盤面が埋まっているか、両者とも合法手がない
pub fn is_terminal(board: &Board) -> bool {
    board.is_full() || (!has_legal_move(board, Color::Black) && !has_legal_move(board, Color::White))
}

/// 盤面を文字列で表示する
///
/// `show_legal_for`を指定すると、その色の合法手を`*`で表示する。
pub fn display(board: &Board, show_legal_for: Option<Color>) -> String {
    let legal = show_legal_for.map_or(0, |side| legal_moves_mask(board, side));
    let mut out = String::from("  A B C D E F G H\n");
    for row in 0..BOARD_SIZE {
        out.push_str(&format!("{} ", row + 1));
        for col in 0..BOARD_SIZE {
            let pos = Position::new(row as u8, col as u8);
            let ch = match board.cell(pos) {
                Some(Color::Black) => 'X',
                Some(Color::White) => 'O',
                None if legal & pos.bit() != 0 => '*',
                None => '.',
            };
            out.push(ch);
            if col + 1 < BOARD_SIZE {
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out
}
