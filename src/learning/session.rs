//! ゲームセッション
//!
//! 1ゲーム分の盤面・手番・終局状態を保持し、手番交代と自動パスを管理する。
//! 黒が人間、白がAIという対局向けの`human_place`/`ai_step`に加え、
//! 自己対戦用にどちらの手番でもエージェントに打たせる`agent_step`を持つ。
//!
//! 終局後は着手を受け付けない。次のゲームは`reset`または新しいセッションで始める。

use crate::board::{Board, Color, Position, apply_move, has_legal_move, is_legal, is_terminal};
use crate::learning::agent::{AgentStep, MoveChoice, PlayMode, QAgent};
use crate::learning::qtable::QTable;

/// 人間側の色
pub const HUMAN_SIDE: Color = Color::Black;

/// AI側の色
pub const AI_SIDE: Color = Color::White;

/// 勝者
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Winner {
    Black,
    White,
    Draw,
}

impl Winner {
    /// 石数から勝者を判定
    pub fn from_score(black: u32, white: u32) -> Self {
        match black.cmp(&white) {
            std::cmp::Ordering::Greater => Winner::Black,
            std::cmp::Ordering::Less => Winner::White,
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }
}

/// 人間の着手結果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// 着手成功（反転した石）
    Placed { flipped: Vec<Position> },
    /// 非合法手（盤面は変化しない）
    Illegal,
    /// 終局済み
    GameOver,
    /// 人間の手番ではない
    NotYourTurn,
}

/// AIの着手結果
#[derive(Clone, Debug, PartialEq)]
pub enum AiOutcome {
    /// 着手成功
    Placed(AgentStep),
    /// 合法手がなくパス
    Passed,
    /// 終局済み
    GameOver,
    /// AIの手番ではない
    NotAiTurn,
}

/// 1ゲーム分の状態
#[derive(Clone, Debug)]
pub struct GameSession {
    board: Board,
    side: Color,
    game_over: bool,
    last_ai_move: Option<Position>,
    last_ai_reward: f64,
    message: String,
    moves_played: u32,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSession {
    /// 初期盤面・黒番で開始
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            side: Color::Black,
            game_over: false,
            last_ai_move: None,
            last_ai_reward: 0.0,
            message: String::new(),
            moves_played: 0,
        }
    }

    /// 任意の局面から開始（終局判定のみ行う）
    pub fn from_position(board: Board, side: Color) -> Self {
        let mut session = Self {
            board,
            side,
            ..Self::new()
        };
        if is_terminal(&session.board) {
            session.finish();
        }
        session
    }

    /// 初期状態に戻す
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side(&self) -> Color {
        self.side
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// AIの直前の着手（パスしたら`None`）
    pub fn last_ai_move(&self) -> Option<Position> {
        self.last_ai_move
    }

    pub fn last_ai_reward(&self) -> f64 {
        self.last_ai_reward
    }

    /// 表示用メッセージ（パス、非合法手、結果）
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 石を置いた手の数（パスは含まない）
    pub fn moves_played(&self) -> u32 {
        self.moves_played
    }

    /// `(黒石数, 白石数)`
    pub fn score(&self) -> (u32, u32) {
        crate::board::score(&self.board)
    }

    /// 現在の石数での勝者
    pub fn winner(&self) -> Winner {
        let (black, white) = self.score();
        Winner::from_score(black, white)
    }

    /// 人間（黒）の着手
    ///
    /// 非合法手の場合はメッセージを設定するだけで盤面は変化しない。
    pub fn human_place(&mut self, pos: Position) -> PlaceOutcome {
        if self.game_over {
            return PlaceOutcome::GameOver;
        }
        if self.side != HUMAN_SIDE {
            return PlaceOutcome::NotYourTurn;
        }
        if !is_legal(&self.board, pos, self.side) {
            self.message = format!("Illegal move: {}", pos);
            return PlaceOutcome::Illegal;
        }

        let flipped = apply_move(&mut self.board, pos, self.side);
        self.moves_played += 1;
        self.message.clear();
        self.after_placement();
        PlaceOutcome::Placed { flipped }
    }

    /// AI（白）の着手（学習あり・対局モード）
    pub fn ai_step(
        &mut self,
        agent: &mut QAgent,
        qtable: &mut QTable,
        learn: bool,
        learn_count: u64,
    ) -> AiOutcome {
        if self.game_over {
            return AiOutcome::GameOver;
        }
        if self.side != AI_SIDE {
            return AiOutcome::NotAiTurn;
        }
        self.agent_step(agent, qtable, learn, learn_count, PlayMode::Interactive)
    }

    /// 現在の手番をエージェントに打たせる
    ///
    /// 合法手がなければパスして手番を渡す。
    pub fn agent_step(
        &mut self,
        agent: &mut QAgent,
        qtable: &mut QTable,
        learn: bool,
        learn_count: u64,
        mode: PlayMode,
    ) -> AiOutcome {
        if self.game_over {
            return AiOutcome::GameOver;
        }

        let step = agent.choose_and_learn(qtable, &mut self.board, self.side, learn, learn_count, mode);
        match step.choice {
            MoveChoice::Pass => {
                self.last_ai_move = None;
                self.last_ai_reward = 0.0;
                self.switch_side();
                AiOutcome::Passed
            }
            MoveChoice::Place(pos) => {
                self.last_ai_move = Some(pos);
                self.last_ai_reward = step.reward;
                self.moves_played += 1;
                self.message.clear();
                self.after_placement();
                AiOutcome::Placed(step)
            }
        }
    }

    /// 手番を交代する
    ///
    /// 新しい手番に合法手がなく相手にある場合は自動パスして手番を戻す。
    /// 両者とも合法手がなければ終局。
    pub fn switch_side(&mut self) {
        if self.game_over {
            return;
        }
        if is_terminal(&self.board) {
            self.finish();
            return;
        }

        self.side = self.side.opposite();
        if !has_legal_move(&self.board, self.side) {
            self.message = format!("{} has no legal moves and passes", self.side);
            self.side = self.side.opposite();
        }
    }

    /// 手数上限などで強制的に終局させる（現在の盤面で採点）
    pub fn force_game_over(&mut self, reason: &str) {
        if self.game_over {
            return;
        }
        self.finish();
        self.message = format!("{}: {}", reason, self.message);
    }

    fn after_placement(&mut self) {
        if is_terminal(&self.board) {
            self.finish();
        } else {
            self.switch_side();
        }
    }

    fn finish(&mut self) {
        self.game_over = true;
        let (black, white) = self.score();
        let result = match Winner::from_score(black, white) {
            Winner::Black => "Black wins",
            Winner::White => "White wins",
            Winner::Draw => "Draw",
        };
        self.message = format!("Game over: Black {} - White {}, {}", black, white, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn agent() -> QAgent {
        let mut config = EngineConfig::default();
        config.operational.seed = Some(3);
        QAgent::new(&config)
    }

    #[test]
    fn test_new_session() {
        let session = GameSession::new();
        assert_eq!(session.side(), Color::Black);
        assert!(!session.is_game_over());
        assert_eq!(session.score(), (2, 2));
        assert_eq!(session.winner(), Winner::Draw);
        assert!(session.message().is_empty());
    }

    #[test]
    fn test_human_opening_move() {
        let mut session = GameSession::new();
        let outcome = session.human_place(Position::new(2, 3));
        assert_eq!(
            outcome,
            PlaceOutcome::Placed {
                flipped: vec![Position::new(3, 3)]
            }
        );
        assert_eq!(session.board().cell(Position::new(2, 3)), Some(Color::Black));
        assert_eq!(session.board().cell(Position::new(3, 3)), Some(Color::Black));
        assert_eq!(session.score(), (4, 1));
        assert_eq!(session.side(), Color::White);
        assert!(!session.is_game_over());
    }

    #[test]
    fn test_human_illegal_move() {
        let mut session = GameSession::new();
        let before = *session.board();
        assert_eq!(session.human_place(Position::new(0, 0)), PlaceOutcome::Illegal);
        assert_eq!(*session.board(), before);
        assert_eq!(session.side(), Color::Black);
        assert!(session.message().contains("A1"));
    }

    #[test]
    fn test_turn_checks() {
        let mut session = GameSession::new();
        let mut agent = agent();
        let mut qtable = QTable::new();
        assert_eq!(
            session.ai_step(&mut agent, &mut qtable, true, 0),
            AiOutcome::NotAiTurn
        );

        session.human_place(Position::new(2, 3));
        assert_eq!(
            session.human_place(Position::new(2, 2)),
            PlaceOutcome::NotYourTurn
        );
    }

    #[test]
    fn test_ai_step_after_human() {
        let mut session = GameSession::new();
        let mut agent = agent();
        let mut qtable = QTable::new();
        session.human_place(Position::new(2, 3));

        match session.ai_step(&mut agent, &mut qtable, true, 0) {
            AiOutcome::Placed(step) => {
                assert_eq!(session.last_ai_move(), step.choice.position());
                assert_eq!(session.last_ai_reward(), step.reward);
                assert_eq!(step.learn_count, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(session.side(), Color::Black);
        assert_eq!(session.moves_played(), 2);
        assert_eq!(qtable.len(), 1);
    }

    #[test]
    fn test_switch_side_auto_pass() {
        // 黒は合法手なし、白は(0,2)に打てる
        let board: Board = "
            WB......
            ........
            ........
            ........
            ........
            ........
            ........
            ........
        "
        .parse()
        .unwrap();
        let mut session = GameSession::from_position(board, Color::White);
        assert!(!session.is_game_over());

        session.switch_side();
        assert_eq!(session.side(), Color::White);
        assert!(session.message().contains("pass"));
        assert!(!session.is_game_over());
    }

    #[test]
    fn test_terminal_position() {
        let board: Board = "
            BBBBBBBB
            ........
            ........
            ........
            ........
            ........
            ........
            .......W
        "
        .parse()
        .unwrap();
        let mut session = GameSession::from_position(board, Color::Black);
        assert!(session.is_game_over());
        assert_eq!(session.winner(), Winner::Black);
        assert!(session.message().contains("Black wins"));
        assert_eq!(
            session.human_place(Position::new(1, 1)),
            PlaceOutcome::GameOver
        );
    }

    #[test]
    fn test_force_game_over() {
        let mut session = GameSession::new();
        session.force_game_over("Move cap reached");
        assert!(session.is_game_over());
        assert!(session.message().starts_with("Move cap reached"));
        assert_eq!(session.winner(), Winner::Draw);
    }

    #[test]
    fn test_reset() {
        let mut session = GameSession::new();
        session.human_place(Position::new(2, 3));
        session.reset();
        assert_eq!(session.score(), (2, 2));
        assert_eq!(session.side(), Color::Black);
        assert_eq!(session.moves_played(), 0);
    }
}
