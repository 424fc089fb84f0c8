//! End-to-end game scenarios through the engine and session APIs.

use reversi_qlearn::ReversiEngine;
use reversi_qlearn::board::{
    Board, Color, Position, has_legal_move, is_terminal, legal_moves, score,
};
use reversi_qlearn::config::EngineConfig;
use reversi_qlearn::learning::{GameEnd, GameSession, GameType, PlaceOutcome, QAgent, QTable};
use reversi_qlearn::state_key::{action_key, state_key};
use tempfile::{TempDir, tempdir};

fn engine_in(dir: &TempDir, seed: u64) -> ReversiEngine {
    let mut config = EngineConfig::default().rooted_at(dir.path());
    config.operational.seed = Some(seed);
    ReversiEngine::new(config).unwrap()
}

// ========== Opening move ==========

#[test]
fn test_opening_move() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir, 1);

    let outcome = engine.human_place(2, 3);
    assert_eq!(
        outcome,
        PlaceOutcome::Placed {
            flipped: vec![Position::new(3, 3)]
        }
    );
    assert_eq!(engine.board().cell(Position::new(2, 3)), Some(Color::Black));
    assert_eq!(engine.board().cell(Position::new(3, 3)), Some(Color::Black));
    assert_eq!(engine.score(), (4, 1));
    assert_eq!(engine.current_side(), Color::White);
    assert!(!engine.game_over());
}

// ========== Corner capture ==========

#[test]
fn test_corner_capture_reward() {
    let mut config = EngineConfig::default();
    config.operational.seed = Some(2);
    let mut agent = QAgent::new(&config);
    let mut qtable = QTable::new();

    let before: Board = "
        .BW.....
        ........
        ........
        ...WB...
        ...BW...
        ........
        ........
        ........
    "
    .parse()
    .unwrap();
    let mut board = before;
    let corner = Position::new(0, 0);

    let step = agent.play_move(&mut qtable, &mut board, corner, Color::White, true, 0);
    assert!(step.legal);
    assert_eq!(step.flipped, vec![Position::new(0, 1)]);
    assert!(!step.terminal);

    let breakdown = agent
        .shaper()
        .evaluate(&before, &board, corner, Color::White, 1, false);
    assert_eq!(breakdown.flip, config.reward.flip);
    assert_eq!(breakdown.corner, config.reward.corner);
    assert_eq!(breakdown.edge, 0.0);
    // 白5 - 黒2 の石差
    assert_eq!(breakdown.outcome, 3.0 * config.reward.parity);
    assert!((step.reward - breakdown.total()).abs() < 1e-12);

    // 旧値0・次状態は未学習なので Q = α・報酬
    let key = action_key(&state_key(&before), corner);
    assert!(qtable.contains_key(&key));
    assert!((qtable.get(&key) - config.q_learning.alpha * step.reward).abs() < 1e-12);
}

// ========== Forced pass ==========

#[test]
fn test_forced_pass() {
    // 黒は(0,1)の1石のみで挟める白石がない
    let board: Board = "
        WB......
        ........
        ........
        ....WW..
        ....W...
        ........
        ........
        ........
    "
    .parse()
    .unwrap();
    assert!(!has_legal_move(&board, Color::Black));
    assert!(has_legal_move(&board, Color::White));

    let mut session = GameSession::from_position(board, Color::White);
    session.switch_side();

    assert_eq!(session.side(), Color::White);
    assert!(!session.is_game_over());
    assert_eq!(session.message(), "Black has no legal moves and passes");
    assert_eq!(*session.board(), board);
}

// ========== Self-play reproducibility ==========

#[test]
fn test_self_play_reproducible() {
    let run = |seed: u64| {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(&dir, seed);
        let mut scores = Vec::new();
        let summary = engine
            .start_self_play(10, |p| scores.push(p.final_score))
            .unwrap();
        assert_eq!(summary.games_played, 10);
        (scores, engine.qtable().len(), engine.qtable().clone())
    };

    let (scores_a, size_a, q_a) = run(1234);
    let (scores_b, size_b, q_b) = run(1234);
    assert_eq!(scores_a.len(), 10);
    assert_eq!(scores_a, scores_b);
    assert_eq!(size_a, size_b);
    assert_eq!(q_a, q_b);
}

// ========== Slot round trip ==========

#[test]
fn test_slot_roundtrip_through_engine() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir, 99);
    engine.start_self_play(3, |_| {}).unwrap();

    engine.save_slot("alpha").unwrap();
    let snapshot = engine.qtable().clone();
    let learn_count = engine.current_stats().ai_learn_count;

    engine.start_self_play(5, |_| {}).unwrap();
    assert_ne!(engine.qtable().len(), snapshot.len());

    engine.load_slot("alpha").unwrap();
    assert_eq!(engine.qtable().len(), snapshot.len());
    assert_eq!(*engine.qtable(), snapshot);
    assert_eq!(engine.current_stats().ai_learn_count, learn_count);
    assert_eq!(engine.history().len(), 3);

    assert!(engine.list_slots().unwrap().contains(&"alpha".to_string()));
    engine.delete_slot("alpha").unwrap();
    assert!(!engine.list_slots().unwrap().contains(&"alpha".to_string()));
}

#[test]
fn test_reloading_slot_restores_same_state() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir, 31);
    engine.start_self_play(2, |_| {}).unwrap();
    engine.save_slot("beta").unwrap();

    engine.load_slot("beta").unwrap();
    let qtable = engine.qtable().clone();
    let stats = engine.current_stats().clone();
    let records: Vec<_> = engine.history().records().cloned().collect();

    // 読み込み後に状態を変える
    engine.start_self_play(3, |_| {}).unwrap();
    engine.human_place(2, 3);
    assert_ne!(engine.current_stats(), &stats);

    engine.load_slot("beta").unwrap();
    assert_eq!(*engine.qtable(), qtable);
    assert_eq!(engine.current_stats(), &stats);
    assert!(engine.history().records().eq(records.iter()));
}

// ========== Move cap ==========

#[test]
fn test_move_cap_scores_board_as_is() {
    let dir = tempdir().unwrap();
    let mut config = EngineConfig::default().rooted_at(dir.path());
    config.operational.seed = Some(5);
    // 最短の終局でも9手かかる
    config.operational.move_cap = 8;
    let mut engine = ReversiEngine::new(config).unwrap();

    let mut events = Vec::new();
    let summary = engine
        .start_self_play(1, |p| events.push(p.clone()))
        .unwrap();

    assert_eq!(summary.move_cap_games, 1);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.end, GameEnd::MoveCap);
    assert_eq!(event.moves, 8);
    assert!(!is_terminal(&event.board));
    assert_eq!(score(&event.board), event.final_score);
    assert_eq!(event.final_score.0 + event.final_score.1, 12);

    assert_eq!(engine.history().len(), 1);
    let record = engine.history().latest().unwrap();
    assert_eq!(record.game_type, GameType::AiVsAi);
    assert_eq!((record.black_stones, record.white_stones), event.final_score);
}

// ========== Human vs AI game ==========

#[test]
fn test_full_game_records_once() {
    let dir = tempdir().unwrap();
    let mut engine = engine_in(&dir, 7);

    while !engine.game_over() {
        match engine.current_side() {
            Color::Black => {
                let pos = legal_moves(engine.board(), Color::Black)[0];
                let outcome = engine.human_place(pos.row as usize, pos.col as usize);
                assert!(matches!(outcome, PlaceOutcome::Placed { .. }));
            }
            Color::White => {
                engine.ai_step();
            }
        }
    }

    assert_eq!(engine.history().len(), 1);
    assert_eq!(
        engine.history().latest().unwrap().game_type,
        GameType::HumanVsAi
    );
    assert_eq!(engine.current_stats().game_count, 1);
    assert!(engine.current_stats().ai_learn_count > 0);
    assert!(engine.message().starts_with("Game over"));

    // 終局後の操作は記録を増やさない
    assert_eq!(engine.human_place(0, 0), PlaceOutcome::GameOver);
    engine.ai_step();
    assert_eq!(engine.history().len(), 1);
}
