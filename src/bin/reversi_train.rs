//! Self-play trainer.
//!
//! Runs self-play games against the active Q-table and history files, then
//! optionally stores the result in a named slot. Ctrl-C stops between games;
//! the Q-table is still saved.
//!
//! ```text
//! RUST_LOG=info reversi-train --games 5000 --seed 42 --slot run_1
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use reversi_qlearn::board::display;
use reversi_qlearn::learning::SelfPlayProgress;
use reversi_qlearn::{Board, EngineConfig, LearningError, ReversiEngine};

#[derive(Debug, Parser)]
#[command(name = "reversi-train", version, about = "Train the Othello Q-learning agent by self-play")]
struct Args {
    /// Number of self-play games
    #[arg(long, default_value_t = 1000)]
    games: u64,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with configuration overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the active files and slots
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Directory for the self-play log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Load this slot before training
    #[arg(long)]
    load_slot: Option<String>,

    /// Save the result into this slot after training
    #[arg(long)]
    slot: Option<String>,

    /// Print the final board of the last game
    #[arg(long)]
    show_board: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(LearningError::Interrupted) => {
            eprintln!("Interrupted; Q-table and history saved");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), LearningError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.dir {
        config = config.rooted_at(dir);
    }
    if let Some(seed) = args.seed {
        config.operational.seed = Some(seed);
    }
    if let Some(log_dir) = &args.log_dir {
        config.operational.log_dir = Some(log_dir.clone());
    }
    let report_every = config.operational.log_interval;

    let mut engine = ReversiEngine::open(config)?;
    if let Some(name) = &args.load_slot {
        engine.load_slot(name)?;
        println!("Loaded slot {}", name);
    }

    let token = engine.cancel_token();
    ctrlc::set_handler(move || token.cancel())
        .map_err(|e| LearningError::Config(format!("Failed to set signal handler: {}", e)))?;

    let mut last_board: Option<Board> = None;
    let summary = engine.start_self_play(args.games, |p: &SelfPlayProgress| {
        last_board = Some(p.board);
        if p.current_game % report_every == 0 || p.current_game == p.total {
            println!(
                "[{}/{}] black {} white {} draw {} | learn {} | avg reward {:+.3} | Q {}",
                p.current_game,
                p.total,
                p.win_black,
                p.win_white,
                p.draws,
                p.learn_count,
                p.avg_reward,
                p.qtable_size
            );
        }
    })?;

    if args.show_board
        && let Some(board) = &last_board
    {
        println!("{}", display(board, None));
    }

    let cumulative = engine.cumulative_stats();
    println!(
        "Games {} (black {}, white {}, draw {}, move cap {}) in {:.1}s",
        summary.games_played,
        summary.black_wins,
        summary.white_wins,
        summary.draws,
        summary.move_cap_games,
        summary.elapsed_secs
    );
    println!(
        "AI win rate {:.1}% | avg reward {:+.3} | Q-table {} | level {}",
        cumulative.win_rate,
        cumulative.avg_reward,
        engine.qtable().len(),
        cumulative.level()
    );

    if let Some(name) = &args.slot {
        engine.overwrite_slot(name)?;
        println!("Saved slot {}", name);
    }

    if summary.cancelled {
        return Err(LearningError::Interrupted);
    }
    Ok(())
}
