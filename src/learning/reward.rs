//! Shaped per-move reward.
//!
//! The reward for a placement is built in three steps:
//!
//! 1. Sum the additive shaping terms (flips, cell class, positional,
//!    mobility, forced pass, neighbour bonuses, dominance).
//! 2. Apply the stage multipliers to that running sum: the endgame
//!    multiplier above `endgame_threshold` stones, then the late (above
//!    `late_threshold`) or mid (above `mid_threshold`) multiplier.
//! 3. Add the outcome term: the win/lose/draw bonus if the move ended the
//!    game, otherwise the stone-parity term.
//!
//! Reversing steps 2 and 3 gives different numbers; callers rely on this
//! order.

use crate::board::{Board, Color, Position, legal_moves_mask};
use crate::config::RewardConfig;

/// The four corners.
pub const CORNERS: [Position; 4] = [
    Position::new(0, 0),
    Position::new(0, 7),
    Position::new(7, 0),
    Position::new(7, 7),
];

/// Edge cells orthogonally adjacent to a corner.
pub const EDGE_ADJACENT: [Position; 8] = [
    Position::new(0, 1),
    Position::new(1, 0),
    Position::new(0, 6),
    Position::new(1, 7),
    Position::new(6, 0),
    Position::new(7, 1),
    Position::new(6, 7),
    Position::new(7, 6),
];

/// Inner-edge cells two steps from a corner, three per corner.
pub const STABLE_CELLS: [Position; 12] = [
    Position::new(0, 2),
    Position::new(2, 0),
    Position::new(2, 2),
    Position::new(0, 5),
    Position::new(2, 5),
    Position::new(2, 7),
    Position::new(5, 0),
    Position::new(5, 2),
    Position::new(7, 2),
    Position::new(5, 5),
    Position::new(5, 7),
    Position::new(7, 5),
];

/// The four centre cells.
pub const CENTER: [Position; 4] = [
    Position::new(3, 3),
    Position::new(3, 4),
    Position::new(4, 3),
    Position::new(4, 4),
];

#[inline]
pub fn is_corner(pos: Position) -> bool {
    CORNERS.contains(&pos)
}

#[inline]
pub fn is_edge_adjacent(pos: Position) -> bool {
    EDGE_ADJACENT.contains(&pos)
}

#[inline]
pub fn is_stable_cell(pos: Position) -> bool {
    STABLE_CELLS.contains(&pos)
}

#[inline]
pub fn is_center(pos: Position) -> bool {
    CENTER.contains(&pos)
}

/// Per-component view of one move's reward.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RewardBreakdown {
    pub flip: f64,
    pub corner: f64,
    pub edge: f64,
    pub stable: f64,
    pub territory: f64,
    pub positional: f64,
    pub mobility: f64,
    pub pass_force: f64,
    pub neighbors: f64,
    pub dominance: f64,
    /// Product of the stage multipliers applied to the shaping sum.
    pub multiplier: f64,
    /// Terminal bonus or parity term, added after the multipliers.
    pub outcome: f64,
}

impl RewardBreakdown {
    /// Sum of the additive shaping terms before multipliers.
    pub fn shaping_sum(&self) -> f64 {
        self.flip
            + self.corner
            + self.edge
            + self.stable
            + self.territory
            + self.positional
            + self.mobility
            + self.pass_force
            + self.neighbors
            + self.dominance
    }

    /// Final reward.
    pub fn total(&self) -> f64 {
        self.shaping_sum() * self.multiplier + self.outcome
    }
}

/// Computes shaped rewards from a [`RewardConfig`].
#[derive(Clone, Debug, Default)]
pub struct RewardShaper {
    config: RewardConfig,
}

impl RewardShaper {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Reward for playing an illegal move.
    #[inline]
    pub fn invalid(&self) -> f64 {
        self.config.invalid
    }

    /// Break down the reward of `side` placing at `pos`.
    ///
    /// `before` is the board prior to the move, `after` the board with the
    /// stone placed and `flipped` stones turned. `terminal` says whether
    /// `after` ends the game.
    pub fn evaluate(
        &self,
        before: &Board,
        after: &Board,
        pos: Position,
        side: Color,
        flipped: usize,
        terminal: bool,
    ) -> RewardBreakdown {
        let cfg = &self.config;
        let opponent = side.opposite();

        let class = |hit: bool, value: f64| if hit { value } else { 0.0 };

        let opp_mobility_before = legal_moves_mask(before, opponent).count_ones() as f64;
        let opp_mobility_after = legal_moves_mask(after, opponent).count_ones() as f64;

        let mut neighbors = 0.0;
        for n in pos.neighbors() {
            match after.cell(n) {
                Some(c) if c == side => neighbors += cfg.own_neighbor,
                Some(_) => neighbors += cfg.opponent_neighbor,
                None => {}
            }
        }

        let own = after.count(side) as f64;
        let opp = after.count(opponent) as f64;

        RewardBreakdown {
            flip: flipped as f64 * cfg.flip,
            corner: class(is_corner(pos), cfg.corner),
            edge: class(is_edge_adjacent(pos), cfg.edge),
            stable: class(is_stable_cell(pos), cfg.stable),
            territory: class(is_center(pos), cfg.territory),
            positional: pos.distance_from_edge() as f64 * cfg.positional,
            mobility: (opp_mobility_before - opp_mobility_after) * cfg.mobility,
            pass_force: class(opp_mobility_after == 0.0, cfg.pass_force),
            neighbors,
            dominance: (own - opp) / (own + opp + 1.0) * cfg.dominance,
            multiplier: self.stage_multiplier(after.stone_count()),
            outcome: self.outcome(after, side, terminal),
        }
    }

    /// Total reward of a placement; see [`RewardShaper::evaluate`].
    pub fn reward(
        &self,
        before: &Board,
        after: &Board,
        pos: Position,
        side: Color,
        flipped: usize,
        terminal: bool,
    ) -> f64 {
        self.evaluate(before, after, pos, side, flipped, terminal)
            .total()
    }

    /// Combined stage multiplier for a board holding `stones` stones.
    pub fn stage_multiplier(&self, stones: u32) -> f64 {
        let cfg = &self.config;
        let mut multiplier = 1.0;
        if stones > cfg.endgame_threshold {
            multiplier *= cfg.endgame_multiplier;
        }
        if stones > cfg.late_threshold {
            multiplier *= cfg.late_multiplier;
        } else if stones > cfg.mid_threshold {
            multiplier *= cfg.mid_multiplier;
        }
        multiplier
    }

    /// Outcome term from the mover's perspective.
    ///
    /// On a terminal board this is the win/lose/draw bonus; otherwise the
    /// stone difference times the parity weight.
    pub fn outcome(&self, after: &Board, side: Color, terminal: bool) -> f64 {
        let own = after.count(side);
        let opp = after.count(side.opposite());
        if terminal {
            match own.cmp(&opp) {
                std::cmp::Ordering::Greater => self.config.win,
                std::cmp::Ordering::Less => self.config.lose,
                std::cmp::Ordering::Equal => self.config.draw,
            }
        } else {
            (own as f64 - opp as f64) * self.config.parity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{apply_move, is_terminal};

    fn shaper() -> RewardShaper {
        RewardShaper::new(RewardConfig::default())
    }

    #[test]
    fn test_cell_classes_are_disjoint() {
        for pos in (0..64).map(Position::from_index) {
            let hits = [
                is_corner(pos),
                is_edge_adjacent(pos),
                is_stable_cell(pos),
                is_center(pos),
            ]
            .iter()
            .filter(|&&b| b)
            .count();
            assert!(hits <= 1, "{} belongs to {} classes", pos, hits);
        }
    }

    #[test]
    fn test_stage_multiplier_cascade() {
        let s = shaper();
        assert_eq!(s.stage_multiplier(10), 1.0);
        assert_eq!(s.stage_multiplier(45), 1.0);
        assert!((s.stage_multiplier(46) - 1.2).abs() < 1e-12);
        assert!((s.stage_multiplier(50) - 1.2).abs() < 1e-12);
        assert!((s.stage_multiplier(51) - 1.3 * 1.2).abs() < 1e-12);
        assert!((s.stage_multiplier(56) - 1.3 * 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_opening_move_breakdown() {
        let s = shaper();
        let before = Board::new();
        let mut after = before;
        let pos = Position::new(2, 3);
        let flipped = apply_move(&mut after, pos, Color::Black);
        let terminal = is_terminal(&after);

        let b = s.evaluate(&before, &after, pos, Color::Black, flipped.len(), terminal);
        assert_eq!(b.flip, 1.0);
        assert_eq!(b.corner, 0.0);
        assert_eq!(b.edge, 0.0);
        assert_eq!(b.stable, 0.0);
        assert_eq!(b.territory, 0.0);
        assert_eq!(b.positional, 2.0 * 0.5);
        // white mobility: 4 before, 3 after
        assert_eq!(b.mobility, (4.0 - 3.0) * 0.5);
        assert_eq!(b.pass_force, 0.0);
        // own neighbours at (3,3) and (3,4), the rest empty
        assert_eq!(b.neighbors, 2.0 * 0.5);
        assert!((b.dominance - (4.0 - 1.0) / 6.0 * 2.0).abs() < 1e-12);
        assert_eq!(b.multiplier, 1.0);
        assert!((b.outcome - 3.0 * 0.1).abs() < 1e-12);
        assert!((b.total() - s.reward(&before, &after, pos, Color::Black, 1, false)).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_outcome_signs() {
        let s = shaper();
        let white_wins: Board = "
            WWW.....
            ........
            ........
            ........
            ........
            ........
            ........
            .......B
        "
        .parse()
        .unwrap();
        assert_eq!(s.outcome(&white_wins, Color::White, true), 100.0);
        assert_eq!(s.outcome(&white_wins, Color::Black, true), -100.0);
        assert!((s.outcome(&white_wins, Color::White, false) - 0.2).abs() < 1e-12);

        let draw = Board::new();
        assert_eq!(s.outcome(&draw, Color::Black, true), 50.0);
    }

    #[test]
    fn test_outcome_added_after_multiplier() {
        let b = RewardBreakdown {
            flip: 10.0,
            multiplier: 2.0,
            outcome: 100.0,
            ..Default::default()
        };
        assert_eq!(b.total(), 120.0);
    }
}
