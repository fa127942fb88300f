// src/types.rs
// Core value types shared across the betting engine

use serde::{Deserialize, Serialize};

/// Maximum dots visible on one side of the table
pub const MAX_DOT_COUNT: u8 = 6;

/// One of the two mutually-exclusive screen regions the engine interacts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Left,
    Right,
}

impl Window {
    pub fn other(&self) -> Window {
        match self {
            Window::Left => Window::Right,
            Window::Right => Window::Left,
        }
    }

    pub const ALL: [Window; 2] = [Window::Left, Window::Right];
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Window::Left => write!(f, "left"),
            Window::Right => write!(f, "right"),
        }
    }
}

/// Binary bet selector. Red pays when the left side shows more dots,
/// orange when the right side does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Red,
    Orange,
}

impl Choice {
    pub fn opposite(&self) -> Choice {
        match self {
            Choice::Red => Choice::Orange,
            Choice::Orange => Choice::Red,
        }
    }
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::Red => write!(f, "red"),
            Choice::Orange => write!(f, "orange"),
        }
    }
}

/// A fully validated round outcome.
///
/// Built only through [`RoundResult::from_counts`] so the invariants hold:
/// counts are within 0..=6, `is_draw` iff the counts are equal, and a winner
/// is present exactly when the round is not a draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub left_count: u8,
    pub right_count: u8,
    pub winner: Option<Choice>,
    pub is_draw: bool,
    pub confidence: f32,
}

impl RoundResult {
    /// Validate raw counts into a result. Counts above the table maximum are
    /// clamped and the reading's confidence is penalized for it.
    pub fn from_counts(left: u8, right: u8, confidence: f32) -> RoundResult {
        let mut confidence = confidence.clamp(0.0, 1.0);
        if left > MAX_DOT_COUNT || right > MAX_DOT_COUNT {
            confidence *= 0.5;
        }
        let left = left.min(MAX_DOT_COUNT);
        let right = right.min(MAX_DOT_COUNT);

        let is_draw = left == right;
        let winner = if is_draw {
            None
        } else if left > right {
            Some(Choice::Red)
        } else {
            Some(Choice::Orange)
        };

        RoundResult {
            left_count: left,
            right_count: right,
            winner,
            is_draw,
            confidence,
        }
    }

    /// Equality used for per-window event dedup: counts and winner only,
    /// confidence jitter between polls must not re-emit the same round.
    pub fn same_outcome(&self, other: &RoundResult) -> bool {
        self.left_count == other.left_count
            && self.right_count == other.right_count
            && self.winner == other.winner
    }
}

/// Bet-sizing and switching rule set, fixed per session unless explicitly
/// updated through the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    WinSwitch,
    LossDouble,
    ColorAlternating,
}

/// Session state owned by the coordinator. Every change goes through a pure
/// transition function in `strategy.rs` that returns a fresh state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub current_color: Choice,
    pub consecutive_losses: u32,
    pub current_bet: u64,
    pub waiting_for_result: bool,
    pub total_bets_placed: u64,
    pub total_profit: i64,
    pub active_window: Option<Window>,
}

impl GameState {
    pub fn new(starting_color: Choice, base_bet: u64, active_window: Window) -> GameState {
        GameState {
            current_color: starting_color,
            consecutive_losses: 0,
            current_bet: base_bet,
            waiting_for_result: false,
            total_bets_placed: 0,
            total_profit: 0,
            active_window: Some(active_window),
        }
    }
}

/// Snapshot of the public session counters, surfaced through `get_stats()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub running: bool,
    pub total_bets: u64,
    pub profit: i64,
    pub active_window: Option<Window>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_iff_counts_equal() {
        for left in 0..=6u8 {
            for right in 0..=6u8 {
                let result = RoundResult::from_counts(left, right, 0.9);
                assert_eq!(result.is_draw, left == right);
                if result.is_draw {
                    assert_eq!(result.winner, None);
                } else {
                    assert!(result.winner.is_some());
                }
            }
        }
    }

    #[test]
    fn winner_follows_higher_side() {
        let left_wins = RoundResult::from_counts(5, 2, 0.9);
        assert_eq!(left_wins.winner, Some(Choice::Red));

        let right_wins = RoundResult::from_counts(1, 4, 0.9);
        assert_eq!(right_wins.winner, Some(Choice::Orange));
    }

    #[test]
    fn out_of_range_counts_clamped_and_penalized() {
        let result = RoundResult::from_counts(9, 3, 0.8);
        assert_eq!(result.left_count, MAX_DOT_COUNT);
        assert_eq!(result.right_count, 3);
        assert!(result.confidence < 0.5, "clamped counts must cost confidence");
    }

    #[test]
    fn outcome_equality_ignores_confidence() {
        let a = RoundResult::from_counts(3, 5, 0.8);
        let b = RoundResult::from_counts(3, 5, 0.95);
        assert!(a.same_outcome(&b));

        let c = RoundResult::from_counts(5, 3, 0.8);
        assert!(!a.same_outcome(&c));
    }

    #[test]
    fn window_and_choice_flip() {
        assert_eq!(Window::Left.other(), Window::Right);
        assert_eq!(Choice::Red.opposite(), Choice::Orange);
        assert_eq!(Choice::Orange.opposite().opposite(), Choice::Orange);
    }
}
