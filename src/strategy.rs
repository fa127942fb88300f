// src/strategy.rs
// Pure bet-sizing and state transition functions for the session strategies

use crate::settings::StrategyParams;
use crate::types::{GameState, RoundResult, Strategy};

/// Next stake for a given loss streak. WinSwitch always bets the base
/// amount; the doubling strategies play a capped martingale.
pub fn bet_amount(strategy: Strategy, base_bet: u64, max_bet: u64, consecutive_losses: u32) -> u64 {
    match strategy {
        Strategy::WinSwitch => base_bet.min(max_bet),
        Strategy::LossDouble | Strategy::ColorAlternating => {
            if consecutive_losses >= u64::BITS {
                return max_bet;
            }
            base_bet
                .saturating_mul(1u64 << consecutive_losses)
                .min(max_bet)
        }
    }
}

/// Transition after a bet was physically placed.
pub fn after_bet_placed(state: &GameState, amount: u64) -> GameState {
    GameState {
        current_bet: amount,
        waiting_for_result: true,
        total_bets_placed: state.total_bets_placed + 1,
        ..state.clone()
    }
}

/// Transition after a round result arrived for the active window. Returns
/// the new state; the input is never mutated.
///
/// A draw settles like a loss: the stake is gone and the streak grows.
pub fn apply_result(
    state: &GameState,
    params: &StrategyParams,
    result: &RoundResult,
) -> GameState {
    let won = result.winner == Some(state.current_color);
    let stake = state.current_bet as i64;

    let mut next = state.clone();
    next.waiting_for_result = false;

    if won {
        next.consecutive_losses = 0;
        next.total_profit += stake;
    } else {
        next.consecutive_losses = state.consecutive_losses + 1;
        next.total_profit -= stake;
    }

    match params.strategy {
        Strategy::WinSwitch | Strategy::LossDouble => {
            next.active_window = state.active_window.map(|w| w.other());
        }
        Strategy::ColorAlternating => {
            if next.consecutive_losses >= params.color_switch_threshold {
                next.current_color = state.current_color.opposite();
                next.consecutive_losses = 0;
            }
        }
    }

    next.current_bet = bet_amount(
        params.strategy,
        params.base_bet,
        params.max_bet,
        next.consecutive_losses,
    );
    next
}
