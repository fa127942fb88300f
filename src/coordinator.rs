// src/coordinator.rs
// Root state machine: place bet -> await result -> apply strategy -> repeat

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bet::BetPlacer;
use crate::detector::{DetectionObserver, ResultDetector};
use crate::settings::StrategyParams;
use crate::strategy::{after_bet_placed, apply_result, bet_amount};
use crate::sync::WindowSynchronizer;
use crate::timing::{OperationKind, TimingOptimizer};
use crate::types::{GameState, RoundResult, SessionStats, Window};

/// Coordinator lifecycle. Stopped sessions restart with a fresh GameState.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Running,
    Stopped,
}

/// Observer surface for the excluded UI/CLI layers. Implementations must
/// return quickly; they are called from the game loop.
pub trait EventSink: Send + Sync {
    fn on_state_changed(&self, _state: &GameState) {}
    fn on_bet_completed(&self, _window: Window, _choice: crate::types::Choice, _amount: u64) {}
    fn on_result_processed(&self, _window: Window, _result: &RoundResult) {}
    fn on_error_occurred(&self, _message: &str, _detail: &str) {}
}

/// Bridges detector events into the game loop's channel so the loop stays
/// the single owner of GameState.
struct ResultRelay {
    tx: mpsc::UnboundedSender<(Window, RoundResult)>,
    events: Arc<dyn EventSink>,
}

impl DetectionObserver for ResultRelay {
    fn on_result(&self, window: Window, result: RoundResult) {
        let _ = self.tx.send((window, result));
    }

    fn on_error(&self, message: String) {
        self.events.on_error_occurred("detection cycle failed", &message);
    }
}

pub struct GameCoordinator {
    placer: Arc<BetPlacer>,
    detector: Arc<ResultDetector>,
    synchronizer: Arc<WindowSynchronizer>,
    optimizer: Arc<TimingOptimizer>,
    events: Arc<dyn EventSink>,
    params: Arc<Mutex<StrategyParams>>,
    game_state: Arc<Mutex<GameState>>,
    lifecycle: Mutex<CoordinatorState>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GameCoordinator {
    pub fn new(
        placer: Arc<BetPlacer>,
        detector: Arc<ResultDetector>,
        synchronizer: Arc<WindowSynchronizer>,
        optimizer: Arc<TimingOptimizer>,
        events: Arc<dyn EventSink>,
        params: StrategyParams,
    ) -> GameCoordinator {
        let initial = initial_state(&params);
        GameCoordinator {
            placer,
            detector,
            synchronizer,
            optimizer,
            events,
            params: Arc::new(Mutex::new(params)),
            game_state: Arc::new(Mutex::new(initial)),
            lifecycle: Mutex::new(CoordinatorState::Idle),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Begin a session: fresh GameState, detector polling, game loop.
    /// Starting an already running coordinator is a no-op.
    pub fn start(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if *lifecycle == CoordinatorState::Running {
                debug!("coordinator already running");
                return;
            }
            *lifecycle = CoordinatorState::Running;
        }
        self.running.store(true, Ordering::SeqCst);

        {
            let params = self.params.lock().unwrap();
            *self.game_state.lock().unwrap() = initial_state(&params);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.detector.start(Arc::new(ResultRelay {
            tx,
            events: self.events.clone(),
        }));

        let placer = self.placer.clone();
        let synchronizer = self.synchronizer.clone();
        let optimizer = self.optimizer.clone();
        let events = self.events.clone();
        let params = self.params.clone();
        let game_state = self.game_state.clone();
        let running = self.running.clone();

        let handle = tokio::spawn(async move {
            info!("game coordinator started");
            let opening = game_state.lock().unwrap().clone();
            events.on_state_changed(&opening);
            game_loop(
                placer,
                synchronizer,
                optimizer,
                events,
                params,
                game_state,
                running,
                rx,
            )
            .await;
            info!("game coordinator stopped");
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Cooperative stop: the loop finishes its current phase (an in-flight
    /// click sequence always completes) before exiting.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.detector.stop().await;
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.lifecycle.lock().unwrap() = CoordinatorState::Stopped;
    }

    /// Swap strategy parameters. Takes effect on the next session start;
    /// a running session keeps its current parameters until restarted.
    pub fn update_settings(&self, new_params: StrategyParams) {
        let running = *self.lifecycle.lock().unwrap() == CoordinatorState::Running;
        if running {
            warn!("settings updated while running, applied on next start");
        }
        *self.params.lock().unwrap() = new_params;
    }

    pub fn get_stats(&self) -> SessionStats {
        let state = self.game_state.lock().unwrap();
        SessionStats {
            running: *self.lifecycle.lock().unwrap() == CoordinatorState::Running,
            total_bets: state.total_bets_placed,
            profit: state.total_profit,
            active_window: state.active_window,
        }
    }

    pub fn lifecycle(&self) -> CoordinatorState {
        *self.lifecycle.lock().unwrap()
    }
}

fn initial_state(params: &StrategyParams) -> GameState {
    let opening_bet = bet_amount(params.strategy, params.base_bet, params.max_bet, 0);
    GameState::new(params.starting_color, opening_bet, params.starting_window)
}

#[allow(clippy::too_many_arguments)]
async fn game_loop(
    placer: Arc<BetPlacer>,
    synchronizer: Arc<WindowSynchronizer>,
    optimizer: Arc<TimingOptimizer>,
    events: Arc<dyn EventSink>,
    params: Arc<Mutex<StrategyParams>>,
    game_state: Arc<Mutex<GameState>>,
    running: Arc<AtomicBool>,
    mut results: mpsc::UnboundedReceiver<(Window, RoundResult)>,
) {
    while running.load(Ordering::SeqCst) {
        // Phase 1: settle any detected results for the active window.
        while let Ok((window, result)) = results.try_recv() {
            let state = game_state.lock().unwrap().clone();
            if !state.waiting_for_result || state.active_window != Some(window) {
                debug!(%window, "ignoring result for inactive window");
                continue;
            }

            events.on_result_processed(window, &result);
            let current_params = params.lock().unwrap().clone();
            let next = apply_result(&state, &current_params, &result);
            debug!(
                %window,
                won = next.consecutive_losses == 0,
                losses = next.consecutive_losses,
                next_bet = next.current_bet,
                "result settled"
            );
            *game_state.lock().unwrap() = next.clone();
            events.on_state_changed(&next);
        }

        // Phase 2: place the next bet when the previous round is settled.
        let state = game_state.lock().unwrap().clone();
        if !state.waiting_for_result {
            if let Some(window) = state.active_window {
                // Back-to-back window switches wait for the quiet buffer.
                if !synchronizer.is_ready_for_fast_switch() {
                    sleep(optimizer.delay_for(OperationKind::Reaction)).await;
                }

                let amount = state.current_bet;
                let choice = state.current_color;
                if placer.place_bet(window, choice, amount).await {
                    let next = after_bet_placed(&state, amount);
                    *game_state.lock().unwrap() = next.clone();
                    events.on_bet_completed(window, choice, amount);
                    events.on_state_changed(&next);
                } else {
                    events.on_error_occurred(
                        "bet placement failed",
                        &format!("window={window} amount={amount}"),
                    );
                }
            }
        }

        // Phase 3: react to sustained slowness before the next tick.
        if optimizer.should_reduce_load() {
            optimizer.apply_reduced_load_mode();
        }

        sleep(optimizer.delay_for(OperationKind::Reaction)).await;
    }
}
