// src/bet.rs
// Physical bet placement: stake -> choice -> confirm click sequence

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::geometry::RegionMapping;
use crate::settings::Settings;
use crate::sync::{SyncOperation, WindowSynchronizer};
use crate::timing::{OperationKind, TimingOptimizer};
use crate::types::{Choice, Window};

/// Fixed stake ladder offered by the table UI, lowest first.
pub const DENOMINATIONS: [u64; 5] = [10, 50, 100, 500, 2500];

const BET_PRIORITY: u8 = 5;

/// Platform click-injection service. Must complete or fail within a bounded
/// time; the engine treats `false` as an aborted placement.
#[async_trait]
pub trait ClickInjector: Send + Sync {
    async fn click(&self, x: i32, y: i32) -> bool;
}

/// Largest denomination not exceeding the requested amount, or the smallest
/// one when the request is below the whole ladder. A monotonic step
/// function, deliberately not nearest-neighbor.
pub fn select_denomination(amount: u64) -> (usize, u64) {
    let mut selected = 0;
    for (i, &denomination) in DENOMINATIONS.iter().enumerate() {
        if denomination <= amount {
            selected = i;
        } else {
            break;
        }
    }
    (selected, DENOMINATIONS[selected])
}

/// Executes the three-step action sequence for one bet, pacing every click
/// from the optimizer and holding the window lock for the whole sequence.
pub struct BetPlacer {
    clicker: Arc<dyn ClickInjector>,
    synchronizer: Arc<WindowSynchronizer>,
    optimizer: Arc<TimingOptimizer>,
    settings: Arc<Settings>,
    screen_width: u32,
    screen_height: u32,
}

impl BetPlacer {
    pub fn new(
        clicker: Arc<dyn ClickInjector>,
        synchronizer: Arc<WindowSynchronizer>,
        optimizer: Arc<TimingOptimizer>,
        settings: Arc<Settings>,
        screen_width: u32,
        screen_height: u32,
    ) -> BetPlacer {
        BetPlacer {
            clicker,
            synchronizer,
            optimizer,
            settings,
            screen_width,
            screen_height,
        }
    }

    /// Place one bet on a window. Returns `false` when the window could not
    /// be acquired or any click failed; no later step runs after a failure.
    pub async fn place_bet(&self, window: Window, choice: Choice, amount: u64) -> bool {
        let mut operation = SyncOperation::new(OperationKind::BetPlacement, window, BET_PRIORITY);
        if !self.synchronizer.acquire_with_retries(&mut operation).await {
            debug!(%window, "bet skipped, window unavailable");
            return false;
        }

        let started = Instant::now();
        let success = self.run_click_sequence(window, choice, amount).await;
        self.optimizer.record_metric(
            OperationKind::BetPlacement,
            started.elapsed().as_millis() as u64,
            success,
        );
        self.synchronizer.release(window, &operation, success);
        success
    }

    async fn run_click_sequence(&self, window: Window, choice: Choice, amount: u64) -> bool {
        let region = self.settings.region_for(window);

        let (ladder_index, denomination) = select_denomination(amount);
        let Some(&stake_point) = region
            .stake_buttons
            .get(ladder_index)
            .or_else(|| region.stake_buttons.last())
        else {
            warn!(%window, "no stake buttons mapped for this region");
            return false;
        };
        debug!(%window, amount, denomination, "selecting stake");
        if !self
            .click_step(region, stake_point, OperationKind::Click)
            .await
        {
            warn!(%window, "stake click failed, aborting placement");
            return false;
        }

        let choice_point = match choice {
            Choice::Red => region.red_button,
            Choice::Orange => region.orange_button,
        };
        if !self
            .click_step(region, choice_point, OperationKind::Click)
            .await
        {
            warn!(%window, %choice, "choice click failed, aborting placement");
            return false;
        }

        // Confirmation gets the longer settle delay so the table registers
        // the bet before the next action.
        if !self
            .click_step(region, region.confirm_button, OperationKind::Confirmation)
            .await
        {
            warn!(%window, "confirm click failed, aborting placement");
            return false;
        }

        true
    }

    async fn click_step(
        &self,
        region: &RegionMapping,
        point: crate::geometry::RelPoint,
        kind: OperationKind,
    ) -> bool {
        let (x, y) = region.resolve_point(point, self.screen_width, self.screen_height);
        let started = Instant::now();
        let success = self.clicker.click(x, y).await;
        self.optimizer
            .record_metric(kind, started.elapsed().as_millis() as u64, success);
        if success {
            sleep(self.optimizer.delay_for(kind)).await;
        }
        success
    }
}
