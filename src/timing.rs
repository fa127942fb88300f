// src/timing.rs
// Adaptive operation pacing derived from a bounded rolling performance history

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kinds of timed operations the engine performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Detection,
    Reaction,
    Click,
    Confirmation,
    BetPlacement,
}

/// One recorded operation outcome. Read-only once appended.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceMetric {
    pub kind: OperationKind,
    pub duration_ms: u64,
    pub success: bool,
    pub recorded_at: Instant,
}

/// Current recommended delays, all clamped to the per-kind bounds below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySet {
    pub detection_ms: u64,
    pub reaction_ms: u64,
    pub click_ms: u64,
    pub confirmation_ms: u64,
}

impl Default for DelaySet {
    fn default() -> Self {
        DelaySet {
            detection_ms: 1500,
            reaction_ms: 300,
            click_ms: 150,
            confirmation_ms: 600,
        }
    }
}

const HISTORY_CAPACITY: usize = 20;
const REDERIVE_INTERVAL: Duration = Duration::from_secs(30);

const DETECTION_BOUNDS: (u64, u64) = (500, 5000);
const REACTION_BOUNDS: (u64, u64) = (100, 1000);
const CLICK_BOUNDS: (u64, u64) = (50, 800);
const CONFIRMATION_BOUNDS: (u64, u64) = (200, 2000);

const DETECTION_STEP: u64 = 250;
const REACTION_STEP: u64 = 50;
const CLICK_STEP: u64 = 25;
const CONFIRMATION_STEP: u64 = 100;

/// Average duration above this counts an operation as slow.
const SLOW_THRESHOLD_MS: u64 = 800;
/// Average duration below this counts as fast.
const FAST_THRESHOLD_MS: u64 = 300;

const REACTION_SLOW_MS: u64 = 500;
const REACTION_FAST_MS: u64 = 200;

const LOAD_SHED_FACTOR: f64 = 1.5;
const HIGH_PERF_FACTOR: f64 = 0.8;

struct OptimizerInner {
    history: VecDeque<PerformanceMetric>,
    delays: DelaySet,
    last_derivation: Instant,
}

/// Derives recommended delays from recent operation timings. Every caller
/// that needs to pause between actions asks this instead of hard-coding a
/// sleep.
pub struct TimingOptimizer {
    inner: Mutex<OptimizerInner>,
}

impl Default for TimingOptimizer {
    fn default() -> Self {
        TimingOptimizer::new()
    }
}

impl TimingOptimizer {
    pub fn new() -> TimingOptimizer {
        TimingOptimizer {
            inner: Mutex::new(OptimizerInner {
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
                delays: DelaySet::default(),
                last_derivation: Instant::now(),
            }),
        }
    }

    /// Append one timing sample. Triggers re-derivation when the interval
    /// has elapsed or the ring buffer is full.
    pub fn record_metric(&self, kind: OperationKind, duration_ms: u64, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        if inner.history.len() == HISTORY_CAPACITY {
            inner.history.pop_front();
        }
        inner.history.push_back(PerformanceMetric {
            kind,
            duration_ms,
            success,
            recorded_at: Instant::now(),
        });

        let buffer_full = inner.history.len() == HISTORY_CAPACITY;
        if buffer_full || inner.last_derivation.elapsed() >= REDERIVE_INTERVAL {
            let history: Vec<PerformanceMetric> = inner.history.iter().copied().collect();
            let derived = derive_delays(&history, inner.delays);
            if derived != inner.delays {
                debug!(?derived, "timing delays re-derived");
            }
            inner.delays = derived;
            inner.last_derivation = Instant::now();
        }
    }

    pub fn delay_for(&self, kind: OperationKind) -> Duration {
        let delays = self.inner.lock().unwrap().delays;
        let ms = match kind {
            OperationKind::Detection => delays.detection_ms,
            OperationKind::Reaction => delays.reaction_ms,
            // A bet placement is a click sequence, paced like one.
            OperationKind::Click | OperationKind::BetPlacement => delays.click_ms,
            OperationKind::Confirmation => delays.confirmation_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn current_delays(&self) -> DelaySet {
        self.inner.lock().unwrap().delays
    }

    /// True when at least 3 of the last 10 recorded operations ran slow.
    /// Callers should respond by calling [`apply_reduced_load_mode`].
    ///
    /// [`apply_reduced_load_mode`]: TimingOptimizer::apply_reduced_load_mode
    pub fn should_reduce_load(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        let slow = inner
            .history
            .iter()
            .rev()
            .take(10)
            .filter(|m| m.duration_ms > SLOW_THRESHOLD_MS)
            .count();
        slow >= 3
    }

    /// Widen every delay by a fixed factor, clamped to ceilings.
    pub fn apply_reduced_load_mode(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.delays = scale_delays(inner.delays, LOAD_SHED_FACTOR);
        debug!(delays = ?inner.delays, "reduced load mode applied");
    }

    /// Proportionally shrink every delay, clamped to floors.
    pub fn optimize(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.delays = scale_delays(inner.delays, HIGH_PERF_FACTOR);
        debug!(delays = ?inner.delays, "high performance mode applied");
    }

    #[cfg(test)]
    fn force_derivation_due(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_derivation = Instant::now() - REDERIVE_INTERVAL;
    }
}

fn clamp_delay(ms: u64, bounds: (u64, u64)) -> u64 {
    ms.clamp(bounds.0, bounds.1)
}

fn scale_delays(delays: DelaySet, factor: f64) -> DelaySet {
    let scale = |ms: u64, bounds: (u64, u64)| clamp_delay((ms as f64 * factor) as u64, bounds);
    DelaySet {
        detection_ms: scale(delays.detection_ms, DETECTION_BOUNDS),
        reaction_ms: scale(delays.reaction_ms, REACTION_BOUNDS),
        click_ms: scale(delays.click_ms, CLICK_BOUNDS),
        confirmation_ms: scale(delays.confirmation_ms, CONFIRMATION_BOUNDS),
    }
}

fn kind_stats(history: &[PerformanceMetric], kind: OperationKind) -> Option<(u64, f64)> {
    let metrics: Vec<&PerformanceMetric> = history.iter().filter(|m| m.kind == kind).collect();
    if metrics.is_empty() {
        return None;
    }
    let avg = metrics.iter().map(|m| m.duration_ms).sum::<u64>() / metrics.len() as u64;
    let success_rate =
        metrics.iter().filter(|m| m.success).count() as f64 / metrics.len() as f64;
    Some((avg, success_rate))
}

/// Pure re-derivation of the delay set from a history snapshot. Kinds with
/// no recorded samples keep their current delay.
fn derive_delays(history: &[PerformanceMetric], current: DelaySet) -> DelaySet {
    let mut next = current;

    if let Some((avg, success_rate)) = kind_stats(history, OperationKind::Detection) {
        if avg > SLOW_THRESHOLD_MS {
            next.detection_ms =
                clamp_delay(current.detection_ms + DETECTION_STEP, DETECTION_BOUNDS);
        } else if avg < FAST_THRESHOLD_MS && success_rate > 0.90 {
            next.detection_ms = clamp_delay(
                current.detection_ms.saturating_sub(DETECTION_STEP),
                DETECTION_BOUNDS,
            );
        }
    }

    if let Some((avg, _)) = kind_stats(history, OperationKind::Reaction) {
        if avg < REACTION_FAST_MS {
            next.reaction_ms = clamp_delay(
                current.reaction_ms.saturating_sub(REACTION_STEP),
                REACTION_BOUNDS,
            );
        } else if avg > REACTION_SLOW_MS {
            next.reaction_ms = clamp_delay(current.reaction_ms + REACTION_STEP, REACTION_BOUNDS);
        }
    }

    if let Some((_, success_rate)) = kind_stats(history, OperationKind::Click) {
        if success_rate < 0.80 {
            next.click_ms = clamp_delay(current.click_ms + CLICK_STEP, CLICK_BOUNDS);
        } else if success_rate > 0.95 {
            next.click_ms =
                clamp_delay(current.click_ms.saturating_sub(CLICK_STEP), CLICK_BOUNDS);
        }
    }

    if let Some((_, success_rate)) = kind_stats(history, OperationKind::Confirmation) {
        if success_rate < 0.80 {
            next.confirmation_ms =
                clamp_delay(current.confirmation_ms + CONFIRMATION_STEP, CONFIRMATION_BOUNDS);
        } else if success_rate > 0.95 {
            next.confirmation_ms = clamp_delay(
                current.confirmation_ms.saturating_sub(CONFIRMATION_STEP),
                CONFIRMATION_BOUNDS,
            );
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(kind: OperationKind, duration_ms: u64, success: bool) -> PerformanceMetric {
        PerformanceMetric {
            kind,
            duration_ms,
            success,
            recorded_at: Instant::now(),
        }
    }

    #[test]
    fn history_is_bounded() {
        let optimizer = TimingOptimizer::new();
        for _ in 0..100 {
            optimizer.record_metric(OperationKind::Click, 40, true);
        }
        let inner = optimizer.inner.lock().unwrap();
        assert_eq!(inner.history.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn slow_detection_widens_interval() {
        let history: Vec<_> = (0..5)
            .map(|_| metric(OperationKind::Detection, 1200, true))
            .collect();
        let derived = derive_delays(&history, DelaySet::default());
        assert_eq!(derived.detection_ms, 1500 + DETECTION_STEP);
    }

    #[test]
    fn fast_successful_detection_narrows_interval() {
        let history: Vec<_> = (0..10)
            .map(|_| metric(OperationKind::Detection, 100, true))
            .collect();
        let derived = derive_delays(&history, DelaySet::default());
        assert_eq!(derived.detection_ms, 1500 - DETECTION_STEP);
    }

    #[test]
    fn fast_but_failing_detection_keeps_interval() {
        // 50% success rate blocks the narrowing rule.
        let history: Vec<_> = (0..10)
            .map(|i| metric(OperationKind::Detection, 100, i % 2 == 0))
            .collect();
        let derived = derive_delays(&history, DelaySet::default());
        assert_eq!(derived.detection_ms, 1500);
    }

    #[test]
    fn failing_clicks_widen_click_delay() {
        let history: Vec<_> = (0..10)
            .map(|i| metric(OperationKind::Click, 60, i < 5))
            .collect();
        let derived = derive_delays(&history, DelaySet::default());
        assert_eq!(derived.click_ms, 150 + CLICK_STEP);
    }

    #[test]
    fn reliable_clicks_narrow_click_delay() {
        let history: Vec<_> = (0..10)
            .map(|_| metric(OperationKind::Click, 60, true))
            .collect();
        let derived = derive_delays(&history, DelaySet::default());
        assert_eq!(derived.click_ms, 150 - CLICK_STEP);
    }

    #[test]
    fn derived_delays_never_escape_bounds() {
        // Hammer the derivation in both directions from extreme starts.
        let slow: Vec<_> = (0..HISTORY_CAPACITY)
            .map(|_| metric(OperationKind::Detection, 10_000, false))
            .collect();
        let mut delays = DelaySet {
            detection_ms: DETECTION_BOUNDS.1,
            reaction_ms: REACTION_BOUNDS.1,
            click_ms: CLICK_BOUNDS.1,
            confirmation_ms: CONFIRMATION_BOUNDS.1,
        };
        for _ in 0..50 {
            delays = derive_delays(&slow, delays);
        }
        assert_eq!(delays.detection_ms, DETECTION_BOUNDS.1);

        let fast: Vec<_> = (0..HISTORY_CAPACITY)
            .map(|_| metric(OperationKind::Detection, 10, true))
            .collect();
        for _ in 0..50 {
            delays = derive_delays(&fast, delays);
        }
        assert_eq!(delays.detection_ms, DETECTION_BOUNDS.0);
        assert!(delays.detection_ms >= DETECTION_BOUNDS.0);
    }

    #[test]
    fn full_buffer_triggers_derivation() {
        let optimizer = TimingOptimizer::new();
        for _ in 0..HISTORY_CAPACITY {
            optimizer.record_metric(OperationKind::Detection, 1200, true);
        }
        assert_eq!(
            optimizer.current_delays().detection_ms,
            1500 + DETECTION_STEP
        );
    }

    #[test]
    fn elapsed_interval_triggers_derivation() {
        let optimizer = TimingOptimizer::new();
        optimizer.record_metric(OperationKind::Detection, 1200, true);
        assert_eq!(optimizer.current_delays().detection_ms, 1500);

        optimizer.force_derivation_due();
        optimizer.record_metric(OperationKind::Detection, 1200, true);
        assert_eq!(
            optimizer.current_delays().detection_ms,
            1500 + DETECTION_STEP
        );
    }

    #[test]
    fn load_shedding_detects_slow_streaks() {
        let optimizer = TimingOptimizer::new();
        for _ in 0..7 {
            optimizer.record_metric(OperationKind::Click, 50, true);
        }
        assert!(!optimizer.should_reduce_load());

        for _ in 0..3 {
            optimizer.record_metric(OperationKind::Detection, 2000, true);
        }
        assert!(optimizer.should_reduce_load());
    }

    #[test]
    fn mode_switches_stay_clamped() {
        let optimizer = TimingOptimizer::new();
        for _ in 0..20 {
            optimizer.apply_reduced_load_mode();
        }
        let widened = optimizer.current_delays();
        assert_eq!(widened.detection_ms, DETECTION_BOUNDS.1);
        assert_eq!(widened.click_ms, CLICK_BOUNDS.1);

        for _ in 0..50 {
            optimizer.optimize();
        }
        let narrowed = optimizer.current_delays();
        assert_eq!(narrowed.detection_ms, DETECTION_BOUNDS.0);
        assert_eq!(narrowed.click_ms, CLICK_BOUNDS.0);
    }
}
