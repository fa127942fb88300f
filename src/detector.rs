// src/detector.rs
// Polling loop: capture the display, analyze both windows concurrently,
// emit deduplicated round results

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::DynamicImage;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::settings::Settings;
use crate::timing::{OperationKind, TimingOptimizer};
use crate::types::{RoundResult, Window};
use crate::vision::RecognitionPipeline;

/// Pause after a failed cycle before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Display-capture service. `None` means "no frame right now" and is a
/// skip, not an error.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture_frame(&self) -> Option<DynamicImage>;
}

/// Receives detection events. The coordinator implements this; tests use a
/// collector.
pub trait DetectionObserver: Send + Sync {
    fn on_result(&self, window: Window, result: RoundResult);
    fn on_error(&self, message: String);
}

/// Drives the capture/analyze/dedup cycle for both windows until stopped.
/// Stopping is cooperative: the flag is checked between cycles, never
/// inside one.
pub struct ResultDetector {
    frames: Arc<dyn FrameSource>,
    pipeline: Arc<RecognitionPipeline>,
    optimizer: Arc<TimingOptimizer>,
    settings: Arc<Settings>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ResultDetector {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        pipeline: Arc<RecognitionPipeline>,
        optimizer: Arc<TimingOptimizer>,
        settings: Arc<Settings>,
    ) -> ResultDetector {
        ResultDetector {
            frames,
            pipeline,
            optimizer,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the polling loop. A second start while running is a no-op.
    pub fn start(&self, observer: Arc<dyn DetectionObserver>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("detector already running");
            return;
        }
        // Fresh session: baselines from the previous run are stale.
        self.pipeline.reset_snapshots();

        let frames = self.frames.clone();
        let pipeline = self.pipeline.clone();
        let optimizer = self.optimizer.clone();
        let settings = self.settings.clone();
        let running = self.running.clone();

        let handle = tokio::spawn(async move {
            info!("result detector started");
            let mut last_emitted: HashMap<Window, RoundResult> = HashMap::new();

            while running.load(Ordering::SeqCst) {
                let cycle_started = Instant::now();
                let outcome = run_cycle(
                    frames.as_ref(),
                    &pipeline,
                    &settings,
                    &mut last_emitted,
                    observer.as_ref(),
                )
                .await;

                let elapsed_ms = cycle_started.elapsed().as_millis() as u64;
                optimizer.record_metric(OperationKind::Detection, elapsed_ms, outcome.is_ok());

                if let Err(error) = outcome {
                    warn!(%error, "detection cycle failed");
                    observer.on_error(error.to_string());
                    sleep(ERROR_BACKOFF).await;
                    continue;
                }

                // Half the adaptive detection delay keeps cycles from
                // overlapping without starving fresh results.
                let min_interval = optimizer.delay_for(OperationKind::Detection) / 2;
                let elapsed = cycle_started.elapsed();
                if elapsed < min_interval {
                    sleep(min_interval - elapsed).await;
                }
            }
            info!("result detector stopped");
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Request a stop and wait for the loop to exit between cycles.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_cycle(
    frames: &dyn FrameSource,
    pipeline: &RecognitionPipeline,
    settings: &Settings,
    last_emitted: &mut HashMap<Window, RoundResult>,
    observer: &dyn DetectionObserver,
) -> Result<()> {
    let Some(frame) = frames.capture_frame().await else {
        debug!("no frame available, skipping cycle");
        return Ok(());
    };

    let left_region = crop_window(&frame, settings, Window::Left)?;
    let right_region = crop_window(&frame, settings, Window::Right)?;

    // Both windows analyzed concurrently; the cycle costs the slower of
    // the two, not their sum.
    let (left_result, right_result) = tokio::join!(
        pipeline.analyze(&left_region, Window::Left),
        pipeline.analyze(&right_region, Window::Right),
    );

    for (window, result) in [(Window::Left, left_result), (Window::Right, right_result)] {
        let Some(result) = result else { continue };
        let already_emitted = last_emitted
            .get(&window)
            .map(|prev| prev.same_outcome(&result))
            .unwrap_or(false);
        if !already_emitted {
            debug!(%window, ?result, "new round result");
            last_emitted.insert(window, result);
            observer.on_result(window, result);
        }
    }
    Ok(())
}

fn crop_window(frame: &DynamicImage, settings: &Settings, window: Window) -> Result<DynamicImage> {
    let rect = settings
        .region_for(window)
        .to_pixel_rect(frame.width(), frame.height());
    if rect.width == 0 || rect.height == 0 {
        bail!("{window} window region is empty at {}x{}", frame.width(), frame.height());
    }
    Ok(frame.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{RegionMapping, RelPoint};
    use crate::settings::StrategyParams;
    use crate::vision::{DotCounter, DotReading};
    use image::RgbaImage;

    fn half_region(x: f64) -> RegionMapping {
        RegionMapping {
            x,
            y: 0.0,
            width: 0.5,
            height: 1.0,
            stake_buttons: vec![RelPoint { x: 0.1, y: 0.9 }],
            red_button: RelPoint { x: 0.3, y: 0.8 },
            orange_button: RelPoint { x: 0.7, y: 0.8 },
            confirm_button: RelPoint { x: 0.5, y: 0.95 },
        }
    }

    fn test_settings() -> Arc<Settings> {
        Arc::new(Settings {
            left_region: half_region(0.0),
            right_region: half_region(0.5),
            monitor: None,
            strategy_params: StrategyParams::default(),
            remote_provider: None,
        })
    }

    struct SolidFrames {
        enabled: AtomicBool,
    }

    #[async_trait]
    impl FrameSource for SolidFrames {
        async fn capture_frame(&self) -> Option<DynamicImage> {
            if !self.enabled.load(Ordering::SeqCst) {
                return None;
            }
            let img = RgbaImage::from_fn(64, 32, |_, _| image::Rgba([40, 40, 40, 255]));
            Some(DynamicImage::ImageRgba8(img))
        }
    }

    struct SharedCounter {
        reading: Arc<Mutex<DotReading>>,
    }

    impl DotCounter for SharedCounter {
        fn count(&self, _image: &DynamicImage) -> DotReading {
            *self.reading.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct Collector {
        results: Mutex<Vec<(Window, RoundResult)>>,
        errors: Mutex<Vec<String>>,
    }

    impl DetectionObserver for Collector {
        fn on_result(&self, window: Window, result: RoundResult) {
            self.results.lock().unwrap().push((window, result));
        }

        fn on_error(&self, message: String) {
            self.errors.lock().unwrap().push(message);
        }
    }

    fn detector_with(
        reading: Arc<Mutex<DotReading>>,
        frames_enabled: bool,
    ) -> ResultDetector {
        let pipeline = Arc::new(RecognitionPipeline::new(
            Box::new(SharedCounter { reading }),
            None,
        ));
        ResultDetector::new(
            Arc::new(SolidFrames { enabled: AtomicBool::new(frames_enabled) }),
            pipeline,
            Arc::new(TimingOptimizer::new()),
            test_settings(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_results_emitted_once_per_window() {
        let reading = Arc::new(Mutex::new(DotReading {
            left_count: 3,
            right_count: 5,
            confidence: 0.9,
        }));
        let detector = detector_with(reading.clone(), true);
        let observer = Arc::new(Collector::default());

        detector.start(observer.clone());
        sleep(Duration::from_secs(10)).await;
        detector.stop().await;

        let results = observer.results.lock().unwrap();
        assert_eq!(results.len(), 2, "one emission per window despite many cycles");
        assert!(results.iter().any(|(w, _)| *w == Window::Left));
        assert!(results.iter().any(|(w, _)| *w == Window::Right));
        assert_eq!(results[0].1.left_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_outcome_is_emitted_again() {
        let reading = Arc::new(Mutex::new(DotReading {
            left_count: 3,
            right_count: 5,
            confidence: 0.9,
        }));
        let detector = detector_with(reading.clone(), true);
        let observer = Arc::new(Collector::default());

        detector.start(observer.clone());
        sleep(Duration::from_secs(5)).await;

        *reading.lock().unwrap() = DotReading {
            left_count: 6,
            right_count: 1,
            confidence: 0.9,
        };
        sleep(Duration::from_secs(5)).await;
        detector.stop().await;

        let results = observer.results.lock().unwrap();
        assert_eq!(results.len(), 4, "two outcomes per window");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_frames_are_a_skip_not_an_error() {
        let reading = Arc::new(Mutex::new(DotReading {
            left_count: 1,
            right_count: 1,
            confidence: 0.9,
        }));
        let detector = detector_with(reading, false);
        let observer = Arc::new(Collector::default());

        detector.start(observer.clone());
        sleep(Duration::from_secs(5)).await;
        detector.stop().await;

        assert!(observer.results.lock().unwrap().is_empty());
        assert!(observer.errors.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_frames_produce_no_events() {
        let reading = Arc::new(Mutex::new(DotReading {
            left_count: 2,
            right_count: 4,
            confidence: 0.3,
        }));
        let detector = detector_with(reading, true);
        let observer = Arc::new(Collector::default());

        detector.start(observer.clone());
        sleep(Duration::from_secs(5)).await;
        detector.stop().await;

        assert!(observer.results.lock().unwrap().is_empty());
        assert!(observer.errors.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_cooperative_and_idempotent() {
        let reading = Arc::new(Mutex::new(DotReading {
            left_count: 1,
            right_count: 2,
            confidence: 0.9,
        }));
        let detector = detector_with(reading, true);
        let observer = Arc::new(Collector::default());

        detector.start(observer.clone());
        assert!(detector.is_running());

        detector.stop().await;
        assert!(!detector.is_running());
        detector.stop().await;

        // Restart works and re-baselines.
        detector.start(observer.clone());
        assert!(detector.is_running());
        detector.stop().await;
    }
}
