// src/vision/pipeline.rs
// Change-gated recognition: local counts always, remote analysis only when
// the scene actually changed and the response cache misses

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{RoundResult, Window};
use crate::vision::remote::{RemoteAnalyzer, RemoteCounts};
use crate::vision::{DotCounter, DotReading};

/// Local readings below this confidence are treated as "no result yet".
const MIN_LOCAL_CONFIDENCE: f32 = 0.7;
/// Confidence drift within this epsilon does not count as a scene change.
const CONFIDENCE_EPSILON: f32 = 0.05;
/// Confidence assigned to results backed by the remote analyzer.
const REMOTE_RESULT_CONFIDENCE: f32 = 0.95;

const CACHE_CAPACITY: usize = 50;

/// Last accepted local reading for one window. Only used for the
/// did-the-scene-change test; reset on session (re)start.
#[derive(Debug, Clone, Copy)]
struct DetectionSnapshot {
    left_count: u8,
    right_count: u8,
    confidence: f32,
}

impl DetectionSnapshot {
    fn changed_from(&self, reading: &DotReading) -> bool {
        self.left_count != reading.left_count
            || self.right_count != reading.right_count
            || (self.confidence - reading.confidence).abs() > CONFIDENCE_EPSILON
    }
}

/// Bounded remote-response cache keyed by a content hash of the full
/// analyzed region. Eviction is oldest-key-first.
struct RecognitionCache {
    entries: HashMap<u64, RemoteCounts>,
    insertion_order: VecDeque<u64>,
    capacity: usize,
}

impl RecognitionCache {
    fn new(capacity: usize) -> RecognitionCache {
        RecognitionCache {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, hash: u64) -> Option<RemoteCounts> {
        self.entries.get(&hash).copied()
    }

    fn insert(&mut self, hash: u64, counts: RemoteCounts) {
        if self.entries.insert(hash, counts).is_none() {
            self.insertion_order.push_back(hash);
            if self.insertion_order.len() > self.capacity {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Counters describing how much remote spend the gating avoided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionStats {
    pub total_analyses: u64,
    pub ambiguous_frames: u64,
    pub baseline_reads: u64,
    pub unchanged_reads: u64,
    pub cache_hits: u64,
    pub remote_calls: u64,
    pub remote_failures: u64,
    pub remote_calls_saved: u64,
}

impl RecognitionStats {
    /// Share of analyses that would have paid for a remote call but did not.
    pub fn remote_save_rate(&self) -> f64 {
        let gated = self.remote_calls + self.remote_calls_saved;
        if gated == 0 {
            0.0
        } else {
            self.remote_calls_saved as f64 / gated as f64
        }
    }
}

struct PipelineState {
    snapshots: HashMap<Window, DetectionSnapshot>,
    cache: RecognitionCache,
    stats: RecognitionStats,
}

/// Turns a window's region image into a validated round result, paying for
/// remote analysis only on genuine visual change.
pub struct RecognitionPipeline {
    counter: Box<dyn DotCounter>,
    remote: Option<Box<dyn RemoteAnalyzer>>,
    state: Mutex<PipelineState>,
}

impl RecognitionPipeline {
    pub fn new(
        counter: Box<dyn DotCounter>,
        remote: Option<Box<dyn RemoteAnalyzer>>,
    ) -> RecognitionPipeline {
        RecognitionPipeline {
            counter,
            remote,
            state: Mutex::new(PipelineState {
                snapshots: HashMap::new(),
                cache: RecognitionCache::new(CACHE_CAPACITY),
                stats: RecognitionStats::default(),
            }),
        }
    }

    /// Recognize one window region. `None` means ambiguous frame, skip and
    /// retry on the next poll. The lock is never held across the remote
    /// call.
    pub async fn analyze(&self, image: &DynamicImage, window: Window) -> Option<RoundResult> {
        let reading = self.counter.count(image);

        if reading.confidence < MIN_LOCAL_CONFIDENCE {
            let mut state = self.state.lock().unwrap();
            state.stats.total_analyses += 1;
            state.stats.ambiguous_frames += 1;
            return None;
        }

        let local_result =
            RoundResult::from_counts(reading.left_count, reading.right_count, reading.confidence);

        // Change test + snapshot update happen in one critical section. The
        // snapshot is refreshed on every accepted reading regardless of
        // which branch answers.
        let (had_prior, changed) = {
            let mut state = self.state.lock().unwrap();
            state.stats.total_analyses += 1;

            let prior = state.snapshots.get(&window).copied();
            let changed = prior.map(|snap| snap.changed_from(&reading)).unwrap_or(true);
            state.snapshots.insert(
                window,
                DetectionSnapshot {
                    left_count: reading.left_count,
                    right_count: reading.right_count,
                    confidence: reading.confidence,
                },
            );
            (prior.is_some(), changed)
        };

        // First post-start reading establishes the baseline; startup noise
        // is never worth a remote call.
        if !had_prior {
            let mut state = self.state.lock().unwrap();
            state.stats.baseline_reads += 1;
            debug!(%window, ?reading, "baseline reading accepted");
            return Some(local_result);
        }

        if !changed {
            let mut state = self.state.lock().unwrap();
            state.stats.unchanged_reads += 1;
            if self.remote.is_some() {
                state.stats.remote_calls_saved += 1;
            }
            return Some(local_result);
        }

        let Some(remote) = self.remote.as_ref() else {
            return Some(local_result);
        };

        let hash = content_hash(image);
        {
            let mut state = self.state.lock().unwrap();
            if let Some(cached) = state.cache.get(hash) {
                state.stats.cache_hits += 1;
                state.stats.remote_calls_saved += 1;
                return Some(RoundResult::from_counts(
                    cached.left_count,
                    cached.right_count,
                    REMOTE_RESULT_CONFIDENCE,
                ));
            }
        }

        let png_bytes = match encode_png(image) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%window, %error, "failed to encode region, using local result");
                return Some(local_result);
            }
        };

        {
            let mut state = self.state.lock().unwrap();
            state.stats.remote_calls += 1;
        }
        match remote.analyze(&png_bytes).await {
            Ok(counts) => {
                let mut state = self.state.lock().unwrap();
                state.cache.insert(hash, counts);
                debug!(%window, ?counts, provider = remote.name(), "remote analysis cached");
                Some(RoundResult::from_counts(
                    counts.left_count,
                    counts.right_count,
                    REMOTE_RESULT_CONFIDENCE,
                ))
            }
            Err(error) => {
                let mut state = self.state.lock().unwrap();
                state.stats.remote_failures += 1;
                warn!(
                    %window,
                    provider = remote.name(),
                    %error,
                    "remote analysis failed, falling back to local result"
                );
                Some(local_result)
            }
        }
    }

    /// Forget per-window baselines. Called on detector (re)start; the
    /// response cache survives since region content stays valid.
    pub fn reset_snapshots(&self) {
        self.state.lock().unwrap().snapshots.clear();
    }

    pub fn stats(&self) -> RecognitionStats {
        self.state.lock().unwrap().stats.clone()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

/// Content hash over the full region bytes. Two scenes hashing equal are
/// assumed identical; the hash covers every pixel, not a sample.
fn content_hash(image: &DynamicImage) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    image.to_rgba8().into_raw().hash(&mut hasher);
    hasher.finish()
}

fn encode_png(image: &DynamicImage) -> anyhow::Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    image.write_to(
        &mut std::io::Cursor::new(&mut png_bytes),
        image::ImageFormat::Png,
    )?;
    Ok(png_bytes)
}
