// src/vision/mod.rs
// Hybrid recognition: local dot counting, change gating, remote analysis

pub mod pipeline;
pub mod remote;

pub use pipeline::{RecognitionPipeline, RecognitionStats};
pub use remote::{build_analyzer, ClaudeAnalyzer, OpenAiAnalyzer, RemoteAnalyzer, RemoteCounts};

use image::DynamicImage;

/// Raw output of the local dot counter, before any validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotReading {
    pub left_count: u8,
    pub right_count: u8,
    pub confidence: f32,
}

/// Fast offline shape-counting primitive. Pure and synchronous; the
/// concrete implementation lives outside the engine.
pub trait DotCounter: Send + Sync {
    fn count(&self, image: &DynamicImage) -> DotReading;
}
