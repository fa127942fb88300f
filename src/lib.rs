// src/lib.rs
// dotwager: change-gated dual-window betting automation core

pub mod bet;
pub mod coordinator;
pub mod detector;
pub mod geometry;
pub mod settings;
pub mod strategy;
pub mod sync;
pub mod timing;
pub mod types;
pub mod vision;

pub use bet::{select_denomination, BetPlacer, ClickInjector, DENOMINATIONS};
pub use coordinator::{CoordinatorState, EventSink, GameCoordinator};
pub use detector::{DetectionObserver, FrameSource, ResultDetector};
pub use geometry::{PixelRect, RegionMapping, RelPoint};
pub use settings::{ProviderConfig, Settings, StrategyParams};
pub use strategy::{after_bet_placed, apply_result, bet_amount};
pub use sync::{SyncOperation, WindowSynchronizer};
pub use timing::{OperationKind, TimingOptimizer};
pub use types::{Choice, GameState, RoundResult, SessionStats, Strategy, Window};
pub use vision::{
    build_analyzer, DotCounter, DotReading, RecognitionPipeline, RecognitionStats, RemoteAnalyzer,
    RemoteCounts,
};
