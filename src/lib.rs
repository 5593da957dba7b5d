//! Mood Mirror - turns noisy per-frame facial expression scores into a
//! stable emoji label.
//!
//! An external face/expression model scores each sampled video frame. This
//! crate buffers those scores, decides on a label once per cycle, and hands
//! the result to a presenter.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Mood Mirror                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Provider   │──▶│   Sampler   │──▶│ Aggregator  │       │
//! │  │ model+video │   │ (cadence)   │   │ (1s window) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                 │               │
//! │                           ▼                 ▼               │
//! │                    ┌─────────────┐   ┌─────────────┐       │
//! │                    │   Session   │   │  Presenter  │       │
//! │                    │    Stats    │   │ emoji+label │       │
//! │                    └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mood_mirror::{
//!     AggregatorSettings, Cadence, ConsolePresenter, DetectionLoop, ReplayProvider,
//!     SyntheticVideo,
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let provider = ReplayProvider::from_jsonl("session.jsonl")?;
//! let video = SyntheticVideo::new(480, 360);
//! let (detection_loop, handle) = DetectionLoop::new(
//!     provider,
//!     video,
//!     ConsolePresenter::new(),
//!     AggregatorSettings::default(),
//!     Cadence::default(),
//! );
//!
//! // `handle.stop()` from anywhere ends the loop.
//! let report = detection_loop.run().await?;
//! println!("{}", report.final_emotion);
//! # drop(handle);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod presenter;
pub mod provider;
pub mod sampler;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    AbsencePolicy, AggregatorSettings, EmotionAggregator, LabelHistory, LoopState, Mood,
    StableEmotion, Strategy,
};
pub use presenter::{ChannelPresenter, ConsolePresenter, Overlay, Presenter, PresenterEvent};
pub use provider::{
    DetectionSample, Emotion, EmotionLabel, ExpressionVector, Face, ModelProvider, ModelStatus,
    ProviderError, ReplayProvider, SyntheticVideo, VideoSource, VideoStatus,
};
pub use sampler::{Cadence, DetectionLoop, LoopError, LoopHandle, LoopReport};
pub use stats::{create_shared_stats, SessionStats, SharedSessionStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
