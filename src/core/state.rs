//! Lifecycle of the detection loop as an explicit state machine.
//!
//! Transitions are pure so the loop can be tested without a camera or model.

use crate::provider::source::{ModelStatus, VideoStatus};
use std::fmt;

/// Whether the collaborators allow sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    AwaitingModels,
    AwaitingVideo,
    Ready { width: u32, height: u32 },
    /// A resource can never become ready; carries a user-facing message.
    Failed(String),
}

/// Combine model and video status. Failures win over waiting, and models
/// are waited for before the video.
pub fn assess(models: &ModelStatus, video: &VideoStatus) -> Readiness {
    if let ModelStatus::Failed(reason) = models {
        return Readiness::Failed(format!("Failed to load models: {reason}"));
    }
    if let VideoStatus::Failed(reason) = video {
        return Readiness::Failed(format!(
            "Unable to access camera ({reason}). Please allow permission and reload."
        ));
    }
    match (models, video) {
        (ModelStatus::Loading, _) => Readiness::AwaitingModels,
        (_, VideoStatus::Ready { width, height }) => Readiness::Ready {
            width: *width,
            height: *height,
        },
        _ => Readiness::AwaitingVideo,
    }
}

/// Loop lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModels,
    AwaitingVideo,
    Sampling,
    Flushing,
    Stopped,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    Readiness(Readiness),
    FlushDue,
    Flushed,
    Stop,
}

impl LoopState {
    /// Pure transition function. `Stopped` is absorbing.
    pub fn next(self, event: &LoopEvent) -> LoopState {
        match (self, event) {
            (LoopState::Stopped, _) => LoopState::Stopped,
            (_, LoopEvent::Stop) => LoopState::Stopped,
            (_, LoopEvent::Readiness(Readiness::Failed(_))) => LoopState::Stopped,
            (_, LoopEvent::Readiness(Readiness::AwaitingModels)) => LoopState::AwaitingModels,
            (_, LoopEvent::Readiness(Readiness::AwaitingVideo)) => LoopState::AwaitingVideo,
            (_, LoopEvent::Readiness(Readiness::Ready { .. })) => LoopState::Sampling,
            (LoopState::Sampling, LoopEvent::FlushDue) => LoopState::Flushing,
            (LoopState::Flushing, LoopEvent::Flushed) => LoopState::Sampling,
            (state, _) => state,
        }
    }

    /// Only a sampling loop may call the detector.
    pub fn may_sample(self) -> bool {
        self == LoopState::Sampling
    }

    pub fn is_stopped(self) -> bool {
        self == LoopState::Stopped
    }

    /// Status line for the presentation layer.
    pub fn status_message(self) -> &'static str {
        match self {
            LoopState::AwaitingModels => "Loading models...",
            LoopState::AwaitingVideo => "Models loaded. Waiting for camera...",
            LoopState::Sampling | LoopState::Flushing => "Detecting expressions...",
            LoopState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::AwaitingModels => "awaiting_models",
            LoopState::AwaitingVideo => "awaiting_video",
            LoopState::Sampling => "sampling",
            LoopState::Flushing => "flushing",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READY: Readiness = Readiness::Ready {
        width: 480,
        height: 360,
    };

    #[test]
    fn test_assess_order() {
        let ready_video = VideoStatus::Ready {
            width: 480,
            height: 360,
        };
        assert_eq!(
            assess(&ModelStatus::Loading, &VideoStatus::Pending),
            Readiness::AwaitingModels
        );
        assert_eq!(
            assess(&ModelStatus::Loading, &ready_video),
            Readiness::AwaitingModels
        );
        assert_eq!(
            assess(&ModelStatus::Ready, &VideoStatus::Pending),
            Readiness::AwaitingVideo
        );
        assert_eq!(assess(&ModelStatus::Ready, &ready_video), READY);
    }

    #[test]
    fn test_assess_failures_are_terminal() {
        let denied = assess(
            &ModelStatus::Loading,
            &VideoStatus::Failed("permission denied".to_string()),
        );
        match denied {
            Readiness::Failed(message) => assert!(message.contains("permission denied")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            LoopState::Sampling.next(&LoopEvent::Readiness(Readiness::Failed(String::new()))),
            LoopState::Stopped
        );
    }

    #[test]
    fn test_happy_path() {
        let state = LoopState::AwaitingModels
            .next(&LoopEvent::Readiness(Readiness::AwaitingVideo))
            .next(&LoopEvent::Readiness(READY));
        assert!(state.may_sample());

        let flushing = state.next(&LoopEvent::FlushDue);
        assert_eq!(flushing, LoopState::Flushing);
        assert!(!flushing.may_sample());
        assert_eq!(flushing.next(&LoopEvent::Flushed), LoopState::Sampling);
    }

    #[test]
    fn test_flush_events_ignored_outside_sampling() {
        assert_eq!(
            LoopState::AwaitingVideo.next(&LoopEvent::FlushDue),
            LoopState::AwaitingVideo
        );
        assert_eq!(
            LoopState::Sampling.next(&LoopEvent::Flushed),
            LoopState::Sampling
        );
    }

    #[test]
    fn test_video_loss_pauses_sampling() {
        assert_eq!(
            LoopState::Sampling.next(&LoopEvent::Readiness(Readiness::AwaitingVideo)),
            LoopState::AwaitingVideo
        );
    }

    #[test]
    fn test_stopped_is_absorbing() {
        let stopped = LoopState::Sampling.next(&LoopEvent::Stop);
        assert!(stopped.is_stopped());
        assert_eq!(stopped.next(&LoopEvent::Readiness(READY)), LoopState::Stopped);
    }
}
