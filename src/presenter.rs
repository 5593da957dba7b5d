//! Presentation layer fed by the detection loop.
//!
//! Presenters are purely reactive: the loop pushes status lines, stable
//! labels, and overlay geometry, and never reads anything back.

use crate::core::label::StableEmotion;
use crate::provider::types::FaceGeometry;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Detection geometry scaled to the video's native resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub width: u32,
    pub height: u32,
    /// Empty when the frame had no face; the overlay should be cleared.
    pub faces: Vec<FaceGeometry>,
}

/// Receives updates from the loop.
pub trait Presenter {
    /// A new stable label.
    fn present(&mut self, emotion: &StableEmotion);

    /// Lifecycle status ("Loading models...", errors, ...).
    fn status(&mut self, _message: &str) {}

    /// Per-frame overlay geometry.
    fn overlay(&mut self, _overlay: &Overlay) {}
}

/// Prints labels to stdout.
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    last_status: Option<String>,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for ConsolePresenter {
    fn present(&mut self, emotion: &StableEmotion) {
        let time = emotion
            .decided_at
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());

        if emotion.samples > 0 {
            println!(
                "[{}] {} {} (top {:.2}, {} samples)",
                time,
                emotion.emoji,
                emotion.name(),
                emotion.top_score,
                emotion.samples
            );
        } else {
            println!("[{}] {} {}", time, emotion.emoji, emotion.name());
        }
    }

    fn status(&mut self, message: &str) {
        if self.last_status.as_deref() != Some(message) {
            println!("Status: {message}");
            self.last_status = Some(message.to_string());
        }
    }
}

/// Everything a presenter can receive, as a message.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    Status(String),
    Emotion(StableEmotion),
    Overlay(Overlay),
}

/// Forwards updates over a channel, for UIs running on another thread.
pub struct ChannelPresenter {
    sender: Sender<PresenterEvent>,
    forward_overlays: bool,
}

impl ChannelPresenter {
    pub fn new() -> (Self, Receiver<PresenterEvent>) {
        let (sender, receiver) = unbounded();
        (
            Self {
                sender,
                forward_overlays: true,
            },
            receiver,
        )
    }

    /// Drop per-frame overlay messages.
    pub fn without_overlays(mut self) -> Self {
        self.forward_overlays = false;
        self
    }

    fn send(&self, event: PresenterEvent) {
        // The receiver may be gone during shutdown.
        let _ = self.sender.send(event);
    }
}

impl Presenter for ChannelPresenter {
    fn present(&mut self, emotion: &StableEmotion) {
        self.send(PresenterEvent::Emotion(emotion.clone()));
    }

    fn status(&mut self, message: &str) {
        self.send(PresenterEvent::Status(message.to_string()));
    }

    fn overlay(&mut self, overlay: &Overlay) {
        if self.forward_overlays {
            self.send(PresenterEvent::Overlay(overlay.clone()));
        }
    }
}
