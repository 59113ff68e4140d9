// Events surfaced across the host boundary
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

pub const EVENT_FINISHED_PLAYING: &str = "FinishedPlaying";
pub const EVENT_FINISHED_LOADING: &str = "FinishedLoading";
pub const EVENT_FINISHED_LOADING_FILE: &str = "FinishedLoadingFile";
pub const EVENT_FINISHED_LOADING_URL: &str = "FinishedLoadingURL";
pub const EVENT_SETUP_ERROR: &str = "OnSetupError";
pub const EVENT_STATE_CHANGED: &str = "PlaybackStateChanged";

/// Playback state of one player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlayerEvent {
    /// Player reached end of media (`success`) or was cut off (`!success`).
    /// `identifier` is the sound identifier or the primary source.
    FinishedPlaying { identifier: String, success: bool },
    FinishedLoading { success: bool },
    FinishedLoadingFile { success: bool, name: String, kind: String },
    FinishedLoadingUrl { success: bool, url: String },
    SetupError { error: String },
    StateChanged { identifier: String, state: PlaybackState },
}

impl PlayerEvent {
    /// Event name the host subscribes to
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::FinishedPlaying { .. } => EVENT_FINISHED_PLAYING,
            PlayerEvent::FinishedLoading { .. } => EVENT_FINISHED_LOADING,
            PlayerEvent::FinishedLoadingFile { .. } => EVENT_FINISHED_LOADING_FILE,
            PlayerEvent::FinishedLoadingUrl { .. } => EVENT_FINISHED_LOADING_URL,
            PlayerEvent::SetupError { .. } => EVENT_SETUP_ERROR,
            PlayerEvent::StateChanged { .. } => EVENT_STATE_CHANGED,
        }
    }

    /// JSON payload delivered with the event
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Sink for events; the host wires this to its own event channel
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: PlayerEvent);
}

impl<F> EventEmitter for F
where
    F: Fn(PlayerEvent) + Send + Sync,
{
    fn emit(&self, event: PlayerEvent) {
        self(event)
    }
}

/// Forwards events into a tokio channel
pub struct ChannelEmitter {
    tx: UnboundedSender<PlayerEvent>,
}

impl ChannelEmitter {
    pub fn new(tx: UnboundedSender<PlayerEvent>) -> Self {
        Self { tx }
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: PlayerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver dropped, discarding event");
        }
    }
}
