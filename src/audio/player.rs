// Audio player implementation
// One player instance: a voice plus the transport state the registry tracks
use std::time::Duration;

use crate::audio::engine::Voice;
use crate::audio::signals::VoiceId;
use crate::error::{AudioError, Result};
use crate::events::PlaybackState;

pub struct Player {
    id: VoiceId,
    label: String,
    /// Format hint of the loaded resource, e.g. `wav`
    extension: Option<String>,
    voice: Box<dyn Voice>,
    state: PlaybackState,
    /// Bumped whenever the playhead is repositioned. An end-of-media
    /// signal tagged with an older session belongs to a finished run.
    session: u64,
}

impl Player {
    pub fn new(id: VoiceId, label: String, voice: Box<dyn Voice>) -> Self {
        Self {
            id,
            label,
            extension: None,
            voice,
            state: PlaybackState::Idle,
            session: 0,
        }
    }

    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    fn next_session(&mut self) {
        self.session += 1;
        self.voice.set_session(self.session);
    }

    pub fn play(&mut self) {
        self.voice.play();
        self.state = PlaybackState::Playing;
    }

    /// Returns true when the state changed
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        self.voice.pause();
        self.state = PlaybackState::Paused;
        true
    }

    /// Starts from the current position; a stopped player starts from 0.
    /// Returns true when the state changed.
    pub fn resume(&mut self) -> bool {
        if self.state == PlaybackState::Playing {
            return false;
        }
        self.play();
        true
    }

    /// Pause and return to the start, keeping the source loaded
    pub fn stop(&mut self) -> bool {
        self.voice.pause();
        self.voice.seek(Duration::ZERO);
        self.next_session();
        let changed = self.state != PlaybackState::Stopped;
        self.state = PlaybackState::Stopped;
        changed
    }

    /// Pause at the start, ready to be resumed
    pub fn reset(&mut self) {
        self.voice.pause();
        self.voice.seek(Duration::ZERO);
        self.next_session();
        self.state = PlaybackState::Paused;
    }

    pub fn rewind(&mut self) {
        self.voice.seek(Duration::ZERO);
        self.next_session();
    }

    /// Seek in seconds; fails outside [0, duration]
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        let duration = self.voice.duration().as_secs_f64();
        if !seconds.is_finite() || seconds < 0.0 || seconds > duration {
            return Err(AudioError::InvalidPosition {
                position: seconds,
                duration,
            });
        }
        self.voice.seek(Duration::from_secs_f64(seconds));
        self.next_session();
        Ok(())
    }

    /// End of media without a repeat: stopped, back at the start
    pub fn finish(&mut self) {
        self.stop();
    }

    /// Cut off by a failure or interruption: paused where it was
    pub fn interrupt(&mut self) {
        self.voice.pause();
        self.state = PlaybackState::Paused;
    }

    pub fn position(&self) -> Duration {
        self.voice.position()
    }

    pub fn duration(&self) -> Duration {
        self.voice.duration()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.voice.set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn volume(&self) -> f32 {
        self.voice.volume()
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}
