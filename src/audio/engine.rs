// Native playback primitive seen by the registry
use std::time::Duration;

use crate::assets::AudioResource;
use crate::audio::signals::SignalSender;
use crate::error::Result;

/// Creates player instances from audio resources
pub trait AudioEngine: Send {
    /// Decode `resource` into a new voice, paused at position 0.
    /// End-of-media and playback failures are reported through `signals`.
    fn open(&mut self, resource: AudioResource, signals: SignalSender) -> Result<Box<dyn Voice>>;
}

/// One player instance. Dropping it releases the underlying resources.
pub trait Voice: Send {
    fn play(&mut self);

    fn pause(&mut self);

    /// Position is clamped to the duration by the implementation
    fn seek(&mut self, position: Duration);

    fn position(&self) -> Duration;

    fn duration(&self) -> Duration;

    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    fn is_playing(&self) -> bool;

    /// Tag later end-of-media signals with `session`
    fn set_session(&mut self, session: u64);
}
