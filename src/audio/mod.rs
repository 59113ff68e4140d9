// Audio playback module
// Uses Symphonia for decoding, Rubato for resampling and cpal for output

pub mod decoder;
pub mod engine;
pub mod mixer;
pub mod output;
pub mod player;
pub mod resampler;
pub mod signals;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{AudioEngine, Voice};
pub use mixer::{Mixer, MixerEngine, OutputFormat};
pub use player::Player;
pub use signals::{SessionEvent, SessionHandle, Signal, VoiceId, VoiceSignal};
