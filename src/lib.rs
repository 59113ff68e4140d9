// Sound Player - native sound playback for app host bridges
// Module declarations
pub mod assets;
pub mod audio;
pub mod commands;
pub mod error;
pub mod events;
pub mod registry;
pub mod settings;
pub mod state;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use assets::{AssetResolver, AudioResource, FsAssetResolver, SoundSource};
pub use commands::{dispatch, CommandError};
pub use error::AudioError;
pub use events::{ChannelEmitter, EventEmitter, PlaybackState, PlayerEvent};
pub use registry::{LoopCount, PlaybackInfo, SoundRegistry};
pub use settings::{OutputSettings, PlayerSettings};
pub use state::AppState;

/// Install a `RUST_LOG`-driven subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Build the player stack described by `settings`: asset lookup, audio
/// output, mixer engine and registry.
pub fn init(settings: PlayerSettings, emitter: Arc<dyn EventEmitter>) -> Result<AppState> {
    let resolver = FsAssetResolver::new(settings.asset_dir.clone(), settings.asset_extensions.clone());
    let (mixer, output) = audio::output::start(&settings.output)?;
    let engine = audio::MixerEngine::new(mixer);

    let registry = SoundRegistry::new(Box::new(engine), Arc::new(resolver), emitter)
        .with_volume(settings.default_volume)
        .with_resume_after_interruption(settings.resume_after_interruption);

    info!(
        "Sound player ready (assets: {:?}, headless: {})",
        settings.asset_dir,
        output.is_headless()
    );
    Ok(AppState::new(registry, settings, Some(output)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::wav_bytes;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn test_init_plays_named_sound_headless() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("click.wav"), wav_bytes(8000, 1, 800)).unwrap();

        let mut settings = PlayerSettings::default();
        settings.asset_dir = dir.path().to_path_buf();
        settings.output.prefer_device = false;
        settings.output.sample_rate = 8000;
        settings.output.block_frames = 80;

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let state = init(settings, Arc::new(move |e: PlayerEvent| sink.lock().push(e))).unwrap();

        dispatch(&state, "playNamed", serde_json::json!({ "identifier": "click" })).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            state.registry.lock().pump_signals();
            let finished = events.lock().contains(&PlayerEvent::FinishedPlaying {
                identifier: "click".into(),
                success: true,
            });
            if finished {
                break;
            }
            assert!(Instant::now() < deadline, "named sound never finished");
            std::thread::sleep(Duration::from_millis(10));
        }

        state.shutdown();
        assert_eq!(state.registry.lock().named_count(), 0);
    }
}
