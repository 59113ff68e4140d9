// Application state management
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::audio::output::OutputDriver;
use crate::registry::SoundRegistry;
use crate::settings::PlayerSettings;

/// State shared by every host command. The registry mutex is the single
/// owner context: commands and the signal pump both go through it.
pub struct AppState {
    pub registry: Arc<Mutex<SoundRegistry>>,
    pub settings: PlayerSettings,
    output: Mutex<Option<OutputDriver>>,
}

impl AppState {
    pub fn new(registry: SoundRegistry, settings: PlayerSettings, output: Option<OutputDriver>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            settings,
            output: Mutex::new(output),
        }
    }

    /// Move signal handling onto a tokio task: each signal from the audio
    /// side is applied under the registry lock as soon as it arrives.
    /// Returns `None` if the signals were already detached.
    pub fn spawn_signal_pump(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.registry.lock().detach_signals()?;
        let registry = Arc::clone(&self.registry);

        Some(tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                registry.lock().handle_signal(signal);
            }
            debug!("Signal pump finished");
        }))
    }

    /// Release every player and stop the output
    pub fn shutdown(&self) {
        self.registry.lock().teardown();
        self.output.lock().take();
    }
}
