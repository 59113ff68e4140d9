// Sound player registry
// Owns the primary player, the named players and the loop counter, and turns
// engine signals into host events

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::assets::{AssetResolver, AudioResource, SoundSource};
use crate::audio::engine::AudioEngine;
use crate::audio::player::Player;
use crate::audio::signals::{
    signal_channel, SessionEvent, SessionHandle, Signal, SignalReceiver, SignalSender, VoiceId,
    VoiceSignal,
};
use crate::error::{AudioError, Result};
use crate::events::{EventEmitter, PlaybackState, PlayerEvent};

/// Repeat behaviour of the primary playback session.
///
/// Integer convention: `0` plays once, `n > 0` repeats `n` more times,
/// any negative value repeats until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopCount {
    #[default]
    Once,
    Times(u32),
    Forever,
}

impl LoopCount {
    pub const INFINITE: i32 = -1;

    pub fn as_i32(self) -> i32 {
        match self {
            LoopCount::Once => 0,
            LoopCount::Times(n) => n.min(i32::MAX as u32) as i32,
            LoopCount::Forever => Self::INFINITE,
        }
    }

    /// Consume one repeat. Returns the remaining count when playback should
    /// restart, `None` when it should finish.
    fn next_repeat(self) -> Option<LoopCount> {
        match self {
            LoopCount::Once => None,
            LoopCount::Times(1) => Some(LoopCount::Once),
            LoopCount::Times(n) => Some(LoopCount::Times(n - 1)),
            LoopCount::Forever => Some(LoopCount::Forever),
        }
    }
}

impl From<i32> for LoopCount {
    fn from(count: i32) -> Self {
        match count {
            0 => LoopCount::Once,
            n if n < 0 => LoopCount::Forever,
            n => LoopCount::Times(n as u32),
        }
    }
}

/// Current time and duration of the primary player, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfo {
    pub current_time: f64,
    pub duration: f64,
}

struct PrimaryPlayer {
    player: Player,
    source: SoundSource,
}

pub struct SoundRegistry {
    engine: Box<dyn AudioEngine>,
    resolver: Arc<dyn AssetResolver>,
    emitter: Arc<dyn EventEmitter>,
    primary: Option<PrimaryPlayer>,
    named: HashMap<String, Player>,
    /// Configured repeat behaviour of the primary session
    loop_count: LoopCount,
    /// Repeats left in the running session
    loops_remaining: LoopCount,
    volume: f32,
    resume_after_interruption: bool,
    /// Voices paused by an audio session interruption
    interrupted: Vec<VoiceId>,
    next_voice: u64,
    signal_tx: UnboundedSender<Signal>,
    signal_rx: Option<SignalReceiver>,
}

impl SoundRegistry {
    pub fn new(
        engine: Box<dyn AudioEngine>,
        resolver: Arc<dyn AssetResolver>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let (signal_tx, signal_rx) = signal_channel();
        Self {
            engine,
            resolver,
            emitter,
            primary: None,
            named: HashMap::new(),
            loop_count: LoopCount::Once,
            loops_remaining: LoopCount::Once,
            volume: 1.0,
            resume_after_interruption: false,
            interrupted: Vec::new(),
            next_voice: 1,
            signal_tx,
            signal_rx: Some(signal_rx),
        }
    }

    /// Volume given to newly created primary players
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_resume_after_interruption(mut self, resume: bool) -> Self {
        self.resume_after_interruption = resume;
        self
    }

    // ===== Primary player =====

    /// Start `source` on the primary player, replacing a different source
    /// and restarting the same one from the beginning.
    pub fn play(&mut self, source: &SoundSource, looping: bool) -> Result<()> {
        let primary = self.prepare_primary(source)?;
        primary.player.rewind();
        primary.player.play();
        let identifier = primary.source.to_string();

        self.loop_count = if looping { LoopCount::Forever } else { LoopCount::Once };
        self.loops_remaining = self.loop_count;

        info!("Playing {} (loop: {})", identifier, looping);
        self.emit_state(identifier, PlaybackState::Playing);
        Ok(())
    }

    /// Load `source` on the primary player without starting it
    pub fn load(&mut self, source: &SoundSource) -> Result<()> {
        let primary = self.prepare_primary(source)?;
        primary.player.reset();
        self.loops_remaining = self.loop_count;
        Ok(())
    }

    pub fn pause(&mut self) {
        let Some(primary) = self.primary.as_mut() else {
            return;
        };
        let voice = primary.player.id();
        self.interrupted.retain(|id| *id != voice);
        if primary.player.pause() {
            let identifier = primary.source.to_string();
            self.emit_state(identifier, PlaybackState::Paused);
        }
    }

    pub fn resume(&mut self) {
        let Some(primary) = self.primary.as_mut() else {
            return;
        };
        let from_stop = primary.player.state() == PlaybackState::Stopped;
        if primary.player.resume() {
            let identifier = primary.source.to_string();
            if from_stop {
                self.loops_remaining = self.loop_count;
            }
            self.emit_state(identifier, PlaybackState::Playing);
        }
    }

    /// Stop and rewind; the source stays loaded
    pub fn stop(&mut self) {
        let Some(primary) = self.primary.as_mut() else {
            return;
        };
        let voice = primary.player.id();
        self.interrupted.retain(|id| *id != voice);
        if primary.player.stop() {
            let identifier = primary.source.to_string();
            self.emit_state(identifier, PlaybackState::Stopped);
        }
    }

    /// Move the primary player to `seconds`. No-op without a primary player.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        match self.primary.as_mut() {
            Some(primary) => primary.player.seek(seconds),
            None => Ok(()),
        }
    }

    pub fn set_volume(&mut self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.volume = level;
        if let Some(primary) = self.primary.as_mut() {
            primary.player.set_volume(level);
        }
    }

    pub fn set_number_of_loops(&mut self, loops: i32) {
        self.loop_count = LoopCount::from(loops);
        self.loops_remaining = self.loop_count;
    }

    pub fn info(&self) -> Option<PlaybackInfo> {
        self.primary.as_ref().map(|p| PlaybackInfo {
            current_time: p.player.position().as_secs_f64(),
            duration: p.player.duration().as_secs_f64(),
        })
    }

    pub fn primary_state(&self) -> Option<PlaybackState> {
        self.primary.as_ref().map(|p| p.player.state())
    }

    pub fn primary_source(&self) -> Option<&SoundSource> {
        self.primary.as_ref().map(|p| &p.source)
    }

    pub fn position(&self) -> Option<Duration> {
        self.primary.as_ref().map(|p| p.player.position())
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn loop_count(&self) -> LoopCount {
        self.loop_count
    }

    // ===== Named players =====

    /// Rewind and play the player for `identifier`, creating it on first use
    pub fn play_named(&mut self, identifier: &str) -> Result<()> {
        let player = self.ensure_named(identifier)?;
        player.rewind();
        player.play();
        debug!("Playing named sound {}", identifier);
        self.emit_state(identifier.to_string(), PlaybackState::Playing);
        Ok(())
    }

    /// Create or rewind the player for `identifier` without starting it
    pub fn load_named(&mut self, identifier: &str) -> Result<()> {
        let player = self.ensure_named(identifier)?;
        player.reset();
        Ok(())
    }

    /// Release the player for `identifier`. Returns false when none existed.
    pub fn unload_named(&mut self, identifier: &str) -> bool {
        match self.named.remove(identifier) {
            Some(player) => {
                self.interrupted.retain(|id| *id != player.id());
                debug!("Unloaded named sound {}", identifier);
                true
            }
            None => false,
        }
    }

    pub fn named_state(&self, identifier: &str) -> Option<PlaybackState> {
        self.named.get(identifier).map(|p| p.state())
    }

    pub fn named_count(&self) -> usize {
        self.named.len()
    }

    /// Release every player
    pub fn teardown(&mut self) {
        let released = self.named.len() + usize::from(self.primary.is_some());
        self.primary = None;
        self.named.clear();
        self.interrupted.clear();
        info!("Registry torn down, released {} player(s)", released);
    }

    // ===== Signals =====

    /// Handle for platform observers that report audio session interruptions
    pub fn session_handle(&self) -> SessionHandle {
        SessionHandle::new(self.signal_tx.clone())
    }

    /// Hand the signal receiver to an external pump. Afterwards
    /// `pump_signals` does nothing and the pump calls `handle_signal`.
    pub fn detach_signals(&mut self) -> Option<SignalReceiver> {
        self.signal_rx.take()
    }

    /// Drain and handle every queued signal. Returns how many were handled.
    pub fn pump_signals(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(rx) = self.signal_rx.as_mut() {
            while let Ok(signal) = rx.try_recv() {
                pending.push(signal);
            }
        }
        let count = pending.len();
        for signal in pending {
            self.handle_signal(signal);
        }
        count
    }

    pub fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Voice { voice, signal: VoiceSignal::Ended { session } } => {
                self.on_voice_ended(voice, session)
            }
            Signal::Voice { voice, signal: VoiceSignal::Failed(reason) } => {
                self.on_voice_failed(voice, AudioError::DeviceInterrupted(reason))
            }
            Signal::Session(SessionEvent::InterruptionBegan) => self.on_interruption_began(),
            Signal::Session(SessionEvent::InterruptionEnded { should_resume }) => {
                self.on_interruption_ended(should_resume)
            }
        }
    }

    fn on_voice_ended(&mut self, voice: VoiceId, session: u64) {
        if let Some(primary) = self.primary.as_mut().filter(|p| p.player.id() == voice) {
            if primary.player.session() != session {
                debug!("Dropping end of media from an earlier run of {:?}", voice);
                return;
            }
            if !primary.player.is_playing() {
                debug!("Ignoring end of media for non-playing primary {:?}", voice);
                return;
            }
            match self.loops_remaining.next_repeat() {
                Some(remaining) => {
                    primary.player.rewind();
                    primary.player.play();
                    self.loops_remaining = remaining;
                    debug!("Looping {} (remaining: {:?})", primary.source, remaining);
                }
                None => {
                    primary.player.finish();
                    let identifier = primary.source.to_string();
                    info!("Finished playing {}", identifier);
                    self.emit(PlayerEvent::FinishedPlaying { identifier, success: true });
                }
            }
            return;
        }

        if let Some((identifier, player)) = self.named_by_voice(voice) {
            if player.session() == session && player.is_playing() {
                player.finish();
                let identifier = identifier.clone();
                self.emit(PlayerEvent::FinishedPlaying { identifier, success: true });
            }
            return;
        }

        debug!("Dropping end-of-media signal for released voice {:?}", voice);
    }

    fn on_voice_failed(&mut self, voice: VoiceId, error: AudioError) {
        let identifier = if let Some(primary) = self.primary.as_mut().filter(|p| p.player.id() == voice) {
            primary.player.interrupt();
            primary.source.to_string()
        } else if let Some((identifier, player)) = self.named_by_voice(voice) {
            player.interrupt();
            identifier.clone()
        } else {
            debug!("Dropping failure signal for released voice {:?}", voice);
            return;
        };

        warn!("Playback of {} failed: {}", identifier, error);
        self.emit(PlayerEvent::FinishedPlaying { identifier, success: false });
    }

    fn on_interruption_began(&mut self) {
        let mut cut_off = Vec::new();
        if let Some(primary) = self.primary.as_mut().filter(|p| p.player.is_playing()) {
            primary.player.interrupt();
            cut_off.push((primary.player.id(), primary.source.to_string()));
        }
        for (identifier, player) in self.named.iter_mut().filter(|(_, p)| p.is_playing()) {
            player.interrupt();
            cut_off.push((player.id(), identifier.clone()));
        }

        info!("Audio session interrupted, paused {} player(s)", cut_off.len());
        for (voice, identifier) in cut_off {
            self.interrupted.push(voice);
            self.emit(PlayerEvent::FinishedPlaying { identifier, success: false });
        }
    }

    fn on_interruption_ended(&mut self, should_resume: bool) {
        let voices = std::mem::take(&mut self.interrupted);
        if !should_resume || !self.resume_after_interruption {
            debug!("Interruption ended, not resuming {} player(s)", voices.len());
            return;
        }

        for voice in voices {
            let resumed = if let Some(primary) = self.primary.as_mut().filter(|p| p.player.id() == voice) {
                primary.player.resume().then(|| primary.source.to_string())
            } else if let Some((identifier, player)) = self.named_by_voice(voice) {
                player.resume().then(|| identifier.clone())
            } else {
                None
            };
            if let Some(identifier) = resumed {
                self.emit_state(identifier, PlaybackState::Playing);
            }
        }
    }

    // ===== Internals =====

    fn named_by_voice(&mut self, voice: VoiceId) -> Option<(&String, &mut Player)> {
        self.named.iter_mut().find(|(_, p)| p.id() == voice)
    }

    fn next_signal_sender(&mut self) -> SignalSender {
        let id = VoiceId(self.next_voice);
        self.next_voice += 1;
        SignalSender::new(id, self.signal_tx.clone())
    }

    fn open_player(&mut self, resource: AudioResource) -> Result<Player> {
        let signals = self.next_signal_sender();
        let id = signals.voice();
        let label = resource.label.clone();
        let extension = resource.extension.clone();
        let voice = self.engine.open(resource, signals)?;
        Ok(Player::new(id, label, voice).with_extension(extension))
    }

    /// Make sure the primary player holds `source`. A different source is
    /// released before the new one is opened.
    fn prepare_primary(&mut self, source: &SoundSource) -> Result<&mut PrimaryPlayer> {
        let same_source = self.primary.as_ref().is_some_and(|p| &p.source == source);

        if !same_source {
            if let Some(old) = self.primary.take() {
                debug!("Releasing primary player for {}", old.source);
                self.interrupted.retain(|id| *id != old.player.id());
                if old.player.is_playing() {
                    self.emit_state(old.source.to_string(), PlaybackState::Stopped);
                }
            }

            let player = self
                .resolver
                .resolve_source(source)
                .and_then(|resource| self.open_player(resource))
                .map_err(|e| self.report_setup_error(e))?;

            let mut primary = PrimaryPlayer {
                player,
                source: source.clone(),
            };
            primary.player.set_volume(self.volume);
            self.primary = Some(primary);
        }
        self.emit_loaded_source(source);

        let primary = self
            .primary
            .as_mut()
            .ok_or_else(|| AudioError::source_unavailable(source.to_string(), "primary player missing"))?;
        let voice = primary.player.id();
        self.interrupted.retain(|id| *id != voice);
        Ok(primary)
    }

    fn ensure_named(&mut self, identifier: &str) -> Result<&mut Player> {
        if !self.named.contains_key(identifier) {
            let player = self
                .resolver
                .resolve_named(identifier)
                .and_then(|resource| self.open_player(resource))
                .map_err(|e| self.report_setup_error(e))?;
            self.named.insert(identifier.to_string(), player);
        }

        let player = self
            .named
            .get_mut(identifier)
            .ok_or_else(|| AudioError::source_unavailable(identifier, "named player missing"))?;
        let kind = player.extension().unwrap_or_default().to_string();
        let voice = player.id();
        self.interrupted.retain(|id| *id != voice);

        self.emitter.emit(PlayerEvent::FinishedLoading { success: true });
        self.emitter.emit(PlayerEvent::FinishedLoadingFile {
            success: true,
            name: identifier.to_string(),
            kind,
        });
        Ok(player)
    }

    fn emit_loaded_source(&self, source: &SoundSource) {
        self.emit(PlayerEvent::FinishedLoading { success: true });
        match source {
            SoundSource::File(path) => self.emit(PlayerEvent::FinishedLoadingFile {
                success: true,
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                kind: path
                    .extension()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }),
            SoundSource::Url(url) => self.emit(PlayerEvent::FinishedLoadingUrl {
                success: true,
                url: url.clone(),
            }),
        }
    }

    fn report_setup_error(&self, error: AudioError) -> AudioError {
        warn!("Failed to load sound: {}", error);
        self.emit(PlayerEvent::SetupError { error: error.to_string() });
        error
    }

    fn emit_state(&self, identifier: String, state: PlaybackState) {
        self.emit(PlayerEvent::StateChanged { identifier, state });
    }

    fn emit(&self, event: PlayerEvent) {
        self.emitter.emit(event);
    }
}

impl Drop for SoundRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}
