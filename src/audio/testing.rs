// Test fixtures: generated WAV data, an in-memory resolver and a scripted engine
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::assets::{AssetResolver, AudioResource, SoundSource};
use crate::audio::engine::{AudioEngine, Voice};
use crate::audio::signals::{SignalSender, VoiceId, VoiceSignal};
use crate::error::{AudioError, Result};

/// 16-bit PCM sine tone as an in-memory WAV resource
pub fn wav_resource(label: &str, sample_rate: u32, channels: u16, frames: usize) -> AudioResource {
    AudioResource {
        label: label.to_string(),
        bytes: wav_bytes(sample_rate, channels, frames),
        extension: Some("wav".to_string()),
    }
}

pub fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    bytes
}

/// Resolver over fixed in-memory entries
#[derive(Default)]
pub struct MemoryResolver {
    sources: HashMap<String, Vec<u8>>,
    named: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn with_source(mut self, source: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.sources.insert(source.to_string(), bytes.into());
        self
    }

    pub fn with_named(mut self, identifier: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.named.insert(identifier.to_string(), bytes.into());
        self
    }
}

impl AssetResolver for MemoryResolver {
    fn resolve_source(&self, source: &SoundSource) -> Result<AudioResource> {
        let key = source.to_string();
        self.sources
            .get(&key)
            .map(|bytes| AudioResource { label: key.clone(), bytes: bytes.clone(), extension: None })
            .ok_or_else(|| AudioError::source_unavailable(&key, "not found"))
    }

    fn resolve_named(&self, identifier: &str) -> Result<AudioResource> {
        self.named
            .get(identifier)
            .map(|bytes| AudioResource {
                label: identifier.to_string(),
                bytes: bytes.clone(),
                extension: None,
            })
            .ok_or_else(|| AudioError::source_unavailable(identifier, "not found"))
    }
}

#[derive(Debug, Clone)]
pub struct FakeVoiceState {
    pub label: String,
    pub position: Duration,
    pub duration: Duration,
    pub playing: bool,
    pub volume: f32,
    pub released: bool,
    pub session: u64,
    signals: SignalSender,
}

#[derive(Default)]
struct FakeShared {
    voices: HashMap<VoiceId, FakeVoiceState>,
    opened: Vec<VoiceId>,
}

/// Engine whose resources are UTF-8 durations in seconds, e.g. `b"2.5"`
#[derive(Clone, Default)]
pub struct FakeEngine {
    shared: Arc<Mutex<FakeShared>>,
}

impl FakeEngine {
    pub fn open_count(&self) -> usize {
        self.shared.lock().opened.len()
    }

    pub fn last_opened(&self) -> Option<VoiceId> {
        self.shared.lock().opened.last().copied()
    }

    pub fn voice(&self, id: VoiceId) -> FakeVoiceState {
        self.shared.lock().voices[&id].clone()
    }

    /// Simulate end-of-media: the voice sits paused at its end
    pub fn finish(&self, id: VoiceId) {
        let mut shared = self.shared.lock();
        let voice = shared.voices.get_mut(&id).unwrap();
        voice.position = voice.duration;
        voice.playing = false;
        voice.signals.send(VoiceSignal::Ended { session: voice.session });
    }

    pub fn fail(&self, id: VoiceId, reason: &str) {
        let mut shared = self.shared.lock();
        let voice = shared.voices.get_mut(&id).unwrap();
        voice.playing = false;
        voice.signals.send(VoiceSignal::Failed(reason.to_string()));
    }
}

impl AudioEngine for FakeEngine {
    fn open(&mut self, resource: AudioResource, signals: SignalSender) -> Result<Box<dyn Voice>> {
        let seconds: f64 = std::str::from_utf8(&resource.bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| AudioError::source_unavailable(&resource.label, "undecodable"))?;

        let id = signals.voice();
        let mut shared = self.shared.lock();
        shared.voices.insert(
            id,
            FakeVoiceState {
                label: resource.label,
                position: Duration::ZERO,
                duration: Duration::from_secs_f64(seconds),
                playing: false,
                volume: 1.0,
                released: false,
                session: 0,
                signals,
            },
        );
        shared.opened.push(id);

        Ok(Box::new(FakeVoice {
            id,
            shared: self.shared.clone(),
        }))
    }
}

struct FakeVoice {
    id: VoiceId,
    shared: Arc<Mutex<FakeShared>>,
}

impl FakeVoice {
    fn get<T>(&self, f: impl FnOnce(&FakeVoiceState) -> T) -> T {
        f(&self.shared.lock().voices[&self.id])
    }

    fn set(&self, f: impl FnOnce(&mut FakeVoiceState)) {
        if let Some(v) = self.shared.lock().voices.get_mut(&self.id) {
            f(v);
        }
    }
}

impl Voice for FakeVoice {
    fn play(&mut self) {
        self.set(|v| v.playing = true);
    }

    fn pause(&mut self) {
        self.set(|v| v.playing = false);
    }

    fn seek(&mut self, position: Duration) {
        self.set(|v| v.position = position.min(v.duration));
    }

    fn position(&self) -> Duration {
        self.get(|v| v.position)
    }

    fn duration(&self) -> Duration {
        self.get(|v| v.duration)
    }

    fn set_volume(&mut self, volume: f32) {
        self.set(|v| v.volume = volume);
    }

    fn volume(&self) -> f32 {
        self.get(|v| v.volume)
    }

    fn is_playing(&self) -> bool {
        self.get(|v| v.playing)
    }

    fn set_session(&mut self, session: u64) {
        self.set(|v| v.session = session);
    }
}

impl Drop for FakeVoice {
    fn drop(&mut self) {
        self.set(|v| {
            v.released = true;
            v.playing = false;
        });
    }
}
