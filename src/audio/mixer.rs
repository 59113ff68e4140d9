// Software voice mixer
// Every player instance is a voice; the output driver pulls mixed frames

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::assets::AudioResource;
use crate::audio::decoder::{decode_resource, DecodedClip};
use crate::audio::engine::{AudioEngine, Voice};
use crate::audio::resampler::Resampler;
use crate::audio::signals::{SignalSender, VoiceId, VoiceSignal};
use crate::error::Result;

/// Sample rate and channel count the mixer renders at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

struct VoiceState {
    clip: Arc<DecodedClip>,
    /// Next frame to render
    cursor: usize,
    playing: bool,
    volume: f32,
    /// Playback session reported with `Ended`
    session: u64,
    signals: SignalSender,
}

#[derive(Default)]
struct MixerState {
    voices: HashMap<VoiceId, VoiceState>,
}

/// Shared between the engine, its voices and the output callback
#[derive(Clone)]
pub struct Mixer {
    state: Arc<Mutex<MixerState>>,
    format: OutputFormat,
}

impl Mixer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            state: Arc::new(Mutex::new(MixerState::default())),
            format,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn voice_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Fill `out` (interleaved, `format.channels` wide) with the sum of all
    /// playing voices. Voices reaching their end are paused there and
    /// signal `Ended` once.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let out_channels = self.format.channels.max(1);
        let out_frames = out.len() / out_channels;

        let mut state = self.state.lock();
        for voice in state.voices.values_mut() {
            if !voice.playing {
                continue;
            }

            let clip = &voice.clip;
            let total = clip.frames();
            let count = total.saturating_sub(voice.cursor).min(out_frames);

            for i in 0..count {
                let src_start = (voice.cursor + i) * clip.channels;
                let src = &clip.samples[src_start..src_start + clip.channels];
                let dst = &mut out[i * out_channels..(i + 1) * out_channels];
                mix_frame(src, dst, voice.volume);
            }

            voice.cursor += count;
            if voice.cursor >= total {
                voice.playing = false;
                voice.signals.send(VoiceSignal::Ended { session: voice.session });
            }
        }
        drop(state);

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    /// Stop every playing voice after an output failure and report it
    pub fn fail_all(&self, reason: &str) {
        let mut state = self.state.lock();
        for voice in state.voices.values_mut().filter(|v| v.playing) {
            voice.playing = false;
            voice.signals.send(VoiceSignal::Failed(reason.to_string()));
        }
    }

    fn insert(&self, id: VoiceId, state: VoiceState) {
        self.state.lock().voices.insert(id, state);
    }

    fn with_voice<T>(&self, id: VoiceId, f: impl FnOnce(&mut VoiceState) -> T) -> Option<T> {
        self.state.lock().voices.get_mut(&id).map(f)
    }

    fn remove(&self, id: VoiceId) {
        self.state.lock().voices.remove(&id);
    }
}

/// Add one source frame into one output frame, mapping channel counts
fn mix_frame(src: &[f32], dst: &mut [f32], volume: f32) {
    if src.len() == dst.len() {
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s * volume;
        }
    } else if src.len() == 1 {
        for d in dst.iter_mut() {
            *d += src[0] * volume;
        }
    } else if dst.len() == 1 {
        let sum: f32 = src.iter().sum();
        dst[0] += sum / src.len() as f32 * volume;
    } else {
        for (c, d) in dst.iter_mut().enumerate() {
            *d += src[c % src.len()] * volume;
        }
    }
}

/// Audio engine backed by the software mixer
pub struct MixerEngine {
    mixer: Mixer,
}

impl MixerEngine {
    pub fn new(mixer: Mixer) -> Self {
        Self { mixer }
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }
}

impl AudioEngine for MixerEngine {
    fn open(&mut self, resource: AudioResource, signals: SignalSender) -> Result<Box<dyn Voice>> {
        let label = resource.label.clone();
        let clip = decode_resource(resource)?;
        let clip = Resampler::to_rate(&label, clip, self.mixer.format.sample_rate)?;
        let duration = clip.duration();
        let id = signals.voice();

        self.mixer.insert(
            id,
            VoiceState {
                clip: Arc::new(clip),
                cursor: 0,
                playing: false,
                volume: 1.0,
                session: 0,
                signals,
            },
        );
        debug!("Opened voice {:?} for {} ({:.3}s)", id, label, duration.as_secs_f64());

        Ok(Box::new(MixerVoice {
            id,
            mixer: self.mixer.clone(),
            duration,
        }))
    }
}

struct MixerVoice {
    id: VoiceId,
    mixer: Mixer,
    duration: Duration,
}

impl MixerVoice {
    fn frames_to_duration(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.mixer.format.sample_rate as f64)
    }

    fn update(&self, f: impl FnOnce(&mut VoiceState)) {
        if self.mixer.with_voice(self.id, f).is_none() {
            warn!("Voice {:?} is no longer registered with the mixer", self.id);
        }
    }
}

impl Voice for MixerVoice {
    fn play(&mut self) {
        self.update(|v| v.playing = true);
    }

    fn pause(&mut self) {
        self.update(|v| v.playing = false);
    }

    fn seek(&mut self, position: Duration) {
        let rate = self.mixer.format.sample_rate as f64;
        self.update(|v| {
            let frame = (position.as_secs_f64() * rate).round() as usize;
            v.cursor = frame.min(v.clip.frames());
        });
    }

    fn position(&self) -> Duration {
        let frames = self.mixer.with_voice(self.id, |v| v.cursor).unwrap_or(0);
        self.frames_to_duration(frames)
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.update(|v| v.volume = volume.clamp(0.0, 1.0));
    }

    fn volume(&self) -> f32 {
        self.mixer.with_voice(self.id, |v| v.volume).unwrap_or(0.0)
    }

    fn is_playing(&self) -> bool {
        self.mixer.with_voice(self.id, |v| v.playing).unwrap_or(false)
    }

    fn set_session(&mut self, session: u64) {
        self.update(|v| v.session = session);
    }
}

impl Drop for MixerVoice {
    fn drop(&mut self) {
        self.mixer.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signals::{signal_channel, Signal};
    use crate::audio::testing::wav_resource;

    const FORMAT: OutputFormat = OutputFormat { sample_rate: 8000, channels: 2 };

    fn open(engine: &mut MixerEngine, id: u64, frames: usize) -> (Box<dyn Voice>, crate::audio::signals::SignalReceiver) {
        let (tx, rx) = signal_channel();
        let voice = engine
            .open(wav_resource("t", 8000, 1, frames), SignalSender::new(VoiceId(id), tx))
            .unwrap();
        (voice, rx)
    }

    #[test]
    fn test_open_is_paused_at_zero() {
        let mut engine = MixerEngine::new(Mixer::new(FORMAT));
        let (voice, _rx) = open(&mut engine, 1, 800);

        assert!(!voice.is_playing());
        assert_eq!(voice.position(), Duration::ZERO);
        assert!((voice.duration().as_secs_f64() - 0.1).abs() < 1e-6);
        assert_eq!(engine.mixer().voice_count(), 1);
    }

    #[test]
    fn test_render_signals_end_once() {
        let mut engine = MixerEngine::new(Mixer::new(FORMAT));
        let (mut voice, mut rx) = open(&mut engine, 7, 100);
        voice.play();

        let mut out = vec![0.0; 64 * 2];
        engine.mixer().render(&mut out);
        assert!(rx.try_recv().is_err());
        engine.mixer().render(&mut out);
        engine.mixer().render(&mut out);

        assert_eq!(
            rx.try_recv().unwrap(),
            Signal::Voice { voice: VoiceId(7), signal: VoiceSignal::Ended { session: 0 } }
        );
        assert!(rx.try_recv().is_err());
        assert!(!voice.is_playing());
        assert_eq!(voice.position(), voice.duration());
    }

    #[test]
    fn test_ended_carries_session() {
        let mut engine = MixerEngine::new(Mixer::new(FORMAT));
        let (mut voice, mut rx) = open(&mut engine, 4, 10);
        voice.set_session(3);
        voice.play();

        let mut out = vec![0.0; 16 * 2];
        engine.mixer().render(&mut out);
        assert_eq!(
            rx.try_recv().unwrap(),
            Signal::Voice { voice: VoiceId(4), signal: VoiceSignal::Ended { session: 3 } }
        );
    }

    #[test]
    fn test_paused_voice_is_silent() {
        let mixer = Mixer::new(FORMAT);
        let (tx, _rx) = signal_channel();
        mixer.insert(
            VoiceId(1),
            VoiceState {
                clip: Arc::new(DecodedClip { samples: vec![0.5; 16], sample_rate: 8000, channels: 1 }),
                cursor: 0,
                playing: false,
                volume: 1.0,
                session: 0,
                signals: SignalSender::new(VoiceId(1), tx),
            },
        );

        let mut out = vec![1.0; 8];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mono_to_stereo_with_volume() {
        let mixer = Mixer::new(FORMAT);
        let (tx, _rx) = signal_channel();
        mixer.insert(
            VoiceId(1),
            VoiceState {
                clip: Arc::new(DecodedClip { samples: vec![0.5; 4], sample_rate: 8000, channels: 1 }),
                cursor: 0,
                playing: true,
                volume: 0.5,
                session: 0,
                signals: SignalSender::new(VoiceId(1), tx),
            },
        );

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_mix_frame_stereo_to_mono() {
        let mut dst = [0.0];
        mix_frame(&[0.2, 0.4], &mut dst, 1.0);
        assert!((dst[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_seek_clamps_and_drop_releases() {
        let mut engine = MixerEngine::new(Mixer::new(FORMAT));
        let (mut voice, _rx) = open(&mut engine, 2, 800);

        voice.seek(Duration::from_millis(50));
        assert!((voice.position().as_secs_f64() - 0.05).abs() < 1e-3);
        voice.seek(Duration::from_secs(5));
        assert_eq!(voice.position(), voice.duration());

        drop(voice);
        assert_eq!(engine.mixer().voice_count(), 0);
    }

    #[test]
    fn test_fail_all_reports_playing_voices() {
        let mut engine = MixerEngine::new(Mixer::new(FORMAT));
        let (mut playing, mut rx_playing) = open(&mut engine, 1, 800);
        let (_idle, mut rx_idle) = open(&mut engine, 2, 800);
        playing.play();

        engine.mixer().fail_all("device unplugged");

        assert_eq!(
            rx_playing.try_recv().unwrap(),
            Signal::Voice {
                voice: VoiceId(1),
                signal: VoiceSignal::Failed("device unplugged".to_string())
            }
        );
        assert!(rx_idle.try_recv().is_err());
        assert!(!playing.is_playing());
    }
}
