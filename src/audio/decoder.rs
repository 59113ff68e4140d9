// Audio decoder using Symphonia
// Decodes a whole audio resource into interleaved f32 PCM

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::assets::AudioResource;
use crate::error::{AudioError, Result};

/// Fully decoded audio held in memory
#[derive(Debug, Clone)]
pub struct DecodedClip {
    /// Interleaved samples, `channels` per frame
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

pub struct AudioDecoder {
    label: String,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: Option<u32>,
}

impl AudioDecoder {
    /// Probe the resource and prepare a decoder for its first audio track
    pub fn open(resource: AudioResource) -> Result<Self> {
        let AudioResource { label, bytes, extension } = resource;
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension.as_deref() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::source_unavailable(&label, format!("unsupported format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::source_unavailable(&label, "no audio track found"))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::source_unavailable(&label, format!("no decoder: {}", e)))?;

        Ok(Self {
            label,
            format,
            decoder,
            track_id,
            sample_rate,
        })
    }

    /// Decode the next packet of the selected track.
    /// Returns `None` at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<(Vec<f32>, u32, usize)>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(AudioError::source_unavailable(
                        &self.label,
                        format!("failed to read packet: {}", e),
                    ))
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some((buf.samples().to_vec(), spec.rate, spec.channels.count())));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error in {} (skipping packet): {}", self.label, e);
                    continue;
                }
                Err(e) => {
                    return Err(AudioError::source_unavailable(
                        &self.label,
                        format!("decode failed: {}", e),
                    ))
                }
            }
        }
    }

    /// Decode the remaining stream into a single clip
    pub fn decode_all(mut self) -> Result<DecodedClip> {
        let mut samples = Vec::new();
        let mut sample_rate = self.sample_rate;
        let mut channels = 0usize;

        while let Some((chunk, rate, chunk_channels)) = self.decode_next()? {
            if channels == 0 {
                channels = chunk_channels;
            }
            sample_rate.get_or_insert(rate);
            samples.extend_from_slice(&chunk);
        }

        if channels == 0 || samples.is_empty() {
            return Err(AudioError::source_unavailable(&self.label, "no audio frames decoded"));
        }

        let clip = DecodedClip {
            samples,
            sample_rate: sample_rate.unwrap_or(44100),
            channels,
        };
        debug!(
            "Decoded {}: {} frames, {} Hz, {} ch",
            self.label,
            clip.frames(),
            clip.sample_rate,
            clip.channels
        );
        Ok(clip)
    }
}

/// Open and fully decode a resource
pub fn decode_resource(resource: AudioResource) -> Result<DecodedClip> {
    AudioDecoder::open(resource)?.decode_all()
}
