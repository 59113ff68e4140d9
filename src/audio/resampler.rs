// Sample rate conversion using rubato
// Clips are converted once, at open time, to the output rate

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

use crate::audio::decoder::DecodedClip;
use crate::error::{AudioError, Result};

pub struct Resampler;

impl Resampler {
    /// Convert `clip` to `target_rate`. Returns the clip untouched when the
    /// rates already match.
    pub fn to_rate(label: &str, clip: DecodedClip, target_rate: u32) -> Result<DecodedClip> {
        if clip.sample_rate == target_rate || clip.frames() == 0 {
            return Ok(clip);
        }

        debug!(
            "Resampling {} from {}Hz to {}Hz ({} channels)",
            label, clip.sample_rate, target_rate, clip.channels
        );

        let planar_input = deinterleave(&clip.samples, clip.channels);
        let input_frames = planar_input[0].len();

        let mut resampler = FastFixedIn::<f32>::new(
            target_rate as f64 / clip.sample_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            input_frames,
            clip.channels,
        )
        .map_err(|e| AudioError::source_unavailable(label, format!("resampler setup failed: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| AudioError::source_unavailable(label, format!("resampling failed: {}", e)))?;

        Ok(DecodedClip {
            samples: interleave(&planar_output),
            sample_rate: target_rate,
            channels: clip.channels,
        })
    }
}

/// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planar.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for plane in planar {
            out.push(plane[i]);
        }
    }
    out
}
