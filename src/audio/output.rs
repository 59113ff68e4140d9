// Audio output
// Drives the mixer from a cpal output stream, or from a headless clock thread
// when no device is wanted or available

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::audio::mixer::{Mixer, OutputFormat};
use crate::settings::OutputSettings;

/// Keeps the active output alive; dropping it stops rendering
pub enum OutputDriver {
    #[cfg(feature = "cpal-output")]
    Device(device::CpalOutput),
    Headless(HeadlessOutput),
}

impl OutputDriver {
    pub fn is_headless(&self) -> bool {
        matches!(self, OutputDriver::Headless(_))
    }
}

/// Open the output described by `settings` and return the mixer it renders
pub fn start(settings: &OutputSettings) -> Result<(Mixer, OutputDriver)> {
    #[cfg(feature = "cpal-output")]
    if settings.prefer_device {
        match device::CpalOutput::start() {
            Ok((mixer, output)) => return Ok((mixer, OutputDriver::Device(output))),
            Err(e) => warn!("Audio device unavailable, falling back to headless output: {:#}", e),
        }
    }

    #[cfg(not(feature = "cpal-output"))]
    if settings.prefer_device {
        warn!("Built without `cpal-output`, using headless output");
    }

    let format = OutputFormat {
        sample_rate: settings.sample_rate.max(1),
        channels: settings.channels.max(1) as usize,
    };
    let mixer = Mixer::new(format);
    let output = HeadlessOutput::start(mixer.clone(), settings.block_frames)?;
    Ok((mixer, OutputDriver::Headless(output)))
}

/// Renders the mixer in real time into a scratch buffer
pub struct HeadlessOutput {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HeadlessOutput {
    pub fn start(mixer: Mixer, block_frames: usize) -> Result<Self> {
        let format = mixer.format();
        let block_frames = block_frames.max(1);
        let period = Duration::from_secs_f64(block_frames as f64 / format.sample_rate as f64);
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = std::thread::Builder::new()
            .name("sound-player-headless".to_string())
            .spawn(move || {
                let mut scratch = vec![0.0f32; block_frames * format.channels];
                let mut next_tick = Instant::now();
                while flag.load(Ordering::Relaxed) {
                    mixer.render(&mut scratch);
                    next_tick += period;
                    let now = Instant::now();
                    if next_tick > now {
                        std::thread::sleep(next_tick - now);
                    } else {
                        next_tick = now;
                    }
                }
                debug!("Headless output stopped");
            })
            .context("Failed to spawn headless output thread")?;

        info!(
            "Headless output running at {} Hz, {} ch, {} frames per tick",
            format.sample_rate, format.channels, block_frames
        );
        Ok(Self {
            running,
            thread: Some(thread),
        })
    }
}

impl Drop for HeadlessOutput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(feature = "cpal-output")]
pub mod device {
    use std::sync::mpsc;
    use std::thread::JoinHandle;

    use anyhow::{anyhow, Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Stream, StreamConfig};
    use tracing::{error, info};

    use crate::audio::mixer::{Mixer, OutputFormat};

    /// Owns a cpal stream on a dedicated thread so the handle stays `Send`
    pub struct CpalOutput {
        stop_tx: Option<mpsc::Sender<()>>,
        thread: Option<JoinHandle<()>>,
    }

    impl CpalOutput {
        /// Open the default output device and start rendering
        pub fn start() -> Result<(Mixer, Self)> {
            let (ready_tx, ready_rx) = mpsc::channel::<Result<Mixer, String>>();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();

            let thread = std::thread::Builder::new()
                .name("sound-player-output".to_string())
                .spawn(move || match open_stream() {
                    Ok((stream, mixer)) => {
                        let _ = ready_tx.send(Ok(mixer));
                        // Blocks until the owner drops the output
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                })
                .context("Failed to spawn audio output thread")?;

            let mixer = ready_rx
                .recv()
                .map_err(|_| anyhow!("Audio output thread exited during setup"))?
                .map_err(|e| anyhow!(e))?;

            Ok((
                mixer,
                Self {
                    stop_tx: Some(stop_tx),
                    thread: Some(thread),
                },
            ))
        }
    }

    impl Drop for CpalOutput {
        fn drop(&mut self) {
            self.stop_tx.take();
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    fn open_stream() -> Result<(Stream, Mixer), String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("No output device available")?;
        let config = device
            .default_output_config()
            .map_err(|e| format!("Failed to get default output config: {}", e))?;

        let mixer = Mixer::new(OutputFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels() as usize,
        });

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), mixer.clone())?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), mixer.clone())?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), mixer.clone())?,
            format => return Err(format!("Unsupported sample format: {:?}", format)),
        };

        stream
            .play()
            .map_err(|e| format!("Failed to start stream: {}", e))?;

        let format = mixer.format();
        info!("Audio device output at {} Hz, {} ch", format.sample_rate, format.channels);
        Ok((stream, mixer))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        mixer: Mixer,
    ) -> Result<Stream, String> {
        let error_mixer = mixer.clone();
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    mixer.render(&mut scratch);
                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample);
                    }
                },
                move |err| {
                    error!("Audio output error: {}", err);
                    error_mixer.fail_all(&err.to_string());
                },
                None,
            )
            .map_err(|e| format!("Failed to build output stream: {}", e))
    }
}
