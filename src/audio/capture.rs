//! Microphone capture via `cpal`.
//!
//! [`AudioCapture::start`] streams [`AudioChunk`]s over a std mpsc channel
//! from the cpal callback thread.  The returned [`StreamHandle`] keeps the
//! stream alive; dropping it stops capture.  `cpal::Stream` is not `Send` on
//! every platform, so the handle must stay on the thread that created it.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::resample::{downmix, resample_to_16k};

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One callback's worth of interleaved `f32` samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    /// This chunk as 16 kHz mono, ready for segmentation.
    pub fn to_mono_16k(&self) -> Vec<f32> {
        resample_to_16k(&downmix(&self.samples, self.channels), self.sample_rate)
    }
}

/// Keeps the cpal stream running until dropped.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("microphone thread exited before reporting readiness")]
    ThreadExited,
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// The default input device and its preferred stream configuration.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the system default microphone.
    pub fn new() -> Result<Self, CaptureError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;

        if let Ok(name) = device.name() {
            log::info!("audio: input '{name}' at {sample_rate} Hz, {channels} ch");
        }

        Ok(Self {
            device,
            config: supported.into(),
            sample_rate,
            channels,
        })
    }

    /// Begin streaming to `tx`.  Send errors are ignored so the audio
    /// thread never panics after the receiver is gone.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| log::error!("audio: stream error: {err}"),
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn stereo_48k_chunk_becomes_mono_16k() {
        let chunk = AudioChunk {
            samples: vec![0.25_f32; 960],
            sample_rate: 48_000,
            channels: 2,
        };
        let mono = chunk.to_mono_16k();
        assert_eq!(mono.len(), 160);
        assert!(mono.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }
}
