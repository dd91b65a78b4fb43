//! Energy-based utterance endpointing.
//!
//! Audio is cut into 30 ms frames (480 samples at 16 kHz).  A frame whose RMS
//! exceeds the threshold counts as voice.  An utterance starts on the first
//! voice frame (with a short pre-roll so the first syllable is not clipped)
//! and ends after `pause` of continuous silence or when it reaches the
//! phrase limit.

use std::collections::VecDeque;
use std::time::Duration;

use super::resample::WHISPER_SAMPLE_RATE;
use crate::config::VoiceConfig;

/// 30 ms at 16 kHz.
pub const FRAME_SAMPLES: usize = 480;

/// Frames kept from before the voice onset.
const PRE_ROLL_FRAMES: usize = 10;

/// Root-mean-square level of `frame`.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

fn frames_in(duration: Duration) -> usize {
    let samples = duration.as_micros() * u128::from(WHISPER_SAMPLE_RATE) / 1_000_000;
    (samples as usize).div_ceil(FRAME_SAMPLES).max(1)
}

pub struct Segmenter {
    threshold: f32,
    pause_frames: usize,
    limit_frames: usize,
    /// Samples not yet forming a whole frame.
    pending: Vec<f32>,
    pre_roll: VecDeque<Vec<f32>>,
    utterance: Vec<f32>,
    speaking: bool,
    voiced_frames: usize,
    total_frames: usize,
    silent_run: usize,
}

impl Segmenter {
    pub fn new(threshold: f32, pause: Duration, phrase_limit: Duration) -> Self {
        Self {
            threshold,
            pause_frames: frames_in(pause),
            limit_frames: frames_in(phrase_limit),
            pending: Vec::with_capacity(FRAME_SAMPLES),
            pre_roll: VecDeque::with_capacity(PRE_ROLL_FRAMES),
            utterance: Vec::new(),
            speaking: false,
            voiced_frames: 0,
            total_frames: 0,
            silent_run: 0,
        }
    }

    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(
            config.energy_threshold,
            Duration::from_secs_f32(config.pause_secs.max(0.0)),
            Duration::from_secs_f32(config.phrase_limit_secs.max(0.0)),
        )
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Feed 16 kHz mono samples; returns every utterance completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut finished = Vec::new();
        self.pending.extend_from_slice(samples);

        let whole = self.pending.len() / FRAME_SAMPLES * FRAME_SAMPLES;
        let frames: Vec<f32> = self.pending.drain(..whole).collect();

        for frame in frames.chunks_exact(FRAME_SAMPLES) {
            if let Some(utterance) = self.push_frame(frame) {
                finished.push(utterance);
            }
        }
        finished
    }

    /// Close an utterance in progress, e.g. when the input stalls.
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        self.pending.clear();
        if self.speaking {
            self.finish()
        } else {
            None
        }
    }

    fn push_frame(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        let voiced = rms(frame) > self.threshold;

        if !self.speaking {
            if !voiced {
                if self.pre_roll.len() == PRE_ROLL_FRAMES {
                    self.pre_roll.pop_front();
                }
                self.pre_roll.push_back(frame.to_vec());
                return None;
            }

            self.speaking = true;
            self.total_frames = self.pre_roll.len();
            for earlier in self.pre_roll.drain(..) {
                self.utterance.extend(earlier);
            }
        }

        self.utterance.extend_from_slice(frame);
        self.total_frames += 1;
        if voiced {
            self.voiced_frames += 1;
            self.silent_run = 0;
        } else {
            self.silent_run += 1;
        }

        if self.silent_run >= self.pause_frames || self.total_frames >= self.limit_frames {
            return self.finish();
        }
        None
    }

    fn finish(&mut self) -> Option<Vec<f32>> {
        let utterance = std::mem::take(&mut self.utterance);
        let voiced = self.voiced_frames;

        self.speaking = false;
        self.voiced_frames = 0;
        self.total_frames = 0;
        self.silent_run = 0;

        // A lone click is not speech.
        (voiced >= 2).then_some(utterance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
