//! Conversion of microphone audio to the 16 kHz mono `f32` format Whisper
//! expects.

/// Sample rate required by the speech recogniser.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Average interleaved channels down to one.  Trailing samples that do not
/// fill a whole frame are dropped.
///
/// ```rust
/// use vision_guide::audio::downmix;
///
/// let stereo = [0.5_f32, -0.5, 0.2, 0.4];
/// let mono = downmix(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = usize::from(n);
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Linear-interpolation resampler from `from_rate` to 16 kHz.
pub fn resample_to_16k(samples: &[f32], from_rate: u32) -> Vec<f32> {
    if from_rate == WHISPER_SAMPLE_RATE || from_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let step = f64::from(from_rate) / f64::from(WHISPER_SAMPLE_RATE);
    let out_len = (samples.len() as f64 / step).ceil() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}
