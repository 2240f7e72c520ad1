//! Sample rate conversion between the host's capture/playback rates and the
//! engine's operating rate. Linear interpolation; good enough for tones that
//! sit well below Nyquist on both sides.

/// Mix interleaved multi-channel audio down to mono by averaging the channels
///
/// Trailing samples that do not form a whole frame are dropped.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample audio to a target sample rate using linear interpolation
///
/// # Example
/// ```
/// use wavebridge_core::resample::resample_audio;
///
/// let audio_48k = vec![0.0f32; 480];
/// let audio_16k = resample_audio(&audio_48k, 48000, 16000);
/// assert_eq!(audio_16k.len(), 160);
/// ```
pub fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_length = ((samples.len() as f64) * ratio).ceil() as usize;
    let mut resampled = Vec::with_capacity(new_length);

    for i in 0..new_length {
        let src_idx = i as f64 / ratio;
        let src_idx_floor = (src_idx.floor() as usize).min(samples.len() - 1);
        let src_idx_ceil = src_idx_floor + 1;
        let fraction = (src_idx - src_idx_floor as f64) as f32;

        let interpolated = if src_idx_ceil < samples.len() {
            samples[src_idx_floor] * (1.0 - fraction) + samples[src_idx_ceil] * fraction
        } else {
            samples[src_idx_floor]
        };

        resampled.push(interpolated);
    }

    resampled
}

/// Linear-interpolation resampler for audio that arrives in pieces
///
/// Carries the fractional read position and the last input sample across
/// calls, so feeding a signal in chunks of any size yields the same output
/// as feeding it at once. Output is only produced for positions that lie
/// between two samples already received.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    step: f64,
    /// Next output position, relative to the first sample of the window
    pos: f64,
    last: Option<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let step = if from_rate == 0 || to_rate == 0 {
            1.0
        } else {
            from_rate as f64 / to_rate as f64
        };
        Self {
            from_rate,
            to_rate,
            step,
            pos: 0.0,
            last: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate || self.from_rate == 0 || self.to_rate == 0
    }

    /// Resample `samples` and append the result to `out`
    pub fn process(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        if self.is_passthrough() {
            out.extend_from_slice(samples);
            return;
        }

        // The window is the carried sample (if any) followed by `samples`
        let carried = self.last;
        let offset = usize::from(carried.is_some());
        let window_len = samples.len() + offset;
        let at = |i: usize| match carried {
            Some(last) if i == 0 => last,
            _ => samples[i - offset],
        };

        out.reserve((window_len as f64 / self.step) as usize + 1);
        while (self.pos as usize) + 1 < window_len {
            let i = self.pos as usize;
            let fraction = (self.pos - i as f64) as f32;
            out.push(at(i) * (1.0 - fraction) + at(i + 1) * fraction);
            self.pos += self.step;
        }

        // The last sample becomes index 0 of the next window
        self.pos -= (window_len - 1) as f64;
        self.last = samples.last().copied();
    }

    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let stereo = vec![0.2, 0.8, 0.4, 0.6]; // [L, R, L, R]
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 0.001);
        assert!((mono[1] - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_downmix_drops_partial_frame() {
        let samples = vec![0.1, 0.3, 0.5, 0.7, -0.2];
        let mono = downmix_to_mono(&samples, 2);
        assert_eq!(mono.len(), 2);
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample_audio(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples: Vec<f32> = (0..48).map(|i| i as f32 / 48.0).collect();
        let resampled = resample_audio(&samples, 48000, 16000);
        assert_eq!(resampled.len(), 16);
        assert!((resampled[1] - samples[3]).abs() < 1e-6);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let samples = vec![0.0, 1.0];
        let resampled = resample_audio(&samples, 16000, 32000);
        assert_eq!(resampled.len(), 4);
        assert!((resampled[1] - 0.5).abs() < 1e-6);
        assert!(resampled.iter().all(|&s| (0.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_stream_resampler_chunking_matches_single_pass() {
        let signal: Vec<f32> = (0..20_000)
            .map(|i| (i as f32 * 0.0137).sin() * 0.8)
            .collect();

        for (from, to) in [(44100, 48000), (48000, 44100), (48000, 16000)] {
            let mut whole = Vec::new();
            StreamResampler::new(from, to).process(&signal, &mut whole);

            for chunk in [1, 64, 256, 511, 4096] {
                let mut streamed = Vec::new();
                let mut resampler = StreamResampler::new(from, to);
                for block in signal.chunks(chunk) {
                    resampler.process(block, &mut streamed);
                }
                assert_eq!(streamed.len(), whole.len(), "{} -> {} in {}", from, to, chunk);
                assert!(streamed
                    .iter()
                    .zip(&whole)
                    .all(|(a, b)| (a - b).abs() < 1e-4));
            }

            // Agrees with the one-shot resampler wherever both interpolate
            let oneshot = resample_audio(&signal, from, to);
            assert!(oneshot.len() >= whole.len());
            assert!(oneshot.len() - whole.len() <= (to / from + 2) as usize);
            assert!(whole.iter().zip(&oneshot).all(|(a, b)| (a - b).abs() < 1e-4));
        }
    }

    #[test]
    fn test_stream_resampler_reset_and_passthrough() {
        let mut resampler = StreamResampler::new(16000, 32000);
        let mut out = Vec::new();
        resampler.process(&[0.0], &mut out);
        assert!(out.is_empty());
        resampler.process(&[1.0], &mut out);
        assert_eq!(out, vec![0.0, 0.5]);

        resampler.reset();
        out.clear();
        resampler.process(&[1.0], &mut out);
        assert!(out.is_empty());

        let mut same = StreamResampler::new(48000, 48000);
        let mut out = Vec::new();
        same.process(&[0.1, 0.2], &mut out);
        assert_eq!(out, vec![0.1, 0.2]);
    }
}
