/// Input level of a block of captured samples
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioLevel {
    pub rms: f32,
    pub peak: f32,
}

impl AudioLevel {
    /// RMS and absolute peak of `samples`; zero for an empty block
    pub fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sum_sq = 0.0f64;
        let mut peak = 0.0f32;
        for &s in samples {
            sum_sq += (s as f64) * (s as f64);
            peak = peak.max(s.abs());
        }

        Self {
            rms: (sum_sq / samples.len() as f64).sqrt() as f32,
            peak,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(AudioLevel::measure(&[0.0; 512]), AudioLevel::default());
        assert_eq!(AudioLevel::measure(&[]), AudioLevel::default());
    }

    #[test]
    fn test_full_scale_square_wave() {
        let square: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let level = AudioLevel::measure(&square);
        assert!((level.rms - 1.0).abs() < 1e-6);
        assert_eq!(level.peak, 1.0);
    }

    #[test]
    fn test_sine_rms() {
        let sine: Vec<f32> = (0..4800)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin())
            .collect();
        let level = AudioLevel::measure(&sine);
        assert!((level.rms - 0.5 / 2f32.sqrt()).abs() < 1e-3);
        assert!((level.peak - 0.5).abs() < 1e-3);
    }
}
