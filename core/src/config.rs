use crate::error::{ModemError, Result};
use crate::{BASE_FRAME_SAMPLES, BASE_SAMPLE_RATE, DEFAULT_SAMPLE_RATE, SAMPLE_RATE_MAX, SAMPLE_RATE_MIN};

/// Engine construction parameters
///
/// `sample_rate` is the operating rate tones are synthesised and analysed at.
/// Captured input is resampled from `sample_rate_inp` and rendered output is
/// resampled to `sample_rate_out` when they differ from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    pub sample_rate_inp: u32,
    pub sample_rate_out: u32,
    pub sample_rate: u32,
}

impl Parameters {
    /// Input and output rates; the output rate doubles as the operating rate.
    pub fn new(sample_rate_inp: i64, sample_rate_out: i64) -> Result<Self> {
        let inp = checked_rate(sample_rate_inp)?;
        let out = checked_rate(sample_rate_out)?;
        Ok(Self {
            sample_rate_inp: inp,
            sample_rate_out: out,
            sample_rate: out,
        })
    }

    /// Same rate for capture, playback and processing
    pub fn uniform(sample_rate: i64) -> Result<Self> {
        Self::new(sample_rate, sample_rate)
    }

    pub fn validate(&self) -> Result<()> {
        for rate in [self.sample_rate_inp, self.sample_rate_out, self.sample_rate] {
            checked_rate(rate as i64)?;
        }
        Ok(())
    }

    /// Samples per tone frame at the operating rate
    pub fn frame_samples(&self) -> usize {
        let scaled = (BASE_FRAME_SAMPLES as u64 * self.sample_rate as u64
            + BASE_SAMPLE_RATE as u64 / 2)
            / BASE_SAMPLE_RATE as u64;
        scaled.max(1) as usize
    }

    /// Spacing of the tone grid in Hz
    pub fn hz_per_bin(&self) -> f32 {
        self.sample_rate as f32 / self.frame_samples() as f32
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            sample_rate_inp: DEFAULT_SAMPLE_RATE,
            sample_rate_out: DEFAULT_SAMPLE_RATE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

fn checked_rate(rate: i64) -> Result<u32> {
    if rate < SAMPLE_RATE_MIN as i64 || rate > SAMPLE_RATE_MAX as i64 {
        return Err(ModemError::InvalidSampleRate(rate));
    }
    Ok(rate as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_grid() {
        let params = Parameters::default();
        assert_eq!(params.frame_samples(), 1024);
        assert!((params.hz_per_bin() - 46.875).abs() < 1e-4);
    }

    #[test]
    fn test_output_rate_drives_operating_rate() {
        let params = Parameters::new(44100, 16000).unwrap();
        assert_eq!(params.sample_rate_inp, 44100);
        assert_eq!(params.sample_rate, 16000);
        assert_eq!(params.frame_samples(), 341);
    }

    #[test]
    fn test_rates_out_of_range_rejected() {
        assert_eq!(
            Parameters::uniform(0),
            Err(ModemError::InvalidSampleRate(0))
        );
        assert!(Parameters::uniform(-48000).is_err());
        assert!(Parameters::new(48000, 192_000).is_err());
        assert!(Parameters::uniform(SAMPLE_RATE_MIN as i64).is_ok());
        assert!(Parameters::uniform(SAMPLE_RATE_MAX as i64).is_ok());
    }
}
