use crate::config::Parameters;
use crate::error::{ModemError, Result};
use crate::protocol::Family;
use crate::{FSK_BINS_PER_BAND, FSK_BYTES_PER_SYMBOL, FSK_NIBBLES_PER_SYMBOL};
use std::f32::consts::PI;

// Multi-tone FSK on an integer tone grid
//
// Every tone bin `b` sits at `b * sample_rate / frame_samples` Hz, so it
// completes a whole number of cycles per frame and all bins are orthogonal
// over any window that spans whole frames.
//
// Data encoding:
// - 3 bytes (6 nibbles) per symbol
// - Each nibble selects one of 16 bins in its own band
// - All 6 tones are transmitted simultaneously
// - A symbol lasts `frames_per_symbol` frames (protocol dependent)

/// Apply a smooth envelope to reduce spectral splatter near symbol edges.
const FSK_EDGE_TAPER_RATIO: f32 = 0.08; // 8% of the symbol on each side

/// Ensure we always have a minimum attack/decay regardless of speed.
const FSK_MIN_TAPER_SAMPLES: usize = 16;

/// Frames whose energy is below this (per sample) count as silence.
const SILENCE_ENERGY_PER_SAMPLE: f64 = 1e-10;

/// Nibble each band plays in marker frame `frame`.
///
/// Even frames play 0,F,0,F,0,F and odd frames the complement. Data symbols
/// hold their tones for at least three frames, so they never alternate like
/// this.
pub fn marker_nibble(frame: usize, band: usize) -> u8 {
    if (frame + band) % 2 == 0 {
        0x0
    } else {
        0xF
    }
}

fn split_nibbles(bytes: &[u8]) -> [u8; FSK_NIBBLES_PER_SYMBOL] {
    [
        (bytes[0] >> 4) & 0x0F,
        bytes[0] & 0x0F,
        (bytes[1] >> 4) & 0x0F,
        bytes[1] & 0x0F,
        (bytes[2] >> 4) & 0x0F,
        bytes[2] & 0x0F,
    ]
}

fn join_nibbles(nibbles: &[u8; FSK_NIBBLES_PER_SYMBOL]) -> [u8; FSK_BYTES_PER_SYMBOL] {
    [
        (nibbles[0] << 4) | nibbles[1],
        (nibbles[2] << 4) | nibbles[3],
        (nibbles[4] << 4) | nibbles[5],
    ]
}

fn tone_bin(family: Family, band: usize, nibble: u8) -> usize {
    family.first_bin() + band * FSK_BINS_PER_BAND + nibble as usize
}

/// Generate a raised-cosine style window that softly ramps amplitude at both edges.
fn raised_cosine_window(len: usize, taper_len: usize) -> Vec<f32> {
    if taper_len == 0 || len == 0 {
        return vec![1.0; len];
    }

    let taper = taper_len.min(len / 2);
    if taper == 0 {
        return vec![1.0; len];
    }

    let mut window = vec![1.0; len];
    for i in 0..taper {
        // Smoothly increase from 0 to 1 using a sine-squared profile
        let progress = i as f32 / taper as f32;
        let value = (PI * progress / 2.0).sin().powi(2);
        window[i] = value;
        window[len - 1 - i] = value;
    }

    window
}

/// Power of DFT bin `k` over the whole of `samples` (Goertzel)
pub fn goertzel_power(samples: &[f32], k: usize) -> f64 {
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }
    let omega = 2.0 * std::f64::consts::PI * k as f64 / n as f64;
    let coeff = 2.0 * omega.cos();

    let mut q1 = 0.0f64;
    let mut q2 = 0.0f64;
    for &sample in samples {
        let q0 = coeff * q1 - q2 + sample as f64;
        q2 = q1;
        q1 = q0;
    }

    let real = q1 - q2 * omega.cos();
    let imag = q2 * omega.sin();
    real * real + imag * imag
}

/// FSK modulator - renders marker frames and multi-tone data symbols
pub struct FskModulator {
    frame_samples: usize,
}

impl FskModulator {
    pub fn new(params: &Parameters) -> Self {
        Self {
            frame_samples: params.frame_samples(),
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Superimpose one tone per band for `frames` frames
    fn render_tones(&self, bins: &[usize; FSK_NIBBLES_PER_SYMBOL], frames: usize, amplitude: f32) -> Vec<f32> {
        let len = frames * self.frame_samples;
        let mut samples = vec![0.0f32; len];
        let per_tone = amplitude / FSK_NIBBLES_PER_SYMBOL as f32;

        for &bin in bins {
            for (i, sample) in samples.iter_mut().enumerate() {
                // Integer phase keeps long symbols exact
                let cycle = (bin * i) % self.frame_samples;
                let phase = 2.0 * PI * cycle as f32 / self.frame_samples as f32;
                *sample += per_tone * phase.sin();
            }
        }

        samples
    }

    /// Modulate 3 bytes into one multi-tone symbol spanning `frames` frames
    ///
    /// Nibble `n` (high nibble of byte 0 first) picks bin `n * 16 + value`
    /// inside the family's band.
    pub fn modulate_symbol(&self, bytes: &[u8], family: Family, frames: usize, amplitude: f32) -> Result<Vec<f32>> {
        if bytes.len() != FSK_BYTES_PER_SYMBOL || frames == 0 {
            return Err(ModemError::InvalidInputSize);
        }

        let nibbles = split_nibbles(bytes);
        let mut bins = [0usize; FSK_NIBBLES_PER_SYMBOL];
        for (band, &nibble) in nibbles.iter().enumerate() {
            bins[band] = tone_bin(family, band, nibble);
        }

        let mut samples = self.render_tones(&bins, frames, amplitude);
        self.apply_edge_taper(&mut samples);
        Ok(samples)
    }

    /// Modulate a sequence of bytes
    /// Input length must be a multiple of FSK_BYTES_PER_SYMBOL (3)
    pub fn modulate(&self, bytes: &[u8], family: Family, frames: usize, amplitude: f32) -> Result<Vec<f32>> {
        if bytes.len() % FSK_BYTES_PER_SYMBOL != 0 {
            return Err(ModemError::InvalidInputSize);
        }

        let mut samples = Vec::with_capacity(bytes.len() / FSK_BYTES_PER_SYMBOL * frames * self.frame_samples);
        for chunk in bytes.chunks(FSK_BYTES_PER_SYMBOL) {
            let symbol_samples = self.modulate_symbol(chunk, family, frames, amplitude)?;
            samples.extend_from_slice(&symbol_samples);
        }

        Ok(samples)
    }

    /// Start marker: `marker_frames` frames of alternating tone patterns
    pub fn marker(&self, family: Family, marker_frames: usize, amplitude: f32) -> Vec<f32> {
        let mut samples = Vec::with_capacity(marker_frames * self.frame_samples);
        for frame in 0..marker_frames {
            let mut bins = [0usize; FSK_NIBBLES_PER_SYMBOL];
            for (band, bin) in bins.iter_mut().enumerate() {
                *bin = tone_bin(family, band, marker_nibble(frame, band));
            }
            samples.extend_from_slice(&self.render_tones(&bins, 1, amplitude));
        }
        samples
    }

    fn taper_length(&self, symbol_samples: usize) -> usize {
        let taper = ((symbol_samples as f32) * FSK_EDGE_TAPER_RATIO).round() as usize;
        taper.max(FSK_MIN_TAPER_SAMPLES).min(symbol_samples / 2)
    }

    fn apply_edge_taper(&self, samples: &mut [f32]) {
        let taper_len = self.taper_length(samples.len());
        if taper_len == 0 {
            return;
        }

        let window = raised_cosine_window(samples.len(), taper_len);
        for (sample, &weight) in samples.iter_mut().zip(window.iter()) {
            *sample *= weight;
        }
    }
}

/// FSK demodulator - picks the strongest bin of each band
pub struct FskDemodulator {
    frame_samples: usize,
}

impl FskDemodulator {
    pub fn new(params: &Parameters) -> Self {
        Self {
            frame_samples: params.frame_samples(),
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Demodulate a single multi-tone symbol
    ///
    /// `samples` must span whole frames; bin `b` is DFT bin `b * frames` of
    /// the window.
    pub fn demodulate_symbol(&self, samples: &[f32], family: Family) -> Result<[u8; FSK_BYTES_PER_SYMBOL]> {
        if samples.is_empty() || samples.len() % self.frame_samples != 0 {
            return Err(ModemError::InvalidInputSize);
        }
        let frames = samples.len() / self.frame_samples;

        let mut nibbles = [0u8; FSK_NIBBLES_PER_SYMBOL];
        for (band, nibble) in nibbles.iter_mut().enumerate() {
            let mut best_value = 0u8;
            let mut best_power = f64::MIN;

            for value in 0..FSK_BINS_PER_BAND as u8 {
                let bin = tone_bin(family, band, value);
                let power = goertzel_power(samples, bin * frames);
                if power > best_power {
                    best_power = power;
                    best_value = value;
                }
            }

            *nibble = best_value;
        }

        Ok(join_nibbles(&nibbles))
    }

    /// Demodulate consecutive symbols of `frames` frames each
    pub fn demodulate(&self, samples: &[f32], family: Family, frames: usize) -> Result<Vec<u8>> {
        let symbol_samples = frames * self.frame_samples;
        if symbol_samples == 0 || samples.len() % symbol_samples != 0 {
            return Err(ModemError::InvalidInputSize);
        }

        let mut bytes = Vec::with_capacity(samples.len() / symbol_samples * FSK_BYTES_PER_SYMBOL);
        for chunk in samples.chunks(symbol_samples) {
            bytes.extend_from_slice(&self.demodulate_symbol(chunk, family)?);
        }
        Ok(bytes)
    }

    /// Share of a frame's energy carried by the marker tones expected in
    /// marker frame `frame_index`. Returns 0 for silent frames.
    pub fn marker_fraction(&self, frame: &[f32], family: Family, frame_index: usize) -> f32 {
        if frame.len() != self.frame_samples {
            return 0.0;
        }

        let total: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        if total < SILENCE_ENERGY_PER_SAMPLE * frame.len() as f64 {
            return 0.0;
        }

        // 2|X|^2 / N equals the time-domain energy of a pure tone on bin k
        let scale = 2.0 / frame.len() as f64;
        let tone_energy: f64 = (0..FSK_NIBBLES_PER_SYMBOL)
            .map(|band| {
                let bin = tone_bin(family, band, marker_nibble(frame_index, band));
                goertzel_power(frame, bin) * scale
            })
            .sum();

        (tone_energy / total).min(1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Parameters {
        Parameters::default()
    }

    #[test]
    fn test_symbol_round_trip_every_nibble() {
        let modulator = FskModulator::new(&params());
        let demodulator = FskDemodulator::new(&params());

        for value in 0..=255u8 {
            let bytes = [value, value.wrapping_mul(7), !value];
            let samples = modulator
                .modulate_symbol(&bytes, Family::Audible, 3, 0.5)
                .unwrap();
            assert_eq!(samples.len(), 3 * 1024);
            let decoded = demodulator.demodulate_symbol(&samples, Family::Audible).unwrap();
            assert_eq!(decoded, bytes, "byte value {}", value);
        }
    }

    #[test]
    fn test_ultrasound_symbol_round_trip() {
        let modulator = FskModulator::new(&params());
        let demodulator = FskDemodulator::new(&params());
        let bytes = b"abcdef";

        let samples = modulator.modulate(bytes, Family::Ultrasound, 6, 0.8).unwrap();
        let decoded = demodulator.demodulate(&samples, Family::Ultrasound, 6).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn test_amplitude_bounded_by_volume() {
        let modulator = FskModulator::new(&params());
        let samples = modulator
            .modulate(&[0xFF, 0x00, 0x5A], Family::Audible, 9, 1.0)
            .unwrap();
        assert!(samples.iter().all(|s| s.abs() <= 1.0 + 1e-5));
    }

    #[test]
    fn test_modulate_rejects_partial_symbol() {
        let modulator = FskModulator::new(&params());
        assert_eq!(
            modulator.modulate(&[1, 2], Family::Audible, 3, 0.5),
            Err(ModemError::InvalidInputSize)
        );
    }

    #[test]
    fn test_marker_fraction_high_on_marker_low_elsewhere() {
        let modulator = FskModulator::new(&params());
        let demodulator = FskDemodulator::new(&params());
        let marker = modulator.marker(Family::Audible, 4, 0.5);

        for frame in 0..4 {
            let window = &marker[frame * 1024..(frame + 1) * 1024];
            assert!(demodulator.marker_fraction(window, Family::Audible, frame) > 0.95);
            // Wrong phase of the alternation
            assert!(demodulator.marker_fraction(window, Family::Audible, frame + 1) < 0.05);
            // Wrong family
            assert!(demodulator.marker_fraction(window, Family::Ultrasound, frame) < 0.05);
        }

        let silence = vec![0.0f32; 1024];
        assert_eq!(demodulator.marker_fraction(&silence, Family::Audible, 0), 0.0);
    }
}
