use crate::fsk::FskDemodulator;
use crate::protocol::Family;
use crate::MARKER_FRAMES;

/// Minimum share of a frame's energy the expected marker tones must carry
const MARKER_THRESHOLD: f32 = 0.5;

/// Coarse search hop as a fraction of a frame
const COARSE_STEPS_PER_FRAME: usize = 8;

/// Fine search hops per coarse hop
const FINE_STEPS_PER_COARSE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerMatch {
    /// Sample offset of the first marker frame
    pub offset: usize,
    pub family: Family,
    /// Mean marker energy fraction over all marker frames
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerSearch {
    Found(MarkerMatch),
    /// No marker starts before `resume_at`; everything earlier can be dropped
    NotFound { resume_at: usize },
}

/// Samples covered by a start marker
pub fn marker_len(demodulator: &FskDemodulator) -> usize {
    MARKER_FRAMES * demodulator.frame_samples()
}

/// Mean marker fraction at `offset`, or `None` when any frame falls below
/// the threshold or the marker would run past the buffer.
pub fn marker_score(demodulator: &FskDemodulator, samples: &[f32], offset: usize, family: Family) -> Option<f32> {
    let frame_len = demodulator.frame_samples();
    if offset + marker_len(demodulator) > samples.len() {
        return None;
    }

    let mut sum = 0.0f32;
    for frame in 0..MARKER_FRAMES {
        let start = offset + frame * frame_len;
        let fraction = demodulator.marker_fraction(&samples[start..start + frame_len], family, frame);
        if fraction < MARKER_THRESHOLD {
            return None;
        }
        sum += fraction;
    }
    Some(sum / MARKER_FRAMES as f32)
}

/// Locate the first start marker in `samples`
///
/// Scans with a hop of 1/8 frame until some offset passes, then sweeps the
/// next half frame for the best-scoring offset and refines around it with a
/// hop of 1/64 frame. When the marker may extend past the end of the buffer
/// the search stops and reports where to resume once more samples arrive.
pub fn find_marker(demodulator: &FskDemodulator, samples: &[f32]) -> MarkerSearch {
    let frame_len = demodulator.frame_samples();
    let marker = marker_len(demodulator);
    let coarse = (frame_len / COARSE_STEPS_PER_FRAME).max(1);
    let fine = (coarse / FINE_STEPS_PER_COARSE).max(1);

    let mut offset = 0;
    while offset + marker <= samples.len() {
        for family in Family::ALL {
            let Some(first_score) = marker_score(demodulator, samples, offset, family) else {
                continue;
            };

            let sweep_end = offset + frame_len / 2;
            if sweep_end + coarse + marker > samples.len() {
                return MarkerSearch::NotFound { resume_at: offset };
            }

            let mut best = (offset, first_score);
            let mut candidate = offset + coarse;
            while candidate <= sweep_end {
                if let Some(score) = marker_score(demodulator, samples, candidate, family) {
                    if score > best.1 {
                        best = (candidate, score);
                    }
                }
                candidate += coarse;
            }

            let mut candidate = best.0.saturating_sub(coarse);
            let refine_end = best.0 + coarse;
            while candidate <= refine_end {
                if let Some(score) = marker_score(demodulator, samples, candidate, family) {
                    if score > best.1 {
                        best = (candidate, score);
                    }
                }
                candidate += fine;
            }

            return MarkerSearch::Found(MarkerMatch {
                offset: best.0,
                family,
                score: best.1,
            });
        }
        offset += coarse;
    }

    MarkerSearch::NotFound { resume_at: offset }
}
