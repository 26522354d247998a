//! Harmonic gap synthesis.
//!
//! Each side of the gap is decomposed into sinusoids with an FFT. The bridge
//! is the superposition of both sides' components, the left phased from the
//! start of the gap and the right from its end, then clipped and rescaled into
//! the amplitude band the two sides share.

use std::cmp::Reverse;
use std::f64::consts::PI;

use ndarray::{s, Array1};
use ordered_float::OrderedFloat;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{GlueError, GlueWarning, Sample, Segment, Side};

pub const DEFAULT_HARMONIC_POINTS: usize = 100;
pub const DEFAULT_MAX_HARMONICS: usize = 32;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Harmonic {
    pub frequency: f64,
    pub magnitude: f64,
    pub phase: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Spectrum {
    /// Retained components, ordered by frequency.
    pub harmonics: Vec<Harmonic>,
    pub max_magnitude: f64,
}

/// Amplitude band `[min, max]` averaged over both sides' observed ranges.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub min: f64,
    pub max: f64,
}

impl Envelope {
    pub fn from_segments(left: &Segment, right: &Segment) -> Self {
        let (left_min, left_max) = left.value_range();
        let (right_min, right_max) = right.value_range();
        Self {
            min: (left_min + right_min) / 2.0,
            max: (left_max + right_max) / 2.0,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HarmonicBridge {
    pub samples: Vec<Sample>,
    pub envelope: Envelope,
    pub warnings: Vec<GlueWarning>,
}

/// Positive-frequency spectrum of a segment's mean-removed values.
///
/// Returns `None` for a side that carries no oscillation: fewer than two
/// samples, or zero variance. At most `max_harmonics` components are kept,
/// strongest first; `0` keeps them all.
pub fn decompose(segment: &Segment, max_harmonics: usize) -> Option<Spectrum> {
    let n = segment.len();
    if n < 2 || segment.span() <= 0.0 {
        return None;
    }
    let values: Vec<f64> = segment.values().collect();
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || variance.sqrt() <= scale * 1e-12 {
        return None;
    }

    // Irregular spacing is treated as uniform at the mean interval.
    let sample_rate = (n - 1) as f64 / segment.span();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex<f64>> = values
        .iter()
        .map(|&v| Complex::new(v - mean, 0.0))
        .collect();
    fft.process(&mut buffer);

    let mut harmonics: Vec<Harmonic> = (1..=n / 2)
        .map(|k| Harmonic {
            frequency: k as f64 * sample_rate / n as f64,
            magnitude: buffer[k].norm(),
            phase: buffer[k].arg(),
        })
        .collect();
    let max_magnitude = harmonics
        .iter()
        .map(|h| OrderedFloat(h.magnitude))
        .max()?
        .into_inner();
    if !(max_magnitude > 0.0) {
        return None;
    }

    if max_harmonics > 0 && harmonics.len() > max_harmonics {
        harmonics.sort_by_key(|h| Reverse(OrderedFloat(h.magnitude)));
        harmonics.truncate(max_harmonics);
        harmonics.sort_by_key(|h| OrderedFloat(h.frequency));
    }

    Some(Spectrum {
        harmonics,
        max_magnitude,
    })
}

/// Synthesize `num_points` samples strictly inside `(gap_start, gap_end)`.
///
/// Boundary samples belong to the segments themselves and are not repeated in
/// the bridge. Every returned value lies within the averaged envelope.
pub fn synthesize_gap(
    left: &Segment,
    right: &Segment,
    gap_start: f64,
    gap_end: f64,
    num_points: usize,
    max_harmonics: usize,
) -> Result<HarmonicBridge, GlueError> {
    if !(gap_end > gap_start) {
        return Err(GlueError::DegenerateWindow(format!(
            "gap [{gap_start}, {gap_end}] has no positive duration"
        )));
    }
    if num_points == 0 {
        return Err(GlueError::InvalidParameter(
            "harmonic bridge needs at least 1 point".into(),
        ));
    }

    let envelope = Envelope::from_segments(left, right);
    let times = Array1::linspace(gap_start, gap_end, num_points + 2)
        .slice(s![1..num_points + 1])
        .to_owned();
    let mut predicted = Array1::<f64>::zeros(num_points);
    let mut warnings = Vec::new();

    for (side, segment, anchor) in [(Side::Left, left, gap_start), (Side::Right, right, gap_end)] {
        match decompose(segment, max_harmonics) {
            Some(spectrum) => accumulate(&mut predicted, &times, &spectrum, anchor, envelope.max),
            None => {
                warn!(?side, "segment has no variance; skipping its harmonic contribution");
                warnings.push(GlueWarning::ZeroVariance { side });
            }
        }
    }

    let values = fit_to_envelope(predicted, &envelope);
    let samples = times
        .iter()
        .zip(values.iter())
        .map(|(&t, &value)| Sample::new(t, value))
        .collect();

    Ok(HarmonicBridge {
        samples,
        envelope,
        warnings,
    })
}

fn accumulate(
    predicted: &mut Array1<f64>,
    times: &Array1<f64>,
    spectrum: &Spectrum,
    anchor: f64,
    amplitude: f64,
) {
    for harmonic in &spectrum.harmonics {
        let weight = harmonic.magnitude / spectrum.max_magnitude * amplitude;
        let omega = 2.0 * PI * harmonic.frequency;
        predicted.zip_mut_with(times, |p, &t| {
            *p += weight * (omega * (t - anchor) + harmonic.phase).sin();
        });
    }
}

/// Clip into the envelope, then stretch the clipped values so their own
/// min/max land on the envelope bounds.
fn fit_to_envelope(raw: Array1<f64>, envelope: &Envelope) -> Array1<f64> {
    let clipped = raw.mapv(|v| envelope.clamp(v));
    let lo = clipped.fold(f64::INFINITY, |acc, &v| acc.min(v));
    let hi = clipped.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let spread = hi - lo;
    if !(spread > f64::EPSILON * envelope.width().abs().max(1.0)) {
        return clipped;
    }
    let band = envelope.width();
    clipped.mapv(|v| envelope.clamp(envelope.min + (v - lo) * band / spread))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(start: f64, count: usize, dt: f64, freq: f64, amp: f64, offset: f64) -> Segment {
        Segment::new(
            (0..count)
                .map(|i| {
                    let t = start + i as f64 * dt;
                    Sample::new(t, offset + amp * (2.0 * PI * freq * t).sin())
                })
                .collect(),
        )
        .unwrap()
    }

    fn flat(start: f64, count: usize, value: f64) -> Segment {
        Segment::new(
            (0..count)
                .map(|i| Sample::new(start + i as f64 * 0.1, value))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn decompose_finds_dominant_frequency() {
        let seg = sine(0.0, 100, 0.01, 5.0, 1.0, 0.0);
        let spectrum = decompose(&seg, 0).unwrap();
        let peak = spectrum
            .harmonics
            .iter()
            .max_by_key(|h| OrderedFloat(h.magnitude))
            .unwrap();
        assert!((peak.frequency - 5.0).abs() < 0.2, "peak at {}", peak.frequency);
        assert_eq!(peak.magnitude, spectrum.max_magnitude);
    }

    #[test]
    fn decompose_keeps_at_most_requested_components() {
        let seg = sine(0.0, 64, 0.01, 3.0, 2.0, 1.0);
        let spectrum = decompose(&seg, 4).unwrap();
        assert_eq!(spectrum.harmonics.len(), 4);
        assert!(spectrum
            .harmonics
            .windows(2)
            .all(|w| w[0].frequency < w[1].frequency));
        assert!(decompose(&flat(0.0, 10, 3.0), 4).is_none());
    }

    #[test]
    fn bridge_stays_inside_envelope() {
        let left = sine(0.0, 80, 0.01, 4.0, 2.0, 1.0);
        let right = sine(1.5, 60, 0.01, 6.0, 1.0, -0.5);
        let bridge = synthesize_gap(&left, &right, left.end(), right.start(), 100, 16).unwrap();
        assert_eq!(bridge.samples.len(), 100);
        assert!(bridge.warnings.is_empty());
        let env = bridge.envelope;
        for s in &bridge.samples {
            assert!(s.value >= env.min - 1e-9 && s.value <= env.max + 1e-9);
            assert!(s.t > left.end() && s.t < right.start());
        }
        let lo = bridge.samples.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
        let hi = bridge.samples.iter().map(|s| s.value).fold(f64::NEG_INFINITY, f64::max);
        assert!((lo - env.min).abs() < 1e-9);
        assert!((hi - env.max).abs() < 1e-9);
    }

    #[test]
    fn flat_sides_give_constant_bridge() {
        let left = flat(0.0, 20, 2.5);
        let right = flat(5.0, 20, 2.5);
        let bridge = synthesize_gap(&left, &right, left.end(), right.start(), 10, 0).unwrap();
        assert!(bridge.samples.iter().all(|s| s.value == 2.5));
        assert_eq!(
            bridge.warnings,
            vec![
                GlueWarning::ZeroVariance { side: Side::Left },
                GlueWarning::ZeroVariance { side: Side::Right },
            ]
        );
    }

    #[test]
    fn one_flat_side_still_uses_the_other() {
        let left = sine(0.0, 50, 0.02, 2.0, 1.0, 0.0);
        let right = flat(2.0, 10, 0.0);
        let bridge = synthesize_gap(&left, &right, left.end(), right.start(), 25, 8).unwrap();
        assert_eq!(
            bridge.warnings,
            vec![GlueWarning::ZeroVariance { side: Side::Right }]
        );
        assert!(bridge.samples.iter().all(|s| s.value.is_finite()));
    }

    #[test]
    fn rejects_inverted_gap() {
        let left = flat(0.0, 5, 1.0);
        let right = flat(1.0, 5, 1.0);
        assert!(matches!(
            synthesize_gap(&left, &right, 2.0, 1.0, 10, 0),
            Err(GlueError::DegenerateWindow(_))
        ));
    }
}
