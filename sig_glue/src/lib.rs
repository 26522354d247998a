//! Two-segment signal gluing.
//!
//! Given two independently sampled segments of one signal, produce a single
//! ordered signal spanning both: overlapping regions are averaged, gaps are
//! bridged with a straight line or with a harmonic reconstruction.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

pub mod gap;
pub mod harmonic;
pub mod overlap;
pub mod relation;
pub mod segment;
pub mod stats;

pub use gap::interpolate_gap;
pub use harmonic::{decompose, synthesize_gap, Envelope, HarmonicBridge, Spectrum};
pub use overlap::{resolve_overlap, OverlapResolution};
pub use relation::{classify, Classification, InputOrder, Relation};
pub use segment::{parse_segment, Sample, Segment};
pub use stats::{stats, summarize, SignalStatistics, ValueStats};

#[derive(Error, Debug)]
pub enum GlueError {
    #[error("empty segment: {0}")]
    EmptySegment(String),
    #[error("insufficient data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("degenerate window: {0}")]
    DegenerateWindow(String),
    #[error("invalid segment: {0}")]
    InvalidSegment(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse segment: {0}")]
    Parse(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Non-fatal conditions met while gluing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GlueWarning {
    /// A flat side contributed nothing to a harmonic bridge.
    ZeroVariance { side: Side },
}

/// How a gap is bridged. Overlaps are always averaged.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GlueStrategy {
    Average,
    LinearGap,
    HarmonicGap,
}

impl Default for GlueStrategy {
    fn default() -> Self {
        GlueStrategy::Average
    }
}

/// Pairing of the two sides' samples inside an overlap window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Interpolate the other side at each bridge timestamp.
    Resample,
    /// Pair by rank and stop at the shorter selection.
    Truncate,
    /// Pair by rank; unequal selections are an error.
    Strict,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        OverlapPolicy::Resample
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlueParams {
    pub strategy: GlueStrategy,
    pub overlap_policy: OverlapPolicy,
    pub linear_points: usize,
    pub harmonic_points: usize,
    pub max_harmonics: usize,
}

impl Default for GlueParams {
    fn default() -> Self {
        Self {
            strategy: GlueStrategy::Average,
            overlap_policy: OverlapPolicy::Resample,
            linear_points: gap::DEFAULT_LINEAR_POINTS,
            harmonic_points: harmonic::DEFAULT_HARMONIC_POINTS,
            max_harmonics: harmonic::DEFAULT_MAX_HARMONICS,
        }
    }
}

impl GlueParams {
    pub fn validate(&self) -> Result<(), GlueError> {
        if self.linear_points < 2 {
            return Err(GlueError::InvalidParameter(format!(
                "linear_points must be >= 2, got {}",
                self.linear_points
            )));
        }
        if self.harmonic_points == 0 {
            return Err(GlueError::InvalidParameter(
                "harmonic_points must be >= 1".into(),
            ));
        }
        Ok(())
    }

    pub fn params_hash_sha256(&self) -> Result<String, GlueError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| GlueError::InvalidParameter(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeKind {
    Averaged,
    Linear,
    Harmonic,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Left,
    Bridge,
    Right,
}

impl Part {
    pub fn as_str(&self) -> &'static str {
        match self {
            Part::Left => "left",
            Part::Bridge => "bridge",
            Part::Right => "right",
        }
    }
}

/// Index ranges of the three regions of a glued signal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalLayout {
    pub left: Range<usize>,
    pub bridge: Range<usize>,
    pub right: Range<usize>,
}

impl SignalLayout {
    pub fn part_of(&self, index: usize) -> Part {
        if index < self.bridge.start {
            Part::Left
        } else if index < self.bridge.end {
            Part::Bridge
        } else {
            Part::Right
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GluedSignal {
    pub samples: Vec<Sample>,
}

impl GluedSignal {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.t - first.t,
            _ => 0.0,
        }
    }

    pub fn is_time_ordered(&self) -> bool {
        self.samples.windows(2).all(|w| w[0].t <= w[1].t)
    }

    /// SHA-256 over the exact bit patterns of every sample.
    pub fn fingerprint(&self) -> String {
        let mut bytes = Vec::with_capacity(self.samples.len() * 16);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.t.to_le_bytes());
            bytes.extend_from_slice(&sample.value.to_le_bytes());
        }
        sha256_hex(&bytes)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlueResult {
    pub signal: GluedSignal,
    pub classification: Classification,
    pub bridge: BridgeKind,
    pub layout: SignalLayout,
    pub duration: f64,
    pub warnings: Vec<GlueWarning>,
}

impl GlueResult {
    pub fn values(&self) -> Vec<f64> {
        self.signal.values()
    }

    pub fn statistics(&self) -> Result<SignalStatistics, GlueError> {
        summarize(&self.signal.samples)
    }
}

/// Glue two segments into one ordered signal.
///
/// The segments may be passed in any order. Overlapping segments are averaged
/// over the shared window; separated segments are bridged according to
/// `params.strategy`. Nothing is returned on failure.
pub fn glue(a: &Segment, b: &Segment, params: &GlueParams) -> Result<GlueResult, GlueError> {
    params.validate()?;
    let classification = classify(a, b);
    let (left, right) = classification.arrange(a, b);
    debug!(
        relation = ?classification.relation,
        order = ?classification.order,
        strategy = ?params.strategy,
        "classified segments"
    );

    let mut warnings = Vec::new();
    let (prefix, bridge, suffix, kind): (&[Sample], Vec<Sample>, &[Sample], BridgeKind) =
        match classification.relation {
            Relation::Overlap => {
                let resolved = resolve_overlap(left, right, params.overlap_policy)?;
                let head = left.samples();
                let prefix = &head[..head.partition_point(|s| s.t < resolved.overlap_start)];
                // The tail comes from whichever segment runs longer, which is the
                // left one when it fully contains the right.
                let later = if right.end() >= left.end() { right } else { left };
                let tail = later.samples();
                let suffix = &tail[tail.partition_point(|s| s.t <= resolved.overlap_end)..];
                (prefix, resolved.bridge, suffix, BridgeKind::Averaged)
            }
            Relation::Gap => match params.strategy {
                GlueStrategy::Average | GlueStrategy::LinearGap => {
                    let mut line = interpolate_gap(left, right, params.linear_points)?;
                    // Both end points repeat samples the segments already carry.
                    line.pop();
                    line.remove(0);
                    (left.samples(), line, right.samples(), BridgeKind::Linear)
                }
                GlueStrategy::HarmonicGap => {
                    let harmonic = synthesize_gap(
                        left,
                        right,
                        left.end(),
                        right.start(),
                        params.harmonic_points,
                        params.max_harmonics,
                    )?;
                    warnings.extend(harmonic.warnings);
                    (
                        left.samples(),
                        harmonic.samples,
                        right.samples(),
                        BridgeKind::Harmonic,
                    )
                }
            },
        };

    let bridge_start = prefix.len();
    let bridge_end = bridge_start + bridge.len();
    let layout = SignalLayout {
        left: 0..bridge_start,
        bridge: bridge_start..bridge_end,
        right: bridge_end..bridge_end + suffix.len(),
    };

    let mut samples = Vec::with_capacity(layout.right.end);
    samples.extend_from_slice(prefix);
    samples.extend(bridge);
    samples.extend_from_slice(suffix);
    let signal = GluedSignal { samples };
    let duration = signal.duration();

    debug!(
        samples = signal.len(),
        bridge = ?kind,
        bridge_len = layout.bridge.len(),
        duration,
        "glued signal assembled"
    );

    Ok(GlueResult {
        signal,
        classification,
        bridge: kind,
        layout,
        duration,
        warnings,
    })
}

/// [`glue`] followed by statistics over the glued values.
pub fn glue_with_statistics(
    a: &Segment,
    b: &Segment,
    params: &GlueParams,
) -> Result<(GlueResult, SignalStatistics), GlueError> {
    let result = glue(a, b, params)?;
    let statistics = result.statistics()?;
    Ok((result, statistics))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
