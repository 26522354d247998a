use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::GlueError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub t: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(t: f64, value: f64) -> Self {
        Self { t, value }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((t, value): (f64, f64)) -> Self {
        Self { t, value }
    }
}

/// One acquisition: a non-empty run of samples with strictly increasing, finite times.
///
/// The only way to obtain a `Segment` is through a validating constructor, so every
/// accessor below can rely on there being at least one sample.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<Sample>", into = "Vec<Sample>")]
pub struct Segment {
    samples: Vec<Sample>,
}

impl Segment {
    pub fn new(samples: Vec<Sample>) -> Result<Self, GlueError> {
        if samples.is_empty() {
            return Err(GlueError::EmptySegment("segment has no samples".into()));
        }
        for (idx, sample) in samples.iter().enumerate() {
            if !sample.t.is_finite() || !sample.value.is_finite() {
                return Err(GlueError::InvalidSegment(format!(
                    "sample {idx} is not finite (t={}, value={})",
                    sample.t, sample.value
                )));
            }
        }
        if let Some(idx) = samples.windows(2).position(|w| w[1].t <= w[0].t) {
            return Err(GlueError::InvalidSegment(format!(
                "times must be strictly increasing: t[{}]={} follows t[{}]={}",
                idx + 1,
                samples[idx + 1].t,
                idx,
                samples[idx].t
            )));
        }
        Ok(Self { samples })
    }

    /// Build a segment from parallel time/value channels.
    pub fn from_channels(times: &[f64], values: &[f64]) -> Result<Self, GlueError> {
        if times.len() != values.len() {
            return Err(GlueError::InvalidSegment(format!(
                "channel length mismatch: {} times, {} values",
                times.len(),
                values.len()
            )));
        }
        Self::new(
            times
                .iter()
                .zip(values.iter())
                .map(|(&t, &value)| Sample::new(t, value))
                .collect(),
        )
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Sample {
        self.samples[0]
    }

    pub fn last(&self) -> Sample {
        self.samples[self.samples.len() - 1]
    }

    pub fn start(&self) -> f64 {
        self.first().t
    }

    pub fn end(&self) -> f64 {
        self.last().t
    }

    pub fn span(&self) -> f64 {
        self.end() - self.start()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.t)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// Observed `(min, max)` of the value channel.
    pub fn value_range(&self) -> (f64, f64) {
        self.values()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// A copy of this segment with every timestamp moved by `offset`.
    pub fn shifted(&self, offset: f64) -> Result<Self, GlueError> {
        if !offset.is_finite() {
            return Err(GlueError::InvalidParameter(format!(
                "time shift must be finite, got {offset}"
            )));
        }
        Self::new(
            self.samples
                .iter()
                .map(|s| Sample::new(s.t + offset, s.value))
                .collect(),
        )
    }

    /// Samples whose time lies in `[min_t, max_t]`, as a new segment.
    ///
    /// The bounds may be given in either order, as a drag selection would produce them.
    pub fn select(&self, min_t: f64, max_t: f64) -> Result<Self, GlueError> {
        if !min_t.is_finite() || !max_t.is_finite() {
            return Err(GlueError::InvalidParameter(format!(
                "selection bounds must be finite, got [{min_t}, {max_t}]"
            )));
        }
        let (lo, hi) = if min_t <= max_t {
            (min_t, max_t)
        } else {
            (max_t, min_t)
        };
        let selected = window(&self.samples, lo, hi);
        if selected.is_empty() {
            return Err(GlueError::EmptySegment(format!(
                "selection [{lo}, {hi}] contains no samples"
            )));
        }
        Self::new(selected.to_vec())
    }

    /// Linear interpolation of the value channel at `t`, held flat outside the segment.
    pub fn value_at(&self, t: f64) -> f64 {
        let samples = &self.samples;
        if t <= samples[0].t {
            return samples[0].value;
        }
        let idx = samples.partition_point(|s| s.t < t);
        if idx >= samples.len() {
            return samples[samples.len() - 1].value;
        }
        let (s0, s1) = (samples[idx - 1], samples[idx]);
        let frac = if (s1.t - s0.t).abs() > f64::EPSILON {
            ((t - s0.t) / (s1.t - s0.t)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        s0.value + (s1.value - s0.value) * frac
    }
}

impl TryFrom<Vec<Sample>> for Segment {
    type Error = GlueError;

    fn try_from(samples: Vec<Sample>) -> Result<Self, Self::Error> {
        Segment::new(samples)
    }
}

impl From<Segment> for Vec<Sample> {
    fn from(segment: Segment) -> Self {
        segment.samples
    }
}

/// Samples with `lo <= t <= hi`; `samples` must be sorted by time.
pub(crate) fn window(samples: &[Sample], lo: f64, hi: f64) -> &[Sample] {
    let start = samples.partition_point(|s| s.t < lo);
    let end = samples.partition_point(|s| s.t <= hi).max(start);
    &samples[start..end]
}

/// Parse a two-column (time, value) table using the provided format hint (extension).
pub fn parse_segment(input: &[u8], format: &str) -> Result<Segment, GlueError> {
    let format_lc = format.to_ascii_lowercase();
    if format_lc.ends_with(".csv") || format_lc == "csv" || format_lc == "txt" {
        parse_delimited(input, b',')
    } else if format_lc.ends_with(".tsv") || format_lc == "tsv" {
        parse_delimited(input, b'\t')
    } else {
        Err(GlueError::UnsupportedFormat(format.to_string()))
    }
}

fn parse_delimited(input: &[u8], delimiter: u8) -> Result<Segment, GlueError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(input);

    let mut points: Vec<(f64, f64)> = Vec::new();
    let mut base: Option<DateTime<Utc>> = None;

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| GlueError::Parse(e.to_string()))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        if record.len() < 2 {
            return Err(GlueError::Parse(format!(
                "row {}: expected time and value columns",
                row + 1
            )));
        }
        let value = record[1].parse::<f64>().ok();
        let time = parse_time(&record[0], &mut base);
        match (time, value) {
            (Some(t), Some(v)) => points.push((t, v)),
            // A leading row that does not parse is the header.
            _ if points.is_empty() && row == 0 => continue,
            _ => {
                return Err(GlueError::Parse(format!(
                    "row {}: cannot read ({:?}, {:?}) as (time, value)",
                    row + 1,
                    &record[0],
                    &record[1]
                )))
            }
        }
    }

    if points.is_empty() {
        return Err(GlueError::EmptySegment("input contains no data rows".into()));
    }
    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    points.dedup_by(|a, b| a.0 == b.0);

    Segment::new(points.into_iter().map(Sample::from).collect())
}

fn parse_time(field: &str, base: &mut Option<DateTime<Utc>>) -> Option<f64> {
    if let Ok(seconds) = field.parse::<f64>() {
        return Some(seconds);
    }
    let utc = DateTime::parse_from_rfc3339(field).ok()?.with_timezone(&Utc);
    let origin = *base.get_or_insert(utc);
    let delta = utc - origin;
    let seconds = match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => match delta.num_microseconds() {
            Some(micros) => micros as f64 / 1e6,
            None => delta.num_milliseconds() as f64 / 1e3,
        },
    };
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(points: &[(f64, f64)]) -> Segment {
        Segment::new(points.iter().copied().map(Sample::from).collect()).unwrap()
    }

    #[test]
    fn rejects_empty_and_unordered_input() {
        assert!(matches!(
            Segment::new(Vec::new()),
            Err(GlueError::EmptySegment(_))
        ));
        let err = Segment::new(vec![Sample::new(1.0, 0.0), Sample::new(1.0, 2.0)]).unwrap_err();
        assert!(matches!(err, GlueError::InvalidSegment(_)));
        let err = Segment::new(vec![Sample::new(0.0, f64::NAN)]).unwrap_err();
        assert!(matches!(err, GlueError::InvalidSegment(_)));
    }

    #[test]
    fn shifted_moves_time_channel_only() {
        let original = seg(&[(0.0, 1.0), (1.0, 2.0)]);
        let shifted = original.shifted(2.5).unwrap();
        assert_eq!(shifted.start(), 2.5);
        assert_eq!(shifted.end(), 3.5);
        assert_eq!(shifted.values().collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert_eq!(original.start(), 0.0);
    }

    #[test]
    fn select_is_inclusive_and_order_agnostic() {
        let s = seg(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        let picked = s.select(2.0, 1.0).unwrap();
        assert_eq!(picked.times().collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert!(matches!(
            s.select(1.2, 1.8),
            Err(GlueError::EmptySegment(_))
        ));
    }

    #[test]
    fn value_at_interpolates_and_holds_edges() {
        let s = seg(&[(0.0, 0.0), (2.0, 4.0)]);
        assert_eq!(s.value_at(1.0), 2.0);
        assert_eq!(s.value_at(-1.0), 0.0);
        assert_eq!(s.value_at(5.0), 4.0);
        assert_eq!(s.value_at(2.0), 4.0);
    }

    #[test]
    fn parses_csv_with_header_and_unsorted_rows() {
        let input = b"time,voltage\n0.2,3.0\n0.0,1.0\n0.1,2.0\n0.1,9.0\n";
        let s = parse_segment(input, "signal.csv").unwrap();
        assert_eq!(s.times().collect::<Vec<_>>(), vec![0.0, 0.1, 0.2]);
        assert_eq!(s.values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn parses_rfc3339_times_relative_to_first_row() {
        let input = b"2024-01-01T00:00:00Z,1\n2024-01-01T00:00:01.5Z,2\n";
        let s = parse_segment(input, "csv").unwrap();
        assert_eq!(s.times().collect::<Vec<_>>(), vec![0.0, 1.5]);
    }

    #[test]
    fn rfc3339_keeps_sub_millisecond_spacing() {
        let input = b"2024-01-01T00:00:00.0000Z,1\n\
2024-01-01T00:00:00.0002Z,2\n\
2024-01-01T00:00:00.0004Z,3\n\
2024-01-01T00:00:00.0006Z,4\n";
        let s = parse_segment(input, "csv").unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(
            s.times().collect::<Vec<_>>(),
            vec![0.0, 0.0002, 0.0004, 0.0006]
        );
        assert_eq!(s.values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn parse_errors_are_reported() {
        assert!(matches!(
            parse_segment(b"0,1\n", "fit"),
            Err(GlueError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            parse_segment(b"t,v\n", "csv"),
            Err(GlueError::EmptySegment(_))
        ));
        assert!(matches!(
            parse_segment(b"0,1\n1,abc\n", "csv"),
            Err(GlueError::Parse(_))
        ));
    }
}
