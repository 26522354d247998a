use serde::{Deserialize, Serialize};

use crate::segment::window;
use crate::{GlueError, OverlapPolicy, Sample, Segment};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OverlapResolution {
    pub overlap_start: f64,
    pub overlap_end: f64,
    /// Averaged samples covering `[overlap_start, overlap_end]`.
    pub bridge: Vec<Sample>,
    pub left_selected: usize,
    pub right_selected: usize,
}

/// Reconcile the overlapping region of two segments into one averaged run.
///
/// Bridge times come from the left segment's samples inside the window (the
/// right segment's, when the left has none there). Values are the mean of the
/// two sides, paired according to `policy`.
pub fn resolve_overlap(
    left: &Segment,
    right: &Segment,
    policy: OverlapPolicy,
) -> Result<OverlapResolution, GlueError> {
    let overlap_start = left.start().max(right.start());
    let overlap_end = left.end().min(right.end());
    if overlap_end < overlap_start {
        return Err(GlueError::DegenerateWindow(format!(
            "overlap window [{overlap_start}, {overlap_end}] is inverted"
        )));
    }

    let left_sel = window(left.samples(), overlap_start, overlap_end);
    let right_sel = window(right.samples(), overlap_start, overlap_end);
    if left_sel.is_empty() && right_sel.is_empty() {
        return Err(GlueError::DegenerateWindow(format!(
            "overlap window [{overlap_start}, {overlap_end}] holds no samples"
        )));
    }

    let bridge = match policy {
        OverlapPolicy::Resample => {
            if left_sel.is_empty() {
                right_sel
                    .iter()
                    .map(|s| Sample::new(s.t, (left.value_at(s.t) + s.value) / 2.0))
                    .collect()
            } else {
                left_sel
                    .iter()
                    .map(|s| Sample::new(s.t, (s.value + right.value_at(s.t)) / 2.0))
                    .collect()
            }
        }
        OverlapPolicy::Truncate | OverlapPolicy::Strict => {
            if left_sel.is_empty() || right_sel.is_empty() {
                return Err(GlueError::DegenerateWindow(format!(
                    "overlap window [{overlap_start}, {overlap_end}] selected {} left and {} right samples",
                    left_sel.len(),
                    right_sel.len()
                )));
            }
            if policy == OverlapPolicy::Strict && left_sel.len() != right_sel.len() {
                return Err(GlueError::DegenerateWindow(format!(
                    "positional pairing needs equal counts, got {} left and {} right samples",
                    left_sel.len(),
                    right_sel.len()
                )));
            }
            left_sel
                .iter()
                .zip(right_sel.iter())
                .map(|(l, r)| Sample::new(l.t, (l.value + r.value) / 2.0))
                .collect()
        }
    };

    Ok(OverlapResolution {
        overlap_start,
        overlap_end,
        bridge,
        left_selected: left_sel.len(),
        right_selected: right_sel.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(points: &[(f64, f64)]) -> Segment {
        Segment::new(points.iter().copied().map(Sample::from).collect()).unwrap()
    }

    #[test]
    fn averages_paired_samples_in_window() {
        let left = seg(&[(0.0, 2.0), (1.0, 4.0), (2.0, 6.0)]);
        let right = seg(&[(1.0, 8.0), (2.0, 4.0), (3.0, 0.0)]);
        for policy in [
            OverlapPolicy::Resample,
            OverlapPolicy::Truncate,
            OverlapPolicy::Strict,
        ] {
            let res = resolve_overlap(&left, &right, policy).unwrap();
            assert_eq!((res.overlap_start, res.overlap_end), (1.0, 2.0));
            assert_eq!(res.bridge, vec![Sample::new(1.0, 6.0), Sample::new(2.0, 5.0)]);
        }
    }

    #[test]
    fn resample_handles_mismatched_rates() {
        let left = seg(&[(0.0, 0.0), (1.0, 2.0), (2.0, 4.0)]);
        let right = seg(&[(1.0, 10.0), (1.5, 10.0), (2.0, 10.0), (2.5, 10.0)]);
        let res = resolve_overlap(&left, &right, OverlapPolicy::Resample).unwrap();
        assert_eq!(res.left_selected, 2);
        assert_eq!(res.right_selected, 3);
        assert_eq!(res.bridge, vec![Sample::new(1.0, 6.0), Sample::new(2.0, 7.0)]);

        let truncated = resolve_overlap(&left, &right, OverlapPolicy::Truncate).unwrap();
        assert_eq!(truncated.bridge.len(), 2);
        assert_eq!(truncated.bridge[1], Sample::new(2.0, 7.0));

        assert!(matches!(
            resolve_overlap(&left, &right, OverlapPolicy::Strict),
            Err(GlueError::DegenerateWindow(_))
        ));
    }

    #[test]
    fn resample_uses_right_times_when_left_has_none_inside() {
        let left = seg(&[(0.0, 0.0), (10.0, 10.0)]);
        let right = seg(&[(2.0, 4.0), (3.0, 5.0)]);
        let res = resolve_overlap(&left, &right, OverlapPolicy::Resample).unwrap();
        assert_eq!(res.left_selected, 0);
        assert_eq!(res.bridge, vec![Sample::new(2.0, 3.0), Sample::new(3.0, 4.0)]);

        assert!(matches!(
            resolve_overlap(&left, &right, OverlapPolicy::Truncate),
            Err(GlueError::DegenerateWindow(_))
        ));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let left = seg(&[(0.0, 0.0), (1.0, 0.0)]);
        let right = seg(&[(2.0, 0.0), (3.0, 0.0)]);
        assert!(matches!(
            resolve_overlap(&left, &right, OverlapPolicy::Resample),
            Err(GlueError::DegenerateWindow(_))
        ));
    }
}
