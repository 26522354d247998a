use crate::{GlueError, Sample, Segment};

pub const DEFAULT_LINEAR_POINTS: usize = 50;

/// Bridge a gap with a straight line between the boundary samples.
///
/// Produces `num_points` evenly spaced samples over `[gap_start, gap_end]`,
/// endpoints included.
pub fn interpolate_gap(
    left: &Segment,
    right: &Segment,
    num_points: usize,
) -> Result<Vec<Sample>, GlueError> {
    if num_points < 2 {
        return Err(GlueError::InvalidParameter(format!(
            "linear bridge needs at least 2 points, got {num_points}"
        )));
    }
    let from = left.last();
    let to = right.first();
    if to.t <= from.t {
        return Err(GlueError::DegenerateWindow(format!(
            "gap [{}, {}] has no positive duration",
            from.t, to.t
        )));
    }

    let span = to.t - from.t;
    Ok(linspace(from.t, to.t, num_points)
        .into_iter()
        .map(|t| {
            let frac = ((t - from.t) / span).clamp(0.0, 1.0);
            Sample::new(t, from.value + (to.value - from.value) * frac)
        })
        .collect())
}

/// `count` evenly spaced values from `start` to `end`; the last one is `end` exactly.
pub(crate) fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return vec![end];
    }
    let mut out = Vec::with_capacity(count);
    let step = (end - start) / (count as f64 - 1.0);
    for i in 0..count - 1 {
        out.push(start + step * i as f64);
    }
    out.push(end);
    out
}
