use serde::{Deserialize, Serialize};

use crate::{GlueError, Sample};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValueStats {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std_dev: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SignalStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
    pub min: f64,
    pub duration: f64,
}

pub fn stats(values: &[f64]) -> Result<ValueStats, GlueError> {
    let n = values.len();
    if n < 2 {
        return Err(GlueError::InsufficientData { needed: 2, got: n });
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Ok(ValueStats {
        mean,
        std_dev: (sum_sq / (n - 1) as f64).sqrt(),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
    })
}

/// Value statistics plus the time span of an ordered run of samples.
pub fn summarize(samples: &[Sample]) -> Result<SignalStatistics, GlueError> {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let ValueStats {
        mean,
        std_dev,
        max,
        min,
    } = stats(&values)?;
    let duration = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => last.t - first.t,
        _ => 0.0,
    };
    Ok(SignalStatistics {
        mean,
        std_dev,
        max,
        min,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_to_five() {
        let s = stats(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(s.mean, 3.0);
        assert!((s.std_dev - 1.5811).abs() < 1e-4);
        assert_eq!(s.max, 5.0);
        assert_eq!(s.min, 1.0);
    }

    #[test]
    fn needs_two_values() {
        assert!(matches!(
            stats(&[4.2]),
            Err(GlueError::InsufficientData { needed: 2, got: 1 })
        ));
        assert!(matches!(
            stats(&[]),
            Err(GlueError::InsufficientData { needed: 2, got: 0 })
        ));
    }

    #[test]
    fn summarize_reports_duration() {
        let samples = [
            Sample::new(1.5, -1.0),
            Sample::new(2.0, 1.0),
            Sample::new(4.0, 3.0),
        ];
        let s = summarize(&samples).unwrap();
        assert_eq!(s.duration, 2.5);
        assert_eq!(s.mean, 1.0);
        assert_eq!(s.std_dev, 2.0);
        assert_eq!((s.min, s.max), (-1.0, 3.0));
    }
}
