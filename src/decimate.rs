//! Reduction of raw samples to a viewport's point budget

use crate::types::DataPoint;

/// Raw samples per emitted point for a channel
///
/// `floor(samples_per_second / frequency)`, never below 1. A missing or
/// non-positive frequency disables decimation.
pub fn decimation_factor(samples_per_second: f64, frequency: Option<f64>) -> usize {
    match frequency {
        Some(frequency) if frequency > 0.0 && frequency.is_finite() => {
            let factor = (samples_per_second / frequency).floor();
            if factor >= 1.0 { factor as usize } else { 1 }
        }
        _ => 1,
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    sum: f64,
    min: f64,
    max: f64,
    count: usize,
}

impl Bucket {
    fn new() -> Self {
        Bucket { sum: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY, count: 0 }
    }

    fn push(&mut self, value: f64) {
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.count += 1;
    }

    fn take(&mut self, time: f64) -> DataPoint {
        let point = DataPoint::bucket(time, self.sum / self.count as f64, self.min, self.max);
        *self = Bucket::new();
        point
    }
}

/// Turns `(time, value)` samples into render points
///
/// With `factor <= 1` every sample becomes a raw point. Otherwise the first
/// sample is emitted on its own (there is nothing to aggregate yet) and every
/// following run of `factor` samples becomes one point stamped with the time
/// of its last sample, carrying the run's mean and `[min, max]`. A trailing
/// run shorter than `factor` is dropped.
///
/// ```rust
/// use edfstream::decimate::decimate;
///
/// let samples = (0..7).map(|i| (i as f64, i as f64));
/// let points = decimate(samples, 3);
///
/// assert_eq!(points.len(), 3);
/// assert_eq!(points[0].range, None);
/// assert_eq!(points[1].value, 2.0);            // mean of 1, 2, 3
/// assert_eq!(points[1].range, Some((1.0, 3.0)));
/// assert_eq!(points[2].time, 6.0);
/// ```
pub fn decimate<I>(samples: I, factor: usize) -> Vec<DataPoint>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut samples = samples.into_iter();

    if factor <= 1 {
        return samples.map(|(time, value)| DataPoint::raw(time, value)).collect();
    }

    let (lower, _) = samples.size_hint();
    let mut points = Vec::with_capacity(lower / factor + 1);

    let Some((time, value)) = samples.next() else {
        return points;
    };
    points.push(DataPoint::raw(time, value));

    let mut bucket = Bucket::new();
    for (time, value) in samples {
        bucket.push(value);
        if bucket.count == factor {
            points.push(bucket.take(time));
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor() {
        assert_eq!(decimation_factor(256.0, None), 1);
        assert_eq!(decimation_factor(256.0, Some(10.0)), 25);
        assert_eq!(decimation_factor(256.0, Some(1000.0)), 1);
        assert_eq!(decimation_factor(256.0, Some(0.0)), 1);
        assert_eq!(decimation_factor(256.0, Some(f64::NAN)), 1);
    }

    #[test]
    fn test_no_decimation_keeps_every_sample() {
        let points = decimate(vec![(0.0, 1.5), (4.0, -2.0)], 1);
        assert_eq!(points, vec![DataPoint::raw(0.0, 1.5), DataPoint::raw(4.0, -2.0)]);
    }

    #[test]
    fn test_bucket_mean_min_max() {
        let values = [5.0, 1.0, 9.0, 4.0, 2.0, 8.0, 3.0];
        let samples = values.iter().enumerate().map(|(i, v)| (i as f64 * 10.0, *v));
        let points = decimate(samples, 3);

        assert_eq!(points.len(), 3);
        assert_eq!(points[0], DataPoint::raw(0.0, 5.0));

        let expected_mean = (1.0 + 9.0 + 4.0) / 3.0;
        assert!((points[1].value - expected_mean).abs() < 1e-12);
        assert_eq!(points[1].range, Some((1.0, 9.0)));
        assert_eq!(points[1].time, 30.0);

        assert_eq!(points[2].range, Some((2.0, 8.0)));
        assert_eq!(points[2].time, 60.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(decimate(Vec::<(f64, f64)>::new(), 4).is_empty());
    }
}
