//! Robust statistics over the successful-trial latencies.
//!
//! LED round-trip samples are few and noisy, so the summary leans on
//! median/MAD estimators with MAD-based outlier trimming rather than plain
//! mean/stdev.

use crate::stats::trial_sample::TrialSample;

/// Robust summary of a run's latency samples, in nanoseconds.
#[derive(Debug, Clone)]
pub struct LatencyStatistics {
    pub mean_ns: f64,
    pub median_ns: f64,
    pub stdev_ns: f64,
    pub mad_ns: f64, // Median Absolute Deviation - robust stdev
    pub p95_ns: f64,
    pub p99_ns: f64,
    pub min_ns: f64,
    pub max_ns: f64,
    pub outliers_removed: usize,
    pub confidence_interval_95: (f64, f64),
}

impl LatencyStatistics {
    /// Summarize a run's successful trials. Returns `None` when every trial
    /// timed out and there is nothing to summarize.
    pub fn from_samples(samples: &[TrialSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.iter().map(|s| s.elapsed_ns as f64).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let median = Self::percentile(&sorted, 50.0);

        let mut deviations: Vec<f64> = sorted.iter().map(|&x| (x - median).abs()).collect();
        deviations.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mad = Self::percentile(&deviations, 50.0);

        // Outlier rule: |x - median| > k * MAD, with k = 3.5 (~3 sigma).
        let threshold = 3.5 * mad;
        let clean: Vec<f64> = sorted
            .iter()
            .filter(|&&x| (x - median).abs() <= threshold)
            .copied()
            .collect();
        let outliers_removed = sorted.len() - clean.len();

        let mean = clean.iter().sum::<f64>() / clean.len() as f64;
        let variance =
            clean.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / clean.len() as f64;
        let stdev = variance.sqrt();

        let p95 = Self::percentile(&clean, 95.0);
        let p99 = Self::percentile(&clean, 99.0);

        // 95% confidence interval for the trimmed mean.
        let se = stdev / (clean.len() as f64).sqrt();
        let ci_margin = 1.96 * se;

        Some(Self {
            mean_ns: mean,
            median_ns: median,
            stdev_ns: stdev,
            mad_ns: mad,
            p95_ns: p95,
            p99_ns: p99,
            min_ns: sorted[0],
            max_ns: sorted[sorted.len() - 1],
            outliers_removed,
            confidence_interval_95: (mean - ci_margin, mean + ci_margin),
        })
    }

    /// Calculate percentile of sorted data.
    fn percentile(sorted_data: &[f64], p: f64) -> f64 {
        if sorted_data.is_empty() {
            return 0.0;
        }
        let idx = (p / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
        sorted_data[idx.min(sorted_data.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(elapsed_ns: u64) -> TrialSample {
        TrialSample { elapsed_ns, polls: 1 }
    }

    #[test]
    fn empty_run_has_no_statistics() {
        assert!(LatencyStatistics::from_samples(&[]).is_none());
    }

    #[test]
    fn identical_samples_collapse() {
        let samples: Vec<TrialSample> = (0..5).map(|_| sample(1_000_000)).collect();
        let statistics = LatencyStatistics::from_samples(&samples).unwrap();
        assert_eq!(statistics.median_ns, 1_000_000.0);
        assert_eq!(statistics.mean_ns, 1_000_000.0);
        assert_eq!(statistics.stdev_ns, 0.0);
        assert_eq!(statistics.outliers_removed, 0);
        assert_eq!(statistics.min_ns, statistics.max_ns);
    }

    #[test]
    fn known_set_summary() {
        let samples: Vec<TrialSample> = (1..=9).map(|i| sample(i * 100)).collect();
        let statistics = LatencyStatistics::from_samples(&samples).unwrap();
        assert_eq!(statistics.median_ns, 500.0);
        assert_eq!(statistics.mean_ns, 500.0);
        assert_eq!(statistics.p95_ns, 900.0);
        assert_eq!(statistics.min_ns, 100.0);
        assert_eq!(statistics.max_ns, 900.0);
        assert_eq!(statistics.outliers_removed, 0);
    }

    #[test]
    fn far_outlier_is_trimmed() {
        let mut samples: Vec<TrialSample> = (0..9).map(|i| sample(1_000 + i)).collect();
        samples.push(sample(1_000_000));
        let statistics = LatencyStatistics::from_samples(&samples).unwrap();
        assert_eq!(statistics.outliers_removed, 1);
        assert!(statistics.mean_ns < 2_000.0);
        // Min and max still describe the raw sample set.
        assert_eq!(statistics.max_ns, 1_000_000.0);
    }

    #[test]
    fn confidence_interval_brackets_the_mean() {
        let samples: Vec<TrialSample> = (1..=10).map(|i| sample(i * 1_000)).collect();
        let statistics = LatencyStatistics::from_samples(&samples).unwrap();
        let (lower, upper) = statistics.confidence_interval_95;
        assert!(lower <= statistics.mean_ns);
        assert!(upper >= statistics.mean_ns);
    }
}
