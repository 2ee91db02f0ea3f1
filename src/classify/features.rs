use crate::db::SensorRecord;

pub const FEATURE_COUNT: usize = 10;

/// Summary statistics of one magnitude series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl SeriesStats {
    /// `None` for an empty series.
    pub fn compute(series: &[f64]) -> Option<Self> {
        if series.is_empty() {
            return None;
        }

        let n = series.len() as f64;
        let mut sorted = series.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let (min, max) = (sorted[0], sorted[sorted.len() - 1]);
        // Upper median for even lengths.
        let median = sorted[sorted.len() / 2];

        // A summed constant series can drift the mean by an ulp.
        if min == max {
            return Some(Self {
                max,
                min,
                mean: min,
                median,
                std_dev: 0.0,
            });
        }

        let mean = series.iter().sum::<f64>() / n;
        // Population variance.
        let variance = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            max,
            min,
            mean,
            median,
            std_dev: variance.sqrt(),
        })
    }

    fn as_features(&self) -> [f32; 5] {
        [
            self.max as f32,
            self.min as f32,
            self.mean as f32,
            self.median as f32,
            self.std_dev as f32,
        ]
    }
}

/// Model input: `[max, min, mean, median, std]` of the accelerometer
/// magnitude followed by the same for the gyroscope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f32; FEATURE_COUNT]);

impl FeatureVector {
    pub fn from_stats(acc: &SeriesStats, gyro: &SeriesStats) -> Self {
        let mut values = [0.0; FEATURE_COUNT];
        values[..5].copy_from_slice(&acc.as_features());
        values[5..].copy_from_slice(&gyro.as_features());
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Feature vector for a window of samples, `None` when the window is empty.
pub fn extract_features(records: &[SensorRecord]) -> Option<FeatureVector> {
    let acc: Vec<f64> = records.iter().map(|r| r.acc.magnitude()).collect();
    let gyro: Vec<f64> = records.iter().map(|r| r.gyro.magnitude()).collect();

    let acc_stats = SeriesStats::compute(&acc)?;
    let gyro_stats = SeriesStats::compute(&gyro)?;
    Some(FeatureVector::from_stats(&acc_stats, &gyro_stats))
}
