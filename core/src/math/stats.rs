pub struct StatsHelper;

impl StatsHelper {
    /// Median of `values`, which are reordered in place.
    pub fn median(values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let half = values.len() / 2;
        if values.len() % 2 == 0 {
            Some((values[half - 1] + values[half]) / 2.0)
        } else {
            Some(values[half])
        }
    }

    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }
}
