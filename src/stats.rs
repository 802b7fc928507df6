/// Running collection of frames-per-second samples for the current job.
#[derive(Clone, Debug, Default)]
pub struct FpsStats {
    samples: Vec<f64>,
}

impl FpsStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Non-finite values are rejected and `false` is returned.
    pub fn record(&mut self, sample: f64) -> bool {
        if !sample.is_finite() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    /// Median of all samples since the last reset, `None` when there are none.
    pub fn median(&self) -> Option<f64> {
        median(&self.samples)
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in recording order.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Median of `values`; the input order is left untouched.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}
