use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    /// CPU or memory could not be read; the tick produced nothing.
    #[error("{metric} metrics unavailable: {reason}")]
    MetricSourceUnavailable {
        metric: &'static str,
        reason: String,
    },
}

impl SampleError {
    pub fn unavailable(metric: &'static str, reason: impl Into<String>) -> Self {
        SampleError::MetricSourceUnavailable {
            metric,
            reason: reason.into(),
        }
    }
}
