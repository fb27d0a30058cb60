/// Validation and lookup failures of a [`crate::store::MetricStore`].
///
/// Each variant maps to one protocol status: `BadRequest` to 400,
/// `NotImplemented` to 501, `NotFound` to 404.
///
/// # Examples
///
/// ```rust
/// use metrix_common::MetricError;
///
/// let err = MetricError::NotFound("Alloc".to_string());
/// assert!(err.to_string().contains("Alloc"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    /// Empty id, unparsable value, negative counter delta or overflow.
    #[error("Metric: bad request: {0}")]
    BadRequest(String),

    /// The metric type is neither `counter` nor `gauge`.
    #[error("Metric: unsupported metric type {0:?}")]
    NotImplemented(String),

    #[error("Metric: {0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, MetricError>;
