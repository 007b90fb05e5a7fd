use thiserror::Error;

/// Crate-wide result alias.
pub type GpResult<T> = Result<T, GpError>;

/// Failure taxonomy shared by every component.
///
/// `Domain` is only ever seen through the strict evaluation API; the
/// sampling hot path converts it (and everything else) to `-inf`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpError {
    /// Bad shapes, bounds, or options. The caller must fix the inputs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A parameter vector left its bounds during evaluation.
    #[error("parameter `{name}` = {value} outside bounds [{lower}, {upper}]")]
    Domain {
        name: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    /// The covariance matrix could not be factorized even after jitter.
    #[error("covariance factorization failed after adding jitter {jitter:e}: {reason}")]
    NumericalInstability { jitter: f64, reason: String },

    /// The optimizer or sampler exhausted its budget without a usable result.
    #[error("convergence failure: {0}")]
    Convergence(String),
}

impl GpError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        GpError::Configuration(msg.into())
    }
}
