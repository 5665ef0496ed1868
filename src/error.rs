//! Error types for the toolpath optimization engine
//!
//! Every failure of `optimize()` is surfaced as one of these kinds; nothing
//! is recovered locally. The CLI wraps them in `anyhow` at the application
//! boundary.

use thiserror::Error;

/// Main error type for toolpath optimization
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// `optimize()` was called with no paths at all
    #[error("no paths to optimize")]
    EmptyInput,

    /// A path has fewer than two points or contains non-finite coordinates
    #[error("malformed path {index}: {reason}")]
    MalformedPath { index: usize, reason: String },

    /// A configuration value is outside its documented range
    #[error("invalid configuration: {0}")]
    ConfigRange(String),

    /// The cancellation flag tripped; partial state was discarded
    #[error("optimization cancelled")]
    Cancelled,

    /// An internal invariant was violated mid-run. Unreachable by
    /// construction; kept as a checked failure mode rather than a panic.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Convenience result type for optimizer operations
pub type Result<T> = std::result::Result<T, OptimizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OptimizeError::MalformedPath {
            index: 3,
            reason: "only 1 point".to_string(),
        };
        assert_eq!(err.to_string(), "malformed path 3: only 1 point");

        let err = OptimizeError::ConfigRange("pen_width must be >= 0".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: pen_width must be >= 0"
        );

        assert_eq!(OptimizeError::Cancelled.to_string(), "optimization cancelled");
    }
}
