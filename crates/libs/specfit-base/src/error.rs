//! Error types for specfit.

use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

/// Custom error type for specfit.
///
/// Carries a human-readable message describing what the pipeline was doing
/// and, optionally, the lower-level error that caused the failure.
#[derive(Debug)]
pub struct SpecFitError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl Display for SpecFitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let cause = match &self.source {
            Some(cause) => format!("{}", cause),
            None => String::from("None"),
        };
        write!(f, "Error: {}, caused by {}", self.message, cause)
    }
}

impl Error for SpecFitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn Error + 'static))
    }
}

impl SpecFitError {
    /// Creates a new SpecFitError.
    pub fn new<S>(message: S, source: Option<Box<dyn Error + Send + Sync>>) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            source,
        }
    }

    /// Creates a new SpecFitError from a std::io::Error.
    pub fn from_io_error<S>(err: std::io::Error, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(message, Some(Box::new(err)))
    }

    /// Creates a new SpecFitError from a [`RuntimeError`].
    pub fn from_runtime_error<S>(err: RuntimeError, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(message, Some(Box::new(err)))
    }

    /// Returns the message of the error.
    pub fn message(&self) -> &str { &self.message }

    /// Returns the cause of the error downcast to the given type, if any.
    pub fn cause<T: Error + 'static>(&self) -> Option<&T> {
        self.source.as_ref().and_then(|err| err.downcast_ref::<T>())
    }
}

/// Errors raised by the specfit pipeline outside the numeric solvers.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The settings are inconsistent.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    /// The system configuration directory is not found.
    #[error("System configuration directory not found")]
    SysConfigDirNotFound,
    /// Toml deserialisation error.
    #[error("Toml deserialisation error: {0}")]
    TomlDe(#[from] toml::de::Error),
    /// Toml serialisation error.
    #[error("Toml serialisation error: {0}")]
    TomlSe(#[from] toml::ser::Error),
    /// A persisted basis file is malformed.
    #[error("Malformed basis file at line {line}: {reason}")]
    MalformedBasis {
        /// Line (1-based) where the problem was found.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },
    /// The reflectance data does not match the texture layout.
    #[error("Reflectance data size mismatch: expected {expected} texels, got {actual}")]
    ReflectanceSizeMismatch {
        /// Number of texels of the decomposition.
        expected: usize,
        /// Number of samples provided by the view.
        actual: usize,
    },
    /// The basis of the decomposition is not owned and cannot be
    /// reconstructed.
    #[error("The material basis is borrowed from an existing fit and cannot be reconstructed")]
    BasisNotReconstructible,
    /// No texel has any visible sample.
    #[error("No texel received a visible sample")]
    NoVisibleSamples,
    /// The sparse accumulation disagrees with the dense reference.
    #[error(
        "Matrix validation failed at ({row}, {col}): accumulated {actual}, reference {expected}"
    )]
    ValidationMismatch {
        /// Row of the mismatching entry.
        row: usize,
        /// Column of the mismatching entry, or the channel for right-hand
        /// sides.
        col: usize,
        /// Value computed by the closed-form accumulation.
        actual: f64,
        /// Value computed by the dense reference.
        expected: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_cause_downcast() {
        let err = SpecFitError::from_runtime_error(
            RuntimeError::InvalidSettings("basis count is zero".into()),
            "Failed to start fitting",
        );
        assert_eq!(err.message(), "Failed to start fitting");
        assert!(matches!(
            err.cause::<RuntimeError>(),
            Some(RuntimeError::InvalidSettings(_))
        ));
        assert!(err.cause::<std::io::Error>().is_none());
        assert!(format!("{}", err).contains("basis count is zero"));
    }
}
