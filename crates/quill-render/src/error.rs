use quill_test_utils::BackendError;

/// Broad classes of [`BatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The backend cannot support the requested setup. Raised at construction.
    Configuration,
    /// The caller broke an API contract.
    InvariantViolation,
}

/// Errors surfaced by batch construction and the front-end API.
///
/// Running out of buffer space or draw-call slots is not an error; the batch
/// flushes and carries on.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchError {
    /// The backend failed to allocate a geometry buffer generation.
    BufferAllocation {
        generation: usize,
        source: BackendError,
    },
    /// The backend lacks a required feature or limit.
    UnsupportedConfiguration(String),
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
    /// The draw-call queue limit was configured as zero.
    ZeroDrawCallLimit,
    /// A batch created by another context was handed to `set_active_batch`.
    ForeignBatch,
    MatrixStackOverflow {
        capacity: usize,
    },
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BufferAllocation { .. }
            | Self::UnsupportedConfiguration(_)
            | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::ZeroDrawCallLimit | Self::ForeignBatch | Self::MatrixStackOverflow { .. } => {
                ErrorKind::InvariantViolation
            }
        }
    }

    /// Log at error level and hand the error back, for use in `map_err`/`return Err`.
    pub(crate) fn logged(self) -> Self {
        tracing::error!("{}", self);
        self
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BufferAllocation { generation, source } => {
                write!(
                    f,
                    "Failed to allocate geometry buffer generation {}: {}",
                    generation, source
                )
            }
            Self::UnsupportedConfiguration(msg) => write!(f, "Unsupported configuration: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "Invalid batch configuration: {}", msg),
            Self::ZeroDrawCallLimit => write!(f, "Draw call queue limit must be at least 1"),
            Self::ForeignBatch => write!(f, "Batch belongs to a different context"),
            Self::MatrixStackOverflow { capacity } => {
                write!(f, "Matrix stack overflow (capacity {})", capacity)
            }
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BufferAllocation { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BatchError::InvalidConfig("x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BatchError::ZeroDrawCallLimit.kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(BatchError::ForeignBatch.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_buffer_allocation_source() {
        let err = BatchError::BufferAllocation {
            generation: 2,
            source: BackendError::OutOfMemory { requested: 64 },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("generation 2"));
    }
}
