use crate::store::ArtifactKey;

#[derive(Debug, thiserror::Error)]
pub enum VcError {
    #[error("Invalid value for `{parameter}`: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
    #[error("Unsupported {parameter}: `{value}`")]
    UnsupportedVariant {
        parameter: &'static str,
        value: String,
    },
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("List lengths differ: {left} != {right}")]
    ListLengthMismatch { left: usize, right: usize },
    #[error("Empty sequence given to {context}")]
    EmptySequence { context: &'static str },
    #[error("Degenerate data: {0}")]
    DegenerateData(String),
    #[error("Singular matrix in {0}")]
    SingularMatrix(&'static str),

    #[error("Artifact not found: {0}")]
    MissingArtifact(ArtifactKey),
    #[error("Artifact {key} is malformed: {reason}")]
    MalformedArtifact { key: ArtifactKey, reason: String },
    #[error("Artifact {0} already exists")]
    ArtifactExists(ArtifactKey),

    #[error("Failed to parse text: {0}")]
    TextParse(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VcError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(parameter: &'static str, value: impl Into<String>) -> Self {
        Self::UnsupportedVariant {
            parameter,
            value: value.into(),
        }
    }

    /// Fails with [`VcError::DimensionMismatch`] unless `expected == actual`.
    pub(crate) fn check_dim(context: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                context,
                expected,
                actual,
            })
        }
    }
}

pub type Result<T> = std::result::Result<T, VcError>;

#[cfg(test)]
mod tests {
    use super::VcError;

    #[test]
    fn messages() {
        assert_eq!(
            VcError::TextParse("expected integer".to_owned()).to_string(),
            "Failed to parse text: expected integer"
        );
        assert_eq!(
            VcError::ListLengthMismatch { left: 3, right: 2 }.to_string(),
            "List lengths differ: 3 != 2"
        );
    }
}
