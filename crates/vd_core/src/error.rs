use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{path}: value {value} is outside {min}..={max}")]
    OutOfRange {
        path: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("{path}: unknown parameter `{name}`")]
    UnknownParameter { path: String, name: String },
    #[error("{path}: missing required field `{name}`")]
    MissingRequired { path: String, name: String },
    #[error("{path}: invalid key `{key}`")]
    InvalidKey { path: String, key: String },
    #[error("{path}: expected {expected}")]
    InvalidType {
        path: String,
        expected: &'static str,
    },
    #[error("{path}: duplicate entry {value}")]
    Duplicate { path: String, value: i64 },
}

impl ValidationError {
    pub fn path(&self) -> &str {
        match self {
            ValidationError::OutOfRange { path, .. }
            | ValidationError::UnknownParameter { path, .. }
            | ValidationError::MissingRequired { path, .. }
            | ValidationError::InvalidKey { path, .. }
            | ValidationError::InvalidType { path, .. }
            | ValidationError::Duplicate { path, .. } => path,
        }
    }

    /// Re-anchors the error at a fully qualified document path.
    pub fn with_path(mut self, new_path: impl Into<String>) -> Self {
        let new_path = new_path.into();
        match &mut self {
            ValidationError::OutOfRange { path, .. }
            | ValidationError::UnknownParameter { path, .. }
            | ValidationError::MissingRequired { path, .. }
            | ValidationError::InvalidKey { path, .. }
            | ValidationError::InvalidType { path, .. }
            | ValidationError::Duplicate { path, .. } => *path = new_path,
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::OutOfRange { .. } => "out-of-range",
            ValidationError::UnknownParameter { .. } => "unknown-parameter",
            ValidationError::MissingRequired { .. } => "missing-required",
            ValidationError::InvalidKey { .. } => "invalid-key",
            ValidationError::InvalidType { .. } => "invalid-type",
            ValidationError::Duplicate { .. } => "duplicate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ValidationError;

    #[test]
    fn with_path_rewrites_only_the_location() {
        let err = ValidationError::OutOfRange {
            path: "send-amount".to_string(),
            value: 128,
            min: 0,
            max: 127,
        }
        .with_path("controls.parts.part4.layer1.send-amount");

        assert_eq!(err.path(), "controls.parts.part4.layer1.send-amount");
        assert_eq!(err.kind(), "out-of-range");
        assert_eq!(
            err.to_string(),
            "controls.parts.part4.layer1.send-amount: value 128 is outside 0..=127"
        );
    }
}
