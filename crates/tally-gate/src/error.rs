use std::fmt;

/// Errors that can occur during limit evaluation.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Arithmetic on the request overflowed `i64`.
    #[error("arithmetic overflow in stage '{stage}'")]
    Overflow { stage: String },

    /// A stage returned an unexpected error.
    #[error("stage error in '{stage}': {message}")]
    StageError { stage: String, message: String },

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GateError {
    /// Create a stage error with a name and message.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageError {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn overflow(stage: impl Into<String>) -> Self {
        Self::Overflow {
            stage: stage.into(),
        }
    }
}

impl PartialEq for GateError {
    fn eq(&self, other: &Self) -> bool {
        // Compare by display representation for test convenience.
        fmt::format(format_args!("{self}")) == fmt::format(format_args!("{other}"))
    }
}

impl Eq for GateError {}
