use thiserror::Error as ThisError;

/// A syntax error with the 1-based line it was detected on. The display
/// form is the exact message surfaced by `eval()`'s parse-failure result.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("Line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        SyntaxError {
            line,
            message: message.into(),
        }
    }
}
