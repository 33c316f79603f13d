use thiserror::Error;

/// Errors produced while interpreting controller responses.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ProtoError {
    /// The response did not have the expected shape.
    #[error("malformed response to {command}: {response:?}")]
    Malformed { command: &'static str, response: String },

    /// The controller answered with an error line instead of `OK`.
    #[error("controller rejected {command}: {response:?}")]
    Rejected { command: &'static str, response: String },
}
