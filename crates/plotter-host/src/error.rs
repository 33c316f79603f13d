use thiserror::Error;

/// Errors surfaced by the plotter host.
///
/// Numeric recovery inside the planner and executor is always local;
/// these variants cover the remaining failure surfaces: configuration,
/// connection, and malformed input documents.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to connect to the plotter")]
    ConnectFailed,

    #[error("lost connection to the plotter")]
    ConnectionLost,

    #[error("invalid plot digest: {0}")]
    Digest(String),

    #[error(transparent)]
    Proto(#[from] ebb_proto::ProtoError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
