/// Failures a harness request can end in.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid data parameter: {0}")]
    InvalidData(#[from] serde_json::Error),
    #[error("unknown socket: {0}")]
    UnknownConnection(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("shutting down")]
    ShuttingDown,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidData(_) | Self::UnknownConnection(_) => 400,
            Self::ConnectionClosed => 410,
            Self::ShuttingDown => 503,
            Self::Io(_) => 500,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidData(_) => "invalid_data",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::ConnectionClosed => "connection_closed",
            Self::ShuttingDown => "shutting_down",
            Self::Io(_) => "io",
        }
    }
}
