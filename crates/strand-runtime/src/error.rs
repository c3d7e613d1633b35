use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no handler for pattern: {0}")]
    PatternNotFound(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("value error: {0}")]
    Value(#[from] rmpv::ext::Error),

    #[error("wire error: {0}")]
    Wire(#[from] strand_wire::WireError),

    #[error("config error: {0}")]
    Config(#[from] strand_config::ConfigError),

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// The message surfaced to the remote peer inside an `{error: ...}`
    /// reply. Handler errors travel verbatim, without the local variant
    /// prefix.
    pub fn reply_message(&self) -> String {
        match self {
            Error::Handler(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
