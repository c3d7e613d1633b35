use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame length {0} exceeds the maximum message size")]
    InvalidLength(usize),

    #[error("read buffer grew to {0} bytes, past the hard cap")]
    BufferOverflow(usize),

    #[error("stream ended with {0} buffered bytes of an unfinished frame")]
    IncompleteMessage(usize),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WireError>;
