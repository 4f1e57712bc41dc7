use thiserror::Error;

use crate::response::ResponseError;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Transport and protocol failures raised by [`super::SmtpClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("server reply exceeds {0} bytes")]
    ReplyTooLarge(usize),
}
