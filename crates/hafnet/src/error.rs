use crate::consts;
use std::io;
use thiserror::Error;

/// Errors surfaced by a session, either while connecting or when the I/O
/// worker dies.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The server rejected the authentication cookie.
    #[error("Authentication failed")]
    Auth,

    /// The account is already logged in.
    #[error("Already logged in")]
    Busy,

    /// The server could not be reached, or the handshake timed out.
    #[error("Could not connect to server")]
    Connection,

    /// The server requires a newer protocol version.
    #[error("This client is too old")]
    ProtocolVersion,

    /// The authentication token has expired.
    #[error("Authentication token expired")]
    Expired,

    /// A free-form rejection message from the server.
    #[error("{0}")]
    Message(String),

    /// A fatal socket error while the session was running.
    #[error("Network I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Maps a SESS reply code to a typed error. Codes this client does not
    /// know are reported verbatim.
    pub fn from_code(code: u8, detail: Option<String>) -> Self {
        match code {
            consts::SESSERR_AUTH => SessionError::Auth,
            consts::SESSERR_BUSY => SessionError::Busy,
            consts::SESSERR_CONN => SessionError::Connection,
            consts::SESSERR_PVER => SessionError::ProtocolVersion,
            consts::SESSERR_EXPR => SessionError::Expired,
            consts::SESSERR_MESG => SessionError::Message(detail.unwrap_or_default()),
            other => SessionError::Message(format!("Unknown session error {}", other)),
        }
    }
}
