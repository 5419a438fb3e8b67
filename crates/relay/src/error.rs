use std::io;

use switchboard_peers::ConnectError;
use thiserror::Error;

/// Why a session ended, other than the client plainly hanging up.
///
/// Everything here is fatal to the connection and never to the process; the
/// variant only decides the quit line that gets logged.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The client broke the wire protocol; closed without a reply.
    #[error("{0}")]
    Protocol(&'static str),

    /// The handshake could not produce an online peer.
    #[error("login failed: {0}")]
    Login(ConnectError),

    /// Pairing state went irrecoverably wrong mid-negotiation.
    #[error("{0}")]
    Negotiation(&'static str),

    /// Transport error talking to the client.
    #[error(transparent)]
    Io(#[from] io::Error),
}
