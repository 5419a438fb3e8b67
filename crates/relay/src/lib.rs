//! The relay server: wire protocol, per-connection session workers and the
//! accepting listener.
//!
//! A session handshakes, registers its peer in the shared
//! [`Registry`](switchboard_peers::Registry), then loops on command frames.
//! A successful `CALL` or `WAIT` negotiation flips the connection into relay
//! mode, after which the server stops interpreting bytes and forwards them
//! to the partner until either side hangs up.

mod error;
pub use error::SessionError;

mod poll;

pub mod server;
pub use server::{Config, ServerHandle};

mod session;
pub use session::Session;

pub mod wire;
