//! Online peer registry and the pairing state machine.
//!
//! Every live connection owns exactly one [`Peer`], registered by phone
//! number in the [`Registry`] for as long as the connection lasts. Pairing
//! couples one caller with one callee across two independent session
//! threads: the caller latches the callee under the callee's lock, then both
//! sides walk a `Linking` barrier before any payload byte may flow. The only
//! way out of an established pair is disconnecting.

mod peer;
pub use peer::{AcceptStatus, CallStatus, Peer, PeerState, WaitStatus};

mod registry;
pub use registry::{ConnectError, Registry};

mod signal;
pub use signal::{Signal, SignalTag};
