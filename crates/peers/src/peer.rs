use std::io;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::OnceCell;
use switchboard_storage::{Identity, Token};
use tracing::warn;

use crate::signal::{Signal, SignalTag};

/// Lifecycle of an online peer.
///
/// `Connected` is the post-handshake idle state; `Waiting` means the peer
/// can be latched by a caller; `Linking` means the peer's final protocol
/// reply is on the wire; `Linked` means both sides cleared the barrier and
/// payload bytes may flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connected,
    Waiting,
    Linking,
    Linked,
}

/// Outcome of a single call attempt against a dialed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// The pair is latched. From here the only way out is disconnecting.
    Latched,
    /// The target is not (yet) accepting calls; the attempt may be retried.
    Unavailable,
    /// The target is already spoken for.
    Busy,
    /// The caller itself was in no state to place a call.
    Internal,
}

/// Outcome of one readiness poll while waiting to be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// A caller latched us; the wakeup tag has been consumed.
    Ready,
    /// Still waiting.
    Pending,
    /// The signal or state was inconsistent; the session is beyond repair.
    Internal,
}

/// Outcome of the pre-relay barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptStatus {
    Ready,
    TimedOut,
    Internal,
}

struct Shared {
    state: PeerState,
    pair: Option<Arc<Peer>>,
}

/// One online session, keyed by its phone number while registered.
///
/// `shared` is the per-peer lock: every state or pair transition goes
/// through it, whether initiated by the owning worker or by a remote
/// caller's thread. The socket slot is installed once after the handshake
/// and never replaced.
pub struct Peer {
    identity: Identity,
    shared: Mutex<Shared>,
    signal: Signal,
    socket: OnceCell<TcpStream>,
}

impl Peer {
    pub(crate) fn new(identity: Identity) -> io::Result<Self> {
        Ok(Self {
            identity,
            shared: Mutex::new(Shared {
                state: PeerState::Connected,
                pair: None,
            }),
            signal: Signal::new()?,
            socket: OnceCell::new(),
        })
    }

    pub fn number(&self) -> &str {
        self.identity.number()
    }

    pub fn token(&self) -> &Token {
        self.identity.token()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PeerState {
        self.shared.lock().unwrap().state
    }

    /// The partner's number, once latched.
    pub fn pair_number(&self) -> Option<String> {
        let shared = self.shared.lock().unwrap();
        shared.pair.as_ref().map(|pair| pair.number().to_owned())
    }

    /// A handle to the partner's socket, for the relay loop.
    pub fn pair_socket(&self) -> io::Result<Option<TcpStream>> {
        let Some(pair) = self.shared.lock().unwrap().pair.clone() else {
            return Ok(None);
        };
        match pair.socket.get() {
            Some(stream) => Ok(Some(stream.try_clone()?)),
            None => Ok(None),
        }
    }

    /// The wakeup pipe, so the session can poll it next to its socket.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    /// Install the session's socket. Happens exactly once, after the
    /// handshake reply has been sent.
    pub fn install_socket(&self, socket: TcpStream) {
        if self.socket.set(socket).is_err() {
            warn!(number = self.number(), "socket installed twice, keeping the first");
        }
    }

    /// Attempt to pair `self` (the caller) with `target`.
    ///
    /// The latch is symmetric and happens atomically under the target's
    /// lock; on `Latched` the target is woken with a `Waiting` tag and
    /// neither side can back out short of disconnecting.
    pub fn call(self: &Arc<Self>, target: &Arc<Peer>) -> io::Result<CallStatus> {
        {
            let me = self.shared.lock().unwrap();
            if me.pair.is_some() || me.state != PeerState::Connected {
                return Ok(CallStatus::Internal);
            }
        }

        // Dialing your own number: a calling peer is never `Waiting`.
        if Arc::ptr_eq(self, target) {
            return Ok(CallStatus::Unavailable);
        }

        let mut tgt = target.shared.lock().unwrap();
        if tgt.state == PeerState::Connected {
            // The callee exists but has not asked to be called yet.
            return Ok(CallStatus::Unavailable);
        }
        if tgt.state != PeerState::Waiting || tgt.pair.is_some() {
            return Ok(CallStatus::Busy);
        }

        // Latch. Taking our own lock inside the target's cannot cycle: only
        // a `Waiting` peer is ever locked by a remote thread, and we just
        // verified we are `Connected`, while a `Waiting` peer's worker never
        // locks anyone else.
        tgt.pair = Some(Arc::clone(self));
        self.shared.lock().unwrap().pair = Some(Arc::clone(target));
        target.signal.post(SignalTag::Waiting)?;

        Ok(CallStatus::Latched)
    }

    /// Caller side of the barrier: our `ACCEPTED` reply is flushed, tell the
    /// callee it may start relaying towards us.
    pub fn call_ready(&self) -> io::Result<()> {
        let pair = {
            let mut me = self.shared.lock().unwrap();
            if me.state != PeerState::Connected {
                return Ok(());
            }
            me.state = PeerState::Linking;
            me.pair.clone()
        };
        if let Some(pair) = pair {
            pair.signal.post(SignalTag::Linking)?;
        }
        Ok(())
    }

    /// Poll our readiness to be called.
    ///
    /// Promotes `Connected` to `Waiting` on the first poll; once a caller
    /// has latched us, consumes the `Waiting` tag and reports `Ready`.
    pub fn wait(&self) -> io::Result<WaitStatus> {
        {
            let mut me = self.shared.lock().unwrap();
            if me.pair.is_none() {
                if me.state == PeerState::Connected {
                    me.state = PeerState::Waiting;
                }
                return Ok(if me.state == PeerState::Waiting {
                    WaitStatus::Pending
                } else {
                    WaitStatus::Internal
                });
            }
        }

        Ok(match self.signal.try_recv()? {
            Some(tag) if tag == SignalTag::Waiting as u8 => WaitStatus::Ready,
            _ => WaitStatus::Internal,
        })
    }

    /// Callee side of the barrier, the mirror of [`Peer::call_ready`].
    pub fn wait_ready(&self) -> io::Result<()> {
        let pair = {
            let mut me = self.shared.lock().unwrap();
            if me.state != PeerState::Waiting {
                return Ok(());
            }
            me.state = PeerState::Linking;
            me.pair.clone()
        };
        if let Some(pair) = pair {
            pair.signal.post(SignalTag::Linking)?;
        }
        Ok(())
    }

    /// Abort waiting because the client spoke. Returns `false` when a caller
    /// has already latched us, in which case it is too late to back out.
    pub fn wait_stop(&self) -> bool {
        let mut me = self.shared.lock().unwrap();
        if me.pair.is_some() {
            return false;
        }
        match me.state {
            PeerState::Connected => true,
            PeerState::Waiting => {
                me.state = PeerState::Connected;
                true
            }
            _ => false,
        }
    }

    /// Block until the partner's protocol reply is on the wire.
    ///
    /// Consumes the partner's `Linking` tag and verifies it really advanced,
    /// so no relayed byte can interleave with an unfinished reply.
    pub fn accept(&self, timeout: Duration) -> io::Result<AcceptStatus> {
        {
            let me = self.shared.lock().unwrap();
            match me.state {
                PeerState::Linked => return Ok(AcceptStatus::Ready),
                PeerState::Linking => {}
                _ => return Ok(AcceptStatus::Internal),
            }
        }

        let Some(tag) = self.signal.recv_timeout(timeout)? else {
            return Ok(AcceptStatus::TimedOut);
        };
        if tag != SignalTag::Linking as u8 {
            return Ok(AcceptStatus::Internal);
        }

        let Some(pair) = self.shared.lock().unwrap().pair.clone() else {
            return Ok(AcceptStatus::Internal);
        };
        let pair_state = pair.shared.lock().unwrap().state;
        if !matches!(pair_state, PeerState::Linking | PeerState::Linked) {
            return Ok(AcceptStatus::Internal);
        }

        self.shared.lock().unwrap().state = PeerState::Linked;
        Ok(AcceptStatus::Ready)
    }

    /// Drop our half of the pair cycle. Called on deregistration only.
    pub(crate) fn clear_pair(&self) {
        self.shared.lock().unwrap().pair = None;
    }

    #[cfg(test)]
    pub(crate) fn pair_is(&self, other: &Arc<Peer>) -> bool {
        let shared = self.shared.lock().unwrap();
        shared
            .pair
            .as_ref()
            .map(|pair| Arc::ptr_eq(pair, other))
            .unwrap_or(false)
    }
}
