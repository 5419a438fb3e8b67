use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use switchboard_storage::{IdentityStore, StoreError, Token};
use tracing::debug;

use crate::peer::Peer;

/// Why a handshake could not produce an online peer.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("unknown token")]
    UnknownToken,
    #[error("number {0} is already online")]
    AlreadyOnline(String),
    #[error("identity allocation exhausted")]
    Exhausted,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("signal setup failed: {0}")]
    Signal(#[from] io::Error),
}

/// The set of online peers, keyed by phone number.
///
/// Exactly one peer per number may be online at a time; a second login with
/// the same identity is rejected while the first is still connected.
pub struct Registry {
    store: Arc<dyn IdentityStore>,
    online: Mutex<HashMap<String, Arc<Peer>>>,
}

impl Registry {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            online: Mutex::new(HashMap::new()),
        }
    }

    /// Log a session in: resolve (or mint) its identity and register it.
    ///
    /// The registry lock spans identity allocation as well as the online
    /// check, so two tokenless logins cannot race into the same freshly
    /// minted number.
    pub fn connect(&self, token: Option<&Token>) -> Result<Arc<Peer>, ConnectError> {
        let looked_up = match token {
            Some(token) => Some(
                self.store
                    .lookup_token(token)?
                    .ok_or(ConnectError::UnknownToken)?,
            ),
            None => None,
        };

        let mut online = self.online.lock().unwrap();

        let identity = match looked_up {
            Some(identity) => identity,
            None => self.store.allocate()?.ok_or(ConnectError::Exhausted)?,
        };
        if online.contains_key(identity.number()) {
            return Err(ConnectError::AlreadyOnline(identity.number().to_owned()));
        }
        self.store.update_last_seen(&identity)?;

        let peer = Arc::new(Peer::new(identity)?);
        online.insert(peer.number().to_owned(), Arc::clone(&peer));
        debug!(number = peer.number(), online = online.len(), "peer registered");

        Ok(peer)
    }

    /// Deregister a session. Frees the number and breaks the peer's half of
    /// any pair cycle so both sides can unwind.
    pub fn disconnect(&self, peer: &Peer) {
        let mut online = self.online.lock().unwrap();
        online.remove(peer.number());
        peer.clear_pair();
        debug!(number = peer.number(), online = online.len(), "peer deregistered");
    }

    /// Snapshot lookup of an online peer by number.
    pub fn dial(&self, number: &str) -> Option<Arc<Peer>> {
        self.online.lock().unwrap().get(number).cloned()
    }

    /// Number of peers currently online.
    pub fn online_count(&self) -> usize {
        self.online.lock().unwrap().len()
    }
}
