use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::identity::random_number;
use crate::store::ALLOC_ATTEMPTS;
use crate::{Identity, IdentityStore, StoreResult, Token};

/// In-memory identity store.
///
/// Backs the `in_memory` configuration switch and the test suites. Nothing
/// survives process exit.
#[derive(Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    by_token: HashMap<Token, Entry>,
    numbers: HashSet<String>,
}

struct Entry {
    identity: Identity,
    last_seen: u64,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-seen timestamp of the identity, unix seconds.
    pub fn last_seen(&self, token: &Token) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.by_token.get(token).map(|entry| entry.last_seen)
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn lookup_token(&self, token: &Token) -> StoreResult<Option<Identity>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.by_token.get(token).map(|entry| entry.identity.clone()))
    }

    fn allocate(&self) -> StoreResult<Option<Identity>> {
        let mut inner = self.inner.lock().unwrap();

        let Some(token) = (0..ALLOC_ATTEMPTS)
            .map(|_| Token::random())
            .find(|candidate| !inner.by_token.contains_key(candidate))
        else {
            return Ok(None);
        };
        let Some(number) = (0..ALLOC_ATTEMPTS)
            .filter_map(|_| random_number())
            .find(|candidate| !inner.numbers.contains(candidate))
        else {
            return Ok(None);
        };

        let identity = Identity::new(token, number.clone());
        inner.numbers.insert(number);
        inner.by_token.insert(
            token,
            Entry {
                identity: identity.clone(),
                last_seen: unix_now(),
            },
        );

        Ok(Some(identity))
    }

    fn update_last_seen(&self, identity: &Identity) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.by_token.get_mut(identity.token()) {
            entry.last_seen = unix_now();
        }
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
