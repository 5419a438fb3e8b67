//! Identity records and the stores that persist them.
//!
//! An [`Identity`] is a durable `(token, number)` pair: the token is what a
//! returning client presents to log back in, the number is what other
//! clients dial. Stores implement [`IdentityStore`]; the relay core only
//! ever looks identities up by token, allocates fresh ones and bumps their
//! last-seen timestamp.

mod identity;
pub use identity::{Identity, Token, TOKEN_LEN};

mod store;
pub use store::{IdentityStore, StoreError, StoreResult};

mod impls;
#[cfg(feature = "leveldb")]
pub use impls::leveldb::{LevelDbIdentityStore, Options as LevelDbOptions};
pub use impls::memory::MemoryIdentityStore;
