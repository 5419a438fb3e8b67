use std::io;

use crate::{Identity, Token};

pub type StoreResult<T> = Result<T, StoreError>;

/// How many fresh tokens/numbers are drawn before allocation gives up.
pub(crate) const ALLOC_ATTEMPTS: usize = 10;

/// Persistent map of bearer tokens to phone numbers.
///
/// Implementations must keep both tokens and numbers unique. The relay core
/// holds the store behind an `Arc<dyn IdentityStore>` and calls it from many
/// session threads at once.
pub trait IdentityStore: Send + Sync {
    /// Look an identity up by its token. Unknown tokens are `Ok(None)`.
    fn lookup_token(&self, token: &Token) -> StoreResult<Option<Identity>>;

    /// Mint a new identity with a unique token and a unique number.
    ///
    /// `Ok(None)` means generation could not find a free token or number
    /// within the attempt budget.
    fn allocate(&self) -> StoreResult<Option<Identity>>;

    /// Bump the identity's last-seen timestamp. Idempotent.
    fn update_last_seen(&self, identity: &Identity) -> StoreResult<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("decoding error: {0}")]
    Decoding(ciborium::de::Error<io::Error>),
    #[error("encoding error: {0}")]
    Encoding(ciborium::ser::Error<io::Error>),
    #[error("storage error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<ciborium::de::Error<io::Error>> for StoreError {
    fn from(err: ciborium::de::Error<io::Error>) -> Self {
        StoreError::Decoding(err)
    }
}

impl From<ciborium::ser::Error<io::Error>> for StoreError {
    fn from(err: ciborium::ser::Error<io::Error>) -> Self {
        StoreError::Encoding(err)
    }
}
