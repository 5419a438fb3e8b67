use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusty_leveldb::DB;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::identity::random_number;
use crate::store::ALLOC_ATTEMPTS;
use crate::{Identity, IdentityStore, StoreError, StoreResult, Token, TOKEN_LEN};

pub struct Options {
    pub path: PathBuf,
    pub create_if_missing: bool,
}

/// LevelDB-backed identity store.
///
/// Records are ciborium-encoded under `token/<bytes>` keys; a second
/// `number/<digits>` index maps each issued number back to its token so
/// number uniqueness can be checked without a scan.
pub struct LevelDbIdentityStore {
    db: Mutex<DB>,
}

const TOKEN_PREFIX: &[u8] = b"token/";
const NUMBER_PREFIX: &[u8] = b"number/";

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    token: [u8; TOKEN_LEN],
    number: String,
    last_seen: u64,
}

impl LevelDbIdentityStore {
    pub fn from_opts(options: Options) -> StoreResult<Self> {
        let opt = rusty_leveldb::Options {
            create_if_missing: options.create_if_missing,
            ..Default::default()
        };

        let db = DB::open(options.path, opt)?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn in_memory() -> StoreResult<Self> {
        let opt = rusty_leveldb::in_memory();

        let db = DB::open("switchboard-db", opt)?;
        Ok(Self { db: Mutex::new(db) })
    }
}

impl IdentityStore for LevelDbIdentityStore {
    fn lookup_token(&self, token: &Token) -> StoreResult<Option<Identity>> {
        let mut db = self.db.lock().unwrap();

        let Some(raw) = db.get(&token_key(token)) else {
            return Ok(None);
        };
        let record: StoredIdentity = cbor_from_vec(&raw)?;

        Ok(Some(Identity::new(record.token.into(), record.number)))
    }

    fn allocate(&self) -> StoreResult<Option<Identity>> {
        // A single write lock serializes generation with insertion, so two
        // sessions cannot race each other into the same fresh number.
        let mut db = self.db.lock().unwrap();

        let Some(token) = (0..ALLOC_ATTEMPTS)
            .map(|_| Token::random())
            .find(|candidate| db.get(&token_key(candidate)).is_none())
        else {
            return Ok(None);
        };
        let Some(number) = (0..ALLOC_ATTEMPTS)
            .filter_map(|_| random_number())
            .find(|candidate| db.get(&number_key(candidate)).is_none())
        else {
            return Ok(None);
        };

        let record = StoredIdentity {
            token: *token.as_bytes(),
            number: number.clone(),
            last_seen: unix_now(),
        };
        db.put(&token_key(&token), &cbor_to_vec(&record)?)?;
        db.put(&number_key(&number), token.as_bytes())?;
        db.flush()?;

        Ok(Some(Identity::new(token, number)))
    }

    fn update_last_seen(&self, identity: &Identity) -> StoreResult<()> {
        let mut db = self.db.lock().unwrap();

        let key = token_key(identity.token());
        let Some(raw) = db.get(&key) else {
            // Unknown identities are a no-op, like an UPDATE matching no rows.
            return Ok(());
        };
        let mut record: StoredIdentity = cbor_from_vec(&raw)?;
        record.last_seen = unix_now();
        db.put(&key, &cbor_to_vec(&record)?)?;

        Ok(())
    }
}

impl From<rusty_leveldb::Status> for StoreError {
    fn from(status: rusty_leveldb::Status) -> Self {
        StoreError::Backend(Box::new(status))
    }
}

fn token_key(token: &Token) -> Vec<u8> {
    let mut key = TOKEN_PREFIX.to_vec();
    key.extend_from_slice(token.as_bytes());
    key
}

fn number_key(number: &str) -> Vec<u8> {
    let mut key = NUMBER_PREFIX.to_vec();
    key.extend_from_slice(number.as_bytes());
    key
}

fn cbor_to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

fn cbor_from_vec<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    Ok(ciborium::from_reader(data)?)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
