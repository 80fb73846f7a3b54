//! Trust anchor: the last point the client independently verified.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;

use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use vledger::Digest;

use crate::{ClientError, Result};

/// Server signature over the canonical state payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateSignature {
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
}

/// `(database, tx_id, tx_hash)` tuple the client trusts.
///
/// Replaced wholesale after every successful verification, never edited
/// in place and never written on failure. `tx_id == 0` means nothing has
/// been verified yet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustState {
    pub db: String,
    pub tx_id: u64,
    pub tx_hash: Digest,
    pub signature: Option<StateSignature>,
}

impl TrustState {
    pub fn initial(db: &str) -> Self {
        Self {
            db: db.to_string(),
            tx_id: 0,
            tx_hash: [0u8; 32],
            signature: None,
        }
    }

    /// Canonical bytes the server signs.
    pub fn signed_payload(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(self.db.len() + 8 + 32);
        b.extend_from_slice(self.db.as_bytes());
        b.extend_from_slice(&self.tx_id.to_be_bytes());
        b.extend_from_slice(&self.tx_hash);
        b
    }

    pub fn verify_signature(&self, vk: &VerifyingKey) -> bool {
        let Some(sig) = &self.signature else {
            return false;
        };
        if sig.public_key != vk.to_bytes() {
            return false;
        }
        let Ok(sig) = Signature::from_slice(&sig.signature) else {
            return false;
        };
        vk.verify(&self.signed_payload(), &sig).is_ok()
    }
}

/// Persistence point for trust anchors, keyed by database name.
///
/// Implementations only load and save; serializing the read-verify-write
/// sequence is the caller's job (`VerifiedClient` holds one lock per
/// database across it).
pub trait StateStore: Send + Sync {
    fn load(&self, db: &str) -> Result<Option<TrustState>>;
    fn save(&self, state: &TrustState) -> Result<()>;
}

/// In-memory store for tests and demos.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, TrustState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self, db: &str) -> Result<Option<TrustState>> {
        Ok(self.states.read().unwrap().get(db).cloned())
    }

    fn save(&self, state: &TrustState) -> Result<()> {
        self.states
            .write()
            .unwrap()
            .insert(state.db.clone(), state.clone());
        Ok(())
    }
}

/// One blob per database under `dir`: a blake3 checksum followed by the
/// bincode payload. Load fails on checksum mismatch rather than handing
/// back a silently corrupted anchor.
///
/// No cross-process exclusion is provided: verified writes from separate
/// processes sharing this directory can race each other's anchors.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ClientError::StateStore(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, db: &str) -> PathBuf {
        // database names may contain path separators; file by content hash
        let name = hex::encode(blake3::hash(db.as_bytes()).as_bytes());
        self.dir.join(format!("{name}.state"))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, db: &str) -> Result<Option<TrustState>> {
        let blob = match fs::read(self.path_for(db)) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::StateStore(e.to_string())),
        };
        if blob.len() < 32 {
            return Err(ClientError::StateStore("state blob truncated".into()));
        }
        let (checksum, payload) = blob.split_at(32);
        if blake3::hash(payload).as_bytes()[..] != *checksum {
            return Err(ClientError::StateStore("state blob checksum mismatch".into()));
        }
        let state = bincode::deserialize(payload)
            .map_err(|e| ClientError::StateStore(e.to_string()))?;
        Ok(Some(state))
    }

    fn save(&self, state: &TrustState) -> Result<()> {
        let payload =
            bincode::serialize(state).map_err(|e| ClientError::StateStore(e.to_string()))?;
        let mut blob = Vec::with_capacity(32 + payload.len());
        blob.extend_from_slice(blake3::hash(&payload).as_bytes());
        blob.extend_from_slice(&payload);
        fs::write(self.path_for(&state.db), blob)
            .map_err(|e| ClientError::StateStore(e.to_string()))
    }
}
