//! Per-instrument signature store.
//!
//! Holds the last recorded chart signature for every instrument. Writers
//! take an exclusive per-symbol claim with [`SignatureStore::begin`]; a
//! second claim on a symbol that is still being processed is refused, so
//! overlapping recomputations are skipped rather than queued and no update
//! is lost. Claims are released when the guard drops, whether or not a new
//! signature was committed.
//!
//! Signatures can be persisted as a JSON object of
//! `symbol -> {"count": n, "type": "X"|"O"}`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use pnf_core::Signature;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("signature file i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("signature file format: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct StoreState {
    signatures: HashMap<String, Signature>,
    in_flight: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct SignatureStore {
    state: Mutex<StoreState>,
}

impl SignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_signatures(signatures: HashMap<String, Signature>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                signatures,
                in_flight: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, symbol: &str) -> Option<Signature> {
        self.lock().signatures.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().signatures.is_empty()
    }

    /// Sorted copy of every recorded signature.
    pub fn snapshot(&self) -> BTreeMap<String, Signature> {
        self.lock()
            .signatures
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn is_in_flight(&self, symbol: &str) -> bool {
        self.lock().in_flight.contains(symbol)
    }

    /// Claim `symbol` for one recomputation.
    ///
    /// Returns `None` if another recomputation of the same symbol holds the
    /// claim.
    pub fn begin(&self, symbol: &str) -> Option<SignatureGuard<'_>> {
        let mut state = self.lock();
        if !state.in_flight.insert(symbol.to_string()) {
            return None;
        }
        let previous = state.signatures.get(symbol).copied();
        Some(SignatureGuard {
            store: self,
            symbol: symbol.to_string(),
            previous,
        })
    }

    /// Load signatures from a JSON file. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let signatures: HashMap<String, Signature> = serde_json::from_str(&content)?;
        Ok(Self::from_signatures(signatures))
    }

    /// Save signatures to a JSON file. Creates parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Exclusive claim on one symbol's signature.
#[derive(Debug)]
pub struct SignatureGuard<'a> {
    store: &'a SignatureStore,
    symbol: String,
    previous: Option<Signature>,
}

impl SignatureGuard<'_> {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Signature recorded before this claim was taken.
    pub fn previous(&self) -> Option<&Signature> {
        self.previous.as_ref()
    }

    /// Record the new signature and release the claim.
    pub fn commit(self, signature: Signature) {
        self.store
            .lock()
            .signatures
            .insert(self.symbol.clone(), signature);
    }
}

impl Drop for SignatureGuard<'_> {
    fn drop(&mut self) {
        self.store.lock().in_flight.remove(&self.symbol);
    }
}
