//! Ledger collaborator interface.
//!
//! A ledger is an external registry that attests which owner registered a
//! content hash. The codec only consults it opportunistically: embedding
//! succeeds without one, and verification degrades to watermark-only when it
//! is missing or failing. Timeouts and retries belong to the implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Transaction reference reported for a hash that was registered earlier.
pub const ALREADY_REGISTERED: &str = "already_registered";

/// Errors reported by a ledger collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No ledger is configured.
    #[error("no ledger configured")]
    NotConfigured,
    /// The ledger could not be reached or rejected the call.
    #[error("ledger call failed: {0}")]
    Call(String),
}

/// A successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Id the ledger assigned to the resource.
    pub registration_id: String,
    /// Transaction reference of the registration.
    pub tx_ref: String,
    /// Whether the hash had already been registered.
    pub already_registered: bool,
}

/// Ownership facts the ledger holds for a content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRecord {
    /// Whether the hash is registered at all.
    pub registered: bool,
    /// Whether the registered owner equals the queried owner.
    pub owner_matches: bool,
    /// Registration id, when registered.
    pub registration_id: Option<String>,
}

impl OwnershipRecord {
    /// Registered and owned by the queried owner.
    #[must_use]
    pub fn confirms_owner(&self) -> bool {
        self.registered && self.owner_matches
    }
}

/// Registry consulted for content-hash ownership.
pub trait Ledger: Send + Sync {
    /// Whether `content_hash` has been registered.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the ledger cannot answer.
    fn is_registered(&self, content_hash: &str) -> Result<bool, LedgerError>;

    /// Register `content_hash` for `owner_id` with free-form JSON metadata and
    /// embedding parameters. Registering a known hash returns its existing id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the registration fails.
    fn register_resource(
        &self,
        content_hash: &str,
        metadata: &str,
        algorithm_params: &str,
        owner_id: &str,
    ) -> Result<Registration, LedgerError>;

    /// Look up the registration of `content_hash` and compare its owner.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the ledger cannot answer.
    fn verify_ownership(
        &self,
        content_hash: &str,
        owner_id: &str,
    ) -> Result<OwnershipRecord, LedgerError>;
}

#[derive(Debug, Clone)]
struct Entry {
    owner_id: String,
    registration_id: String,
    metadata: String,
    algorithm_params: String,
}

/// Process-local ledger, for tests and demos.
///
/// Owner ids compare case-insensitively, like hex account addresses.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<String, Entry>>,
    sequence: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while offline every call fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    /// Whether nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata and algorithm parameters stored for a hash.
    #[must_use]
    pub fn stored_metadata(&self, content_hash: &str) -> Option<(String, String)> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(content_hash)
            .map(|e| (e.metadata.clone(), e.algorithm_params.clone()))
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(LedgerError::Call("ledger offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock_entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, LedgerError> {
        self.entries
            .lock()
            .map_err(|_| LedgerError::Call("ledger state poisoned".to_string()))
    }
}

fn hex_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("0x{}", hex::encode(hasher.finalize()))
}

impl Ledger for InMemoryLedger {
    fn is_registered(&self, content_hash: &str) -> Result<bool, LedgerError> {
        self.check_online()?;
        Ok(self.lock_entries()?.contains_key(content_hash))
    }

    fn register_resource(
        &self,
        content_hash: &str,
        metadata: &str,
        algorithm_params: &str,
        owner_id: &str,
    ) -> Result<Registration, LedgerError> {
        self.check_online()?;
        let mut entries = self.lock_entries()?;
        if let Some(existing) = entries.get(content_hash) {
            return Ok(Registration {
                registration_id: existing.registration_id.clone(),
                tx_ref: ALREADY_REGISTERED.to_string(),
                already_registered: true,
            });
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst).to_string();
        let registration_id = hex_digest(&[content_hash, owner_id, seq.as_str()]);
        let tx_ref = hex_digest(&["tx", registration_id.as_str()]);
        entries.insert(
            content_hash.to_string(),
            Entry {
                owner_id: owner_id.to_string(),
                registration_id: registration_id.clone(),
                metadata: metadata.to_string(),
                algorithm_params: algorithm_params.to_string(),
            },
        );
        Ok(Registration {
            registration_id,
            tx_ref,
            already_registered: false,
        })
    }

    fn verify_ownership(
        &self,
        content_hash: &str,
        owner_id: &str,
    ) -> Result<OwnershipRecord, LedgerError> {
        self.check_online()?;
        let entries = self.lock_entries()?;
        Ok(match entries.get(content_hash) {
            Some(entry) => OwnershipRecord {
                registered: true,
                owner_matches: entry.owner_id.eq_ignore_ascii_case(owner_id),
                registration_id: Some(entry.registration_id.clone()),
            },
            None => OwnershipRecord {
                registered: false,
                owner_matches: false,
                registration_id: None,
            },
        })
    }
}
