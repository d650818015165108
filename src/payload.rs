//! The ownership record carried inside the watermark.
//!
//! Payloads travel as compact JSON with short keys so they fit in as few
//! blocks as possible:
//!
//! ```text
//! {"o":"a1b2c3d4","t":1700000000,"h":"9f8e7d6c","v":"2","bc":{...}}
//! ```
//!
//! `bc` is present only when a ledger took part in the embed.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Version tag written into new payloads.
pub const PAYLOAD_VERSION: &str = "2";

/// Version assumed when a damaged payload has no readable `v` field.
pub const FALLBACK_VERSION: &str = "1";

/// Length of the owner and image-hash fingerprints in characters.
pub const FINGERPRINT_LEN: usize = 8;

/// Number of leading owner-id characters skipped (the `0x` of an address).
pub const OWNER_PREFIX_LEN: usize = 2;

/// Content hash placeholder meaning "no usable hash".
pub const NULL_CONTENT_HASH: &str = "0x0";

/// Length of a usable `0x`-prefixed SHA-256 content hash.
pub const CONTENT_HASH_LEN: usize = 66;

static OWNER_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""o"\s*:\s*"([^"]*)""#).expect("valid regex"));
static HASH_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""h"\s*:\s*"([^"]*)""#).expect("valid regex"));
static TIME_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""t"\s*:\s*(\d+)"#).expect("valid regex"));
static VERSION_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""v"\s*:\s*"([^"]*)""#).expect("valid regex"));

/// Registration facts recorded by the ledger at embed time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerFacts {
    /// Whether the ledger confirmed the registration.
    pub registered: bool,
    /// Registration id assigned by the ledger.
    #[serde(rename = "dataId")]
    pub registration_id: String,
    /// Transaction reference of the registration.
    #[serde(rename = "txHash")]
    pub tx_ref: String,
    /// Content hash the registration is keyed by.
    #[serde(rename = "dataHash")]
    pub content_hash: String,
}

impl Default for LedgerFacts {
    fn default() -> Self {
        Self {
            registered: false,
            registration_id: String::new(),
            tx_ref: String::new(),
            content_hash: NULL_CONTENT_HASH.to_string(),
        }
    }
}

impl LedgerFacts {
    /// Unregistered facts that still remember the content hash.
    #[must_use]
    pub fn unregistered(content_hash: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            ..Self::default()
        }
    }

    /// Whether `content_hash` can be used to query the ledger.
    #[must_use]
    pub fn has_usable_hash(&self) -> bool {
        self.content_hash != NULL_CONTENT_HASH && self.content_hash.len() == CONTENT_HASH_LEN
    }
}

/// The structured ownership claim embedded into an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkPayload {
    /// Owner fingerprint, see [`owner_fingerprint`].
    #[serde(rename = "o")]
    pub owner: String,
    /// Embed time in UNIX seconds.
    #[serde(rename = "t")]
    pub timestamp: u64,
    /// Image hash fingerprint, see [`hash_fingerprint`].
    #[serde(rename = "h")]
    pub image_hash: String,
    /// Payload format version.
    #[serde(rename = "v")]
    pub version: String,
    /// Ledger registration facts, absent when no ledger was involved.
    #[serde(rename = "bc", default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerFacts>,
}

impl WatermarkPayload {
    /// Build a fresh payload from a full owner id and content hash.
    #[must_use]
    pub fn new(
        owner_id: &str,
        content_hash: &str,
        timestamp: u64,
        ledger: Option<LedgerFacts>,
    ) -> Self {
        Self {
            owner: owner_fingerprint(owner_id),
            timestamp,
            image_hash: hash_fingerprint(content_hash),
            version: PAYLOAD_VERSION.to_string(),
            ledger,
        }
    }

    /// Serialize to the compact JSON wire text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serialize`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Strict parse: drop bytes outside printable ASCII, trim, parse JSON.
    #[must_use]
    pub fn parse_structured(raw: &[u8]) -> Option<Self> {
        let cleaned: String = raw
            .iter()
            .filter(|b| (0x20..=0x7E).contains(*b))
            .map(|&b| char::from(b))
            .collect();
        serde_json::from_str(cleaned.trim()).ok()
    }

    /// Tolerant parse that pulls individual fields out of damaged text.
    ///
    /// Succeeds when both the owner and hash fields are found. A missing
    /// timestamp falls back to the current time and a missing version to
    /// [`FALLBACK_VERSION`]. Ledger facts are never recovered this way.
    #[must_use]
    pub fn parse_fields(text: &str) -> Option<Self> {
        let owner = OWNER_FIELD.captures(text)?.get(1)?.as_str().to_string();
        let image_hash = HASH_FIELD.captures(text)?.get(1)?.as_str().to_string();
        let timestamp = TIME_FIELD
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_else(unix_now);
        let version = VERSION_FIELD
            .captures(text)
            .and_then(|c| c.get(1))
            .map_or_else(|| FALLBACK_VERSION.to_string(), |m| m.as_str().to_string());
        Some(Self {
            owner,
            timestamp,
            image_hash,
            version,
            ledger: None,
        })
    }

    /// Whether owner, image hash and version agree with `other`.
    #[must_use]
    pub fn core_matches(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.image_hash == other.image_hash
            && self.version == other.version
    }

    /// Fraction of the five top-level fields that agree with `other`.
    #[must_use]
    pub fn similarity(&self, other: &Self) -> f64 {
        let matches = [
            self.owner == other.owner,
            self.timestamp == other.timestamp,
            self.image_hash == other.image_hash,
            self.version == other.version,
            self.ledger == other.ledger,
        ];
        let hits = matches.iter().filter(|&&m| m).count();
        #[allow(clippy::cast_precision_loss)]
        {
            hits as f64 / matches.len() as f64
        }
    }
}

/// Owner fingerprint: up to 8 characters after the 2-character prefix.
///
/// `"0xa1b2c3d4e5f6..."` becomes `"a1b2c3d4"`.
#[must_use]
pub fn owner_fingerprint(owner_id: &str) -> String {
    owner_id
        .chars()
        .skip(OWNER_PREFIX_LEN)
        .take(FINGERPRINT_LEN)
        .collect()
}

/// Image hash fingerprint: the first 8 characters of the hash.
#[must_use]
pub fn hash_fingerprint(content_hash: &str) -> String {
    content_hash.chars().take(FINGERPRINT_LEN).collect()
}

/// Current time in UNIX seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
