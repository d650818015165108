//! Ownership verification on top of extraction and decoding.
//!
//! Two independent signals feed the verdict:
//!
//! 1. **Watermark match**: the decoded owner fingerprint equals the claimed
//!    owner's fingerprint.
//! 2. **Ledger match** (optional): the ledger confirms the content hash
//!    carried in the payload is registered to the claimed owner.
//!
//! When the ledger is missing, failing, or the payload carries no usable
//! hash, the verdict rests on the watermark alone.

use tracing::{debug, info, warn};

use crate::channel::PixelChannel;
use crate::error::Error;
use crate::extraction::extract_bits;
use crate::framing::{self, DecodedWatermark};
use crate::ledger::{Ledger, OwnershipRecord};
use crate::payload::owner_fingerprint;

/// Confidence multiplier when the watermark owner matches.
pub const WATERMARK_MATCH_BOOST: f64 = 1.2;
/// Confidence multiplier when the ledger confirms the owner.
pub const LEDGER_MATCH_BOOST: f64 = 1.3;
/// Confidence multiplier when the frame checksum is valid.
pub const CHECKSUM_BOOST: f64 = 1.1;

/// How the ledger took part in a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    /// No ledger is configured.
    NotConfigured,
    /// The payload carries no ledger facts or no usable content hash.
    NoUsableFacts,
    /// The ledger call failed.
    Unavailable,
    /// The ledger answered.
    Consulted,
}

/// Outcome of an ownership verification. Always produced, never an error.
#[derive(Debug)]
pub struct VerificationResult {
    /// Final verdict.
    pub verified: bool,
    /// Whether the embedded owner fingerprint matches the claimed owner.
    pub watermark_match: bool,
    /// Ledger verdict, `None` unless the ledger was consulted.
    pub ledger_match: Option<bool>,
    /// How the ledger took part.
    pub ledger_status: LedgerStatus,
    /// Soft confidence in `[0, 1]`.
    pub confidence: f64,
    /// Fingerprint derived from the claimed owner id.
    pub expected_owner: String,
    /// Decoded payload and decoder diagnostics, when decoding succeeded.
    pub decoded: Option<DecodedWatermark>,
    /// Ledger answer, when consulted.
    pub ownership: Option<OwnershipRecord>,
    /// Decode error, when decoding failed.
    pub error: Option<Error>,
    /// Blocks whose transform failed during extraction.
    pub blocks_failed: usize,
}

impl VerificationResult {
    /// The owner fingerprint found in the image, if any.
    #[must_use]
    pub fn extracted_owner(&self) -> Option<&str> {
        self.decoded.as_ref().map(|d| d.payload.owner.as_str())
    }

    /// Whether the frame checksum was valid.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.decoded.as_ref().is_some_and(|d| d.checksum_valid)
    }

    fn failed(
        expected_owner: String,
        error: Error,
        blocks_failed: usize,
        status: LedgerStatus,
    ) -> Self {
        Self {
            verified: false,
            watermark_match: false,
            ledger_match: None,
            ledger_status: status,
            confidence: 0.0,
            expected_owner,
            decoded: None,
            ownership: None,
            error: Some(error),
            blocks_failed,
        }
    }
}

/// Combine decoder and match signals into a confidence in `[0, 1]`.
#[must_use]
pub fn confidence_score(
    sync_ratio: f64,
    watermark_match: bool,
    ledger_match: bool,
    checksum_valid: bool,
) -> f64 {
    let mut confidence = sync_ratio;
    if watermark_match {
        confidence *= WATERMARK_MATCH_BOOST;
    }
    if ledger_match {
        confidence *= LEDGER_MATCH_BOOST;
    }
    if checksum_valid {
        confidence *= CHECKSUM_BOOST;
    }
    confidence.clamp(0.0, 1.0)
}

/// Verifies ownership claims against watermarked channels.
#[derive(Clone, Copy, Default)]
pub struct OwnershipVerifier<'a> {
    ledger: Option<&'a dyn Ledger>,
}

impl<'a> OwnershipVerifier<'a> {
    /// A verifier without a ledger (watermark-only mode).
    #[must_use]
    pub fn new() -> Self {
        Self { ledger: None }
    }

    /// A verifier that also consults `ledger`.
    #[must_use]
    pub fn with_ledger(ledger: &'a dyn Ledger) -> Self {
        Self {
            ledger: Some(ledger),
        }
    }

    /// Extract, decode and judge the claim that `claimed_owner` owns `channel`.
    #[must_use]
    pub fn verify(&self, channel: &PixelChannel, claimed_owner: &str) -> VerificationResult {
        let extracted = extract_bits(channel);
        self.verify_bits(&extracted.bits, claimed_owner, extracted.blocks_failed)
    }

    /// Judge a claim against an already extracted bitstream.
    #[must_use]
    pub fn verify_bits(
        &self,
        bits: &[u8],
        claimed_owner: &str,
        blocks_failed: usize,
    ) -> VerificationResult {
        let expected_owner = owner_fingerprint(claimed_owner);
        let base_status = if self.ledger.is_some() {
            LedgerStatus::NoUsableFacts
        } else {
            LedgerStatus::NotConfigured
        };

        let decoded = match framing::decode(bits) {
            Ok(d) => d,
            Err(e) => {
                info!(error = %e, "watermark extraction failed");
                return VerificationResult::failed(expected_owner, e, blocks_failed, base_status);
            }
        };

        let watermark_match = decoded.payload.owner == expected_owner;
        debug!(
            extracted = %decoded.payload.owner,
            expected = %expected_owner,
            watermark_match,
            "compared owner fingerprints"
        );

        let (ledger_status, ownership) = self.consult_ledger(&decoded, claimed_owner, base_status);
        let ledger_match = ownership.as_ref().map(OwnershipRecord::confirms_owner);
        let verified = match ledger_match {
            Some(ledger_ok) => watermark_match && ledger_ok,
            None => watermark_match,
        };
        let confidence = confidence_score(
            decoded.sync_ratio(),
            watermark_match,
            ledger_match.unwrap_or(false),
            decoded.checksum_valid,
        );

        info!(verified, confidence, ?ledger_status, "ownership verification finished");
        VerificationResult {
            verified,
            watermark_match,
            ledger_match,
            ledger_status,
            confidence,
            expected_owner,
            decoded: Some(decoded),
            ownership,
            error: None,
            blocks_failed,
        }
    }

    fn consult_ledger(
        &self,
        decoded: &DecodedWatermark,
        claimed_owner: &str,
        base_status: LedgerStatus,
    ) -> (LedgerStatus, Option<OwnershipRecord>) {
        let Some(ledger) = self.ledger else {
            debug!("no ledger configured, watermark-only verification");
            return (base_status, None);
        };
        let Some(facts) = decoded
            .payload
            .ledger
            .as_ref()
            .filter(|f| f.has_usable_hash())
        else {
            debug!("payload carries no usable ledger facts, watermark-only verification");
            return (base_status, None);
        };

        match ledger.verify_ownership(&facts.content_hash, claimed_owner) {
            Ok(record) => (LedgerStatus::Consulted, Some(record)),
            Err(e) => {
                let err = Error::from(e);
                warn!(error = %err, "degrading to watermark-only verification");
                (LedgerStatus::Unavailable, None)
            }
        }
    }
}
