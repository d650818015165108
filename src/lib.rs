//! Embed and verify invisible ownership watermarks via block DCT modulation.
//!
//! A small JSON ownership claim is framed into a synchronized, length-prefixed
//! bitstream and written one bit per 8x8 block of the green channel, by forcing
//! the sign of four mid-frequency DCT coefficients. Verification reads the
//! signs back by majority vote, locks onto the preamble, decodes the claim and
//! compares its owner fingerprint against a claimed owner, optionally backed by
//! an external ledger.
//!
//! # Quick Start
//!
//! ```no_run
//! use dct_watermark::{EmbedRequest, WatermarkEngine, WatermarkOptions};
//!
//! let engine = WatermarkEngine::new(WatermarkOptions::default());
//! let mut img = image::open("photo.png").unwrap().to_rgb8();
//! let owner = "0xa1b2c3d4e5f60718293a4b5c6d7e8f9012345678";
//! engine.embed(&mut img, owner, &EmbedRequest::default()).unwrap();
//! img.save("photo_watermarked.png").unwrap();
//! ```
//!
//! # Verification
//!
//! Verification never fails outright; problems are reported in the result.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dct_watermark::{InMemoryLedger, WatermarkEngine, WatermarkOptions};
//!
//! let engine = WatermarkEngine::new(WatermarkOptions::default())
//!     .with_ledger(Arc::new(InMemoryLedger::new()));
//! let img = image::open("photo_watermarked.png").unwrap().to_rgb8();
//! let result = engine.verify(&img, "0xa1b2c3d4e5f60718293a4b5c6d7e8f9012345678");
//! println!("Verified: {}, confidence: {:.0}%", result.verified, result.confidence * 100.0);
//! ```
//!
//! # Capacity
//!
//! An image holds `floor(w/8) * floor(h/8)` bits. The smallest frame is a few
//! hundred bits, so images below roughly 200x200 cannot carry a watermark.

#![deny(missing_docs)]

pub mod channel;
pub mod embedding;
mod engine;
pub mod error;
pub mod extraction;
pub mod framing;
pub mod ledger;
pub mod payload;
pub mod transform;
pub mod verifier;

pub use engine::{
    default_output_path, is_supported_image, pixel_hash, save_image, EmbedReport, EmbedRequest,
    EmbeddingCheck, ProcessResult, WatermarkEngine, WatermarkOptions,
};
pub use error::{Error, Result};
pub use ledger::{InMemoryLedger, Ledger, LedgerError};
pub use payload::{LedgerFacts, WatermarkPayload};
pub use verifier::{LedgerStatus, OwnershipVerifier, VerificationResult};
