//! Embed and verify orchestration over whole images and files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbImage};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::channel::{PixelChannel, GREEN};
use crate::embedding::{embed_bits, EmbedStats, DEFAULT_ALPHA};
use crate::error::{Error, Result};
use crate::extraction::extract_bits;
use crate::framing::{self, encode_payload};
use crate::ledger::{Ledger, ALREADY_REGISTERED};
use crate::payload::{unix_now, LedgerFacts, WatermarkPayload};
use crate::transform::BLOCK_SIZE;
use crate::verifier::{OwnershipVerifier, VerificationResult};

/// Options controlling embedding and verification.
#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    /// Embedding strength α; coefficients move by `α * 100`.
    pub strength: f64,
    /// Never register with the ledger while embedding.
    pub skip_ledger_registration: bool,
    /// Re-extract after embedding and compare with the intended payload.
    pub self_check: bool,
    /// Enable verbose logging.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            strength: DEFAULT_ALPHA,
            skip_ledger_registration: false,
            self_check: true,
            verbose: false,
            quiet: false,
        }
    }
}

/// Caller-supplied facts for one embed.
#[derive(Debug, Clone, Default)]
pub struct EmbedRequest {
    /// Hex SHA-256 of the source content; hashed from the pixels when absent.
    pub content_hash: Option<String>,
    /// Ledger facts to embed as-is, bypassing ledger registration.
    pub ledger_facts: Option<LedgerFacts>,
    /// Embed time in UNIX seconds; now when absent.
    pub timestamp: Option<u64>,
}

/// Comparison of a freshly embedded payload with what extraction returns.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingCheck {
    /// Owner, hash and version all survived.
    pub matches: bool,
    /// Fraction of payload fields that survived.
    pub similarity: f64,
    /// Why extraction failed, if it did.
    pub error: Option<String>,
}

/// Result of embedding a watermark into an image.
#[derive(Debug, Clone)]
pub struct EmbedReport {
    /// The payload that was embedded.
    pub payload: WatermarkPayload,
    /// Content hash (hex) the payload was derived from.
    pub content_hash: String,
    /// Length of the frame in bits.
    pub frame_bits: usize,
    /// Block counters of the embed pass.
    pub stats: EmbedStats,
    /// Self check, when enabled.
    pub check: Option<EmbeddingCheck>,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded (for verification: whether ownership verified).
    pub success: bool,
    /// Whether the file was skipped.
    pub skipped: bool,
    /// Verification confidence score, `0` for embeds.
    pub confidence: f64,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            skipped: false,
            confidence: 0.0,
            message: String::new(),
        }
    }
}

/// The watermark engine.
///
/// Create once and reuse for multiple images. A ledger is optional; without
/// one, embeds carry no ledger facts and verification is watermark-only.
#[derive(Clone, Default)]
pub struct WatermarkEngine {
    options: WatermarkOptions,
    ledger: Option<Arc<dyn Ledger>>,
}

impl WatermarkEngine {
    /// Create an engine without a ledger.
    #[must_use]
    pub fn new(options: WatermarkOptions) -> Self {
        Self {
            options,
            ledger: None,
        }
    }

    /// Attach a ledger collaborator.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// The engine's options.
    #[must_use]
    pub fn options(&self) -> &WatermarkOptions {
        &self.options
    }

    fn verifier(&self) -> OwnershipVerifier<'_> {
        match self.ledger.as_deref() {
            Some(ledger) => OwnershipVerifier::with_ledger(ledger),
            None => OwnershipVerifier::new(),
        }
    }

    /// Embed an ownership watermark for `owner_id` into the green channel of `image`.
    ///
    /// If the frame needs more blocks than the image has, a truncated prefix
    /// is embedded and [`EmbedStats::bits_dropped`] reports the loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or framed.
    pub fn embed(
        &self,
        image: &mut RgbImage,
        owner_id: &str,
        request: &EmbedRequest,
    ) -> Result<EmbedReport> {
        let content_hash = request
            .content_hash
            .clone()
            .unwrap_or_else(|| pixel_hash(image));
        let hex_hash = content_hash.trim_start_matches("0x");
        let timestamp = request.timestamp.unwrap_or_else(unix_now);
        debug!(owner = owner_id, hash = %hex_hash, "embedding watermark");

        let ledger_facts = match (&request.ledger_facts, self.ledger.as_deref()) {
            (Some(facts), _) => Some(facts.clone()),
            (None, Some(ledger)) if !self.options.skip_ledger_registration => Some(
                self.register(ledger, image, owner_id, hex_hash, timestamp),
            ),
            (None, Some(_)) => {
                debug!("ledger registration skipped by options");
                None
            }
            (None, None) => None,
        };

        let payload = WatermarkPayload::new(owner_id, hex_hash, timestamp, ledger_facts);
        let bits = encode_payload(&payload)?;

        let mut channel = PixelChannel::green(image);
        let stats = embed_bits(&mut channel, &bits, self.options.strength);
        channel.write_to_rgb(image, GREEN);
        info!(
            frame_bits = bits.len(),
            written = stats.blocks_written,
            dropped = stats.bits_dropped,
            "watermark embedded"
        );

        let check = if self.options.self_check {
            Some(self.check_embedding(image, &payload))
        } else {
            None
        };

        Ok(EmbedReport {
            payload,
            content_hash: hex_hash.to_string(),
            frame_bits: bits.len(),
            stats,
            check,
        })
    }

    /// Register the content with the ledger, falling back to unregistered facts.
    fn register(
        &self,
        ledger: &dyn Ledger,
        image: &RgbImage,
        owner_id: &str,
        hex_hash: &str,
        timestamp: u64,
    ) -> LedgerFacts {
        let data_hash = format!("0x{hex_hash}");

        match ledger.is_registered(&data_hash) {
            Ok(true) => {
                return match ledger.verify_ownership(&data_hash, owner_id) {
                    Ok(record) if record.confirms_owner() => {
                        info!(hash = %data_hash, "content already registered to this owner");
                        LedgerFacts {
                            registered: true,
                            registration_id: record.registration_id.unwrap_or_default(),
                            tx_ref: ALREADY_REGISTERED.to_string(),
                            content_hash: data_hash,
                        }
                    }
                    Ok(_) => {
                        warn!(hash = %data_hash, "content registered to a different owner");
                        LedgerFacts::unregistered(data_hash)
                    }
                    Err(e) => {
                        warn!(error = %Error::from(e), "ledger lookup failed, embedding without registration");
                        LedgerFacts::unregistered(data_hash)
                    }
                };
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %Error::from(e), "ledger lookup failed, embedding without registration");
                return LedgerFacts::unregistered(data_hash);
            }
        }

        let metadata = serde_json::json!({
            "size": format!("{}x{}", image.width(), image.height()),
            "owner": owner_id,
            "imageHash": hex_hash.chars().take(16).collect::<String>(),
            "timestamp": timestamp,
        });
        let params = serde_json::json!({
            "algorithm": "DCT",
            "blockSize": BLOCK_SIZE,
            "alpha": self.options.strength,
        });

        match ledger.register_resource(
            &data_hash,
            &metadata.to_string(),
            &params.to_string(),
            owner_id,
        ) {
            Ok(registration) => {
                info!(id = %registration.registration_id, "content registered with ledger");
                LedgerFacts {
                    registered: true,
                    registration_id: registration.registration_id,
                    tx_ref: registration.tx_ref,
                    content_hash: data_hash,
                }
            }
            Err(e) => {
                warn!(error = %Error::from(e), "ledger registration failed, embedding without registration");
                LedgerFacts::unregistered(data_hash)
            }
        }
    }

    /// Re-extract the watermark and compare it with `expected`.
    #[must_use]
    pub fn check_embedding(&self, image: &RgbImage, expected: &WatermarkPayload) -> EmbeddingCheck {
        let extracted = extract_bits(&PixelChannel::green(image));
        match framing::decode(&extracted.bits) {
            Ok(decoded) => {
                let check = EmbeddingCheck {
                    matches: decoded.payload.core_matches(expected),
                    similarity: decoded.payload.similarity(expected),
                    error: None,
                };
                debug!(?check, "embedding self check");
                check
            }
            Err(e) => {
                warn!(error = %e, "embedding self check could not extract the watermark");
                EmbeddingCheck {
                    matches: false,
                    similarity: 0.0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Verify that `claimed_owner` owns `image`.
    #[must_use]
    pub fn verify(&self, image: &RgbImage, claimed_owner: &str) -> VerificationResult {
        self.verifier()
            .verify(&PixelChannel::green(image), claimed_owner)
    }

    /// Embed a watermark into an image file and save the result.
    ///
    /// The content hash is the SHA-256 of the input file bytes. Unlike
    /// [`WatermarkEngine::embed`], a frame that does not fit is reported as a
    /// failure and nothing is written.
    #[must_use]
    pub fn embed_file(&self, input: &Path, output: &Path, owner_id: &str) -> ProcessResult {
        let mut result = ProcessResult::new(input);

        let bytes = match std::fs::read(input) {
            Ok(b) => b,
            Err(e) => {
                result.message = format!("Failed to read: {e}");
                return result;
            }
        };
        let mut rgb_img = match image::load_from_memory(&bytes) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };

        let request = EmbedRequest {
            content_hash: Some(hex::encode(Sha256::digest(&bytes))),
            ..EmbedRequest::default()
        };
        let report = match self.embed(&mut rgb_img, owner_id, &request) {
            Ok(r) => r,
            Err(e) => {
                result.message = format!("Failed to embed: {e}");
                return result;
            }
        };

        if !report.stats.is_complete() {
            let (w, h) = (rgb_img.width(), rgb_img.height());
            result.message = format!(
                "Image too small ({w}x{h}) for {}-bit watermark: {} bits dropped, {} blocks failed",
                report.frame_bits, report.stats.bits_dropped, report.stats.blocks_failed
            );
            return result;
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match save_image(&rgb_img, output) {
            Ok(()) => {
                result.success = true;
                result.message = match &report.check {
                    Some(check) if !check.matches => format!(
                        "Watermark embedded ({} bits), self check failed ({:.0}% similarity)",
                        report.frame_bits,
                        check.similarity * 100.0
                    ),
                    _ => format!("Watermark embedded ({} bits)", report.frame_bits),
                };
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }

    /// Verify ownership of a single image file.
    #[must_use]
    pub fn verify_file(&self, path: &Path, claimed_owner: &str) -> ProcessResult {
        let mut result = ProcessResult::new(path);

        let rgb_img = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };

        let verification = self.verify(&rgb_img, claimed_owner);
        result.success = verification.verified;
        result.confidence = verification.confidence;
        result.message = describe(&verification);
        result
    }

    /// Verify every supported image in a directory.
    ///
    /// Uses parallel iteration when the `parallel` feature is enabled (via rayon).
    #[must_use]
    pub fn verify_directory(&self, input_dir: &Path, claimed_owner: &str) -> Vec<ProcessResult> {
        let entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                let mut result = ProcessResult::new(input_dir);
                result.message = format!("Failed to read directory: {e}");
                return vec![result];
            }
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            entries
                .par_iter()
                .map(|path| self.verify_file(path, claimed_owner))
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            entries
                .iter()
                .map(|path| self.verify_file(path, claimed_owner))
                .collect()
        }
    }
}

fn describe(verification: &VerificationResult) -> String {
    if let Some(err) = &verification.error {
        return format!("No watermark recovered: {err}");
    }
    let extracted = verification.extracted_owner().unwrap_or_default();
    let ledger = match verification.ledger_match {
        Some(true) => ", ledger confirmed",
        Some(false) => ", ledger rejected",
        None => "",
    };
    if verification.watermark_match {
        format!("Owner {extracted} matches{ledger}")
    } else {
        format!(
            "Owner mismatch: embedded {extracted}, claimed {}{ledger}",
            verification.expected_owner
        )
    }
}

/// Hex SHA-256 over the dimensions and raw pixels of an image.
#[must_use]
pub fn pixel_hash(image: &RgbImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_be_bytes());
    hasher.update(image.height().to_be_bytes());
    hasher.update(image.as_raw());
    hex::encode(hasher.finalize())
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tif" | "tiff"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// Lossless formats keep the watermark intact; JPEG is written at quality
/// 100, which usually preserves it but is not guaranteed to.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(&DynamicImage::ImageRgb8(img.clone()))?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp | ImageFormat::Tiff => {
            img.save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.png"` becomes `"photo_watermarked.png"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_watermarked.{ext}"))
}
