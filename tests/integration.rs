use std::sync::Arc;

use dct_watermark::{
    default_output_path, save_image, EmbedRequest, Error, InMemoryLedger, LedgerStatus,
    WatermarkEngine, WatermarkOptions,
};
use image::{Rgb, RgbImage};

const OWNER: &str = "0xa1b2c3d4e5f60718293a4b5c6d7e8f9012345678";
const OTHER: &str = "0x5555666677778888999900001111222233334444";

fn gray(size: u32) -> RgbImage {
    RgbImage::from_pixel(size, size, Rgb([128, 128, 128]))
}

/// Gradient with deterministic pseudo-random texture.
fn textured(size: u32) -> RgbImage {
    let mut state: u32 = 0x2545_f491;
    RgbImage::from_fn(size, size, |x, y| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let noise = i32::try_from(state >> 27).unwrap() - 16;
        let base = i32::try_from((x + y) * 200 / (2 * size)).unwrap() + 28;
        let g = u8::try_from((base + noise).clamp(0, 255)).unwrap();
        Rgb([g / 2, g, 255 - g])
    })
}

fn request_at(timestamp: u64) -> EmbedRequest {
    EmbedRequest {
        timestamp: Some(timestamp),
        ..EmbedRequest::default()
    }
}

#[test]
fn round_trip_on_gray_image() {
    let engine = WatermarkEngine::default();
    let mut img = gray(256);
    let report = engine.embed(&mut img, OWNER, &request_at(1_700_000_000)).unwrap();
    assert_eq!(report.frame_bits, 472);
    assert!(report.stats.is_complete());
    assert!(report.check.unwrap().matches);

    let result = engine.verify(&img, OWNER);
    assert!(result.verified);
    assert!(result.watermark_match);
    assert_eq!(result.ledger_match, None);
    assert_eq!(result.ledger_status, LedgerStatus::NotConfigured);
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    assert!(result.checksum_valid());
    assert_eq!(result.extracted_owner(), Some("a1b2c3d4"));

    let decoded = result.decoded.unwrap();
    assert_eq!(decoded.payload.timestamp, 1_700_000_000);
    assert_eq!(decoded.payload.image_hash, &report.content_hash[..8]);
    assert_eq!(decoded.sync_position, 0);
    assert_eq!(decoded.sync_score, 16);
}

#[test]
fn round_trip_on_textured_image() {
    let engine = WatermarkEngine::default();
    let mut img = textured(256);
    engine.embed(&mut img, OWNER, &EmbedRequest::default()).unwrap();
    let result = engine.verify(&img, OWNER);
    assert!(result.verified);
    assert!(result.checksum_valid());
}

#[test]
fn survives_uniform_brightness_shift() {
    let engine = WatermarkEngine::default();
    let mut img = gray(256);
    engine.embed(&mut img, OWNER, &EmbedRequest::default()).unwrap();
    for p in img.pixels_mut() {
        p[1] = p[1].saturating_add(10);
    }
    assert!(engine.verify(&img, OWNER).verified);
}

#[test]
fn rejects_a_different_owner() {
    let engine = WatermarkEngine::default();
    let mut img = gray(256);
    engine.embed(&mut img, OWNER, &EmbedRequest::default()).unwrap();

    let result = engine.verify(&img, OTHER);
    assert!(!result.verified);
    assert!(!result.watermark_match);
    assert_eq!(result.expected_owner, "55556666");
    assert_eq!(result.extracted_owner(), Some("a1b2c3d4"));
    assert!(result.error.is_none());
}

#[test]
fn unmarked_image_does_not_verify() {
    let engine = WatermarkEngine::default();
    let result = engine.verify(&gray(256), OWNER);
    assert!(!result.verified);
    assert!(result.confidence.abs() < f64::EPSILON);
    assert!(matches!(result.error, Some(Error::SyncNotFound { .. })));
}

#[test]
fn small_image_is_below_capacity() {
    let engine = WatermarkEngine::default();
    let mut img = gray(64);
    let report = engine.embed(&mut img, OWNER, &request_at(1_700_000_000)).unwrap();
    assert_eq!(report.stats.blocks_written, 64);
    assert_eq!(report.stats.bits_dropped, 472 - 64);

    let result = engine.verify(&img, OWNER);
    assert!(!result.verified);
    assert!(result.confidence.abs() < f64::EPSILON);
    assert!(matches!(
        result.error,
        Some(Error::InsufficientBits {
            needed: 472,
            available: 64
        })
    ));
}

#[test]
fn ledger_backed_round_trip() {
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = WatermarkEngine::default().with_ledger(ledger.clone());
    let mut img = gray(512);
    let report = engine.embed(&mut img, OWNER, &EmbedRequest::default()).unwrap();
    assert!(report.payload.ledger.as_ref().unwrap().registered);
    assert!(report.stats.is_complete());
    assert_eq!(ledger.len(), 1);

    let result = engine.verify(&img, OWNER);
    assert!(result.verified);
    assert_eq!(result.ledger_match, Some(true));
    assert_eq!(result.ledger_status, LedgerStatus::Consulted);
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);

    let other = engine.verify(&img, OTHER);
    assert!(!other.verified);
    assert_eq!(other.ledger_match, Some(false));
}

#[test]
fn ledger_outage_degrades_to_watermark_only() {
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = WatermarkEngine::default().with_ledger(ledger.clone());
    let mut img = gray(512);
    engine.embed(&mut img, OWNER, &EmbedRequest::default()).unwrap();

    ledger.set_offline(true);
    let result = engine.verify(&img, OWNER);
    assert!(result.verified);
    assert_eq!(result.ledger_match, None);
    assert_eq!(result.ledger_status, LedgerStatus::Unavailable);
}

#[test]
fn ledger_without_record_rejects_claim() {
    let engine = WatermarkEngine::default().with_ledger(Arc::new(InMemoryLedger::new()));
    let mut img = gray(512);
    let facts_only = EmbedRequest {
        ledger_facts: Some(dct_watermark::LedgerFacts {
            registered: true,
            registration_id: "0x01".to_string(),
            tx_ref: "0x02".to_string(),
            content_hash: format!("0x{}", "ab".repeat(32)),
        }),
        ..EmbedRequest::default()
    };
    engine.embed(&mut img, OWNER, &facts_only).unwrap();

    let result = engine.verify(&img, OWNER);
    assert!(result.watermark_match);
    assert_eq!(result.ledger_match, Some(false));
    assert!(!result.verified);
}

#[test]
fn weaker_strength_still_round_trips_on_flat_images() {
    let options = WatermarkOptions {
        strength: 0.1,
        ..WatermarkOptions::default()
    };
    let engine = WatermarkEngine::new(options);
    let mut img = gray(256);
    engine.embed(&mut img, OWNER, &EmbedRequest::default()).unwrap();
    assert!(engine.verify(&img, OWNER).verified);
}

#[test]
fn embed_and_verify_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.png");
    save_image(&textured(256), &input).unwrap();

    let engine = WatermarkEngine::default();
    let output = default_output_path(&input);
    let embedded = engine.embed_file(&input, &output, OWNER);
    assert!(embedded.success, "{}", embedded.message);
    assert!(output.exists());

    let verified = engine.verify_file(&output, OWNER);
    assert!(verified.success, "{}", verified.message);
    assert!(verified.confidence > 0.9);

    let rejected = engine.verify_file(&output, OTHER);
    assert!(!rejected.success);
    assert!(rejected.message.contains("mismatch"));
}

#[test]
fn embed_file_refuses_undersized_images() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tiny.png");
    save_image(&gray(64), &input).unwrap();
    let output = dir.path().join("tiny_out.png");

    let result = WatermarkEngine::default().embed_file(&input, &output, OWNER);
    assert!(!result.success);
    assert!(result.message.contains("too small"));
    assert!(!output.exists());
}

#[test]
fn verify_directory_reports_each_image() {
    let dir = tempfile::tempdir().unwrap();
    let engine = WatermarkEngine::default();

    let mut marked = gray(256);
    engine.embed(&mut marked, OWNER, &EmbedRequest::default()).unwrap();
    save_image(&marked, &dir.path().join("marked.png")).unwrap();
    save_image(&gray(256), &dir.path().join("plain.bmp")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let mut results = engine.verify_directory(dir.path(), OWNER);
    results.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(results.len(), 2);
    assert!(results[0].path.ends_with("marked.png"));
    assert!(results[0].success);
    assert!(results[1].path.ends_with("plain.bmp"));
    assert!(!results[1].success);
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let result = WatermarkEngine::default().verify_file(&dir.path().join("gone.png"), OWNER);
    assert!(!result.success);
    assert!(result.message.starts_with("Failed to load"));
}
