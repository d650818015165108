//! Embed a watermark into an image, then verify it against an in-memory ledger.
//!
//! Usage:
//! ```sh
//! cargo run --example embed_and_verify -- input.png output.png 0xa1b2c3d4e5f6...
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use dct_watermark::{
    save_image, EmbedRequest, InMemoryLedger, WatermarkEngine, WatermarkOptions,
};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <input> <output> <owner>", args[0]);
        process::exit(1);
    }

    let (input, output, owner) = (&args[1], &args[2], &args[3]);

    let ledger = Arc::new(InMemoryLedger::new());
    let engine = WatermarkEngine::new(WatermarkOptions::default()).with_ledger(ledger);

    let mut img = image::open(input).expect("failed to open input").to_rgb8();
    let report = engine
        .embed(&mut img, owner, &EmbedRequest::default())
        .expect("failed to embed");
    println!(
        "Embedded {} bits into {} blocks ({} dropped)",
        report.frame_bits, report.stats.blocks_written, report.stats.bits_dropped
    );
    save_image(&img, output.as_ref()).expect("failed to save output");

    let reloaded = image::open(output).expect("failed to reopen output").to_rgb8();
    let result = engine.verify(&reloaded, owner);
    println!(
        "Verified: {} (watermark: {}, ledger: {:?}, confidence: {:.0}%)",
        result.verified,
        result.watermark_match,
        result.ledger_match,
        result.confidence * 100.0
    );
    if !result.verified {
        process::exit(1);
    }
}
