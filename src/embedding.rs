//! Block-wise bit embedding into DCT coefficients.
//!
//! One block carries one bit. The bit is written redundantly into four
//! mid-frequency coefficients by forcing their sign while keeping (and
//! growing) their magnitude:
//!
//! - bit 1: `c = |c| + strength`
//! - bit 0: `c = -(|c| + strength)`
//!
//! where `strength = alpha * 100` in coefficient units.

use tracing::{debug, info, warn};

use crate::channel::PixelChannel;
use crate::error::{Error, Result};
use crate::transform::{forward_dct, inverse_dct, is_finite_block, Block, BLOCK_SIZE};

/// Coefficients (row, column) that carry the bit of a block.
pub const EMBEDDING_POSITIONS: [(usize, usize); 4] = [(3, 3), (3, 4), (4, 3), (4, 4)];

/// Default embedding strength.
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Scale from `alpha` to coefficient units.
pub const ALPHA_SCALE: f64 = 100.0;

/// Outcome counters of one embed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedStats {
    /// Blocks that were modulated and written back.
    pub blocks_written: usize,
    /// Blocks whose transform failed; their bit is lost.
    pub blocks_failed: usize,
    /// Bits that did not fit into the image.
    pub bits_dropped: usize,
}

impl EmbedStats {
    /// Whether every bit found a block.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bits_dropped == 0 && self.blocks_failed == 0
    }
}

/// Force the sign of every embedding coefficient to encode `bit`.
pub fn modulate_coefficients(coeffs: &mut Block, bit: u8, strength: f64) {
    for &(row, col) in &EMBEDDING_POSITIONS {
        let c = &mut coeffs[row * BLOCK_SIZE + col];
        let magnitude = c.abs() + strength;
        *c = if bit == 1 { magnitude } else { -magnitude };
    }
}

fn embed_block(
    channel: &mut PixelChannel,
    block_x: u32,
    block_y: u32,
    bit: u8,
    strength: f64,
) -> Result<()> {
    let mut coeffs = forward_dct(&channel.read_block(block_x, block_y));
    modulate_coefficients(&mut coeffs, bit, strength);
    let samples = inverse_dct(&coeffs);
    if !is_finite_block(&samples) {
        return Err(Error::Transform { block_x, block_y });
    }
    channel.write_block(block_x, block_y, &samples);
    Ok(())
}

/// Embed `bits` into `channel`, one bit per block in scan order.
///
/// Stops when the bits run out; blocks past that point are untouched. Bits
/// beyond the block count are dropped and counted in
/// [`EmbedStats::bits_dropped`]. A failing block is counted and skipped.
pub fn embed_bits(channel: &mut PixelChannel, bits: &[u8], alpha: f64) -> EmbedStats {
    let strength = alpha * ALPHA_SCALE;
    let capacity = channel.block_count();
    let mut stats = EmbedStats {
        bits_dropped: bits.len().saturating_sub(capacity),
        ..EmbedStats::default()
    };
    if stats.bits_dropped > 0 {
        warn!(
            bits = bits.len(),
            capacity, "frame exceeds image capacity, embedding a truncated prefix"
        );
    }

    let coords: Vec<_> = channel.block_coords().collect();
    for (&bit, (block_x, block_y)) in bits.iter().zip(coords) {
        match embed_block(channel, block_x, block_y, bit, strength) {
            Ok(()) => stats.blocks_written += 1,
            Err(e) => {
                warn!(error = %e, "block embedding failed");
                stats.blocks_failed += 1;
            }
        }
    }

    debug!(?stats, "embedding pass finished");
    info!(
        written = stats.blocks_written,
        failed = stats.blocks_failed,
        "embedded watermark bits"
    );
    stats
}
