//! Block-wise bit recovery by majority vote.

use tracing::{debug, warn};

use crate::channel::PixelChannel;
use crate::embedding::EMBEDDING_POSITIONS;
use crate::error::{Error, Result};
use crate::transform::{forward_dct, is_finite_block, Block, BLOCK_SIZE};

/// Minimum number of non-negative coefficients for a block to read as 1.
pub const MAJORITY: usize = 2;

/// Bits recovered from a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedBits {
    /// One bit per scanned block, in scan order.
    pub bits: Vec<u8>,
    /// Blocks whose transform failed; each contributed a 0.
    pub blocks_failed: usize,
}

/// Decode a block's bit from the signs of its embedding coefficients.
///
/// Each coefficient votes 1 when it is `>= 0`. The block reads as 1 when at
/// least [`MAJORITY`] of the four votes are 1, so a 2-2 split decodes to 1.
#[must_use]
pub fn vote_bit(coeffs: &Block) -> u8 {
    let ones = EMBEDDING_POSITIONS
        .iter()
        .filter(|&&(row, col)| coeffs[row * BLOCK_SIZE + col] >= 0.0)
        .count();
    u8::from(ones >= MAJORITY)
}

fn extract_block(channel: &PixelChannel, block_x: u32, block_y: u32) -> Result<u8> {
    let coeffs = forward_dct(&channel.read_block(block_x, block_y));
    if !is_finite_block(&coeffs) {
        return Err(Error::Transform { block_x, block_y });
    }
    Ok(vote_bit(&coeffs))
}

/// Read one bit from every block of `channel` in scan order.
#[must_use]
pub fn extract_bits(channel: &PixelChannel) -> ExtractedBits {
    let coords: Vec<_> = channel.block_coords().collect();

    #[cfg(feature = "parallel")]
    let results: Vec<Result<u8>> = {
        use rayon::prelude::*;
        coords
            .par_iter()
            .map(|&(bx, by)| extract_block(channel, bx, by))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<u8>> = coords
        .iter()
        .map(|&(bx, by)| extract_block(channel, bx, by))
        .collect();

    let mut extracted = ExtractedBits {
        bits: Vec::with_capacity(results.len()),
        blocks_failed: 0,
    };
    for result in results {
        match result {
            Ok(bit) => extracted.bits.push(bit),
            Err(e) => {
                warn!(error = %e, "block extraction failed, reading as 0");
                extracted.blocks_failed += 1;
                extracted.bits.push(0);
            }
        }
    }

    debug!(
        bits = extracted.bits.len(),
        failed = extracted.blocks_failed,
        "extraction pass finished"
    );
    extracted
}
