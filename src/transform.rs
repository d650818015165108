//! Separable 8x8 block DCT-II and its inverse.
//!
//! Every 1D pass rounds its output to six fractional digits before the next
//! pass consumes it. Embedding and extraction both run through these exact
//! functions, so the rounding keeps the two sides bit-for-bit reproducible
//! regardless of how the surrounding float code is optimized.

use std::f64::consts::PI;
use std::sync::OnceLock;

/// Side length of a transform block in samples.
pub const BLOCK_SIZE: usize = 8;

/// Number of samples (and coefficients) in one block.
pub const BLOCK_LEN: usize = BLOCK_SIZE * BLOCK_SIZE;

/// Decimal scale used by the fixed-precision rounding step (six digits).
const FIXED_PRECISION: f64 = 1_000_000.0;

/// A block of samples or coefficients in row-major order (`row * 8 + col`).
pub type Block = [f64; BLOCK_LEN];

/// `COSINE[k][n] = cos(PI / N * (n + 0.5) * k)`
fn cosine_table() -> &'static [[f64; BLOCK_SIZE]; BLOCK_SIZE] {
    static TABLE: OnceLock<[[f64; BLOCK_SIZE]; BLOCK_SIZE]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0.0; BLOCK_SIZE]; BLOCK_SIZE];
        #[allow(clippy::cast_precision_loss)]
        let factor = PI / BLOCK_SIZE as f64;
        for (k, row) in table.iter_mut().enumerate() {
            for (n, value) in row.iter_mut().enumerate() {
                #[allow(clippy::cast_precision_loss)]
                {
                    *value = (factor * (n as f64 + 0.5) * k as f64).cos();
                }
            }
        }
        table
    })
}

/// Orthonormal scale factor for frequency index `k`.
fn scale(k: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = BLOCK_SIZE as f64;
    if k == 0 {
        (1.0 / n).sqrt()
    } else {
        (2.0 / n).sqrt()
    }
}

/// Round to six fractional digits.
#[must_use]
pub fn round_fixed(value: f64) -> f64 {
    (value * FIXED_PRECISION).round() / FIXED_PRECISION
}

fn dct_1d(samples: &[f64; BLOCK_SIZE]) -> [f64; BLOCK_SIZE] {
    let cos = cosine_table();
    let mut out = [0.0; BLOCK_SIZE];
    for (k, coeff) in out.iter_mut().enumerate() {
        let sum: f64 = samples
            .iter()
            .zip(cos[k].iter())
            .map(|(s, c)| s * c)
            .sum();
        *coeff = round_fixed(sum * scale(k));
    }
    out
}

fn idct_1d(coeffs: &[f64; BLOCK_SIZE]) -> [f64; BLOCK_SIZE] {
    let cos = cosine_table();
    let mut out = [0.0; BLOCK_SIZE];
    for (n, sample) in out.iter_mut().enumerate() {
        let mut sum = coeffs[0] * scale(0);
        for k in 1..BLOCK_SIZE {
            sum += coeffs[k] * scale(k) * cos[k][n];
        }
        *sample = round_fixed(sum);
    }
    out
}

/// Forward 2D DCT: transform every row, then every resulting column.
#[must_use]
pub fn forward_dct(block: &Block) -> Block {
    let mut temp = [0.0; BLOCK_LEN];
    for row in 0..BLOCK_SIZE {
        let mut line = [0.0; BLOCK_SIZE];
        line.copy_from_slice(&block[row * BLOCK_SIZE..(row + 1) * BLOCK_SIZE]);
        temp[row * BLOCK_SIZE..(row + 1) * BLOCK_SIZE].copy_from_slice(&dct_1d(&line));
    }

    let mut out = [0.0; BLOCK_LEN];
    for col in 0..BLOCK_SIZE {
        let mut line = [0.0; BLOCK_SIZE];
        for (row, v) in line.iter_mut().enumerate() {
            *v = temp[row * BLOCK_SIZE + col];
        }
        for (row, v) in dct_1d(&line).into_iter().enumerate() {
            out[row * BLOCK_SIZE + col] = v;
        }
    }
    out
}

/// Inverse 2D DCT: transform every column, then every resulting row.
///
/// Output samples are rounded to the nearest integer but not clamped; the
/// caller clamps when writing back to 8-bit storage (see [`clamp_sample`]).
#[must_use]
pub fn inverse_dct(coeffs: &Block) -> Block {
    let mut temp = [0.0; BLOCK_LEN];
    for col in 0..BLOCK_SIZE {
        let mut line = [0.0; BLOCK_SIZE];
        for (row, v) in line.iter_mut().enumerate() {
            *v = coeffs[row * BLOCK_SIZE + col];
        }
        for (row, v) in idct_1d(&line).into_iter().enumerate() {
            temp[row * BLOCK_SIZE + col] = v;
        }
    }

    let mut out = [0.0; BLOCK_LEN];
    for row in 0..BLOCK_SIZE {
        let mut line = [0.0; BLOCK_SIZE];
        line.copy_from_slice(&temp[row * BLOCK_SIZE..(row + 1) * BLOCK_SIZE]);
        for (col, v) in idct_1d(&line).into_iter().enumerate() {
            out[row * BLOCK_SIZE + col] = v.round();
        }
    }
    out
}

/// Clamp a reconstructed sample into `[0, 255]`.
#[must_use]
pub fn clamp_sample(value: f64) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// Whether every value of a block is finite.
#[must_use]
pub fn is_finite_block(block: &Block) -> bool {
    block.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured_block() -> Block {
        let mut block = [0.0; BLOCK_LEN];
        for (i, v) in block.iter_mut().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            {
                *v = ((i * 37 + 11) % 256) as f64;
            }
        }
        block
    }

    #[test]
    fn round_fixed_keeps_six_digits() {
        assert!((round_fixed(1.234_567_89) - 1.234_568).abs() < 1e-12);
        assert!((round_fixed(-0.000_000_4)).abs() < 1e-12);
    }

    #[test]
    fn flat_block_has_only_dc() {
        let block = [128.0; BLOCK_LEN];
        let coeffs = forward_dct(&block);
        assert!((coeffs[0] - 1024.0).abs() < 1e-4, "DC was {}", coeffs[0]);
        for (i, &c) in coeffs.iter().enumerate().skip(1) {
            assert!(c.abs() < 1e-5, "AC coefficient {i} should vanish, got {c}");
        }
    }

    #[test]
    fn forward_matches_direct_2d_formula() {
        let block = textured_block();
        let coeffs = forward_dct(&block);
        let cos = cosine_table();
        for u in 0..BLOCK_SIZE {
            for v in 0..BLOCK_SIZE {
                let mut sum = 0.0;
                for y in 0..BLOCK_SIZE {
                    for x in 0..BLOCK_SIZE {
                        sum += block[y * BLOCK_SIZE + x] * cos[u][y] * cos[v][x];
                    }
                }
                let expected = sum * scale(u) * scale(v);
                let got = coeffs[u * BLOCK_SIZE + v];
                assert!(
                    (got - expected).abs() < 1e-4,
                    "({u},{v}) expected {expected}, got {got}"
                );
            }
        }
    }

    #[test]
    fn integer_block_round_trips_exactly() {
        let block = textured_block();
        let restored = inverse_dct(&forward_dct(&block));
        for (i, (a, b)) in block.iter().zip(restored.iter()).enumerate() {
            assert!((a - b).abs() < f64::EPSILON, "sample {i}: {a} vs {b}");
        }
    }

    #[test]
    fn transform_is_deterministic() {
        let block = textured_block();
        assert_eq!(forward_dct(&block), forward_dct(&block));
    }

    #[test]
    fn clamp_sample_saturates() {
        assert_eq!(clamp_sample(-12.0), 0);
        assert_eq!(clamp_sample(300.0), 255);
        assert_eq!(clamp_sample(127.6), 128);
    }

    #[test]
    fn non_finite_block_is_detected() {
        let mut block = [0.0; BLOCK_LEN];
        assert!(is_finite_block(&block));
        block[5] = f64::NAN;
        assert!(!is_finite_block(&block));
    }
}
