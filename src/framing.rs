//! Bit framing of the payload.
//!
//! Frame layout, one bit per embedded block:
//!
//! ```text
//! [16 bits] sync preamble 1100110000110011
//! [16 bits] payload length in bytes (big-endian)
//! [8*N    ] payload bytes, MSB first
//! [8 bits ] checksum: XOR of all payload bits
//! ```
//!
//! Bits are `u8` values that are always `0` or `1`.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::payload::WatermarkPayload;

/// Sync preamble prefixed to every frame.
pub const PREAMBLE: [u8; 16] = [1, 1, 0, 0, 1, 1, 0, 0, 0, 0, 1, 1, 0, 0, 1, 1];

/// Width of the length field.
pub const LENGTH_BITS: usize = 16;

/// Width of the checksum field.
pub const CHECKSUM_BITS: usize = 8;

/// Smallest possible frame (empty payload).
pub const MIN_FRAME_BITS: usize = PREAMBLE.len() + LENGTH_BITS + CHECKSUM_BITS;

/// Largest payload the length field can declare.
pub const MAX_PAYLOAD_BYTES: usize = u16::MAX as usize;

/// Number of bits in a frame carrying `payload_len` bytes.
#[must_use]
pub fn frame_bit_len(payload_len: usize) -> usize {
    MIN_FRAME_BITS + payload_len * 8
}

fn push_bits(bits: &mut Vec<u8>, value: u16, width: usize) {
    for shift in (0..width).rev() {
        #[allow(clippy::cast_possible_truncation)]
        bits.push(((value >> shift) & 1) as u8);
    }
}

fn read_bits(bits: &[u8]) -> u16 {
    bits.iter().fold(0u16, |acc, &b| (acc << 1) | u16::from(b & 1))
}

fn xor_bits(bits: &[u8]) -> u8 {
    bits.iter().fold(0u8, |acc, &b| acc ^ (b & 1))
}

/// Frame raw payload bytes into a bit sequence.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the payload exceeds [`MAX_PAYLOAD_BYTES`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge {
        len: payload.len(),
        max: MAX_PAYLOAD_BYTES,
    })?;

    let mut bits = Vec::with_capacity(frame_bit_len(payload.len()));
    bits.extend_from_slice(&PREAMBLE);
    push_bits(&mut bits, len, LENGTH_BITS);
    for &byte in payload {
        push_bits(&mut bits, u16::from(byte), 8);
    }
    let checksum = xor_bits(&bits[PREAMBLE.len() + LENGTH_BITS..]);
    push_bits(&mut bits, u16::from(checksum), CHECKSUM_BITS);
    Ok(bits)
}

/// Serialize and frame a payload.
///
/// # Errors
///
/// Returns an error if serialization fails or the payload is too large.
pub fn encode_payload(payload: &WatermarkPayload) -> Result<Vec<u8>> {
    encode_frame(&payload.to_bytes()?)
}

/// Best preamble alignment found in a bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMatch {
    /// Index of the first preamble bit.
    pub position: usize,
    /// Number of preamble bits that matched.
    pub score: usize,
}

impl SyncMatch {
    /// Fraction of the preamble that matched, in `[0, 1]`.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.score as f64 / PREAMBLE.len() as f64
        }
    }

    /// Whether the match clears the 80% acceptance threshold.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.score * 5 >= PREAMBLE.len() * 4
    }
}

/// Slide the preamble over `bits` and return the first best-scoring window.
///
/// Returns `None` when no window matches a single bit (or `bits` is shorter
/// than the preamble).
#[must_use]
pub fn find_sync(bits: &[u8]) -> Option<SyncMatch> {
    let mut best: Option<SyncMatch> = None;
    for (position, window) in bits.windows(PREAMBLE.len()).enumerate() {
        let score = window
            .iter()
            .zip(PREAMBLE.iter())
            .filter(|(a, b)| a == b)
            .count();
        if score > best.map_or(0, |m| m.score) {
            best = Some(SyncMatch { position, score });
        }
    }
    best
}

/// A located and length-checked frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Where the preamble was found.
    pub sync: SyncMatch,
    /// Checksum stored in the frame.
    pub stored_checksum: u8,
    /// Checksum recomputed over the payload bits.
    pub computed_checksum: u8,
}

impl Frame {
    /// Whether the stored and recomputed checksums agree.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }
}

/// Locate and cut a frame out of an extracted bitstream.
///
/// A checksum mismatch is logged but not an error.
///
/// # Errors
///
/// - [`Error::InsufficientBits`] if the stream is shorter than the minimum frame
///   or than the length the frame declares.
/// - [`Error::SyncNotFound`] if no window matches at least 80% of the preamble.
pub fn decode_frame(bits: &[u8]) -> Result<Frame> {
    if bits.len() < MIN_FRAME_BITS {
        return Err(Error::InsufficientBits {
            needed: MIN_FRAME_BITS,
            available: bits.len(),
        });
    }

    let sync = match find_sync(bits) {
        Some(m) if m.is_locked() => m,
        other => {
            return Err(Error::SyncNotFound {
                best_score: other.map_or(0, |m| m.score),
                preamble_len: PREAMBLE.len(),
            })
        }
    };
    debug!(
        position = sync.position,
        score = sync.score,
        "sync preamble located"
    );

    let length_start = sync.position + PREAMBLE.len();
    let data_start = length_start + LENGTH_BITS;
    if data_start > bits.len() {
        return Err(Error::InsufficientBits {
            needed: data_start,
            available: bits.len(),
        });
    }
    let payload_len = usize::from(read_bits(&bits[length_start..data_start]));

    let checksum_start = data_start + payload_len * 8;
    let frame_end = checksum_start + CHECKSUM_BITS;
    if frame_end > bits.len() {
        return Err(Error::InsufficientBits {
            needed: frame_end,
            available: bits.len(),
        });
    }

    let data_bits = &bits[data_start..checksum_start];
    let payload = data_bits
        .chunks_exact(8)
        .map(|chunk| {
            #[allow(clippy::cast_possible_truncation)]
            {
                read_bits(chunk) as u8
            }
        })
        .collect();

    #[allow(clippy::cast_possible_truncation)]
    let stored_checksum = read_bits(&bits[checksum_start..frame_end]) as u8;
    let computed_checksum = xor_bits(data_bits);
    if stored_checksum != computed_checksum {
        warn!(
            stored = stored_checksum,
            computed = computed_checksum,
            "frame checksum mismatch"
        );
    }

    Ok(Frame {
        payload,
        sync,
        stored_checksum,
        computed_checksum,
    })
}

/// A payload recovered from a bitstream, with decoder diagnostics.
#[derive(Debug, Clone)]
pub struct DecodedWatermark {
    /// The recovered payload.
    pub payload: WatermarkPayload,
    /// Number of preamble bits that matched.
    pub sync_score: usize,
    /// Bit index where the frame starts.
    pub sync_position: usize,
    /// Whether the frame checksum agreed.
    pub checksum_valid: bool,
    /// Whether the field-by-field fallback produced the payload.
    pub recovered_by_fallback: bool,
    /// Payload bytes as (lossy) text, for auditing.
    pub raw_text: String,
}

impl DecodedWatermark {
    /// Fraction of the preamble that matched.
    #[must_use]
    pub fn sync_ratio(&self) -> f64 {
        SyncMatch {
            position: self.sync_position,
            score: self.sync_score,
        }
        .ratio()
    }
}

/// Decode a bitstream all the way to a payload.
///
/// # Errors
///
/// Frame errors from [`decode_frame`], or [`Error::PayloadParse`] when neither
/// the structured parse nor the field fallback recovers owner and hash.
pub fn decode(bits: &[u8]) -> Result<DecodedWatermark> {
    let frame = decode_frame(bits)?;
    let checksum_valid = frame.checksum_valid();
    let raw_text = String::from_utf8_lossy(&frame.payload).into_owned();

    let (payload, recovered_by_fallback) =
        if let Some(p) = WatermarkPayload::parse_structured(&frame.payload) {
            (p, false)
        } else if let Some(p) = WatermarkPayload::parse_fields(&raw_text) {
            debug!("structured parse failed, recovered payload field by field");
            (p, true)
        } else {
            return Err(Error::PayloadParse(format!(
                "no owner/hash fields in {} payload bytes",
                frame.payload.len()
            )));
        };

    Ok(DecodedWatermark {
        payload,
        sync_score: frame.sync.score,
        sync_position: frame.sync.position,
        checksum_valid,
        recovered_by_fallback,
        raw_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"o":"a1b2c3d4","t":1700000000,"h":"9f8e7d6c","v":"2"}"#;

    fn sample_bits() -> Vec<u8> {
        encode_frame(SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn frame_layout() {
        let bits = sample_bits();
        assert_eq!(bits.len(), frame_bit_len(SAMPLE.len()));
        assert_eq!(bits.len(), 16 + 16 + 8 * SAMPLE.len() + 8);
        assert_eq!(&bits[..16], &PREAMBLE);
        assert_eq!(usize::from(read_bits(&bits[16..32])), SAMPLE.len());
        // '{' = 0x7B, MSB first
        assert_eq!(&bits[32..40], &[0, 1, 1, 1, 1, 0, 1, 1]);
    }

    #[test]
    fn checksum_is_xor_of_payload_bits_only() {
        // 0x01 has one set bit; the length field (1) is not counted.
        let bits = encode_frame(&[0x01]).unwrap();
        assert_eq!(&bits[bits.len() - 8..], &[0, 0, 0, 0, 0, 0, 0, 1]);
        let bits = encode_frame(&[0x03]).unwrap();
        assert_eq!(&bits[bits.len() - 8..], &[0; 8]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let big = vec![b'a'; MAX_PAYLOAD_BYTES + 1];
        assert!(matches!(
            encode_frame(&big),
            Err(Error::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn decodes_clean_frame() {
        let decoded = decode(&sample_bits()).unwrap();
        assert_eq!(decoded.payload.owner, "a1b2c3d4");
        assert_eq!(decoded.payload.image_hash, "9f8e7d6c");
        assert_eq!(decoded.payload.version, "2");
        assert_eq!(decoded.payload.timestamp, 1_700_000_000);
        assert!(decoded.checksum_valid);
        assert!(!decoded.recovered_by_fallback);
        assert_eq!(decoded.sync_score, 16);
        assert!((decoded.sync_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decodes_frame_after_leading_noise_and_trailing_bits() {
        let mut bits = vec![0; 5];
        bits.extend(sample_bits());
        bits.extend([1, 0, 1, 1, 0, 0, 1]);
        let decoded = decode(&bits).unwrap();
        assert_eq!(decoded.sync_position, 5);
        assert_eq!(decoded.payload.owner, "a1b2c3d4");
    }

    #[test]
    fn short_stream_is_insufficient() {
        let err = decode_frame(&[1; 39]).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBits {
                needed: 40,
                available: 39
            }
        ));
    }

    #[test]
    fn truncated_frame_is_insufficient() {
        let bits = sample_bits();
        let err = decode(&bits[..64]).unwrap_err();
        assert!(matches!(err, Error::InsufficientBits { available: 64, .. }));
    }

    #[test]
    fn sync_tolerates_three_corrupted_preamble_bits() {
        let mut bits = sample_bits();
        for i in [0, 5, 10] {
            bits[i] ^= 1;
        }
        let decoded = decode(&bits).unwrap();
        assert_eq!(decoded.sync_position, 0);
        assert_eq!(decoded.sync_score, 13);
        assert_eq!(decoded.payload.owner, "a1b2c3d4");
    }

    #[test]
    fn sync_fails_with_four_corrupted_preamble_bits() {
        let mut bits = PREAMBLE.to_vec();
        for i in [0, 5, 10, 15] {
            bits[i] ^= 1;
        }
        bits.extend([0; 24]);
        let err = decode_frame(&bits).unwrap_err();
        assert!(matches!(
            err,
            Error::SyncNotFound {
                best_score: 12,
                preamble_len: 16
            }
        ));
    }

    #[test]
    fn complemented_preamble_does_not_lock() {
        let bits: Vec<u8> = [0, 0, 1, 1, 0, 0, 1, 1, 1, 1, 0, 0, 1, 1, 0, 0]
            .iter()
            .copied()
            .chain([0; 24])
            .collect();
        assert!(matches!(
            decode_frame(&bits),
            Err(Error::SyncNotFound { best_score, .. }) if best_score < 13
        ));
        assert_eq!(find_sync(&[0, 0, 0]), None);
    }

    #[test]
    fn single_flipped_payload_bit_only_breaks_checksum() {
        let mut bits = sample_bits();
        // Flip the low bit of the '7' in the timestamp: '7' -> '6'.
        let byte = SAMPLE.find("1700000000").unwrap() + 1;
        bits[32 + byte * 8 + 7] ^= 1;
        let decoded = decode(&bits).unwrap();
        assert!(!decoded.checksum_valid);
        assert!(!decoded.recovered_by_fallback);
        assert_eq!(decoded.payload.owner, "a1b2c3d4");
        assert_eq!(decoded.payload.timestamp, 1_600_000_000);
    }

    #[test]
    fn damaged_json_falls_back_to_field_extraction() {
        let text = r#"{"o":"a1b2c3d4","h":"9f8e7d6c","v":"2","t":17"#;
        let decoded = decode(&encode_frame(text.as_bytes()).unwrap()).unwrap();
        assert!(decoded.recovered_by_fallback);
        assert!(decoded.checksum_valid);
        assert_eq!(decoded.payload.owner, "a1b2c3d4");
        assert_eq!(decoded.payload.timestamp, 17);
    }

    #[test]
    fn unparseable_payload_is_an_error() {
        let bits = encode_frame(b"not a watermark").unwrap();
        assert!(matches!(decode(&bits), Err(Error::PayloadParse(_))));
    }
}
