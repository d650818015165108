//! Single color plane access with block-level read and write.

use image::RgbImage;

use crate::transform::{clamp_sample, Block, BLOCK_LEN, BLOCK_SIZE};

/// Sample value used for block reads that fall outside the channel.
pub const PAD_VALUE: u8 = 128;

/// Index of the green component in an RGB pixel; the watermark lives there.
pub const GREEN: usize = 1;

/// One 8-bit color plane of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelChannel {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelChannel {
    /// Create a channel filled with a constant value.
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            samples: vec![value; width as usize * height as usize],
        }
    }

    /// Wrap raw row-major samples. Returns `None` if the length does not match.
    #[must_use]
    pub fn from_samples(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        (samples.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            samples,
        })
    }

    /// Copy one component (`0` = R, `1` = G, `2` = B) out of an RGB image.
    #[must_use]
    pub fn from_rgb(image: &RgbImage, component: usize) -> Self {
        let samples = image.pixels().map(|px| px[component]).collect();
        Self {
            width: image.width(),
            height: image.height(),
            samples,
        }
    }

    /// Copy the green component out of an RGB image.
    #[must_use]
    pub fn green(image: &RgbImage) -> Self {
        Self::from_rgb(image, GREEN)
    }

    /// Write this channel back into one component of an RGB image.
    ///
    /// Only the overlapping region is written if dimensions differ.
    pub fn write_to_rgb(&self, image: &mut RgbImage, component: usize) {
        let w = self.width.min(image.width());
        let h = self.height.min(image.height());
        for y in 0..h {
            for x in 0..w {
                image.get_pixel_mut(x, y)[component] = self.get(x, y);
            }
        }
    }

    /// Channel width in samples.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Channel height in samples.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw row-major samples.
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Sample at `(x, y)`; caller guarantees bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.samples[y as usize * self.width as usize + x as usize]
    }

    /// Number of whole blocks horizontally.
    #[must_use]
    pub fn blocks_wide(&self) -> u32 {
        self.width / BLOCK_SIZE as u32
    }

    /// Number of whole blocks vertically.
    #[must_use]
    pub fn blocks_tall(&self) -> u32 {
        self.height / BLOCK_SIZE as u32
    }

    /// Total number of blocks scanned by embed and extract, i.e. the capacity in bits.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks_wide() as usize * self.blocks_tall() as usize
    }

    /// Block coordinates in scan order: `block_y` outer, `block_x` inner.
    pub fn block_coords(&self) -> impl Iterator<Item = (u32, u32)> {
        let wide = self.blocks_wide();
        (0..self.blocks_tall()).flat_map(move |by| (0..wide).map(move |bx| (bx, by)))
    }

    /// Read the block at block coordinates `(block_x, block_y)`.
    ///
    /// Samples outside the channel read as [`PAD_VALUE`].
    #[must_use]
    pub fn read_block(&self, block_x: u32, block_y: u32) -> Block {
        let mut block = [f64::from(PAD_VALUE); BLOCK_LEN];
        let start_x = block_x as usize * BLOCK_SIZE;
        let start_y = block_y as usize * BLOCK_SIZE;
        for dy in 0..BLOCK_SIZE {
            for dx in 0..BLOCK_SIZE {
                let (x, y) = (start_x + dx, start_y + dy);
                if x < self.width as usize && y < self.height as usize {
                    block[dy * BLOCK_SIZE + dx] =
                        f64::from(self.samples[y * self.width as usize + x]);
                }
            }
        }
        block
    }

    /// Write a reconstructed block back, clamping to `[0, 255]`.
    ///
    /// Samples that fall outside the channel are skipped.
    pub fn write_block(&mut self, block_x: u32, block_y: u32, block: &Block) {
        let start_x = block_x as usize * BLOCK_SIZE;
        let start_y = block_y as usize * BLOCK_SIZE;
        for dy in 0..BLOCK_SIZE {
            for dx in 0..BLOCK_SIZE {
                let (x, y) = (start_x + dx, start_y + dy);
                if x < self.width as usize && y < self.height as usize {
                    self.samples[y * self.width as usize + x] =
                        clamp_sample(block[dy * BLOCK_SIZE + dx]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_grid_counts_whole_blocks_only() {
        let ch = PixelChannel::filled(70, 33, 0);
        assert_eq!(ch.blocks_wide(), 8);
        assert_eq!(ch.blocks_tall(), 4);
        assert_eq!(ch.block_count(), 32);
    }

    #[test]
    fn block_coords_are_row_major() {
        let ch = PixelChannel::filled(24, 16, 0);
        let coords: Vec<_> = ch.block_coords().collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn read_block_pads_out_of_bounds() {
        let ch = PixelChannel::filled(4, 4, 10);
        let block = ch.read_block(0, 0);
        assert!((block[0] - 10.0).abs() < f64::EPSILON);
        assert!((block[3] - 10.0).abs() < f64::EPSILON);
        assert!((block[4] - 128.0).abs() < f64::EPSILON);
        assert!((block[63] - 128.0).abs() < f64::EPSILON);
    }

    #[test]
    fn write_block_skips_out_of_bounds_and_clamps() {
        let mut ch = PixelChannel::filled(4, 4, 0);
        let mut block = [300.0; BLOCK_LEN];
        block[1] = -5.0;
        ch.write_block(0, 0, &block);
        assert_eq!(ch.get(0, 0), 255);
        assert_eq!(ch.get(1, 0), 0);
        assert_eq!(ch.samples().len(), 16);
    }

    #[test]
    fn green_round_trips_through_rgb() {
        let mut img = RgbImage::from_pixel(16, 8, image::Rgb([1, 2, 3]));
        let mut ch = PixelChannel::green(&img);
        assert!(ch.samples().iter().all(|&s| s == 2));
        ch.write_block(1, 0, &[99.0; BLOCK_LEN]);
        ch.write_to_rgb(&mut img, GREEN);
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(img.get_pixel(9, 3).0, [1, 99, 3]);
    }

    #[test]
    fn from_samples_rejects_wrong_length() {
        assert!(PixelChannel::from_samples(2, 2, vec![0; 3]).is_none());
        assert!(PixelChannel::from_samples(2, 2, vec![0; 4]).is_some());
    }
}
