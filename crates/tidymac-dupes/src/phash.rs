//! Perceptual hashing for images: a 64-bit difference hash.
//!
//! The image is downscaled to 9×8 grayscale; each output bit is 1 iff the
//! left neighbor is brighter than the right. The fingerprint is stable
//! under re-encoding and small edits and is compared by Hamming distance.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::imageops::FilterType;

use tidymac_core::{Result, TidyError};

/// Image formats supported by the perceptual stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
}

/// Identify a supported image format by magic bytes (never by extension).
pub fn sniff_image(path: &Path) -> Option<ImageKind> {
    let mut header = [0u8; 12];
    let mut file = File::open(path).ok()?;
    let n = file.read(&mut header).ok()?;
    let header = &header[..n];

    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageKind::Jpeg)
    } else if header.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(ImageKind::Png)
    } else if header.starts_with(b"GIF8") {
        Some(ImageKind::Gif)
    } else if header.starts_with(b"BM") {
        Some(ImageKind::Bmp)
    } else if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
        Some(ImageKind::Webp)
    } else {
        None
    }
}

/// Compute the 64-bit difference hash of an image file.
pub fn difference_hash(path: &Path) -> Result<u64> {
    let img = image::open(path).map_err(|e| TidyError::Other {
        message: format!("cannot decode {}: {e}", path.display()),
    })?;

    let gray = img.to_luma8();
    let small = image::imageops::resize(&gray, 9, 8, FilterType::Triangle);

    let mut hash = 0u64;
    for y in 0..8u32 {
        for x in 0..8u32 {
            let left = small.get_pixel(x, y).0[0];
            let right = small.get_pixel(x + 1, y).0[0];
            hash <<= 1;
            if left > right {
                hash |= 1;
            }
        }
    }
    Ok(hash)
}

/// Number of differing bits between two hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
