/**
 * Hashing module: exact content digests for videos, perceptual fingerprints
 * for images
 */

use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// SHA-256 of a file's exact bytes, truncated to 128 bits
pub type ContentDigest = [u8; 16];

fn truncate_digest(full: &[u8]) -> ContentDigest {
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&full[..16]);
    digest
}

pub struct ContentHasher {
    chunk_size: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            chunk_size: 65536, // 64KB chunks
        }
    }

    /// Calculate the content digest of a file, streaming it in chunks
    pub fn calculate_file_hash(&self, file_path: &Path) -> Result<ContentDigest> {
        let file = File::open(file_path).context("Failed to open file for hashing")?;

        let mut reader = BufReader::new(file);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut hasher = Sha256::new();

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .context("Failed to read file for hashing")?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(truncate_digest(&hasher.finalize()))
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Perceptual fingerprinting capability used by the duplicate detector
///
/// Any DCT-based hash of at least 8x8 bits can stand in for the default.
pub trait ImageFingerprinter {
    fn fingerprint(&self, image: &DynamicImage) -> ImageHash;

    /// Hamming distance between two fingerprints
    fn distance(&self, a: &ImageHash, b: &ImageHash) -> u32 {
        a.dist(b)
    }
}

/// 8x8 DCT perceptual hash (pHash)
pub struct DctFingerprinter {
    hasher: Hasher,
}

impl DctFingerprinter {
    pub fn new() -> Self {
        Self::with_hash_size(8)
    }

    pub fn with_hash_size(size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .hash_size(size, size)
            .to_hasher();
        Self { hasher }
    }
}

impl Default for DctFingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageFingerprinter for DctFingerprinter {
    fn fingerprint(&self, image: &DynamicImage) -> ImageHash {
        self.hasher.hash_image(image)
    }
}

/// Decode an image file, sniffing the format from its content
pub fn load_image(file_path: &Path) -> Result<DynamicImage> {
    let image = ImageReader::open(file_path)
        .with_context(|| format!("Failed to open {}", file_path.display()))?
        .with_guessed_format()
        .context("Failed to detect image format")?
        .decode()
        .with_context(|| format!("Failed to decode {}", file_path.display()))?;
    Ok(image)
}

/// Fingerprints of an image upright and rotated by 90, 180 and 270 degrees
pub fn rotation_fingerprints<F: ImageFingerprinter + ?Sized>(
    fingerprinter: &F,
    image: &DynamicImage,
) -> [ImageHash; 4] {
    [
        fingerprinter.fingerprint(image),
        fingerprinter.fingerprint(&image.rotate90()),
        fingerprinter.fingerprint(&image.rotate180()),
        fingerprinter.fingerprint(&image.rotate270()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 255) / width.max(1)) as u8;
            let w = ((y * 255) / height.max(1)) as u8;
            Rgb([v, w, v / 2 + w / 2])
        }))
    }

    fn quadrants(size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
            if x < size / 2 && y < size / 2 {
                Rgb([255, 255, 255])
            } else if x >= size / 2 && y >= size / 2 {
                Rgb([128, 128, 128])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn test_identical_files_same_digest() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("a.mp4");
        let file2 = temp_dir.path().join("b.mp4");
        let file3 = temp_dir.path().join("c.mp4");
        fs::write(&file1, b"identical video bytes").unwrap();
        fs::write(&file2, b"identical video bytes").unwrap();
        fs::write(&file3, b"identical video byteS").unwrap();

        let hasher = ContentHasher::new();
        let h1 = hasher.calculate_file_hash(&file1).unwrap();
        let h2 = hasher.calculate_file_hash(&file2).unwrap();
        let h3 = hasher.calculate_file_hash(&file3).unwrap();

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1, truncate_digest(&Sha256::digest(b"identical video bytes")));
    }

    #[test]
    fn test_digest_spans_multiple_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.mp4");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let digest = ContentHasher::new().calculate_file_hash(&path).unwrap();
        assert_eq!(digest, truncate_digest(&Sha256::digest(&data)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ContentHasher::new()
            .calculate_file_hash(&temp_dir.path().join("none.mp4"))
            .is_err());
    }

    #[test]
    fn test_fingerprint_is_64_bits_and_stable() {
        let fingerprinter = DctFingerprinter::new();
        let image = gradient(64, 48);
        let a = fingerprinter.fingerprint(&image);
        let b = fingerprinter.fingerprint(&image.clone());

        assert_eq!(a.as_bytes().len(), 8);
        assert_eq!(fingerprinter.distance(&a, &b), 0);
    }

    #[test]
    fn test_larger_hash_size_gives_longer_fingerprint() {
        let image = gradient(64, 48);
        let hash = DctFingerprinter::with_hash_size(16).fingerprint(&image);
        assert_eq!(hash.as_bytes().len(), 32);
    }

    #[test]
    fn test_rotated_copy_matches_one_rotation() {
        let fingerprinter = DctFingerprinter::new();
        let image = quadrants(64);
        let rotated = image.rotate90();

        let upright = fingerprinter.fingerprint(&image);
        let candidates = rotation_fingerprints(&fingerprinter, &rotated);
        let best = candidates
            .iter()
            .map(|h| fingerprinter.distance(h, &upright))
            .min()
            .unwrap();
        assert_eq!(best, 0);
    }

    #[test]
    fn test_load_image_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.jpg");
        fs::write(&path, b"not an image").unwrap();
        assert!(load_image(&path).is_err());

        let good = temp_dir.path().join("good.jpg");
        gradient(20, 20).to_rgb8().save(&good).unwrap();
        assert_eq!(load_image(&good).unwrap().width(), 20);
    }
}
