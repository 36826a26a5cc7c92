use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ledger_core::{Error, Result};

const DCT_SIZE: usize = 32;
const HASH_SIZE: usize = 8;

/// 8x8 DCT-based perceptual hash of a single rasterized page (spec §4.5).
/// Rasterization itself is an external collaborator's job; this takes the
/// already-rendered (2x-upsampled, per the spec) page image.
pub fn phash_page(image: &DynamicImage) -> String {
    let gray = image.grayscale().resize_exact(
        DCT_SIZE as u32,
        DCT_SIZE as u32,
        FilterType::Lanczos3,
    );

    let mut pixels = [[0f64; DCT_SIZE]; DCT_SIZE];
    for y in 0..DCT_SIZE {
        for x in 0..DCT_SIZE {
            let px = gray.get_pixel(x as u32, y as u32);
            pixels[y][x] = px.0[0] as f64;
        }
    }

    let dct = dct2d(&pixels);

    // Low frequencies are the top-left HASH_SIZE x HASH_SIZE block, skipping
    // the DC term at [0][0] which only encodes average brightness.
    let mut coeffs = Vec::with_capacity(HASH_SIZE * HASH_SIZE - 1);
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            if x == 0 && y == 0 {
                continue;
            }
            coeffs.push(dct[y][x]);
        }
    }
    let median = median(&coeffs);

    let mut bits: u64 = 0;
    let mut bit_index = 0u32;
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            let value = dct[y][x];
            if value > median {
                bits |= 1 << bit_index;
            }
            bit_index += 1;
        }
    }

    format!("{bits:016x}")
}

pub fn phashes_for_pages(images: &[DynamicImage], max_pages: usize) -> Vec<String> {
    images.iter().take(max_pages).map(phash_page).collect()
}

/// Hamming distance between two phash hex strings (spec §4.5).
pub fn phash_distance(a: &str, b: &str) -> Result<u32> {
    let a = u64::from_str_radix(a, 16)
        .map_err(|_| Error::InvalidInput(format!("invalid phash hex: {a}")))?;
    let b = u64::from_str_radix(b, 16)
        .map_err(|_| Error::InvalidInput(format!("invalid phash hex: {b}")))?;
    Ok((a ^ b).count_ones())
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Separable 2D DCT-II, computed directly (no FFT) since the pack carries no
/// dedicated DCT crate; 32x32 is small enough that the O(n^3) separable form
/// is fast enough for a per-page call.
fn dct2d(input: &[[f64; DCT_SIZE]; DCT_SIZE]) -> [[f64; DCT_SIZE]; DCT_SIZE] {
    let mut rows = [[0f64; DCT_SIZE]; DCT_SIZE];
    for (y, row) in input.iter().enumerate() {
        rows[y] = dct1d(row);
    }

    let mut out = [[0f64; DCT_SIZE]; DCT_SIZE];
    for x in 0..DCT_SIZE {
        let column: [f64; DCT_SIZE] = std::array::from_fn(|y| rows[y][x]);
        let transformed = dct1d(&column);
        for y in 0..DCT_SIZE {
            out[y][x] = transformed[y];
        }
    }
    out
}

fn dct1d(input: &[f64; DCT_SIZE]) -> [f64; DCT_SIZE] {
    let n = DCT_SIZE as f64;
    let mut output = [0f64; DCT_SIZE];
    for (k, out) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &value) in input.iter().enumerate() {
            sum += value * (std::f64::consts::PI / n * (i as f64 + 0.5) * k as f64).cos();
        }
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        *out = sum * scale;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn solid_image(value: u8) -> DynamicImage {
        let buf = ImageBuffer::<Luma<u8>, _>::from_pixel(64, 64, Luma([value]));
        DynamicImage::ImageLuma8(buf)
    }

    #[test]
    fn identical_images_hash_identically() {
        let a = phash_page(&solid_image(128));
        let b = phash_page(&solid_image(128));
        assert_eq!(a, b);
        assert_eq!(phash_distance(&a, &b).unwrap(), 0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = phash_page(&solid_image(30));
        let b = phash_page(&solid_image(220));
        assert_eq!(phash_distance(&a, &b).unwrap(), phash_distance(&b, &a).unwrap());
    }
}
