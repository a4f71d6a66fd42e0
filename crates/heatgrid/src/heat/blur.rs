//! Separable Gaussian blur with edge replication.

use rayon::prelude::*;

/// Kernel half-width in standard deviations.
const TRUNCATE: f64 = 4.0;

/// Normalised 1-D Gaussian kernel of radius `round(TRUNCATE * sigma)`.
pub(crate) fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (TRUNCATE * sigma + 0.5) as usize;
    let denom = 2.0 * sigma * sigma;

    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-(d * d) / denom).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel.into_iter().map(|w| w as f32).collect()
}

/// Blurs a single-channel `width x height` field.
///
/// Samples outside the raster take the value of the nearest edge sample.
/// `sigma <= 0` returns the input unchanged.
pub fn gaussian_blur(src: &[f32], width: usize, height: usize, sigma: f64) -> Vec<f32> {
    debug_assert_eq!(src.len(), width * height);
    if sigma <= 0.0 || src.is_empty() {
        return src.to_vec();
    }

    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    // Horizontal pass, one row per task.
    let mut tmp = vec![0.0f32; src.len()];
    tmp.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(out, row)| {
            let last = width as isize - 1;
            for (x, o) in out.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, w) in kernel.iter().enumerate() {
                    let sx = (x as isize + k as isize - radius).clamp(0, last) as usize;
                    acc += w * row[sx];
                }
                *o = acc;
            }
        });

    // Vertical pass: accumulate whole source rows into each output row.
    let mut out = vec![0.0f32; src.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let last = height as isize - 1;
        for (k, w) in kernel.iter().enumerate() {
            let sy = (y as isize + k as isize - radius).clamp(0, last) as usize;
            let src_row = &tmp[sy * width..(sy + 1) * width];
            for (o, s) in row.iter_mut().zip(src_row) {
                *o += w * s;
            }
        }
    });

    out
}
