//! Exact Euclidean distance transform (Felzenszwalb & Huttenlocher).

use rayon::prelude::*;

/// Squared distance along one line to the nearest finite-cost site.
///
/// Entries of `f` are `0.0` on feature samples and `INFINITY` elsewhere; the
/// lower envelope is built only from finite sites, so a line without any
/// feature stays at `INFINITY`.
fn edt_1d(f: &[f64], out: &mut [f64]) {
    let n = f.len();
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k: isize = -1;

    let sq = |q: usize| (q * q) as f64;

    for q in 0..n {
        if !f[q].is_finite() {
            continue;
        }
        if k < 0 {
            k = 0;
            v[0] = q;
            z[0] = f64::NEG_INFINITY;
            z[1] = f64::INFINITY;
            continue;
        }
        loop {
            let p = v[k as usize];
            let s = ((f[q] + sq(q)) - (f[p] + sq(p))) / (2.0 * (q as f64 - p as f64));
            if s <= z[k as usize] {
                k -= 1;
                continue;
            }
            k += 1;
            v[k as usize] = q;
            z[k as usize] = s;
            z[k as usize + 1] = f64::INFINITY;
            break;
        }
    }

    if k < 0 {
        out.fill(f64::INFINITY);
        return;
    }

    let mut j = 0usize;
    for (q, o) in out.iter_mut().enumerate() {
        while z[j + 1] < q as f64 {
            j += 1;
        }
        let d = q as f64 - v[j] as f64;
        *o = d * d + f[v[j]];
    }
}

/// Euclidean distance from every pixel to the nearest non-zero pixel of
/// `mask` (`width x height`, row-major). Pixels inside the mask get `0.0`.
///
/// Returns `INFINITY` everywhere when the mask is empty.
pub fn distance_transform(mask: &[u8], width: usize, height: usize) -> Vec<f32> {
    debug_assert_eq!(mask.len(), width * height);
    if mask.is_empty() {
        return Vec::new();
    }

    // Column pass, stored column-major.
    let columns: Vec<Vec<f64>> = (0..width)
        .into_par_iter()
        .map(|x| {
            let f: Vec<f64> = (0..height)
                .map(|y| if mask[y * width + x] != 0 { 0.0 } else { f64::INFINITY })
                .collect();
            let mut d = vec![0.0; height];
            edt_1d(&f, &mut d);
            d
        })
        .collect();

    // Row pass over the column results.
    let mut out = vec![0.0f32; width * height];
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let f: Vec<f64> = columns.iter().map(|col| col[y]).collect();
        let mut d = vec![0.0; width];
        edt_1d(&f, &mut d);
        for (o, v) in row.iter_mut().zip(d) {
            *o = v.sqrt() as f32;
        }
    });

    out
}
