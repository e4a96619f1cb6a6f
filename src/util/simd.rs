//! SIMD distance kernels built on the `wide` crate.
//!
//! Both kernels accumulate in eight f32 lanes and then fold the lanes in a
//! fixed order, so the same pair of slices always yields the same bits. The
//! brute-force scan and the bundled indexes share these kernels, which keeps
//! their distances bit-identical.

use wide::f32x8;

#[inline]
fn load8(chunk: &[f32]) -> f32x8 {
    f32x8::new([
        chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
    ])
}

#[inline]
fn fold_lanes(acc: f32x8) -> f32 {
    acc.to_array().iter().sum::<f32>()
}

/// Squared Euclidean distance between two equally sized slices.
pub fn l2_squared_simd(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    if a.len() < 8 {
        return a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
    }

    let mut acc = f32x8::splat(0.0);

    let chunks_a = a.chunks_exact(8);
    let chunks_b = b.chunks_exact(8);
    let remainder_a = chunks_a.remainder();
    let remainder_b = chunks_b.remainder();

    for (chunk_a, chunk_b) in chunks_a.zip(chunks_b) {
        let diff = load8(chunk_a) - load8(chunk_b);
        acc = acc + diff * diff;
    }

    let mut total = fold_lanes(acc);
    total += remainder_a
        .iter()
        .zip(remainder_b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>();

    total
}

/// Dot product of two equally sized slices.
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    if a.len() < 8 {
        return a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    }

    let mut acc = f32x8::splat(0.0);

    let chunks_a = a.chunks_exact(8);
    let chunks_b = b.chunks_exact(8);
    let remainder_a = chunks_a.remainder();
    let remainder_b = chunks_b.remainder();

    for (chunk_a, chunk_b) in chunks_a.zip(chunks_b) {
        acc = acc + load8(chunk_a) * load8(chunk_b);
    }

    let mut total = fold_lanes(acc);
    total += remainder_a
        .iter()
        .zip(remainder_b.iter())
        .map(|(x, y)| x * y)
        .sum::<f32>();

    total
}
