/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! 8x8 inverse DCT (T.81 A.3.3), as a separable pair of 8 point transforms.
//!
//! Each 1-D pass splits the output into an even part (coefficients 0, 2, 4, 6) and an odd
//! part (1, 3, 5, 7) and combines them with a butterfly, scaling by 1/2 so that both passes
//! together give the 1/4 C(u) C(v) normalization of the standard. The scalar and vector
//! versions do exactly the same floating point operations in the same order, so they
//! produce identical results.

use bytemuck::cast;
use wide::f32x8;

const C1: f32 = 0.980_785_3; // cos(1*pi/16)
const C2: f32 = 0.923_879_5; // cos(2*pi/16)
const C3: f32 = 0.831_469_6; // cos(3*pi/16)
const C4: f32 = 0.707_106_77; // cos(4*pi/16) = 1/sqrt(2)
const C5: f32 = 0.555_570_24; // cos(5*pi/16)
const C6: f32 = 0.382_683_43; // cos(6*pi/16)
const C7: f32 = 0.195_090_32; // cos(7*pi/16)

/// Which inverse DCT the decoder uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdctImplementation {
    /// vector version where the target has SIMD support, scalar elsewhere
    #[default]
    Auto,
    /// portable reference version
    Scalar,
    /// eight lanes at a time using `wide`
    Vector,
}

/// An inverse DCT on a block of dequantized coefficients in natural order. The result
/// replaces the coefficients and is centered around 0 (the +128 level shift is up to the caller).
pub trait InverseDct: Send + Sync {
    fn idct8x8(&self, block: &mut [f32; 64]);
}

/// reference implementation, one row or column at a time
pub struct ScalarIdct;

/// all eight rows or columns at once
pub struct VectorIdct;

static SCALAR_IDCT: ScalarIdct = ScalarIdct;
static VECTOR_IDCT: VectorIdct = VectorIdct;

/// true on targets where `wide` maps f32x8 onto native SIMD instructions
const HAS_NATIVE_SIMD: bool = cfg!(any(
    all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2"
    ),
    target_arch = "aarch64",
    all(target_arch = "wasm32", target_feature = "simd128")
));

pub fn select_idct(implementation: IdctImplementation) -> &'static dyn InverseDct {
    match implementation {
        IdctImplementation::Scalar => &SCALAR_IDCT,
        IdctImplementation::Vector => &VECTOR_IDCT,
        IdctImplementation::Auto => {
            if HAS_NATIVE_SIMD {
                &VECTOR_IDCT
            } else {
                &SCALAR_IDCT
            }
        }
    }
}

#[inline(always)]
fn idct_1d(x: [f32; 8]) -> [f32; 8] {
    // even part
    let a = C4 * (x[0] + x[4]);
    let b = C4 * (x[0] - x[4]);
    let p = C2 * x[2] + C6 * x[6];
    let q = C6 * x[2] - C2 * x[6];

    let e0 = a + p;
    let e1 = b + q;
    let e2 = b - q;
    let e3 = a - p;

    // odd part
    let o0 = C1 * x[1] + C3 * x[3] + C5 * x[5] + C7 * x[7];
    let o1 = C3 * x[1] - C7 * x[3] - C1 * x[5] - C5 * x[7];
    let o2 = C5 * x[1] - C1 * x[3] + C7 * x[5] + C3 * x[7];
    let o3 = C7 * x[1] - C5 * x[3] + C3 * x[5] - C1 * x[7];

    [
        (e0 + o0) * 0.5,
        (e1 + o1) * 0.5,
        (e2 + o2) * 0.5,
        (e3 + o3) * 0.5,
        (e3 - o3) * 0.5,
        (e2 - o2) * 0.5,
        (e1 - o1) * 0.5,
        (e0 - o0) * 0.5,
    ]
}

impl InverseDct for ScalarIdct {
    fn idct8x8(&self, block: &mut [f32; 64]) {
        // columns first
        for u in 0..8 {
            let mut col = [0f32; 8];
            for v in 0..8 {
                col[v] = block[v * 8 + u];
            }

            let out = idct_1d(col);
            for y in 0..8 {
                block[y * 8 + u] = out[y];
            }
        }

        // then rows
        for y in 0..8 {
            let mut row = [0f32; 8];
            row.copy_from_slice(&block[y * 8..y * 8 + 8]);
            block[y * 8..y * 8 + 8].copy_from_slice(&idct_1d(row));
        }
    }
}

/// Same as idct_1d, where lane i of every vector belongs to column i. Every expression
/// has to stay in step with the scalar version.
#[inline(always)]
fn idct_1d_x8(x: [f32x8; 8]) -> [f32x8; 8] {
    let c1 = f32x8::splat(C1);
    let c2 = f32x8::splat(C2);
    let c3 = f32x8::splat(C3);
    let c4 = f32x8::splat(C4);
    let c5 = f32x8::splat(C5);
    let c6 = f32x8::splat(C6);
    let c7 = f32x8::splat(C7);
    let half = f32x8::splat(0.5);

    // even part
    let a = c4 * (x[0] + x[4]);
    let b = c4 * (x[0] - x[4]);
    let p = c2 * x[2] + c6 * x[6];
    let q = c6 * x[2] - c2 * x[6];

    let e0 = a + p;
    let e1 = b + q;
    let e2 = b - q;
    let e3 = a - p;

    // odd part
    let o0 = c1 * x[1] + c3 * x[3] + c5 * x[5] + c7 * x[7];
    let o1 = c3 * x[1] - c7 * x[3] - c1 * x[5] - c5 * x[7];
    let o2 = c5 * x[1] - c1 * x[3] + c7 * x[5] + c3 * x[7];
    let o3 = c7 * x[1] - c5 * x[3] + c3 * x[5] - c1 * x[7];

    [
        (e0 + o0) * half,
        (e1 + o1) * half,
        (e2 + o2) * half,
        (e3 + o3) * half,
        (e3 - o3) * half,
        (e2 - o2) * half,
        (e1 - o1) * half,
        (e0 - o0) * half,
    ]
}

#[inline(always)]
fn transpose(rows: [f32x8; 8]) -> [f32x8; 8] {
    let m: [[f32; 8]; 8] = cast(rows);
    let mut t = [[0f32; 8]; 8];
    for (y, row) in m.iter().enumerate() {
        for (x, v) in row.iter().enumerate() {
            t[x][y] = *v;
        }
    }
    cast(t)
}

impl InverseDct for VectorIdct {
    fn idct8x8(&self, block: &mut [f32; 64]) {
        let rows: [f32x8; 8] = cast(*block);

        // with one row of the block per vector, the 1-D transform runs down all columns at once
        let columns_done = idct_1d_x8(rows);
        let rows_done = idct_1d_x8(transpose(columns_done));

        *block = cast(transpose(rows_done));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::get_rand_from_seed;
    use rand::Rng;

    /// straight from the definition in T.81 A.3.3
    fn reference_idct(block: &[f32; 64]) -> [f64; 64] {
        use std::f64::consts::PI;

        let c = |k: usize| if k == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        let mut r = [0f64; 64];

        for y in 0..8 {
            for x in 0..8 {
                let mut sum = 0.0;
                for v in 0..8 {
                    for u in 0..8 {
                        sum += c(u)
                            * c(v)
                            * f64::from(block[v * 8 + u])
                            * (((2 * x + 1) as f64 * u as f64 * PI) / 16.0).cos()
                            * (((2 * y + 1) as f64 * v as f64 * PI) / 16.0).cos();
                    }
                }
                r[y * 8 + x] = sum / 4.0;
            }
        }

        r
    }

    fn random_block(rng: &mut impl Rng) -> [f32; 64] {
        let mut b = [0f32; 64];
        for (i, v) in b.iter_mut().enumerate() {
            // larger values at low frequencies like real images
            let range = 2048 >> (i / 8 + i % 8).min(10);
            *v = rng.gen_range(-range..=range) as f32;
        }
        b
    }

    #[test]
    fn dc_only_block_is_flat() {
        for implementation in [IdctImplementation::Scalar, IdctImplementation::Vector] {
            let mut block = [0f32; 64];
            block[0] = 80.0;

            select_idct(implementation).idct8x8(&mut block);

            for v in block {
                assert!((v - 10.0).abs() < 1e-4, "{0:?} {1}", implementation, v);
            }
        }
    }

    #[test]
    fn zero_block_stays_zero() {
        for implementation in [
            IdctImplementation::Auto,
            IdctImplementation::Scalar,
            IdctImplementation::Vector,
        ] {
            let mut block = [0f32; 64];
            select_idct(implementation).idct8x8(&mut block);
            assert_eq!(block, [0f32; 64]);
        }
    }

    #[test]
    fn matches_definition() {
        let mut rng = get_rand_from_seed([1; 32]);

        for _ in 0..50 {
            let input = random_block(&mut rng);
            let expected = reference_idct(&input);

            let mut block = input;
            ScalarIdct.idct8x8(&mut block);

            for i in 0..64 {
                assert!(
                    (f64::from(block[i]) - expected[i]).abs() < 1e-2,
                    "position {0}: {1} vs {2}",
                    i,
                    block[i],
                    expected[i]
                );
            }
        }
    }

    #[test]
    fn scalar_and_vector_agree() {
        let mut rng = get_rand_from_seed([2; 32]);

        for _ in 0..1000 {
            let input = random_block(&mut rng);

            let mut scalar = input;
            ScalarIdct.idct8x8(&mut scalar);

            let mut vector = input;
            VectorIdct.idct8x8(&mut vector);

            for i in 0..64 {
                assert!(
                    (scalar[i] - vector[i]).abs() < 1e-4,
                    "position {0}: {1} vs {2}",
                    i,
                    scalar[i],
                    vector[i]
                );
            }
        }
    }

    #[test]
    fn single_basis_function() {
        // coefficient (u=1, v=0) varies horizontally only and is antisymmetric
        let mut block = [0f32; 64];
        block[1] = 100.0;
        ScalarIdct.idct8x8(&mut block);

        for y in 0..8 {
            for x in 0..4 {
                assert!((block[y * 8 + x] + block[y * 8 + 7 - x]).abs() < 1e-4);
                assert!((block[y * 8 + x] - block[x]).abs() < 1e-4);
            }
        }
        assert!(block[0] > 0.0);
    }
}
