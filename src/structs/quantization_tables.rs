/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::jpeg::block_based_image::AlignedBlock;

/// The quantization table a component was coded with, in natural order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationTables {
    quantization_table: [u16; 64],
}

impl QuantizationTables {
    pub fn new_from_table(quantization_table: &[u16; 64]) -> Self {
        QuantizationTables {
            quantization_table: *quantization_table,
        }
    }

    pub fn get_quantization_table(&self) -> &[u16; 64] {
        &self.quantization_table
    }

    /// multiplies a block of natural order coefficients by the table
    #[inline(always)]
    pub fn dequantize_block(&self, block: &AlignedBlock) -> [f32; 64] {
        dequantize(block.get_block(), &self.quantization_table)
    }
}

/// elementwise product of coefficients and quantization table, both in natural order
#[inline(always)]
pub fn dequantize(coeffs: &[i16; 64], q: &[u16; 64]) -> [f32; 64] {
    let mut r = [0f32; 64];
    for i in 0..64 {
        r[i] = f32::from(coeffs[i]) * f32::from(q[i]);
    }
    r
}

#[test]
fn dequantize_is_elementwise() {
    let mut coeffs = [0i16; 64];
    let mut q = [1u16; 64];
    coeffs[0] = -3;
    coeffs[9] = 7;
    q[0] = 16;
    q[9] = 255;
    q[63] = 99;

    let tables = QuantizationTables::new_from_table(&q);
    let r = tables.dequantize_block(&AlignedBlock::new(coeffs));

    assert_eq!(r[0], -48.0);
    assert_eq!(r[9], 1785.0);
    assert_eq!(r[63], 0.0);
    assert_eq!(tables.get_quantization_table()[63], 99);
}
