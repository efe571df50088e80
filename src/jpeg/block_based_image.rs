/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use super::component_info::ComponentInfo;
use crate::consts::{RASTER_TO_ZIGZAG, ZIGZAG_TO_RASTER};

/// reorders a block given in zigzag (transmission) order into natural row-major order
pub fn zigzag_to_natural(block: &[i16; 64]) -> [i16; 64] {
    let mut r = [0i16; 64];
    for i in 0..64 {
        r[usize::from(ZIGZAG_TO_RASTER[i])] = block[i];
    }
    r
}

/// reorders a block given in natural row-major order into zigzag (transmission) order
pub fn natural_to_zigzag(block: &[i16; 64]) -> [i16; 64] {
    let mut r = [0i16; 64];
    for i in 0..64 {
        r[usize::from(RASTER_TO_ZIGZAG[i])] = block[i];
    }
    r
}

/// One 8x8 block of DCT coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct AlignedBlock {
    raw_data: [i16; 64],
}

impl Default for AlignedBlock {
    fn default() -> Self {
        AlignedBlock { raw_data: [0; 64] }
    }
}

impl AlignedBlock {
    pub fn new(block: [i16; 64]) -> Self {
        AlignedBlock { raw_data: block }
    }

    #[inline(always)]
    pub fn get_block(&self) -> &[i16; 64] {
        &self.raw_data
    }

    #[inline(always)]
    pub fn get_block_mut(&mut self) -> &mut [i16; 64] {
        &mut self.raw_data
    }

    #[inline(always)]
    pub fn get_coefficient(&self, index: usize) -> i16 {
        self.raw_data[index]
    }

    #[inline(always)]
    pub fn set_coefficient(&mut self, index: usize, v: i16) {
        self.raw_data[index] = v;
    }

    pub fn get_count_of_non_zeros(&self) -> usize {
        self.raw_data.iter().filter(|&&c| c != 0).count()
    }
}

/// The coefficients of all the blocks of one component.
///
/// The grid is padded to whole MCUs (bch x bcv blocks) so that interleaved scans can
/// address every block of every MCU. Blocks are kept in zigzag order while the scans
/// are being decoded and are converted to natural order once all of them are done.
#[derive(Clone, Debug)]
pub struct BlockBasedImage {
    block_width: u32,
    block_height: u32,
    sfh: u32,
    sfv: u32,
    natural_order: bool,
    image: Vec<AlignedBlock>,
}

impl BlockBasedImage {
    /// all zero coefficient plane for a component
    pub fn new(info: &ComponentInfo) -> Self {
        BlockBasedImage {
            block_width: info.bch,
            block_height: info.bcv,
            sfh: info.sfh,
            sfv: info.sfv,
            natural_order: false,
            image: vec![AlignedBlock::default(); info.bc as usize],
        }
    }

    pub fn get_block_width(&self) -> u32 {
        self.block_width
    }

    pub fn get_block_height(&self) -> u32 {
        self.block_height
    }

    /// true once convert_to_natural_order has been called
    pub fn is_natural_order(&self) -> bool {
        self.natural_order
    }

    /// index of a block given its position in the block grid
    #[inline(always)]
    pub fn block_index(&self, bx: u32, by: u32) -> u32 {
        by * self.block_width + bx
    }

    /// index of sub block (sub_x, sub_y) of the MCU at (mcu_x, mcu_y)
    #[inline(always)]
    pub fn mcu_block_index(&self, mcu_x: u32, mcu_y: u32, sub_x: u32, sub_y: u32) -> u32 {
        self.block_index(mcu_x * self.sfh + sub_x, mcu_y * self.sfv + sub_y)
    }

    #[inline(always)]
    pub fn get_block(&self, dpos: u32) -> &AlignedBlock {
        &self.image[dpos as usize]
    }

    #[inline(always)]
    pub fn get_block_mut(&mut self, dpos: u32) -> &mut AlignedBlock {
        &mut self.image[dpos as usize]
    }

    /// the blocks of one row of the block grid
    pub fn get_block_row(&self, by: u32) -> &[AlignedBlock] {
        let start = (by * self.block_width) as usize;
        &self.image[start..start + self.block_width as usize]
    }

    /// reorders every block from zigzag to natural order, only the first call does anything
    pub fn convert_to_natural_order(&mut self) {
        if self.natural_order {
            return;
        }

        for b in self.image.iter_mut() {
            *b = AlignedBlock::new(zigzag_to_natural(b.get_block()));
        }
        self.natural_order = true;
    }
}
