/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Turns IDCT output into samples and spreads subsampled components over full resolution
//! planes (nearest neighbour, each sample is replicated over its scale_x x scale_y cell).

use crate::jpeg::ComponentInfo;
use crate::jpeg::jpeg_header::FrameInfo;
use crate::jpeg_error::{ExitCode, Result, err_exit_code};

/// How many output pixels one sample of a component covers in each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleScale {
    pub scale_x: u32,
    pub scale_y: u32,
}

impl SampleScale {
    pub fn for_component(frame: &FrameInfo, info: &ComponentInfo) -> Result<Self> {
        if frame.sfhm % info.sfh != 0 || frame.sfvm % info.sfv != 0 {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                format!(
                    "component {0} sampling {1}x{2} is not an integer fraction of {3}x{4}",
                    info.jid, info.sfh, info.sfv, frame.sfhm, frame.sfvm
                ),
            );
        }

        Ok(SampleScale {
            scale_x: info.scale_x(frame.sfhm),
            scale_y: info.scale_y(frame.sfvm),
        })
    }
}

/// level shift back to unsigned samples, rounding half away from zero
#[inline(always)]
pub fn to_sample(v: f32) -> u8 {
    (v + 128.0).round().clamp(0.0, 255.0) as u8
}

/// One full resolution component plane covering the pixel rows of a band of the image.
pub struct PlaneBand {
    width: u32,
    first_row: u32,
    rows: u32,
    samples: Vec<u8>,
}

impl PlaneBand {
    /// a band of `rows` pixel rows starting at image row `first_row`
    pub fn new(width: u32, first_row: u32, rows: u32) -> Self {
        PlaneBand {
            width,
            first_row,
            rows,
            samples: vec![0; width as usize * rows as usize],
        }
    }

    /// samples of a pixel row, relative to the start of the band
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width as usize;
        &self.samples[start..start + self.width as usize]
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Writes the IDCT output of the block at (bx, by) in the block grid of its component.
    /// Anything that falls outside of the image or the band is padding and gets dropped.
    pub fn store_block(&mut self, pixels: &[f32; 64], bx: u32, by: u32, scale: SampleScale) {
        let x0 = bx * 8 * scale.scale_x;
        let y0 = by * 8 * scale.scale_y;
        let band_end = self.first_row + self.rows;

        for r in 0..8 {
            let cell_top = y0 + r * scale.scale_y;
            if cell_top >= band_end {
                break;
            }

            for dy in 0..scale.scale_y {
                let y = cell_top + dy;
                if y < self.first_row || y >= band_end {
                    continue;
                }

                let row_start = (y - self.first_row) as usize * self.width as usize;

                for c in 0..8 {
                    let v = to_sample(pixels[(r * 8 + c) as usize]);
                    let cell_left = x0 + c * scale.scale_x;

                    for dx in 0..scale.scale_x {
                        let x = cell_left + dx;
                        if x >= self.width {
                            break;
                        }
                        self.samples[row_start + x as usize] = v;
                    }
                }
            }
        }
    }
}
