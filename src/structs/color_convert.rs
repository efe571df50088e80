/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use super::upsample::PlaneBand;
use crate::jpeg::jpeg_header::FrameInfo;
use crate::jpeg_error::{ExitCode, Result, err_exit_code};

/// Layout of the pixels in the decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 4 bytes per pixel, alpha is always 255
    #[default]
    Rgba,
    /// 3 bytes per pixel
    Rgb,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Rgb => 3,
        }
    }
}

/// Which frame component plays which role in the color transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLayout {
    Grey,
    YCbCr { y: usize, cb: usize, cr: usize },
}

impl ColorLayout {
    /// Resolves the roles from the component ids declared in the frame header. We
    /// only accept the two common numbering schemes, (1,2,3) as per JFIF and the
    /// zero based (0,1,2), and never guess from sampling factors or order.
    pub fn from_frame(frame: &FrameInfo) -> Result<Self> {
        match frame.components.len() {
            1 => Ok(ColorLayout::Grey),
            3 => {
                for ids in [[1u8, 2, 3], [0, 1, 2]] {
                    if let (Some(y), Some(cb), Some(cr)) = (
                        frame.component_index(ids[0]),
                        frame.component_index(ids[1]),
                        frame.component_index(ids[2]),
                    ) {
                        return Ok(ColorLayout::YCbCr { y, cb, cr });
                    }
                }

                err_exit_code(
                    ExitCode::UnsupportedFeature,
                    format!(
                        "component ids {0:?} are not a known YCbCr numbering",
                        frame.components.iter().map(|c| c.jid).collect::<Vec<_>>()
                    ),
                )
            }
            n => err_exit_code(
                ExitCode::UnsupportedFeature,
                format!("no color conversion for {0} components", n),
            ),
        }
    }
}

#[inline(always)]
fn clamp_round(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// BT.601 full range conversion as used by JFIF
#[inline(always)]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;

    [
        clamp_round(y + 1.402 * cr),
        clamp_round(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp_round(y + 1.772 * cb),
    ]
}

/// Interleaves the component planes of a band into pixels of the requested format.
pub fn convert_band(layout: ColorLayout, planes: &[PlaneBand], format: PixelFormat) -> Vec<u8> {
    let bpp = format.bytes_per_pixel();
    let rows = planes.first().map_or(0, |p| p.rows());

    let mut out = Vec::new();

    for row in 0..rows {
        match layout {
            ColorLayout::Grey => {
                for &v in planes[0].row(row) {
                    out.extend_from_slice(&[v, v, v, 255][..bpp]);
                }
            }
            ColorLayout::YCbCr { y, cb, cr } => {
                let (y_row, cb_row, cr_row) =
                    (planes[y].row(row), planes[cb].row(row), planes[cr].row(row));

                for x in 0..y_row.len() {
                    let [r, g, b] = ycbcr_to_rgb(y_row[x], cb_row[x], cr_row[x]);
                    out.extend_from_slice(&[r, g, b, 255][..bpp]);
                }
            }
        }
    }

    out
}
