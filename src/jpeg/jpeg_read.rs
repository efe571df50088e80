/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Entropy decoding of the scans of a frame into coefficient planes.

use log::{debug, trace, warn};

use super::bit_reader::BitReader;
use super::block_based_image::BlockBasedImage;
use super::huffman_table::HuffmanTable;
use super::jpeg_header::{FrameInfo, ParsedJpeg, ScanInfo, ScanKind, ScanSegment};
use super::jpeg_position_state::JpegPositionState;
use super::progressive_read::{ProgressiveTracker, decode_progressive_scan};
use crate::consts::*;
use crate::helpers::*;
use crate::jpeg_error::{AddContext, ExitCode, Result, err_exit_code};

/// Decodes every scan of the image into one coefficient plane per frame component.
///
/// The planes are shared by all the scans, so sequential images split into one scan
/// per component and progressive images that build up the coefficients over many
/// scans end up in the same place. Once all scans are done the blocks are converted
/// from zigzag to natural order.
pub fn read_scans(data: &[u8], parsed: &ParsedJpeg) -> Result<Vec<BlockBasedImage>> {
    let frame = &parsed.frame;

    let mut planes: Vec<BlockBasedImage> =
        frame.components.iter().map(BlockBasedImage::new).collect();

    let mut tracker = ProgressiveTracker::new(frame.components.len());

    for (index, scan) in parsed.scans.iter().enumerate() {
        let Some(payload) = data.get(scan.payload.clone()) else {
            return err_exit_code(
                ExitCode::AssertionFailure,
                format!("scan {0} payload {1:?} is outside of the data", index, scan.payload),
            );
        };

        let kind = scan.info.kind(frame.jpeg_type);

        debug!(
            "decoding scan {0} ({1:?}) at offset {2}, {3} bytes",
            index,
            kind,
            scan.payload.start,
            payload.len()
        );

        match kind {
            ScanKind::Sequential => {
                decode_sequential_scan(frame, scan, payload, &mut planes).context()?
            }
            _ => {
                tracker.start_scan(frame, &scan.info, kind).context()?;
                decode_progressive_scan(frame, scan, kind, payload, &mut planes).context()?;
            }
        }
    }

    for p in planes.iter_mut() {
        p.convert_to_natural_order();
    }

    Ok(planes)
}

/// Per scan state: reader, position and the DC predictors of the scan components.
///
/// Created fresh for every scan, so nothing carries over from one scan to the next
/// except the coefficients themselves.
pub struct ScanDecodeContext<'a> {
    pub bit_reader: BitReader<'a>,
    pub state: JpegPositionState,

    /// DC predictor of each component of the scan (indexed like ScanInfo::components)
    pub dc_pred: [i32; MAX_COMPONENTS],

    restart_interval: u16,
    next_restart: u8,
}

impl<'a> ScanDecodeContext<'a> {
    pub fn new(payload: &'a [u8], scan: &ScanSegment) -> Self {
        ScanDecodeContext {
            bit_reader: BitReader::new(payload),
            state: JpegPositionState::new(&scan.info, scan.restart_interval),
            dc_pred: [0; MAX_COMPONENTS],
            restart_interval: scan.restart_interval,
            next_restart: 0,
        }
    }

    /// Moves on to the next block of the scan, reading the restart marker if a restart
    /// interval just ended. Returns false once every block has been visited.
    pub fn next_block(&mut self, frame: &FrameInfo, info: &ScanInfo) -> Result<bool> {
        match self.state.next_mcu_pos(frame, info) {
            JpegDecodeStatus::DecodeInProgress => Ok(true),
            JpegDecodeStatus::RestartIntervalExpired => {
                self.handle_restart().context()?;
                Ok(true)
            }
            JpegDecodeStatus::ScanCompleted => {
                trace!(
                    "scan completed with {0} bits buffered at offset {1}",
                    self.bit_reader.bits_buffered(),
                    self.bit_reader.position()
                );
                Ok(false)
            }
        }
    }

    /// resynchronizes on the restart marker and resets everything that doesn't
    /// carry over a restart boundary
    fn handle_restart(&mut self) -> Result<()> {
        self.bit_reader.align_to_byte();

        let rst = self.bit_reader.read_restart_marker().context()?;
        if rst != self.next_restart {
            warn!(
                "expected RST{0} before MCU {1} but found RST{2}",
                self.next_restart,
                self.state.get_mcu(),
                rst
            );
        }

        self.next_restart = (rst + 1) & 7;
        self.dc_pred = [0; MAX_COMPONENTS];
        self.state.reset_rstw(self.restart_interval);

        Ok(())
    }
}

/// Decodes a sequential (baseline or extended) scan, which carries the complete
/// coefficients of each block it covers.
pub fn decode_sequential_scan(
    frame: &FrameInfo,
    scan: &ScanSegment,
    payload: &[u8],
    planes: &mut [BlockBasedImage],
) -> Result<()> {
    let mut tables = Vec::with_capacity(scan.tables.len());
    for (sc, t) in scan.info.components.iter().zip(scan.tables.iter()) {
        let (Some(dc), Some(ac)) = (t.dc.as_deref(), t.ac.as_deref()) else {
            return err_exit_code(
                ExitCode::MissingTableReference,
                format!(
                    "huffman tables {0}/{1} missing for component {2}",
                    sc.dc_table, sc.ac_table, frame.components[sc.component].jid
                ),
            );
        };
        tables.push((dc, ac));
    }

    let mut ctx = ScanDecodeContext::new(payload, scan);

    loop {
        let csc = ctx.state.get_csc();
        let (dc, ac) = tables[csc];

        let mut block = [0i16; 64];
        decode_block_seq(&mut ctx.bit_reader, dc, ac, &mut ctx.dc_pred[csc], &mut block)
            .context()?;

        *planes[ctx.state.get_cmp()]
            .get_block_mut(ctx.state.get_dpos())
            .get_block_mut() = block;

        if !ctx.next_block(frame, &scan.info)? {
            break;
        }
    }

    Ok(())
}

/// Reads the DC difference of a block (T.81 F.2.2.1) and returns it sign extended
#[inline(always)]
pub(crate) fn read_dc_diff(bit_reader: &mut BitReader, dctree: &HuffmanTable) -> Result<i32> {
    let s = dctree.decode(bit_reader)?;
    if s > 11 {
        return err_exit_code(
            ExitCode::CorruptCoefficientRun,
            format!("DC magnitude category {0} is out of range", s),
        );
    }

    Ok(i32::from(bit_reader.read_signed(s)?))
}

/// adds the difference to the predictor and returns the new DC value
#[inline(always)]
pub(crate) fn apply_dc_diff(pred: &mut i32, diff: i32) -> Result<i16> {
    *pred += diff;

    match i16::try_from(*pred) {
        Ok(v) => Ok(v),
        Err(_) => err_exit_code(
            ExitCode::CorruptCoefficientRun,
            format!("DC value {0} is out of range", *pred),
        ),
    }
}

/// sequential block decoding routine, block is in zigzag order
#[inline(never)]
pub(crate) fn decode_block_seq(
    bit_reader: &mut BitReader,
    dctree: &HuffmanTable,
    actree: &HuffmanTable,
    pred: &mut i32,
    block: &mut [i16; 64],
) -> Result<()> {
    // decode dc
    let diff = read_dc_diff(bit_reader, dctree)?;
    block[0] = apply_dc_diff(pred, diff)?;

    // decode ac
    let mut bpos: usize = 1;
    while bpos < 64 {
        let hc = actree.decode(bit_reader)?;

        let z = usize::from(lbits(hc, 4));
        let s = rbits(hc, 4);

        if s == 0 {
            if z == 15 {
                // ZRL: 16 zeros, which may end exactly at the end of the block
                bpos += 16;
                if bpos > 64 {
                    return err_exit_code(
                        ExitCode::CorruptCoefficientRun,
                        format!("zero run extends to coefficient {0}", bpos - 1),
                    );
                }
                continue;
            }

            // EOB
            break;
        }

        if s > 10 {
            return err_exit_code(
                ExitCode::CorruptCoefficientRun,
                format!("AC magnitude category {0} is out of range", s),
            );
        }

        // no need to write the zeros since we are already zero initialized
        bpos += z;
        if bpos > 63 {
            return err_exit_code(
                ExitCode::CorruptCoefficientRun,
                format!("run of {0} zeros goes past the end of the block", z),
            );
        }

        block[bpos] = bit_reader.read_signed(s)?;
        bpos += 1;
    }

    Ok(())
}
