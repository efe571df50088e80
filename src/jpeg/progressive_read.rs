/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Decoding of the four kinds of progressive scans (T.81 G.1.2). Each scan adds
//! to the coefficients that the earlier scans left in the planes.

use log::{trace, warn};

use super::bit_reader::BitReader;
use super::block_based_image::BlockBasedImage;
use super::huffman_table::HuffmanTable;
use super::jpeg_header::{FrameInfo, ScanInfo, ScanKind, ScanSegment};
use super::jpeg_read::{ScanDecodeContext, apply_dc_diff, read_dc_diff};
use crate::helpers::*;
use crate::jpeg_error::{AddContext, ExitCode, Result, err_exit_code};

/// Keeps track of which coefficients of which component the scans so far have
/// covered, and the bit position they went down to.
pub struct ProgressiveTracker {
    /// Al of the last scan that covered each coefficient, None if none did yet
    coef_bits: Vec<[Option<u8>; 64]>,
}

impl ProgressiveTracker {
    pub fn new(num_components: usize) -> Self {
        ProgressiveTracker {
            coef_bits: vec![[None; 64]; num_components],
        }
    }

    /// Checks the scan against what came before. Only a DC refinement of a component whose
    /// DC hasn't been started is fatal, the rest is tolerated the way libjpeg does.
    pub fn start_scan(&mut self, frame: &FrameInfo, info: &ScanInfo, kind: ScanKind) -> Result<()> {
        let refine = matches!(kind, ScanKind::DcRefine | ScanKind::AcRefine);

        for sc in &info.components {
            let jid = frame.components[sc.component].jid;
            let bits = &mut self.coef_bits[sc.component];

            if info.ss > 0 && bits[0].is_none() {
                warn!("AC scan of component {0} before its DC first scan", jid);
            }

            let mut unexpected = false;
            for k in usize::from(info.ss)..=usize::from(info.se) {
                match (refine, bits[k]) {
                    (true, None) => {
                        if k == 0 {
                            return err_exit_code(
                                ExitCode::MalformedContainer,
                                format!(
                                    "DC refinement scan of component {0} before its first DC scan",
                                    jid
                                ),
                            );
                        }
                        unexpected = true;
                    }
                    (true, Some(prev_al)) => unexpected |= prev_al != info.ah,
                    (false, Some(_)) => unexpected = true,
                    (false, None) => {}
                }

                bits[k] = Some(info.al);
            }

            if unexpected {
                warn!(
                    "scan {0}..{1} ah={2} al={3} of component {4} doesn't follow on from the previous scans",
                    info.ss, info.se, info.ah, info.al, jid
                );
            }
        }

        Ok(())
    }
}

/// Decodes a progressive scan of the given kind into the planes.
pub fn decode_progressive_scan(
    frame: &FrameInfo,
    scan: &ScanSegment,
    kind: ScanKind,
    payload: &[u8],
    planes: &mut [BlockBasedImage],
) -> Result<()> {
    let info = &scan.info;

    // huffman table each scan component needs for this kind of scan
    let mut tables: Vec<Option<&HuffmanTable>> = Vec::with_capacity(info.components.len());
    for (sc, t) in info.components.iter().zip(scan.tables.iter()) {
        let table = match kind {
            ScanKind::DcFirst => t.dc.as_deref(),
            ScanKind::AcFirst | ScanKind::AcRefine => t.ac.as_deref(),
            _ => {
                tables.push(None);
                continue;
            }
        };

        if table.is_none() {
            return err_exit_code(
                ExitCode::MissingTableReference,
                format!(
                    "huffman table missing for component {0} in {1:?} scan",
                    frame.components[sc.component].jid, kind
                ),
            );
        }
        tables.push(table);
    }

    let mut ctx = ScanDecodeContext::new(payload, scan);

    loop {
        let csc = ctx.state.get_csc();
        let block = planes[ctx.state.get_cmp()]
            .get_block_mut(ctx.state.get_dpos())
            .get_block_mut();

        match (kind, tables[csc]) {
            (ScanKind::DcFirst, Some(dc)) => {
                let diff = read_dc_diff(&mut ctx.bit_reader, dc)?;
                let v = apply_dc_diff(&mut ctx.dc_pred[csc], diff)?;
                block[0] = point_transform(v, info.al)?;
            }
            (ScanKind::DcRefine, _) => {
                if ctx.bit_reader.read_bit()? != 0 {
                    block[0] |= 1 << info.al;
                }
            }
            (ScanKind::AcFirst, Some(ac)) => {
                if ctx.state.eobrun > 0 {
                    ctx.state.eobrun -= 1;
                } else {
                    decode_ac_first(
                        &mut ctx.bit_reader,
                        ac,
                        block,
                        info,
                        &mut ctx.state.eobrun,
                    )
                    .context()?;
                }
            }
            (ScanKind::AcRefine, Some(ac)) => {
                decode_ac_refine(
                    &mut ctx.bit_reader,
                    ac,
                    block,
                    info,
                    &mut ctx.state.eobrun,
                )
                .context()?;
            }
            _ => {
                return err_exit_code(
                    ExitCode::AssertionFailure,
                    format!("{0:?} scan without the table it needs", kind),
                );
            }
        }

        if !ctx.next_block(frame, info)? {
            break;
        }
    }

    if ctx.state.eobrun > 0 {
        trace!("EOB run of {0} blocks left at the end of the scan", ctx.state.eobrun);
    }

    Ok(())
}

/// scales a decoded value up by the successive approximation bit position
#[inline(always)]
fn point_transform(v: i16, al: u8) -> Result<i16> {
    let shifted = i32::from(v) << al;

    match i16::try_from(shifted) {
        Ok(r) => Ok(r),
        Err(_) => err_exit_code(
            ExitCode::CorruptCoefficientRun,
            format!("coefficient {0} << {1} is out of range", v, al),
        ),
    }
}

/// length of an EOB run, the top bit of which is implied by the symbol (T.81 G.1.2.2)
#[inline(always)]
fn read_eobrun(bit_reader: &mut BitReader, r: u8) -> Result<u32> {
    Ok((1u32 << r) + u32::from(bit_reader.read(u32::from(r))?))
}

/// First scan of a band of AC coefficients for one block, block is in zigzag order.
/// `eobrun` is only touched when the block ends with an EOB run, in which case it
/// is set to the number of blocks that follow this one in the run.
fn decode_ac_first(
    bit_reader: &mut BitReader,
    actree: &HuffmanTable,
    block: &mut [i16; 64],
    info: &ScanInfo,
    eobrun: &mut u32,
) -> Result<()> {
    let se = usize::from(info.se);

    let mut bpos = usize::from(info.ss);
    while bpos <= se {
        let hc = actree.decode(bit_reader)?;

        let r = lbits(hc, 4);
        let s = rbits(hc, 4);

        if s == 0 {
            if r == 15 {
                bpos += 16;
                if bpos > se + 1 {
                    return err_exit_code(
                        ExitCode::CorruptCoefficientRun,
                        format!("zero run extends past the end of band {0}", se),
                    );
                }
                continue;
            }

            // count this block
            *eobrun = read_eobrun(bit_reader, r)? - 1;
            break;
        }

        if s > 10 {
            return err_exit_code(
                ExitCode::CorruptCoefficientRun,
                format!("AC magnitude category {0} is out of range", s),
            );
        }

        bpos += usize::from(r);
        if bpos > se {
            return err_exit_code(
                ExitCode::CorruptCoefficientRun,
                format!("run of {0} zeros goes past the end of band {1}", r, se),
            );
        }

        block[bpos] = point_transform(bit_reader.read_signed(s)?, info.al)?;
        bpos += 1;
    }

    Ok(())
}

/// Where the AC refinement decoder is within a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefineState {
    /// the block is part of an EOB run, only correction bits are left
    ApplyingActiveEobRun,

    /// the next run/size symbol is due
    DecodingSymbol,

    /// Skipping `run` coefficients that are still zero, correcting the nonzero ones
    /// along the way. `value` is the new coefficient that goes after the run,
    /// None for a ZRL.
    SkippingZeroRun { run: u8, value: Option<i16> },

    /// the new coefficient goes into the current position
    StoringNewCoefficient { value: i16 },
}

/// adds one more bit of precision to a coefficient that is already nonzero
#[inline(always)]
fn apply_correction_bit(bit_reader: &mut BitReader, coef: &mut i16, p1: i16) -> Result<()> {
    if bit_reader.read_bit()? != 0 && (*coef & p1) == 0 {
        if *coef >= 0 {
            *coef += p1;
        } else {
            *coef -= p1;
        }
    }

    Ok(())
}

/// Refinement scan of a band of AC coefficients for one block (T.81 G.1.2.3),
/// block is in zigzag order and holds what the earlier scans decoded.
fn decode_ac_refine(
    bit_reader: &mut BitReader,
    actree: &HuffmanTable,
    block: &mut [i16; 64],
    info: &ScanInfo,
    eobrun: &mut u32,
) -> Result<()> {
    let se = usize::from(info.se);
    let p1: i16 = 1 << info.al;

    let mut bpos = usize::from(info.ss);
    let mut state = if *eobrun > 0 {
        RefineState::ApplyingActiveEobRun
    } else {
        RefineState::DecodingSymbol
    };

    loop {
        state = match state {
            RefineState::DecodingSymbol => {
                if bpos > se {
                    // the band was filled without an EOB
                    return Ok(());
                }

                let hc = actree.decode(bit_reader)?;
                let r = lbits(hc, 4);
                let s = rbits(hc, 4);

                match s {
                    0 if r == 15 => RefineState::SkippingZeroRun {
                        run: 15,
                        value: None,
                    },
                    0 => {
                        *eobrun = read_eobrun(bit_reader, r)?;
                        RefineState::ApplyingActiveEobRun
                    }
                    1 => {
                        let value = if bit_reader.read_bit()? != 0 { p1 } else { -p1 };
                        RefineState::SkippingZeroRun {
                            run: r,
                            value: Some(value),
                        }
                    }
                    _ => {
                        return err_exit_code(
                            ExitCode::CorruptCoefficientRun,
                            format!(
                                "new coefficient in a refinement scan has magnitude category {0}",
                                s
                            ),
                        );
                    }
                }
            }

            RefineState::SkippingZeroRun { run, value } => {
                if bpos > se {
                    return err_exit_code(
                        ExitCode::CorruptCoefficientRun,
                        format!("zero run goes past the end of band {0}", se),
                    );
                }

                if block[bpos] != 0 {
                    apply_correction_bit(bit_reader, &mut block[bpos], p1)?;
                    bpos += 1;
                    RefineState::SkippingZeroRun { run, value }
                } else if run > 0 {
                    bpos += 1;
                    RefineState::SkippingZeroRun {
                        run: run - 1,
                        value,
                    }
                } else {
                    match value {
                        Some(value) => RefineState::StoringNewCoefficient { value },
                        None => {
                            // last zero of a ZRL
                            bpos += 1;
                            RefineState::DecodingSymbol
                        }
                    }
                }
            }

            RefineState::StoringNewCoefficient { value } => {
                block[bpos] = value;
                bpos += 1;
                RefineState::DecodingSymbol
            }

            RefineState::ApplyingActiveEobRun => {
                for coef in block[bpos..=se].iter_mut() {
                    if *coef != 0 {
                        apply_correction_bit(bit_reader, coef, p1)?;
                    }
                }

                // this block was the first one of the run
                *eobrun -= 1;
                return Ok(());
            }
        };
    }
}
