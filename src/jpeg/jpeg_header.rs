/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Splits a JPEG file into its marker segments and builds the frame model
//! (frame, components, scans, quantization and Huffman tables) out of them.

use std::ops::Range;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};

use super::block_based_image::AlignedBlock;
use super::component_info::ComponentInfo;
use super::huffman_table::HuffmanTable;
use super::jpeg_code;
use crate::consts::*;
use crate::enabled_features::EnabledFeatures;
use crate::helpers::*;
use crate::jpeg_error::{AddContext, ExitCode, Result, err_exit_code};

/// The frame header (SOFn) along with everything derived from it.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// sample precision in bits, always 8
    pub precision: u8,
    pub img_width: u32,
    pub img_height: u32,
    pub jpeg_type: JpegType,
    /// components in the order they are declared in the frame header
    pub components: Vec<ComponentInfo>,
    /// max horizontal sample factor
    pub sfhm: u32,
    /// max vertical sample factor
    pub sfvm: u32,
    /// mcus per line
    pub mcuh: u32,
    /// mcus per column
    pub mcuv: u32,
}

impl FrameInfo {
    pub fn mcu_count(&self) -> u32 {
        self.mcuh * self.mcuv
    }

    /// bytes needed to hold the coefficient planes of every component
    pub fn coefficient_memory(&self) -> u64 {
        self.components
            .iter()
            .map(|c| u64::from(c.bc) * std::mem::size_of::<AlignedBlock>() as u64)
            .sum()
    }

    /// index in the frame of the component with the given id
    pub fn component_index(&self, jid: u8) -> Option<usize> {
        self.components.iter().position(|c| c.jid == jid)
    }
}

/// A component taking part in a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    /// index into FrameInfo::components
    pub component: usize,
    pub dc_table: u8,
    pub ac_table: u8,
}

/// The kind of data a scan carries, which decides how it is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// full blocks (baseline or extended sequential)
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

/// Scan header (SOS) parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanInfo {
    pub components: Vec<ScanComponent>,
    /// begin - band of current scan ( inclusive )
    pub ss: u8,
    /// end - band of current scan ( inclusive )
    pub se: u8,
    /// successive approximation bit pos high
    pub ah: u8,
    /// successive approximation bit pos low
    pub al: u8,
}

impl ScanInfo {
    pub fn kind(&self, jpeg_type: JpegType) -> ScanKind {
        if jpeg_type != JpegType::Progressive {
            ScanKind::Sequential
        } else if self.ss == 0 {
            if self.ah == 0 {
                ScanKind::DcFirst
            } else {
                ScanKind::DcRefine
            }
        } else if self.ah == 0 {
            ScanKind::AcFirst
        } else {
            ScanKind::AcRefine
        }
    }

    pub fn is_interleaved(&self) -> bool {
        self.components.len() > 1
    }
}

/// The Huffman tables used by one component of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanTables {
    pub dc: Option<Arc<HuffmanTable>>,
    pub ac: Option<Arc<HuffmanTable>>,
}

/// A scan header along with the state that was in effect when it was encountered
/// and the location of its entropy coded data.
#[derive(Debug, Clone)]
pub struct ScanSegment {
    pub info: ScanInfo,

    /// restart interval in effect for this scan, 0 if there are no restarts
    pub restart_interval: u16,

    /// tables for each entry of info.components, as defined at the time of the SOS
    pub tables: Vec<ScanTables>,

    /// byte range of the entropy coded data in the file, including any RST markers
    pub payload: Range<usize>,
}

/// Everything the container parser extracted from a JPEG file
#[derive(Debug, Clone)]
pub struct ParsedJpeg {
    pub frame: FrameInfo,
    pub scans: Vec<ScanSegment>,

    /// quantization table of each frame component (natural order), latched when the
    /// first scan containing the component started
    pub component_quantization: Vec<[u16; 64]>,

    /// false if the file ended without an EOI marker
    pub found_eoi: bool,

    /// number of bytes after the EOI marker
    pub trailing_bytes: usize,
}

/// state of the parser while going through the segments
#[derive(Default)]
struct HeaderState {
    frame: Option<FrameInfo>,
    q_tables: [Option<[u16; 64]>; MAX_TABLES],
    latched_q_tables: Vec<Option<[u16; 64]>>,
    dc_tables: [Option<Arc<HuffmanTable>>; MAX_TABLES],
    ac_tables: [Option<Arc<HuffmanTable>>; MAX_TABLES],
    restart_interval: u16,
    scans: Vec<ScanSegment>,
}

/// Parses a complete JPEG file held in memory.
pub fn parse_jpeg(data: &[u8], enabled_features: &EnabledFeatures) -> Result<ParsedJpeg> {
    if data.len() < 2 || data[..2] != SOI {
        return err_exit_code(ExitCode::MalformedContainer, "jpeg must start with SOI");
    }

    let mut state = HeaderState::default();
    let mut pos = 2;
    let mut found_eoi = false;
    let mut trailing_bytes = 0;

    loop {
        if pos >= data.len() {
            break;
        }

        if data[pos] != 0xff {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "expected a marker at offset {0}, found {1:02X}",
                    pos, data[pos]
                ),
            );
        }

        // any number of 0xff fill bytes may precede a marker
        while data.get(pos + 1) == Some(&0xff) {
            pos += 1;
        }

        let Some(&marker) = data.get(pos + 1) else {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!("file ends in the middle of a marker at offset {0}", pos),
            );
        };

        let marker_pos = pos;
        pos += 2;

        match marker {
            jpeg_code::EOI => {
                found_eoi = true;
                trailing_bytes = data.len() - pos;

                if trailing_bytes > 0 {
                    if enabled_features.stop_reading_at_eoi {
                        return err_exit_code(
                            ExitCode::MalformedContainer,
                            format!("{0} bytes of data after EOI", trailing_bytes),
                        );
                    }

                    debug!("ignoring {0} bytes after EOI", trailing_bytes);
                }
                break;
            }

            jpeg_code::TEM => {
                trace!("TEM marker at offset {0}", marker_pos);
                continue;
            }

            jpeg_code::SOI | jpeg_code::RST0..=jpeg_code::RST7 | 0x00 => {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!(
                        "marker {0:02X} at offset {1} is not allowed outside of scan data",
                        marker, marker_pos
                    ),
                );
            }

            _ => {}
        }

        // everything else is followed by a length
        if pos + 2 > data.len() {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "segment {0:02X} at offset {1} is truncated",
                    marker, marker_pos
                ),
            );
        }

        let segment_size = usize::from(BigEndian::read_u16(&data[pos..]));
        if segment_size < 2 {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "segment {0:02X} at offset {1} is too short",
                    marker, marker_pos
                ),
            );
        }

        if pos + segment_size > data.len() {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "segment {0:02X} at offset {1} with size {2} extends past the end of the file",
                    marker, marker_pos, segment_size
                ),
            );
        }

        let segment = &data[pos + 2..pos + segment_size];
        pos += segment_size;

        debug!(
            "segment {0:02X} at offset {1}, {2} bytes",
            marker,
            marker_pos,
            segment.len()
        );

        match marker {
            jpeg_code::SOF0 | jpeg_code::SOF1 | jpeg_code::SOF2 => {
                state
                    .parse_sof(marker, segment, enabled_features)
                    .context()?;
            }

            jpeg_code::DAC => {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    "arithmetic coding is not supported",
                );
            }

            jpeg_code::SOF3
            | jpeg_code::SOF5..=jpeg_code::SOF7
            | jpeg_code::SOF9..=jpeg_code::SOF15 => {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    format!(
                        "SOF{0} frames (lossless, differential or arithmetic coding) are not supported",
                        marker - jpeg_code::SOF0
                    ),
                );
            }

            jpeg_code::DHT => state.parse_dht(segment).context()?,
            jpeg_code::DQT => state.parse_dqt(segment, enabled_features).context()?,
            jpeg_code::DRI => state.parse_dri(segment).context()?,

            jpeg_code::DNL => {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    "DNL defined image height is not supported",
                );
            }

            jpeg_code::SOS => {
                let info = state.parse_sos(segment).context()?;

                let start = pos;
                pos = find_end_of_scan(data, pos);

                debug!(
                    "scan {0}: components {1:?} ss={2} se={3} ah={4} al={5}, {6} bytes of data",
                    state.scans.len(),
                    info.components
                        .iter()
                        .map(|c| c.component)
                        .collect::<Vec<_>>(),
                    info.ss,
                    info.se,
                    info.ah,
                    info.al,
                    pos - start
                );

                state.add_scan(info, start..pos).context()?;
            }

            jpeg_code::APP0..=jpeg_code::APP15
            | jpeg_code::JPG
            | jpeg_code::JPG0..=jpeg_code::JPG13
            | jpeg_code::COM => {
                trace!(
                    "skipping segment {0:02X} of {1} bytes",
                    marker,
                    segment.len()
                );
            }

            _ => {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!("unknown marker {0:02X} at offset {1}", marker, marker_pos),
                );
            }
        }
    }

    state.finish(found_eoi, trailing_bytes)
}

/// Returns the offset of the first marker after the entropy coded data starting at pos
/// that isn't a stuffed 0xff or a restart marker, or the end of the data.
fn find_end_of_scan(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() {
        if data[pos] != 0xff {
            pos += 1;
            continue;
        }

        match data.get(pos + 1) {
            Some(0) => pos += 2,
            Some(&m) if jpeg_code::is_restart(m) => pos += 2,
            // fill byte, look at the next one
            Some(0xff) => {
                let mut fill = pos + 1;
                while data.get(fill + 1) == Some(&0xff) {
                    fill += 1;
                }

                match data.get(fill + 1) {
                    Some(&m) if m == 0 || jpeg_code::is_restart(m) => pos = fill + 2,
                    _ => return pos,
                }
            }
            Some(_) => return pos,
            None => return data.len(),
        }
    }

    data.len()
}

fn ensure_space(segment: &[u8], hpos: usize, amount: usize) -> Result<()> {
    if hpos + amount > segment.len() {
        return err_exit_code(
            ExitCode::MalformedContainer,
            format!(
                "segment too small, needed {0} bytes at offset {1} but only {2} are present",
                amount,
                hpos,
                segment.len()
            ),
        );
    }

    Ok(())
}

impl HeaderState {
    fn parse_sof(
        &mut self,
        marker: u8,
        segment: &[u8],
        enabled_features: &EnabledFeatures,
    ) -> Result<()> {
        if self.frame.is_some() {
            return err_exit_code(
                ExitCode::MalformedContainer,
                "image cannot have multiple SOF blocks",
            );
        }

        let jpeg_type = if marker == jpeg_code::SOF2 {
            if !enabled_features.progressive {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    "progressive jpeg decoding is disabled",
                );
            }
            JpegType::Progressive
        } else {
            JpegType::Sequential
        };

        ensure_space(segment, 0, 6).context()?;

        // check data precision, only 8 bit is allowed
        let precision = segment[0];
        if precision != 8 {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                format!("{0} bit data precision is not supported", precision),
            );
        }

        let img_height = u32::from(BigEndian::read_u16(&segment[1..]));
        let img_width = u32::from(BigEndian::read_u16(&segment[3..]));

        if img_height == 0 {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                "image height defined by a DNL marker is not supported",
            );
        }

        if img_width == 0 {
            return err_exit_code(ExitCode::UnsupportedFeature, "image width can't be zero");
        }

        if img_width > enabled_features.max_jpeg_width
            || img_height > enabled_features.max_jpeg_height
        {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                format!(
                    "image dimensions {0}x{1} larger than {2}x{3}",
                    img_width,
                    img_height,
                    enabled_features.max_jpeg_width,
                    enabled_features.max_jpeg_height
                ),
            );
        }

        let cmpc = usize::from(segment[5]);
        if cmpc == 0 || cmpc > MAX_COMPONENTS {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                format!(
                    "image has {0} components, 1 to {1} are supported",
                    cmpc, MAX_COMPONENTS
                ),
            );
        }

        if segment.len() != 6 + 3 * cmpc {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "SOF with {0} components has the wrong size {1}",
                    cmpc,
                    segment.len()
                ),
            );
        }

        // (id, h, v, tq)
        let mut declared = Vec::with_capacity(cmpc);
        for cmp in 0..cmpc {
            let hpos = 6 + 3 * cmp;
            let jid = segment[hpos];
            let sfh = lbits(segment[hpos + 1], 4);
            let sfv = rbits(segment[hpos + 1], 4);
            let q_table_index = segment[hpos + 2];

            if sfh == 0 || sfh > MAX_SAMPLING_FACTOR || sfv == 0 || sfv > MAX_SAMPLING_FACTOR {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    format!(
                        "component {0} has sampling factors {1}x{2}, only 1 to {3} are allowed",
                        jid, sfh, sfv, MAX_SAMPLING_FACTOR
                    ),
                );
            }

            if usize::from(q_table_index) >= MAX_TABLES {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!(
                        "component {0} uses quantization table {1}",
                        jid, q_table_index
                    ),
                );
            }

            if declared.iter().any(|&(id, _, _, _)| id == jid) {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!("component id {0} is declared twice", jid),
                );
            }

            declared.push((jid, u32::from(sfh), u32::from(sfv), q_table_index));
        }

        let sfhm = declared.iter().map(|c| c.1).max().unwrap_or(1);
        let sfvm = declared.iter().map(|c| c.2).max().unwrap_or(1);
        let mcuh = div_ceil(img_width, 8 * sfhm);
        let mcuv = div_ceil(img_height, 8 * sfvm);

        let components = declared
            .iter()
            .map(|&(jid, sfh, sfv, q)| {
                ComponentInfo::new(
                    jid, sfh, sfv, q, img_width, img_height, sfhm, sfvm, mcuh, mcuv,
                )
            })
            .collect();

        debug!(
            "frame {0}x{1} {2:?} components {3:?}",
            img_width, img_height, jpeg_type, declared
        );

        let frame = FrameInfo {
            precision,
            img_width,
            img_height,
            jpeg_type,
            components,
            sfhm,
            sfvm,
            mcuh,
            mcuv,
        };

        // all planes are allocated up front when the first scan starts
        let coefficient_memory = frame.coefficient_memory();
        if coefficient_memory > enabled_features.max_coefficient_memory {
            return err_exit_code(
                ExitCode::OutOfMemory,
                format!(
                    "{0}x{1} frame needs {2} bytes of coefficients, the limit is {3}",
                    img_width,
                    img_height,
                    coefficient_memory,
                    enabled_features.max_coefficient_memory
                ),
            );
        }

        self.latched_q_tables = vec![None; cmpc];
        self.frame = Some(frame);

        Ok(())
    }

    fn parse_dht(&mut self, segment: &[u8]) -> Result<()> {
        let mut hpos = 0;

        while hpos < segment.len() {
            let class = lbits(segment[hpos], 4);
            let id = usize::from(rbits(segment[hpos], 4));
            if class >= 2 || id >= MAX_TABLES {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!("DHT has invalid class {0} or id {1}", class, id),
                );
            }

            hpos += 1;

            ensure_space(segment, hpos, 16).context()?;
            let mut counts = [0u8; 16];
            counts.copy_from_slice(&segment[hpos..hpos + 16]);
            hpos += 16;

            let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
            ensure_space(segment, hpos, total).context()?;

            let table = Arc::new(HuffmanTable::new(&counts, &segment[hpos..hpos + total]).context()?);
            hpos += total;

            trace!("DHT class {0} id {1} with {2} codes", class, id, total);

            if class == 0 {
                self.dc_tables[id] = Some(table);
            } else {
                self.ac_tables[id] = Some(table);
            }
        }

        Ok(())
    }

    fn parse_dqt(&mut self, segment: &[u8], enabled_features: &EnabledFeatures) -> Result<()> {
        let mut hpos = 0;

        while hpos < segment.len() {
            let precision = lbits(segment[hpos], 4);
            let id = usize::from(rbits(segment[hpos], 4));

            if precision >= 2 {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    format!("DQT precision {0} is not supported", precision),
                );
            }

            if id >= MAX_TABLES {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!("DQT has invalid index {0}", id),
                );
            }

            hpos += 1;

            let mut table = [0u16; 64];
            if precision == 0 {
                ensure_space(segment, hpos, 64).context()?;

                for i in 0..64 {
                    table[usize::from(ZIGZAG_TO_RASTER[i])] = u16::from(segment[hpos + i]);
                }
                hpos += 64;
            } else {
                ensure_space(segment, hpos, 128).context()?;

                for i in 0..64 {
                    table[usize::from(ZIGZAG_TO_RASTER[i])] =
                        BigEndian::read_u16(&segment[hpos + 2 * i..]);
                }
                hpos += 128;
            }

            if table.contains(&0) {
                if enabled_features.reject_dqts_with_zeros {
                    return err_exit_code(
                        ExitCode::UnsupportedFeature,
                        format!("DQT {0} has zero value", id),
                    );
                }

                warn!("quantization table {0} contains zeros", id);
            }

            self.q_tables[id] = Some(table);
        }

        Ok(())
    }

    fn parse_dri(&mut self, segment: &[u8]) -> Result<()> {
        if segment.len() != 2 {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!("DRI segment has size {0}, expected 2", segment.len()),
            );
        }

        self.restart_interval = BigEndian::read_u16(segment);
        Ok(())
    }

    fn parse_sos(&self, segment: &[u8]) -> Result<ScanInfo> {
        let Some(frame) = &self.frame else {
            return err_exit_code(ExitCode::MalformedContainer, "SOS before SOF");
        };

        ensure_space(segment, 0, 1).context()?;

        let cs_cmpc = usize::from(segment[0]);
        if cs_cmpc == 0 || cs_cmpc > frame.components.len() {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "{0} components in scan, only 1 to {1} are allowed",
                    cs_cmpc,
                    frame.components.len()
                ),
            );
        }

        if segment.len() != 1 + 2 * cs_cmpc + 3 {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "SOS with {0} components has the wrong size {1}",
                    cs_cmpc,
                    segment.len()
                ),
            );
        }

        let mut components: Vec<ScanComponent> = Vec::with_capacity(cs_cmpc);
        for i in 0..cs_cmpc {
            let hpos = 1 + 2 * i;
            let jid = segment[hpos];

            let Some(component) = frame.component_index(jid) else {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!("component id {0} in scan is not part of the frame", jid),
                );
            };

            if components.iter().any(|c| c.component == component) {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!("component id {0} appears twice in scan", jid),
                );
            }

            let dc_table = lbits(segment[hpos + 1], 4);
            let ac_table = rbits(segment[hpos + 1], 4);
            if usize::from(dc_table) >= MAX_TABLES || usize::from(ac_table) >= MAX_TABLES {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!(
                        "component {0} selects huffman tables {1}/{2}",
                        jid, dc_table, ac_table
                    ),
                );
            }

            components.push(ScanComponent {
                component,
                dc_table,
                ac_table,
            });
        }

        let hpos = 1 + 2 * cs_cmpc;
        let info = ScanInfo {
            components,
            ss: segment[hpos],
            se: segment[hpos + 1],
            ah: lbits(segment[hpos + 2], 4),
            al: rbits(segment[hpos + 2], 4),
        };

        if info.ss > info.se || info.se > 63 {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "spectral selection {0}..{1} out of range",
                    info.ss, info.se
                ),
            );
        }

        if info.ah > MAX_SUCCESSIVE_APPROXIMATION || info.al > MAX_SUCCESSIVE_APPROXIMATION {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "successive approximation {0}/{1} out of range",
                    info.ah, info.al
                ),
            );
        }

        if frame.jpeg_type == JpegType::Progressive {
            if info.ss == 0 && info.se != 0 {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    "progressive DC scan can't contain AC coefficients",
                );
            }

            if info.ss > 0 && cs_cmpc != 1 {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    "progressive AC scan must contain exactly one component",
                );
            }
        } else if info.ss != 0 || info.se != 63 || info.ah != 0 || info.al != 0 {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "sequential scan has ss={0} se={1} ah={2} al={3}",
                    info.ss, info.se, info.ah, info.al
                ),
            );
        }

        if info.is_interleaved() {
            let blocks: u32 = info
                .components
                .iter()
                .map(|c| frame.components[c.component].mbs)
                .sum();

            if blocks > MAX_BLOCKS_IN_MCU {
                return err_exit_code(
                    ExitCode::MalformedContainer,
                    format!(
                        "interleaved scan has {0} blocks per MCU, at most {1} allowed",
                        blocks, MAX_BLOCKS_IN_MCU
                    ),
                );
            }
        }

        Ok(info)
    }

    /// snapshots the tables the scan needs and records it
    fn add_scan(&mut self, info: ScanInfo, payload: Range<usize>) -> Result<()> {
        let Some(frame) = &self.frame else {
            return err_exit_code(ExitCode::MalformedContainer, "SOS before SOF");
        };

        let kind = info.kind(frame.jpeg_type);
        let needs_dc = matches!(kind, ScanKind::Sequential | ScanKind::DcFirst);
        let needs_ac = matches!(
            kind,
            ScanKind::Sequential | ScanKind::AcFirst | ScanKind::AcRefine
        );

        let mut tables = Vec::with_capacity(info.components.len());
        for sc in &info.components {
            let jid = frame.components[sc.component].jid;
            let mut t = ScanTables::default();

            if needs_dc {
                t.dc = self.dc_tables[usize::from(sc.dc_table)].clone();
                if t.dc.is_none() {
                    return err_exit_code(
                        ExitCode::MissingTableReference,
                        format!(
                            "DC huffman table {0} missing for component {1}",
                            sc.dc_table, jid
                        ),
                    );
                }
            }

            if needs_ac {
                t.ac = self.ac_tables[usize::from(sc.ac_table)].clone();
                if t.ac.is_none() {
                    return err_exit_code(
                        ExitCode::MissingTableReference,
                        format!(
                            "AC huffman table {0} missing for component {1}",
                            sc.ac_table, jid
                        ),
                    );
                }
            }

            // latch the quantization table the first time we see a component
            if self.latched_q_tables[sc.component].is_none() {
                let q = frame.components[sc.component].q_table_index;
                match self.q_tables[usize::from(q)] {
                    Some(table) => self.latched_q_tables[sc.component] = Some(table),
                    None => {
                        return err_exit_code(
                            ExitCode::MissingTableReference,
                            format!("quantization table {0} missing for component {1}", q, jid),
                        );
                    }
                }
            }

            tables.push(t);
        }

        self.scans.push(ScanSegment {
            info,
            restart_interval: self.restart_interval,
            tables,
            payload,
        });

        Ok(())
    }

    fn finish(self, found_eoi: bool, trailing_bytes: usize) -> Result<ParsedJpeg> {
        let Some(frame) = self.frame else {
            return err_exit_code(ExitCode::MalformedContainer, "jpeg has no frame header");
        };

        if self.scans.is_empty() {
            return err_exit_code(ExitCode::MalformedContainer, "jpeg has no scans");
        }

        if !found_eoi {
            warn!("jpeg ended without an EOI marker");
        }

        // components that never appeared in a scan get whatever table is defined now
        let mut component_quantization = Vec::with_capacity(frame.components.len());
        for (c, latched) in frame.components.iter().zip(self.latched_q_tables.iter()) {
            match (*latched).or(self.q_tables[usize::from(c.q_table_index)]) {
                Some(table) => component_quantization.push(table),
                None => {
                    return err_exit_code(
                        ExitCode::MissingTableReference,
                        format!(
                            "quantization table {0} missing for component {1}",
                            c.q_table_index, c.jid
                        ),
                    );
                }
            }
        }

        Ok(ParsedJpeg {
            frame,
            scans: self.scans,
            component_quantization,
            found_eoi,
            trailing_bytes,
        })
    }
}
