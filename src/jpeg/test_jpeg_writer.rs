/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Minimal JPEG writer used by the tests to synthesize images with exactly the
//! coefficients, tables and scan scripts a test needs. Only depends on the
//! bit writer so the integration tests can include it as well.

use super::bit_writer::BitWriter;

/// DHT table definition: number of codes of each length and the symbols
#[derive(Clone, Debug)]
pub struct HuffmanSpec {
    pub counts: [u8; 16],
    pub symbols: Vec<u8>,
}

impl HuffmanSpec {
    /// Table that can encode every possible symbol: 255 codes of 8 bits, and
    /// symbol 255 with 9 bits so no code is all ones.
    pub fn flat() -> Self {
        let mut counts = [0u8; 16];
        counts[7] = 255;
        counts[8] = 1;

        HuffmanSpec {
            counts,
            symbols: (0..=255).collect(),
        }
    }

    /// typical luminance DC table (T.81 table K.3)
    pub fn std_dc_luminance() -> Self {
        HuffmanSpec {
            counts: [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0],
            symbols: (0..12).collect(),
        }
    }

    /// typical luminance AC table (T.81 table K.5)
    pub fn std_ac_luminance() -> Self {
        HuffmanSpec {
            counts: [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d],
            symbols: vec![
                0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13,
                0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42,
                0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a,
                0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x34, 0x35,
                0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a,
                0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67,
                0x68, 0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84,
                0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
                0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3,
                0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7,
                0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1,
                0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4,
                0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa,
            ],
        }
    }

    /// (code, length) for each symbol, length 0 if the symbol isn't in the table
    pub fn codes(&self) -> HuffCodes {
        let mut codes = HuffCodes {
            c_val: [0; 256],
            c_len: [0; 256],
        };

        let mut code = 0u32;
        let mut k = 0;
        for len in 1..=16u8 {
            for _ in 0..self.counts[usize::from(len - 1)] {
                let s = usize::from(self.symbols[k]);
                codes.c_val[s] = code as u16;
                codes.c_len[s] = len;
                code += 1;
                k += 1;
            }
            code <<= 1;
        }

        codes
    }
}

/// encoder side of a Huffman table
#[derive(Clone)]
pub struct HuffCodes {
    pub c_val: [u16; 256],
    pub c_len: [u8; 256],
}

impl HuffCodes {
    pub fn write(&self, w: &mut BitWriter, symbol: u8) {
        let len = self.c_len[usize::from(symbol)];
        assert!(len > 0, "symbol {0:x} has no code", symbol);
        w.write(u32::from(self.c_val[usize::from(symbol)]), u32::from(len));
    }
}

/// number of bits needed for v and the bits that represent it (T.81 F.1.2.1)
pub fn magnitude(v: i32) -> (u8, u32) {
    let nbits = (32 - v.unsigned_abs().leading_zeros()) as u8;
    let bits = if v < 0 { v - 1 } else { v } as u32 & ((1u32 << nbits) - 1);
    (nbits, bits)
}

/// writes a DC difference
pub fn encode_dc_diff(w: &mut BitWriter, dc: &HuffCodes, diff: i32) {
    let (nbits, bits) = magnitude(diff);
    dc.write(w, nbits);
    w.write(bits, u32::from(nbits));
}

/// writes a complete sequential block given in zigzag order
pub fn encode_block_sequential(
    w: &mut BitWriter,
    dc: &HuffCodes,
    ac: &HuffCodes,
    pred: &mut i32,
    block: &[i16; 64],
) {
    let v = i32::from(block[0]);
    encode_dc_diff(w, dc, v - *pred);
    *pred = v;

    let mut run = 0;
    for &c in &block[1..] {
        if c == 0 {
            run += 1;
            continue;
        }

        while run > 15 {
            ac.write(w, 0xf0);
            run -= 16;
        }

        let (nbits, bits) = magnitude(i32::from(c));
        ac.write(w, (run << 4) | nbits);
        w.write(bits, u32::from(nbits));
        run = 0;
    }

    if run > 0 {
        ac.write(w, 0x00);
    }
}

/// writes the DC coefficient of a block for a progressive DC first scan
pub fn encode_dc_first(w: &mut BitWriter, dc: &HuffCodes, pred: &mut i32, coef: i16, al: u8) {
    let v = i32::from(coef) >> al;
    encode_dc_diff(w, dc, v - *pred);
    *pred = v;
}

/// writes the refinement bit of the DC coefficient
pub fn encode_dc_refine(w: &mut BitWriter, coef: i16, al: u8) {
    w.write(((i32::from(coef) >> al) & 1) as u32, 1);
}

/// point transform of an AC coefficient, which rounds towards zero
fn ac_shift(c: i16, al: u8) -> i32 {
    let c = i32::from(c);
    if c < 0 { -((-c) >> al) } else { c >> al }
}

fn emit_eobrun(w: &mut BitWriter, ac: &HuffCodes, eobrun: &mut u32, buffered: &mut Vec<u8>) {
    if *eobrun > 0 {
        let nbits = (31 - eobrun.leading_zeros()) as u8;
        ac.write(w, nbits << 4);
        w.write(*eobrun & ((1 << nbits) - 1), u32::from(nbits));
        *eobrun = 0;

        for b in buffered.drain(..) {
            w.write(u32::from(b), 1);
        }
    }
}

/// Encoder for progressive AC first scans (T.81 G.1.2.2). Blocks without any coefficients
/// left in the band are collected into EOB runs.
#[derive(Default)]
pub struct AcFirstEncoder {
    eobrun: u32,
}

impl AcFirstEncoder {
    pub fn encode_block(
        &mut self,
        w: &mut BitWriter,
        ac: &HuffCodes,
        block: &[i16; 64],
        ss: u8,
        se: u8,
        al: u8,
    ) {
        let mut run = 0;
        for k in usize::from(ss)..=usize::from(se) {
            let v = ac_shift(block[k], al);
            if v == 0 {
                run += 1;
                continue;
            }

            emit_eobrun(w, ac, &mut self.eobrun, &mut Vec::new());

            while run > 15 {
                ac.write(w, 0xf0);
                run -= 16;
            }

            let (nbits, bits) = magnitude(v);
            ac.write(w, (run << 4) | nbits);
            w.write(bits, u32::from(nbits));
            run = 0;
        }

        if run > 0 {
            self.eobrun += 1;
            if self.eobrun == 0x7fff {
                emit_eobrun(w, ac, &mut self.eobrun, &mut Vec::new());
            }
        }
    }

    pub fn finish(&mut self, w: &mut BitWriter, ac: &HuffCodes) {
        emit_eobrun(w, ac, &mut self.eobrun, &mut Vec::new());
    }
}

/// Encoder for progressive AC refinement scans (T.81 G.1.2.3), including EOB runs
/// that carry correction bits of the blocks they cover.
#[derive(Default)]
pub struct AcRefineEncoder {
    eobrun: u32,
    eob_bits: Vec<u8>,
}

impl AcRefineEncoder {
    pub fn encode_block(
        &mut self,
        w: &mut BitWriter,
        ac: &HuffCodes,
        block: &[i16; 64],
        ss: u8,
        se: u8,
        al: u8,
    ) {
        let range = usize::from(ss)..=usize::from(se);

        // last coefficient that becomes nonzero in this scan
        let eob = range
            .clone()
            .filter(|&k| ac_shift(block[k], al).abs() == 1)
            .last();

        let mut correction_bits = Vec::new();
        let mut run = 0u8;

        for k in range {
            let v = ac_shift(block[k], al).abs();
            if v == 0 {
                run += 1;
                continue;
            }

            while run > 15 && eob.is_some_and(|e| k <= e) {
                emit_eobrun(w, ac, &mut self.eobrun, &mut self.eob_bits);
                ac.write(w, 0xf0);
                run -= 16;
                for b in correction_bits.drain(..) {
                    w.write(u32::from(b), 1);
                }
            }

            if v > 1 {
                // already nonzero, just the correction bit
                correction_bits.push((v & 1) as u8);
                continue;
            }

            emit_eobrun(w, ac, &mut self.eobrun, &mut self.eob_bits);
            ac.write(w, (run << 4) | 1);
            w.write(if block[k] < 0 { 0 } else { 1 }, 1);
            for b in correction_bits.drain(..) {
                w.write(u32::from(b), 1);
            }
            run = 0;
        }

        if run > 0 || !correction_bits.is_empty() {
            self.eobrun += 1;
            self.eob_bits.append(&mut correction_bits);

            if self.eobrun == 0x7fff {
                emit_eobrun(w, ac, &mut self.eobrun, &mut self.eob_bits);
            }
        }
    }

    pub fn finish(&mut self, w: &mut BitWriter, ac: &HuffCodes) {
        emit_eobrun(w, ac, &mut self.eobrun, &mut self.eob_bits);
    }
}

/// ends the current restart interval and writes RSTn
pub fn write_restart(w: &mut BitWriter, n: u8) {
    w.pad(0xff);
    w.write_byte_unescaped(0xff);
    w.write_byte_unescaped(0xd0 + (n & 7));
}

/// pads the last byte and returns the entropy coded data
pub fn finish_scan(mut w: BitWriter) -> Vec<u8> {
    w.pad(0xff);
    w.detach_buffer()
}

/// Builds a JPEG file segment by segment
pub struct JpegBuilder {
    data: Vec<u8>,
}

impl JpegBuilder {
    /// starts with SOI
    pub fn new() -> Self {
        JpegBuilder {
            data: vec![0xff, 0xd8],
        }
    }

    /// writes a marker segment with the length prefixed
    pub fn segment(mut self, marker: u8, payload: &[u8]) -> Self {
        let len = (payload.len() + 2) as u16;
        self.data.extend_from_slice(&[0xff, marker]);
        self.data.extend_from_slice(&len.to_be_bytes());
        self.data.extend_from_slice(payload);
        self
    }

    /// appends bytes as is
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// quantization table, values given in zigzag (wire) order
    pub fn dqt(self, id: u8, zigzag: &[u16; 64]) -> Self {
        let mut p = Vec::new();
        if zigzag.iter().all(|&v| v < 256) {
            p.push(id);
            p.extend(zigzag.iter().map(|&v| v as u8));
        } else {
            p.push(0x10 | id);
            for v in zigzag {
                p.extend_from_slice(&v.to_be_bytes());
            }
        }
        self.segment(0xdb, &p)
    }

    /// Huffman table, class 0 = DC, 1 = AC
    pub fn dht(self, class: u8, id: u8, spec: &HuffmanSpec) -> Self {
        let mut p = vec![(class << 4) | id];
        p.extend_from_slice(&spec.counts);
        p.extend_from_slice(&spec.symbols);
        self.segment(0xc4, &p)
    }

    /// frame header with components given as (id, h, v, quantization table)
    pub fn sof(self, marker: u8, width: u16, height: u16, components: &[(u8, u8, u8, u8)]) -> Self {
        let mut p = vec![8];
        p.extend_from_slice(&height.to_be_bytes());
        p.extend_from_slice(&width.to_be_bytes());
        p.push(components.len() as u8);
        for &(id, h, v, tq) in components {
            p.extend_from_slice(&[id, (h << 4) | v, tq]);
        }
        self.segment(marker, &p)
    }

    pub fn dri(self, interval: u16) -> Self {
        self.segment(0xdd, &interval.to_be_bytes())
    }

    /// scan header with components given as (id, dc table, ac table), followed by the entropy coded data
    pub fn sos(
        self,
        components: &[(u8, u8, u8)],
        ss: u8,
        se: u8,
        ah: u8,
        al: u8,
        entropy: &[u8],
    ) -> Self {
        let mut p = vec![components.len() as u8];
        for &(id, dc, ac) in components {
            p.extend_from_slice(&[id, (dc << 4) | ac]);
        }
        p.extend_from_slice(&[ss, se, (ah << 4) | al]);
        self.segment(0xda, &p).raw(entropy)
    }

    /// the file without an EOI
    pub fn build(self) -> Vec<u8> {
        self.data
    }

    /// the file terminated with EOI
    pub fn eoi(mut self) -> Vec<u8> {
        self.data.extend_from_slice(&[0xff, 0xd9]);
        self.data
    }
}

/// A component of a synthesized image with its coefficients
#[derive(Clone, Debug)]
pub struct TestComponent {
    pub id: u8,
    pub h: u8,
    pub v: u8,
    /// blocks in zigzag order, row-major over the padded grid of the MCUs
    pub blocks: Vec<[i16; 64]>,
}

/// Block grid geometry of the components of a synthesized image
pub struct TestGeometry {
    pub mcuh: usize,
    pub mcuv: usize,
    /// (blocks per row padded to MCUs, blocks per row, block rows) for each component
    pub grids: Vec<(usize, usize, usize)>,
}

impl TestGeometry {
    pub fn new(width: u16, height: u16, components: &[(u8, u8)]) -> Self {
        let hmax = components.iter().map(|c| usize::from(c.0)).max().unwrap_or(1);
        let vmax = components.iter().map(|c| usize::from(c.1)).max().unwrap_or(1);
        let (w, h) = (usize::from(width), usize::from(height));
        let mcuh = w.div_ceil(8 * hmax);
        let mcuv = h.div_ceil(8 * vmax);

        let grids = components
            .iter()
            .map(|&(ch, cv)| {
                let (ch, cv) = (usize::from(ch), usize::from(cv));
                (
                    mcuh * ch,
                    (w * ch).div_ceil(hmax).div_ceil(8),
                    (h * cv).div_ceil(vmax).div_ceil(8),
                )
            })
            .collect();

        TestGeometry { mcuh, mcuv, grids }
    }

    /// padded block grid size (bch, bcv) of a component
    pub fn padded(&self, h: u8, v: u8) -> (usize, usize) {
        (self.mcuh * usize::from(h), self.mcuv * usize::from(v))
    }
}

/// calls f with (component index, block index) in the order blocks appear in a scan
fn for_each_block(
    geometry: &TestGeometry,
    components: &[TestComponent],
    scan: &[usize],
    restart_interval: u16,
    w: &mut BitWriter,
    mut f: impl FnMut(&mut BitWriter, usize, usize),
    mut on_restart: impl FnMut(&mut BitWriter),
) {
    let mut restarts = 0u8;
    let mut check_restart = |w: &mut BitWriter, unit: usize, total: usize| {
        if restart_interval > 0 && unit > 0 && unit < total && unit % usize::from(restart_interval) == 0 {
            on_restart(w);
            write_restart(w, restarts);
            restarts = restarts.wrapping_add(1);
        }
    };

    if scan.len() == 1 {
        let c = scan[0];
        let (stride, nch, ncv) = geometry.grids[c];
        for by in 0..ncv {
            for bx in 0..nch {
                check_restart(w, by * nch + bx, nch * ncv);
                f(w, c, by * stride + bx);
            }
        }
    } else {
        let total = geometry.mcuh * geometry.mcuv;
        for my in 0..geometry.mcuv {
            for mx in 0..geometry.mcuh {
                check_restart(w, my * geometry.mcuh + mx, total);
                for &c in scan {
                    let comp = &components[c];
                    let stride = geometry.grids[c].0;
                    for sy in 0..usize::from(comp.v) {
                        for sx in 0..usize::from(comp.h) {
                            let bx = mx * usize::from(comp.h) + sx;
                            let by = my * usize::from(comp.v) + sy;
                            f(w, c, by * stride + bx);
                        }
                    }
                }
            }
        }
    }
}

fn header(width: u16, height: u16, sof: u8, components: &[TestComponent], q: &[u16; 64]) -> JpegBuilder {
    let sof_components: Vec<_> = components.iter().map(|c| (c.id, c.h, c.v, 0)).collect();

    JpegBuilder::new()
        .dqt(0, q)
        .dht(0, 0, &HuffmanSpec::flat())
        .dht(1, 0, &HuffmanSpec::flat())
        .sof(sof, width, height, &sof_components)
}

/// Baseline JPEG with a single interleaved scan (or a non interleaved one for grey images)
/// using one flat quantization table (given in zigzag order) for all components.
pub fn encode_sequential(
    width: u16,
    height: u16,
    components: &[TestComponent],
    q: &[u16; 64],
    restart_interval: u16,
) -> Vec<u8> {
    let geometry = TestGeometry::new(width, height, &components.iter().map(|c| (c.h, c.v)).collect::<Vec<_>>());
    let dc = HuffmanSpec::flat().codes();
    let ac = HuffmanSpec::flat().codes();

    let mut builder = header(width, height, 0xc0, components, q);
    if restart_interval > 0 {
        builder = builder.dri(restart_interval);
    }

    let scan: Vec<usize> = (0..components.len()).collect();
    let preds = std::cell::RefCell::new(vec![0i32; components.len()]);
    let mut w = BitWriter::new(Vec::new());

    for_each_block(
        &geometry,
        components,
        &scan,
        restart_interval,
        &mut w,
        |w, c, b| {
            encode_block_sequential(w, &dc, &ac, &mut preds.borrow_mut()[c], &components[c].blocks[b])
        },
        |_| preds.borrow_mut().iter_mut().for_each(|p| *p = 0),
    );

    let scan_ids: Vec<_> = components.iter().map(|c| (c.id, 0, 0)).collect();
    builder.sos(&scan_ids, 0, 63, 0, 0, &finish_scan(w)).eoi()
}

/// Progressive JPEG that uses every kind of scan: interleaved DC first with Al=1,
/// AC first scans over two bands with Al=1, AC refinement scans, then the DC refinement.
pub fn encode_progressive(
    width: u16,
    height: u16,
    components: &[TestComponent],
    q: &[u16; 64],
    restart_interval: u16,
) -> Vec<u8> {
    let geometry = TestGeometry::new(width, height, &components.iter().map(|c| (c.h, c.v)).collect::<Vec<_>>());
    let dc = HuffmanSpec::flat().codes();
    let ac = HuffmanSpec::flat().codes();

    let mut builder = header(width, height, 0xc2, components, q);
    if restart_interval > 0 {
        builder = builder.dri(restart_interval);
    }

    let all: Vec<usize> = (0..components.len()).collect();
    let all_ids: Vec<_> = components.iter().map(|c| (c.id, 0, 0)).collect();

    // DC first, Al = 1
    {
        let preds = std::cell::RefCell::new(vec![0i32; components.len()]);
        let mut w = BitWriter::new(Vec::new());
        for_each_block(
            &geometry,
            components,
            &all,
            restart_interval,
            &mut w,
            |w, c, b| encode_dc_first(w, &dc, &mut preds.borrow_mut()[c], components[c].blocks[b][0], 1),
            |_| preds.borrow_mut().iter_mut().for_each(|p| *p = 0),
        );
        builder = builder.sos(&all_ids, 0, 0, 0, 1, &finish_scan(w));
    }

    for (c, comp) in components.iter().enumerate() {
        // AC first over two bands, Al = 1
        for (ss, se) in [(1u8, 5u8), (6, 63)] {
            let encoder = std::cell::RefCell::new(AcFirstEncoder::default());
            let mut w = BitWriter::new(Vec::new());
            for_each_block(
                &geometry,
                components,
                &[c],
                restart_interval,
                &mut w,
                |w, c, b| encoder.borrow_mut().encode_block(w, &ac, &components[c].blocks[b], ss, se, 1),
                |w| encoder.borrow_mut().finish(w, &ac),
            );
            encoder.borrow_mut().finish(&mut w, &ac);
            builder = builder.sos(&[(comp.id, 0, 0)], ss, se, 0, 1, &finish_scan(w));
        }

        // AC refinement of the whole band, Ah = 1, Al = 0
        let encoder = std::cell::RefCell::new(AcRefineEncoder::default());
        let mut w = BitWriter::new(Vec::new());
        for_each_block(
            &geometry,
            components,
            &[c],
            restart_interval,
            &mut w,
            |w, c, b| encoder.borrow_mut().encode_block(w, &ac, &components[c].blocks[b], 1, 63, 0),
            |w| encoder.borrow_mut().finish(w, &ac),
        );
        encoder.borrow_mut().finish(&mut w, &ac);
        builder = builder.sos(&[(comp.id, 0, 0)], 1, 63, 1, 0, &finish_scan(w));
    }

    // DC refinement, Ah = 1, Al = 0
    {
        let mut w = BitWriter::new(Vec::new());
        for_each_block(
            &geometry,
            components,
            &all,
            restart_interval,
            &mut w,
            |w, c, b| encode_dc_refine(w, components[c].blocks[b][0], 0),
            |_| {},
        );
        builder = builder.sos(&all_ids, 0, 0, 1, 0, &finish_scan(w));
    }

    builder.eoi()
}
