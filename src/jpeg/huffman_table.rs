/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fmt;

use super::bit_reader::BitReader;
use crate::jpeg_error::{ExitCode, Result, err_exit_code};

/// Canonical Huffman decoding table built from a DHT definition.
///
/// Codes are assigned the JPEG way (T.81 Annex C): starting at 0 for the shortest length,
/// incrementing for each symbol of the same length and shifting left by one when moving
/// to the next length. Codes up to 8 bits long are resolved with a single lookup on the
/// peeked bits, longer ones are resolved bit-by-bit against the per-length code ranges.
#[derive(Clone)]
pub struct HuffmanTable {
    /// number of codes of each length 1..16
    counts: [u8; 16],

    /// symbols in order of increasing code
    values: Vec<u8>,

    /// largest code of each length, -1 if there are no codes of that length.
    /// index 17 is a sentinel so the slow path always terminates
    maxcode: [i32; 18],

    /// added to a code of a given length to get the index into values
    valoffset: [i32; 17],

    /// (symbol, code length) for each possible next byte of the stream.
    /// 0xff as length means the code is longer than 8 bits (or invalid)
    peek_code: [(u8, u8); 256],
}

impl fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuffmanTable")
            .field("counts", &self.counts)
            .field("values", &self.values)
            .finish()
    }
}

impl HuffmanTable {
    /// Builds the table from the 16 code length counts and the symbols of the DHT segment.
    pub fn new(counts: &[u8; 16], symbols: &[u8]) -> Result<Self> {
        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();

        if total > 256 {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!("Huffman table defines {0} codes, at most 256 allowed", total),
            );
        }

        if symbols.len() < total {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "Huffman table needs {0} symbols but only {1} were supplied",
                    total,
                    symbols.len()
                ),
            );
        }

        let mut maxcode = [-1i32; 18];
        let mut valoffset = [0i32; 17];
        let mut peek_code = [(0u8, 0xffu8); 256];

        let mut code: u32 = 0;
        let mut k: usize = 0;

        for len in 1..=16usize {
            let count = usize::from(counts[len - 1]);

            if count > 0 {
                // the first code of this length
                valoffset[len] = k as i32 - code as i32;

                for _ in 0..count {
                    if code >= (1u32 << len) {
                        return err_exit_code(
                            ExitCode::MalformedContainer,
                            format!(
                                "invalid huffman code layout, too many codes of length {0}",
                                len
                            ),
                        );
                    }

                    if len <= 8 {
                        // every byte that starts with this code decodes to this symbol
                        let shift = 8 - len;
                        let first = (code << shift) as usize;
                        for entry in &mut peek_code[first..first + (1 << shift)] {
                            *entry = (symbols[k], len as u8);
                        }
                    }

                    code += 1;
                    k += 1;
                }

                maxcode[len] = code as i32 - 1;
            }

            code <<= 1;
        }

        // sentinel so that the slow path gives up after 16 bits
        maxcode[17] = i32::MAX;

        Ok(HuffmanTable {
            counts: *counts,
            values: symbols[..total].to_vec(),
            maxcode,
            valoffset,
            peek_code,
        })
    }

    /// number of symbols in the table
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Decodes one symbol from the stream.
    #[inline(always)]
    pub fn decode(&self, bit_reader: &mut BitReader) -> Result<u8> {
        // peek ahead to see if we can decode the symbol immediately
        // given what has already been read into the bitreader
        let (peek_value, peek_len) = bit_reader.peek();

        // use lookup table to figure out the first code in this byte and how long it is
        let (code, code_len) = self.peek_code[usize::from(peek_value)];

        if u32::from(code_len) <= peek_len {
            bit_reader.advance(u32::from(code_len));
            return Ok(code);
        }

        if peek_len < 8 {
            bit_reader.fill_register(8);

            let (peek_value, peek_len) = bit_reader.peek();
            let (code, code_len) = self.peek_code[usize::from(peek_value)];

            if u32::from(code_len) <= peek_len {
                bit_reader.advance(u32::from(code_len));
                return Ok(code);
            }
        }

        self.decode_slow(bit_reader)
    }

    /// bit at a time decoding as described in T.81 F.2.2.3
    #[cold]
    fn decode_slow(&self, bit_reader: &mut BitReader) -> Result<u8> {
        let mut code: i32 = 0;

        for len in 1..=16usize {
            code = (code << 1) | i32::from(bit_reader.read_bit()?);

            if code <= self.maxcode[len] {
                let index = code + self.valoffset[len];
                return Ok(self.values[index as usize]);
            }
        }

        err_exit_code(
            ExitCode::InvalidHuffmanCode,
            format!(
                "no Huffman code matched {0:016b} near scan offset {1}",
                code,
                bit_reader.position()
            ),
        )
    }

    /// Returns the (symbol, code, code length) of every code in the table in canonical order
    #[cfg(test)]
    pub fn codes(&self) -> Vec<(u8, u16, u8)> {
        let mut result = Vec::with_capacity(self.values.len());
        let mut code: u32 = 0;
        let mut k = 0;

        for len in 1..=16u8 {
            for _ in 0..self.counts[usize::from(len) - 1] {
                result.push((self.values[k], code as u16, len));
                code += 1;
                k += 1;
            }
            code <<= 1;
        }

        result
    }
}
