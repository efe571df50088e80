/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use super::jpeg_code;
use crate::helpers::{devli, has_ff};
use crate::jpeg_error::{ExitCode, Result, err_exit_code};

/// Reads MSB-first bits out of the entropy coded data of a scan.
///
/// Stuffed 0xFF 0x00 pairs are turned back into a single 0xFF data byte. Any other 0xFF
/// is the start of a marker, which is never consumed as data: once the reader hits it,
/// `marker()` returns the marker code and any read that needs more bits than are already
/// buffered fails. Restart markers are only consumed by `read_restart_marker`.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bits: u64,
    bits_left: u32,
    marker: Option<u8>,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            pos: 0,
            bits: 0,
            bits_left: 0,
            marker: None,
        }
    }

    /// Offset of the first byte that hasn't been loaded into the bit register yet.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The marker that stopped the reader, if it has run into one
    #[cfg(test)]
    pub fn marker(&self) -> Option<u8> {
        self.marker
    }

    /// number of bits that can be read without touching the underlying data
    #[inline(always)]
    pub fn bits_buffered(&self) -> u32 {
        self.bits_left
    }

    #[inline(always)]
    pub fn read(&mut self, bits_to_read: u32) -> Result<u16> {
        debug_assert!(bits_to_read <= 16);

        if bits_to_read == 0 {
            return Ok(0);
        }

        if self.bits_left < bits_to_read {
            self.fill_register(bits_to_read);

            if self.bits_left < bits_to_read {
                return self.truncated(bits_to_read);
            }
        }

        let retval =
            (self.bits >> (self.bits_left - bits_to_read) & ((1 << bits_to_read) - 1)) as u16;
        self.bits_left -= bits_to_read;
        return Ok(retval);
    }

    #[inline(always)]
    pub fn read_bit(&mut self) -> Result<u8> {
        Ok(self.read(1)? as u8)
    }

    /// reads an s bit magnitude value and sign extends it
    #[inline(always)]
    pub fn read_signed(&mut self, s: u8) -> Result<i16> {
        Ok(devli(s, self.read(u32::from(s))?))
    }

    /// Returns the next 8 buffered bits (zero padded if fewer are buffered)
    /// along with the number of bits that are actually buffered.
    #[inline(always)]
    pub fn peek(&self) -> (u8, u32) {
        (
            ((self.bits.wrapping_shl(64 - self.bits_left)) >> 56) as u8,
            self.bits_left,
        )
    }

    #[inline(always)]
    pub fn advance(&mut self, bits: u32) {
        debug_assert!(bits <= self.bits_left);
        self.bits_left -= bits;
    }

    /// Discards the bits left over in the current byte
    pub fn align_to_byte(&mut self) {
        self.bits_left -= self.bits_left & 7;
    }

    /// Loads bytes until at least `bits_to_read` bits are buffered or the reader hits
    /// a marker or the end of the data. Never fails, callers check `bits_buffered`.
    #[inline(always)]
    pub fn fill_register(&mut self, bits_to_read: u32) {
        // if we have 8 bytes and there is no 0xff in them, then we can just read the bits directly as big endian
        if let Some(chunk) = self.data.get(self.pos..self.pos + 8) {
            let mut b = [0u8; 8];
            b.copy_from_slice(chunk);
            let v = u64::from_be_bytes(b);

            if !has_ff(v) {
                // only fill 63 bits not 64 to avoid having to special case
                // of self.bits << 64 which is a nop
                let bytes_to_read = (63 - self.bits_left) / 8;
                if bytes_to_read > 0 {
                    self.bits = self.bits << (bytes_to_read * 8) | v >> (64 - bytes_to_read * 8);
                    self.bits_left += bytes_to_read * 8;
                    self.pos += bytes_to_read as usize;
                }

                if self.bits_left >= bits_to_read {
                    return;
                }
            }
        }

        self.fill_register_slow(bits_to_read)
    }

    #[cold]
    fn fill_register_slow(&mut self, bits_to_read: u32) {
        while self.bits_left < bits_to_read && self.bits_left <= 56 && self.marker.is_none() {
            let Some(&b) = self.data.get(self.pos) else {
                return;
            };

            if b == 0xff {
                match self.data.get(self.pos + 1) {
                    Some(0) => {
                        // escaped 0xff
                        self.pos += 2;
                    }
                    Some(_) => {
                        self.marker = Some(self.marker_code_at(self.pos));
                        return;
                    }
                    None => {
                        // a lone 0xff at the very end can't be data
                        return;
                    }
                }
            } else {
                self.pos += 1;
            }

            self.bits = (self.bits << 8) | u64::from(b);
            self.bits_left += 8;
        }
    }

    /// the code of the marker starting at offset, skipping over 0xff fill bytes
    fn marker_code_at(&self, mut offset: usize) -> u8 {
        while self.data.get(offset + 1) == Some(&0xff) {
            offset += 1;
        }
        self.data.get(offset + 1).copied().unwrap_or(0xff)
    }

    #[cold]
    fn truncated<T>(&self, bits_to_read: u32) -> Result<T> {
        match self.marker {
            Some(m) => err_exit_code(
                ExitCode::StreamTruncated,
                format!(
                    "needed {0} bits but ran into marker {1:02X} at scan offset {2}",
                    bits_to_read, m, self.pos
                ),
            ),
            None => err_exit_code(
                ExitCode::StreamTruncated,
                format!(
                    "needed {0} bits but scan data ended at offset {1}",
                    bits_to_read, self.pos
                ),
            ),
        }
    }

    /// Called at a restart boundary: throws away whatever is left of the current
    /// entropy coded segment, then consumes the next marker, which has to be one
    /// of RST0-RST7. Returns the restart number.
    pub fn read_restart_marker(&mut self) -> Result<u8> {
        self.bits = 0;
        self.bits_left = 0;
        self.marker = None;

        // skip to the next marker (normally we are already there)
        loop {
            match self.data.get(self.pos..self.pos + 2) {
                Some(&[0xff, c]) if c != 0 => break,
                Some(&[0xff, _]) => self.pos += 2,
                Some(_) => self.pos += 1,
                None => {
                    return err_exit_code(
                        ExitCode::MalformedContainer,
                        format!(
                            "scan data ended at offset {0} where a restart marker was expected",
                            self.pos
                        ),
                    );
                }
            }
        }

        // fill bytes
        while self.data.get(self.pos + 1) == Some(&0xff) {
            self.pos += 1;
        }

        let code = self.data.get(self.pos + 1).copied().unwrap_or(0);
        if !jpeg_code::is_restart(code) {
            return err_exit_code(
                ExitCode::MalformedContainer,
                format!(
                    "found marker {0:02X} at offset {1} where a restart marker was expected",
                    code, self.pos
                ),
            );
        }

        self.pos += 2;
        Ok(code - jpeg_code::RST0)
    }
}
