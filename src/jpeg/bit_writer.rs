/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Bit writer used by the tests to synthesize entropy coded data. It doesn't
//! depend on anything else in the crate so the integration tests can include it as well.

use std::mem;

pub struct BitWriter {
    data_buffer: Vec<u8>,
    fill_register: u64,
    current_bit: u32,
}

// use to write varying sized bits for coding JPEG. Escapes 0xff -> [0xff,0]
impl BitWriter {
    pub fn new(data_buffer: Vec<u8>) -> Self {
        return BitWriter {
            current_bit: 64,
            fill_register: 0,
            data_buffer,
        };
    }

    /// flushes whole bytes from the register into the data buffer
    fn flush_whole_bytes(&mut self) {
        while self.current_bit <= 56 {
            let b = (self.fill_register >> 56) as u8;
            if b != 0xff {
                self.data_buffer.push(b);
            } else {
                self.data_buffer.extend_from_slice(&[0xff, 0]);
            }

            self.fill_register <<= 8;
            self.current_bit += 8;
        }
    }

    /// writes a byte as is, used for markers. Only allowed on a byte boundary.
    pub fn write_byte_unescaped(&mut self, b: u8) {
        self.flush_whole_bytes();
        assert!(self.current_bit == 64);
        self.data_buffer.push(b);
    }

    pub fn write(&mut self, val: u32, new_bits: u32) {
        assert!(new_bits <= 32);
        debug_assert!(
            u64::from(val) < (1u64 << new_bits),
            "value {0} should fit into the number of {1} bits provided",
            val,
            new_bits
        );

        if new_bits == 0 {
            return;
        }

        self.flush_whole_bytes();

        // after flushing at most 7 bits are in use, so 32 more always fit
        self.fill_register |= u64::from(val) << (self.current_bit - new_bits);
        self.current_bit -= new_bits;
    }

    /// pads the last partial byte with the fill bit (JPEG uses 1s)
    pub fn pad(&mut self, fillbit: u8) {
        while (self.current_bit & 7) != 0 {
            self.write(u32::from(fillbit & 1), 1);
        }

        self.flush_whole_bytes();

        debug_assert!(
            self.current_bit == 64,
            "there should be no remainder after padding"
        );
    }

    // flushes the data buffer while escaping all 0xff characters
    pub fn detach_buffer(&mut self) -> Vec<u8> {
        self.flush_whole_bytes();

        mem::take(&mut self.data_buffer)
    }
}

#[test]
fn write_simple() {
    let mut b = BitWriter::new(Vec::new());

    b.write(1, 4);
    b.write(2, 4);
    b.write(0x34, 8);
    b.write(0xff, 8);
    b.write(0x5, 3);
    b.pad(0xff);

    assert_eq!(b.detach_buffer(), [0x12, 0x34, 0xff, 0x00, 0b1011_1111]);
}

#[test]
fn write_marker_after_pad() {
    let mut b = BitWriter::new(Vec::new());

    b.write(0, 1);
    b.pad(0xff);
    b.write_byte_unescaped(0xff);
    b.write_byte_unescaped(0xd0);
    b.write(0xab, 8);

    assert_eq!(b.detach_buffer(), [0x7f, 0xff, 0xd0, 0xab]);
}
