/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::jpeg_error::{ExitCode, JpegError};

/// Helper function to catch panics and convert them into the appropriate JpegError
pub fn catch_unwind_result<R>(f: impl FnOnce() -> Result<R, JpegError>) -> Result<R, JpegError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r.map_err(|e| e.into()),
        Err(err) => {
            if let Some(message) = err.downcast_ref::<&str>() {
                Err(JpegError::new(ExitCode::AssertionFailure, *message))
            } else if let Some(message) = err.downcast_ref::<String>() {
                Err(JpegError::new(ExitCode::AssertionFailure, message))
            } else {
                Err(JpegError::new(ExitCode::AssertionFailure, "unknown panic"))
            }
        }
    }
}

/// true if any of the 8 bytes in v is 0xff
#[inline(always)]
pub fn has_ff(v: u64) -> bool {
    (v & 0x8080808080808080 & !v.wrapping_add(0x0101010101010101)) != 0
}

/// Sign extension of a JPEG magnitude category value ("EXTEND" in T.81 F.2.2.1).
///
/// An `s` bit value whose top bit is clear is negative: `value - (2^s - 1)`.
#[inline(always)]
pub const fn devli(s: u8, value: u16) -> i16 {
    if s == 0 {
        return 0;
    }

    let shifted = 1i32 << s;

    if (value as i32) & (shifted >> 1) != 0 {
        value as i16
    } else {
        (value as i32 - shifted + 1) as i16
    }
}

#[inline(always)]
pub const fn rbits(c: u8, n: usize) -> u8 {
    return c & (0xFF >> (8 - n));
}

#[inline(always)]
pub const fn lbits(c: u8, n: usize) -> u8 {
    return c >> (8 - n);
}

/// integer division rounding up, used all over the place for block and MCU counts
#[inline(always)]
pub const fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

#[cfg(test)]
pub fn get_rand_from_seed(seed: [u8; 32]) -> rand_chacha::ChaCha12Rng {
    use rand_chacha::ChaCha12Rng;
    use rand_chacha::rand_core::SeedableRng;

    ChaCha12Rng::from_seed(seed)
}

/// check the optimized version against the textbook definition
#[test]
fn devli_test() {
    for s in 0u8..15 {
        for value in 0..(1u16 << s) {
            assert_eq!(
                devli(s, value),
                if s == 0 {
                    0
                } else if value < (1 << (s as u16 - 1)) {
                    (value as i32 - (1 << s) + 1) as i16
                } else {
                    value as i16
                }
            );
        }
    }
}

#[test]
fn devli_examples() {
    // category 3: 000..011 are -7..-4, 100..111 are 4..7
    assert_eq!(devli(3, 0b000), -7);
    assert_eq!(devli(3, 0b011), -4);
    assert_eq!(devli(3, 0b101), 5);
    assert_eq!(devli(1, 0), -1);
    assert_eq!(devli(1, 1), 1);
}

#[test]
fn has_ff_test() {
    assert!(!has_ff(0x0011223344556677));
    assert!(has_ff(0x00112233445566ff));
    assert!(has_ff(0xff11223344556677));
    assert!(!has_ff(0xfefefefefefefefe));
}

#[test]
fn catch_unwind_translates_panics() {
    let r: Result<(), JpegError> = catch_unwind_result(|| panic!("boom"));
    let e = r.unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::AssertionFailure);
    assert_eq!(e.message(), "boom");
}
