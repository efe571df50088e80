/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum JpegDecodeStatus {
    DecodeInProgress,
    RestartIntervalExpired,
    ScanCompleted,
}

/// Coding process of the frame, as given by the SOF marker
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum JpegType {
    Sequential,
    Progressive,
}

/// maximum number of components in a frame or scan
pub const MAX_COMPONENTS: usize = 4;

/// quantization and Huffman table ids are 0..3
pub const MAX_TABLES: usize = 4;

/// largest legal sampling factor
pub const MAX_SAMPLING_FACTOR: u8 = 4;

/// JPEG limits the blocks in an interleaved MCU to 10
pub const MAX_BLOCKS_IN_MCU: u32 = 10;

/// largest successive approximation bit position for 8 bit data
pub const MAX_SUCCESSIVE_APPROXIMATION: u8 = 13;

/// for each coefficient in natural (raster) order, its position in the zigzag stream
pub const RASTER_TO_ZIGZAG: [u8; 64] = [
    0, 1, 5, 6, 14, 15, 27, 28, 2, 4, 7, 13, 16, 26, 29, 42, 3, 8, 12, 17, 25, 30, 41, 43, 9, 11,
    18, 24, 31, 40, 44, 53, 10, 19, 23, 32, 39, 45, 52, 54, 20, 22, 33, 38, 46, 51, 55, 60, 21, 34,
    37, 47, 50, 56, 59, 61, 35, 36, 48, 49, 57, 58, 62, 63,
];

/// for each position in the zigzag stream, the natural (raster) index of the coefficient
pub const ZIGZAG_TO_RASTER: [u8; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

pub const SOI: [u8; 2] = [0xFF, crate::jpeg::jpeg_code::SOI]; // SOI segment

#[test]
fn zigzag_tables_are_inverse() {
    for i in 0..64 {
        assert_eq!(usize::from(ZIGZAG_TO_RASTER[usize::from(RASTER_TO_ZIGZAG[i])]), i);
        assert_eq!(usize::from(RASTER_TO_ZIGZAG[usize::from(ZIGZAG_TO_RASTER[i])]), i);
    }
}
