/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// Start of Frame (size information), coding process: baseline DCT
pub const SOF0: u8 = 0xC0;

/// Start of Frame (size information), coding process: extended sequential DCT
pub const SOF1: u8 = 0xC1;

/// Start of Frame (size information), coding process: progressive DCT
pub const SOF2: u8 = 0xC2;

/// Start of Frame, lossless (sequential), Huffman coding
pub const SOF3: u8 = 0xC3;

/// Huffman Table
pub const DHT: u8 = 0xC4;

/// Start of Frame, differential sequential DCT, Huffman coding
pub const SOF5: u8 = 0xC5;

/// Start of Frame, differential lossless, Huffman coding
pub const SOF7: u8 = 0xC7;

/// Reserved for JPEG extensions
pub const JPG: u8 = 0xC8;

/// Start of Frame, extended sequential DCT, arithmetic coding
pub const SOF9: u8 = 0xC9;

/// Define arithmetic coding conditioning
pub const DAC: u8 = 0xCC;

/// Start of Frame, differential lossless, arithmetic coding
pub const SOF15: u8 = 0xCF;

/// Restart 0 segment
pub const RST0: u8 = 0xD0;

/// Restart 7 segment
pub const RST7: u8 = 0xD7;

/// Start of Image
pub const SOI: u8 = 0xD8;

/// End of Image, or End of File
pub const EOI: u8 = 0xD9;

/// Start of Scan
pub const SOS: u8 = 0xDA;

/// Define Quantization Table
pub const DQT: u8 = 0xDB;

/// Define Number of Lines
pub const DNL: u8 = 0xDC;

/// Define restart interval
pub const DRI: u8 = 0xDD;

/// First application segment
pub const APP0: u8 = 0xE0;

/// Last application segment
pub const APP15: u8 = 0xEF;

/// First of the reserved JPEG extension segments
pub const JPG0: u8 = 0xF0;

/// Last of the reserved JPEG extension segments
pub const JPG13: u8 = 0xFD;

/// Comment
pub const COM: u8 = 0xFE;

/// For temporary private use in arithmetic coding
pub const TEM: u8 = 0x01;

/// true for the RST0-RST7 markers
#[inline(always)]
pub const fn is_restart(marker: u8) -> bool {
    marker >= RST0 && marker <= RST7
}
