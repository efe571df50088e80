/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Module for reading JPEGs into their DCT coefficients.
//!
//! The container is parsed into the frame model first, then every scan is entropy decoded
//! into one coefficient plane per component. Turning the coefficients into pixels
//! happens in the structs module.

mod bit_reader;
mod component_info;
mod huffman_table;
pub mod jpeg_code;
mod jpeg_position_state;
mod progressive_read;

pub mod block_based_image;
pub mod jpeg_header;
pub mod jpeg_read;

#[cfg(test)]
pub(crate) mod bit_writer;
#[cfg(test)]
pub(crate) mod test_jpeg_writer;

pub use component_info::ComponentInfo;
