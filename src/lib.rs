/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Decoder for baseline, extended sequential and progressive Huffman coded JPEG images.
//!
//! The whole file is parsed and entropy decoded into DCT coefficients first, after which
//! the pixels are reconstructed (dequantization, IDCT, upsampling and color conversion)
//! in bands of MCU rows on a thread pool.

// Don't allow any unsafe code by default. Since this code has to potentially deal with
// badly/maliciously formatted images, we want this extra level of safety.
#![forbid(unsafe_code)]
#![forbid(non_ascii_idents)]
#![forbid(unused_extern_crates)]
#![forbid(macro_use_extern_crate)]

mod consts;
mod helpers;
mod jpeg;
mod metrics;
mod structs;

mod enabled_features;
mod jpeg_error;

use std::io::Read;

pub use consts::JpegType;
pub use enabled_features::EnabledFeatures;
pub use helpers::catch_unwind_result;
pub use jpeg::block_based_image::{
    AlignedBlock, BlockBasedImage, natural_to_zigzag, zigzag_to_natural,
};
pub use jpeg::jpeg_header::FrameInfo;
pub use jpeg::ComponentInfo;
pub use jpeg_error::{ExitCode, JpegError, Result};
pub use metrics::{CpuTimeMeasure, DecodeStage, Metrics};
pub use structs::color_convert::PixelFormat;
pub use structs::idct::{IdctImplementation, InverseDct, select_idct};
pub use structs::jpeg_decoder::{DecodedImage, JpegCoefficients};
pub use structs::quantization_tables::QuantizationTables;
pub use structs::simple_threadpool::{
    DEFAULT_THREAD_POOL, JpegThreadPool, JpegThreadPriority, SimpleThreadPool, SingleThreadPool,
};

use crate::jpeg_error::{AddContext, err_exit_code};

/// Decodes a JPEG held in memory, using the default thread pool to reconstruct the pixels.
pub fn decode_jpeg(data: &[u8], enabled_features: &EnabledFeatures) -> Result<DecodedImage> {
    decode_jpeg_with_pool(data, enabled_features, &DEFAULT_THREAD_POOL)
}

/// Decodes a JPEG held in memory, running the reconstruction on the supplied thread pool.
pub fn decode_jpeg_with_pool(
    data: &[u8],
    enabled_features: &EnabledFeatures,
    thread_pool: &dyn JpegThreadPool,
) -> Result<DecodedImage> {
    structs::jpeg_decoder::decode_jpeg_with_pool(data, enabled_features, thread_pool).context()
}

/// Reads the whole stream (up to `max_jpeg_file_size` bytes) and decodes it.
pub fn decode_jpeg_from_reader<R: Read>(
    reader: &mut R,
    enabled_features: &EnabledFeatures,
) -> Result<DecodedImage> {
    let limit = u64::from(enabled_features.max_jpeg_file_size);

    let mut data = Vec::new();
    reader.take(limit + 1).read_to_end(&mut data).context()?;

    if data.len() as u64 > limit {
        return err_exit_code(
            ExitCode::OutOfMemory,
            format!("jpeg is larger than the limit of {0} bytes", limit),
        );
    }

    decode_jpeg(&data, enabled_features)
}

/// Returns the frame header, the coefficients in natural order and the quantization
/// tables of every component, without reconstructing any pixels.
pub fn read_jpeg_coefficients(
    data: &[u8],
    enabled_features: &EnabledFeatures,
) -> Result<JpegCoefficients> {
    let mut metrics = Metrics::default();
    structs::jpeg_decoder::read_coefficients(data, enabled_features, &mut metrics).context()
}
