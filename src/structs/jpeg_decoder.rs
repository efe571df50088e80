/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Runs the whole decode: parse the segments, entropy decode all the scans into
//! coefficients, then reconstruct the pixels in bands of MCU rows on the thread pool.

use std::cmp::min;
use std::ops::Range;
use std::sync::Arc;
use std::sync::mpsc::channel;

use log::{debug, info};

use super::color_convert::{ColorLayout, PixelFormat, convert_band};
use super::idct::{IdctImplementation, select_idct};
use super::quantization_tables::QuantizationTables;
use super::simple_threadpool::JpegThreadPool;
use super::upsample::{PlaneBand, SampleScale};
use crate::enabled_features::EnabledFeatures;
use crate::helpers::{catch_unwind_result, div_ceil};
use crate::jpeg::block_based_image::BlockBasedImage;
use crate::jpeg::jpeg_header::{FrameInfo, parse_jpeg};
use crate::jpeg::jpeg_read::read_scans;
use crate::jpeg_error::{AddContext, ExitCode, Result, err_exit_code};
use crate::metrics::{CpuTimeMeasure, DecodeStage, Metrics};

/// A fully decoded image
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// rows top to bottom without any padding, `format.bytes_per_pixel()` bytes per pixel
    pub pixels: Vec<u8>,
    /// time spent in each stage of the decode
    pub metrics: Metrics,
}

/// The coefficients of an image before any pixel reconstruction
#[derive(Debug, Clone)]
pub struct JpegCoefficients {
    pub frame: FrameInfo,
    /// one plane per frame component, blocks in natural order
    pub planes: Vec<BlockBasedImage>,
    /// table each component was dequantized with
    pub quantization: Vec<QuantizationTables>,
}

/// parses the file and decodes all of its scans
pub fn read_coefficients(
    data: &[u8],
    enabled_features: &EnabledFeatures,
    metrics: &mut Metrics,
) -> Result<JpegCoefficients> {
    enabled_features.validate().context()?;

    if data.len() as u64 > u64::from(enabled_features.max_jpeg_file_size) {
        return err_exit_code(
            ExitCode::OutOfMemory,
            format!(
                "jpeg of {0} bytes is larger than the limit of {1}",
                data.len(),
                enabled_features.max_jpeg_file_size
            ),
        );
    }

    let cpu = CpuTimeMeasure::new();
    let parsed = parse_jpeg(data, enabled_features).context()?;
    metrics.record_cpu_time(DecodeStage::Parse, cpu.elapsed());

    let cpu = CpuTimeMeasure::new();
    let planes = read_scans(data, &parsed).context()?;
    metrics.record_cpu_time(DecodeStage::Entropy, cpu.elapsed());

    debug!(
        "decoded {0} scans of {1}x{2} {3:?} jpeg, eoi found: {4}, {5} trailing bytes",
        parsed.scans.len(),
        parsed.frame.img_width,
        parsed.frame.img_height,
        parsed.frame.jpeg_type,
        parsed.found_eoi,
        parsed.trailing_bytes
    );

    Ok(JpegCoefficients {
        quantization: parsed
            .component_quantization
            .iter()
            .map(QuantizationTables::new_from_table)
            .collect(),
        frame: parsed.frame,
        planes,
    })
}

/// Decodes a JPEG held in memory, reconstructing the pixels on the given thread pool.
pub fn decode_jpeg_with_pool(
    data: &[u8],
    enabled_features: &EnabledFeatures,
    thread_pool: &dyn JpegThreadPool,
) -> Result<DecodedImage> {
    let mut metrics = Metrics::default();

    let coefficients = read_coefficients(data, enabled_features, &mut metrics).context()?;
    let frame = &coefficients.frame;

    // both of these can fail, so find out before we start any threads
    let layout = ColorLayout::from_frame(frame).context()?;
    let scales = frame
        .components
        .iter()
        .map(|c| SampleScale::for_component(frame, c))
        .collect::<Result<Vec<_>>>()
        .context()?;

    let (width, height) = (frame.img_width, frame.img_height);
    let jpeg_type = frame.jpeg_type;
    let format = enabled_features.output_format;

    let bands = split_into_bands(
        frame.mcuv,
        min(
            enabled_features.max_processor_threads as usize,
            thread_pool.max_parallelism(),
        ),
    );

    let context = Arc::new(ReconstructionContext {
        frame: coefficients.frame,
        planes: coefficients.planes,
        quantization: coefficients.quantization,
        scales,
        layout,
        idct: enabled_features.idct,
        format,
    });

    let pixels = reconstruct_bands(context, &bands, thread_pool, &mut metrics).context()?;

    info!(
        "decoded {0}x{1} {2:?} jpeg into {3:?} using {4} bands",
        width,
        height,
        jpeg_type,
        format,
        bands.len()
    );
    metrics.log_metrics();

    Ok(DecodedImage {
        width,
        height,
        format,
        pixels,
        metrics,
    })
}

/// Splits the MCU rows into at most max_bands contiguous bands of nearly equal size
fn split_into_bands(mcu_rows: u32, max_bands: usize) -> Vec<Range<u32>> {
    let count = (max_bands as u32).clamp(1, mcu_rows.max(1));
    let per_band = mcu_rows / count;
    let extra = mcu_rows % count;

    let mut bands = Vec::with_capacity(count as usize);
    let mut start = 0;
    for i in 0..count {
        let end = start + per_band + u32::from(i < extra);
        bands.push(start..end);
        start = end;
    }

    bands
}

/// Read only state shared by all the band tasks of a decode
struct ReconstructionContext {
    frame: FrameInfo,
    planes: Vec<BlockBasedImage>,
    quantization: Vec<QuantizationTables>,
    scales: Vec<SampleScale>,
    layout: ColorLayout,
    idct: IdctImplementation,
    format: PixelFormat,
}

impl ReconstructionContext {
    /// dequantize, IDCT, upsample and color convert the MCU rows of one band
    fn reconstruct_band(&self, mcu_rows: Range<u32>) -> Result<(Vec<u8>, Metrics)> {
        let cpu = CpuTimeMeasure::new();
        let idct = select_idct(self.idct);
        let frame = &self.frame;

        let mcu_height = 8 * frame.sfvm;
        let first_row = mcu_rows.start * mcu_height;
        let end_row = min(mcu_rows.end * mcu_height, frame.img_height);

        if first_row >= end_row {
            return err_exit_code(
                ExitCode::AssertionFailure,
                format!("band {0:?} has no pixel rows", mcu_rows),
            );
        }

        let mut component_bands = Vec::with_capacity(frame.components.len());

        for (c, info) in frame.components.iter().enumerate() {
            let scale = self.scales[c];
            let plane = &self.planes[c];
            let quantization = &self.quantization[c];

            // blocks that lie entirely to the right of the image are only MCU padding
            let visible_blocks = min(
                plane.get_block_width(),
                div_ceil(frame.img_width, 8 * scale.scale_x),
            ) as usize;

            let mut band = PlaneBand::new(frame.img_width, first_row, end_row - first_row);

            for by in mcu_rows.start * info.sfv..mcu_rows.end * info.sfv {
                for (bx, block) in plane
                    .get_block_row(by)
                    .iter()
                    .take(visible_blocks)
                    .enumerate()
                {
                    let mut pixels = quantization.dequantize_block(block);
                    idct.idct8x8(&mut pixels);
                    band.store_block(&pixels, bx as u32, by, scale);
                }
            }

            component_bands.push(band);
        }

        let pixels = convert_band(self.layout, &component_bands, self.format);

        let mut metrics = Metrics::default();
        metrics.record_cpu_time(DecodeStage::Reconstruct, cpu.elapsed());

        Ok((pixels, metrics))
    }
}

/// Runs one task per band on the thread pool and stitches the results back together
/// in order. The first failing band fails the whole decode.
fn reconstruct_bands(
    context: Arc<ReconstructionContext>,
    bands: &[Range<u32>],
    thread_pool: &dyn JpegThreadPool,
    metrics: &mut Metrics,
) -> Result<Vec<u8>> {
    let (tx, rx) = channel();

    for (index, rows) in bands.iter().enumerate() {
        let tx = tx.clone();
        let context = context.clone();
        let rows = rows.clone();

        thread_pool.run(Box::new(move || {
            let r = catch_unwind_result(|| context.reconstruct_band(rows));

            // the receiver is gone if an earlier band already failed, nobody cares anymore
            let _ = tx.send((index, r));
        }));
    }

    // only the task senders remain, so recv fails instead of hanging if a task disappears
    drop(tx);

    let mut results: Vec<Option<Vec<u8>>> = vec![None; bands.len()];
    for _ in 0..bands.len() {
        let (index, r) = rx.recv().context()?;
        let (pixels, band_metrics) = r.context()?;

        metrics.merge_from(band_metrics);
        results[index] = Some(pixels);
    }

    let bpp = context.format.bytes_per_pixel();
    let mut pixels = Vec::with_capacity(
        context.frame.img_width as usize * context.frame.img_height as usize * bpp,
    );
    for band in results.into_iter().flatten() {
        pixels.extend_from_slice(&band);
    }

    Ok(pixels)
}
