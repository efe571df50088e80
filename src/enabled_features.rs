/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::jpeg_error::{ExitCode, Result, err_exit_code};
use crate::structs::color_convert::PixelFormat;
use crate::structs::idct::IdctImplementation;

/// Features that are enabled in the decoder. Turn off to restrict what kind of images are accepted.
#[derive(Debug, Clone)]
pub struct EnabledFeatures {
    /// enables/disables decoding of progressive images
    pub progressive: bool,

    /// reject/accept images with DQTs with zeros
    pub reject_dqts_with_zeros: bool,

    /// maximum jpeg width
    pub max_jpeg_width: u32,

    /// maximum jpeg height
    pub max_jpeg_height: u32,

    /// maximum size of a jpeg file accepted by the reader based entry point
    pub max_jpeg_file_size: u32,

    /// maximum number of bytes the coefficient planes of all components may take up.
    /// Checked against the frame header before anything is allocated.
    pub max_coefficient_memory: u64,

    /// maximum number of threads (and therefore MCU row bands) used for reconstruction
    pub max_processor_threads: u32,

    /// which inverse DCT implementation to use
    pub idct: IdctImplementation,

    /// layout of the pixels returned
    pub output_format: PixelFormat,

    /// stop reading at the end of the valid JPEG file. If set, any data after the
    /// EOI marker is an error, otherwise it is ignored.
    pub stop_reading_at_eoi: bool,
}

impl Default for EnabledFeatures {
    fn default() -> Self {
        Self {
            progressive: true,
            reject_dqts_with_zeros: false,
            max_jpeg_width: 16384,
            max_jpeg_height: 16384,
            max_jpeg_file_size: 128 * 1024 * 1024,
            max_coefficient_memory: 1024 * 1024 * 1024,
            max_processor_threads: 8,
            idct: IdctImplementation::Auto,
            output_format: PixelFormat::Rgba,
            stop_reading_at_eoi: false,
        }
    }
}

impl EnabledFeatures {
    /// rejects anything unusual: trailing data after EOI and zero quantization entries
    pub fn strict() -> Self {
        Self {
            reject_dqts_with_zeros: true,
            stop_reading_at_eoi: true,
            ..Self::default()
        }
    }

    /// single threaded decoding with the portable scalar IDCT, used as the
    /// reference that all other configurations should match exactly
    pub fn scalar_reference() -> Self {
        Self {
            max_processor_threads: 1,
            idct: IdctImplementation::Scalar,
            ..Self::default()
        }
    }

    /// verifies that the parameters make sense before we start decoding
    pub fn validate(&self) -> Result<()> {
        if self.max_processor_threads == 0 {
            return err_exit_code(
                ExitCode::SyntaxError,
                "max_processor_threads must be at least 1",
            );
        }

        if self.max_jpeg_width == 0 || self.max_jpeg_height == 0 {
            return err_exit_code(
                ExitCode::SyntaxError,
                "maximum image dimensions must be non-zero",
            );
        }

        if self.max_coefficient_memory == 0 {
            return err_exit_code(
                ExitCode::SyntaxError,
                "max_coefficient_memory must be non-zero",
            );
        }

        if self.max_jpeg_width > 65535 || self.max_jpeg_height > 65535 {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!(
                    "maximum image dimensions {0}x{1} exceed what a JPEG frame header can express",
                    self.max_jpeg_width, self.max_jpeg_height
                ),
            );
        }

        Ok(())
    }
}

#[test]
fn validate_rejects_nonsense() {
    assert!(EnabledFeatures::default().validate().is_ok());
    assert!(EnabledFeatures::strict().validate().is_ok());

    let mut f = EnabledFeatures::scalar_reference();
    f.max_processor_threads = 0;
    assert_eq!(
        f.validate().unwrap_err().exit_code(),
        ExitCode::SyntaxError
    );

    let mut f = EnabledFeatures::default();
    f.max_coefficient_memory = 0;
    assert_eq!(
        f.validate().unwrap_err().exit_code(),
        ExitCode::SyntaxError
    );

    let mut f = EnabledFeatures::default();
    f.max_jpeg_width = 100_000;
    assert_eq!(
        f.validate().unwrap_err().exit_code(),
        ExitCode::SyntaxError
    );
}
