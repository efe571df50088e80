/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::helpers::div_ceil;

/// A component as declared in the frame header, with the block geometry
/// that follows from its sampling factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// jpeg internal id (1=Y, 2=Cb, 3=Cr by convention)
    pub jid: u8,

    /// quantization table
    pub q_table_index: u8,

    /// sample factor horizontal
    pub sfh: u32,

    /// sample factor vertical
    pub sfv: u32,

    /// blocks in mcu
    pub mbs: u32,

    /// block count horizontal (interleaved)
    pub bch: u32,

    /// block count vertical (interleaved)
    pub bcv: u32,

    /// block count (all) (interleaved)
    pub bc: u32,

    /// block count horizontal (non interleaved)
    pub nch: u32,

    /// block count vertical (non interleaved)
    pub ncv: u32,

    /// block count (all) (non interleaved)
    pub nc: u32,
}

impl ComponentInfo {
    /// Creates the component and derives its block counts from the image size, the
    /// maximum sampling factors of the frame and the MCU grid size.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jid: u8,
        sfh: u32,
        sfv: u32,
        q_table_index: u8,
        img_width: u32,
        img_height: u32,
        sfhm: u32,
        sfvm: u32,
        mcuh: u32,
        mcuv: u32,
    ) -> Self {
        // T.81 A.1.1: the component is ceil(X * H / Hmax) samples wide
        let width = div_ceil(img_width * sfh, sfhm);
        let height = div_ceil(img_height * sfv, sfvm);

        let nch = div_ceil(width, 8);
        let ncv = div_ceil(height, 8);
        let bch = mcuh * sfh;
        let bcv = mcuv * sfv;

        ComponentInfo {
            jid,
            q_table_index,
            sfh,
            sfv,
            mbs: sfh * sfv,
            bch,
            bcv,
            bc: bch * bcv,
            nch,
            ncv,
            nc: nch * ncv,
        }
    }

    /// pixels covered horizontally by one sample of this component
    pub fn scale_x(&self, sfhm: u32) -> u32 {
        sfhm / self.sfh
    }

    /// pixels covered vertically by one sample of this component
    pub fn scale_y(&self, sfvm: u32) -> u32 {
        sfvm / self.sfv
    }
}

#[test]
fn geometry_420() {
    // 4:2:0, 33x17 image, MCU is 16x16
    let mcuh = div_ceil(33, 16);
    let mcuv = div_ceil(17, 16);
    assert_eq!((mcuh, mcuv), (3, 2));

    let y = ComponentInfo::new(1, 2, 2, 0, 33, 17, 2, 2, mcuh, mcuv);
    assert_eq!((y.bch, y.bcv, y.bc), (6, 4, 24));
    assert_eq!((y.nch, y.ncv, y.nc), (5, 3, 15));
    assert_eq!(y.mbs, 4);
    assert_eq!((y.scale_x(2), y.scale_y(2)), (1, 1));

    let cb = ComponentInfo::new(2, 1, 1, 1, 33, 17, 2, 2, mcuh, mcuv);
    assert_eq!((cb.bch, cb.bcv, cb.bc), (3, 2, 6));
    // chroma plane is 17x9 samples
    assert_eq!((cb.nch, cb.ncv, cb.nc), (3, 2, 6));
    assert_eq!(cb.mbs, 1);
    assert_eq!((cb.scale_x(2), cb.scale_y(2)), (2, 2));
}
