/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use super::jpeg_header::{FrameInfo, ScanInfo};
use crate::consts::JpegDecodeStatus;

/// used to keep track of position while decoding the blocks of a scan
pub struct JpegPositionState {
    /// current component (index into the frame components)
    cmp: usize,

    /// current minimum coded unit. For non-interleaved scans every block is its own MCU.
    mcu: u32,

    /// index of component within the scan
    csc: usize,

    /// offset within mcu
    sub: u32,

    /// current block position in image for this component
    dpos: u32,

    /// number of MCUs left until reset interval
    rstw: u32,

    /// blocks left in the current run of end-of-band blocks (progressive AC scans)
    pub eobrun: u32,
}

impl JpegPositionState {
    /// starts at the top left block of the first component of the scan
    pub fn new(scan: &ScanInfo, restart_interval: u16) -> Self {
        JpegPositionState {
            cmp: scan.components[0].component,
            mcu: 0,
            csc: 0,
            sub: 0,
            dpos: 0,
            rstw: u32::from(restart_interval),
            eobrun: 0,
        }
    }

    pub fn get_mcu(&self) -> u32 {
        self.mcu
    }

    pub fn get_dpos(&self) -> u32 {
        self.dpos
    }

    pub fn get_cmp(&self) -> usize {
        self.cmp
    }

    /// index of the current component within the scan
    pub fn get_csc(&self) -> usize {
        self.csc
    }

    /// called after the restart marker was read. EOB runs don't span restart intervals.
    pub fn reset_rstw(&mut self, restart_interval: u16) {
        self.rstw = u32::from(restart_interval);
        self.eobrun = 0;
    }

    /// counts down the restart interval after an MCU was completed
    fn count_restart(&mut self) -> JpegDecodeStatus {
        if self.rstw > 0 {
            self.rstw -= 1;
            if self.rstw == 0 {
                return JpegDecodeStatus::RestartIntervalExpired;
            }
        }

        JpegDecodeStatus::DecodeInProgress
    }

    /// calculates next position (non interleaved)
    fn next_mcu_pos_noninterleaved(&mut self, frame: &FrameInfo) -> JpegDecodeStatus {
        let cmp_info = &frame.components[self.cmp];

        // non interleaved scans only cover the blocks that contain image data (nch x ncv),
        // not the padding that interleaved scans need to complete their MCUs
        self.mcu += 1;
        if self.mcu >= cmp_info.nc {
            return JpegDecodeStatus::ScanCompleted;
        }

        self.dpos = (self.mcu / cmp_info.nch) * cmp_info.bch + (self.mcu % cmp_info.nch);

        self.count_restart()
    }

    /// calculates next position for MCU
    pub fn next_mcu_pos(&mut self, frame: &FrameInfo, scan: &ScanInfo) -> JpegDecodeStatus {
        // if there is just one component, go the simple route
        if !scan.is_interleaved() {
            return self.next_mcu_pos_noninterleaved(frame);
        }

        let mut sta = JpegDecodeStatus::DecodeInProgress;

        // increment all counts where needed
        self.sub += 1;
        if self.sub >= frame.components[self.cmp].mbs {
            self.sub = 0;
            self.csc += 1;

            if self.csc >= scan.components.len() {
                self.csc = 0;
                self.mcu += 1;

                if self.mcu >= frame.mcu_count() {
                    return JpegDecodeStatus::ScanCompleted;
                }

                sta = self.count_restart();
            }

            self.cmp = scan.components[self.csc].component;
        }

        let cmp_info = &frame.components[self.cmp];

        // blocks within the MCU are in raster order, vertical outer
        let mcu_x = self.mcu % frame.mcuh;
        let mcu_y = self.mcu / frame.mcuh;
        let sub_x = self.sub % cmp_info.sfh;
        let sub_y = self.sub / cmp_info.sfh;

        self.dpos = (mcu_y * cmp_info.sfv + sub_y) * cmp_info.bch + mcu_x * cmp_info.sfh + sub_x;

        sta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::component_info::ComponentInfo;
    use crate::jpeg::jpeg_header::ScanComponent;
    use crate::consts::JpegType;
    use crate::helpers::div_ceil;

    fn frame(width: u32, height: u32, sampling: &[(u32, u32)]) -> FrameInfo {
        let sfhm = sampling.iter().map(|s| s.0).max().unwrap();
        let sfvm = sampling.iter().map(|s| s.1).max().unwrap();
        let mcuh = div_ceil(width, 8 * sfhm);
        let mcuv = div_ceil(height, 8 * sfvm);

        FrameInfo {
            precision: 8,
            img_width: width,
            img_height: height,
            jpeg_type: JpegType::Sequential,
            components: sampling
                .iter()
                .enumerate()
                .map(|(i, &(h, v))| {
                    ComponentInfo::new(i as u8 + 1, h, v, 0, width, height, sfhm, sfvm, mcuh, mcuv)
                })
                .collect(),
            sfhm,
            sfvm,
            mcuh,
            mcuv,
        }
    }

    fn scan(components: &[usize]) -> ScanInfo {
        ScanInfo {
            components: components
                .iter()
                .map(|&component| ScanComponent {
                    component,
                    dc_table: 0,
                    ac_table: 0,
                })
                .collect(),
            ss: 0,
            se: 63,
            ah: 0,
            al: 0,
        }
    }

    /// collects (component, dpos) for every block visited, and the MCUs after which
    /// a restart marker is expected
    fn walk(f: &FrameInfo, s: &ScanInfo, restart_interval: u16) -> (Vec<(usize, u32)>, Vec<u32>) {
        let mut state = JpegPositionState::new(s, restart_interval);
        let mut visited = Vec::new();
        let mut restarts = Vec::new();

        loop {
            visited.push((state.get_cmp(), state.get_dpos()));
            match state.next_mcu_pos(f, s) {
                JpegDecodeStatus::DecodeInProgress => {}
                JpegDecodeStatus::RestartIntervalExpired => {
                    restarts.push(state.get_mcu());
                    state.reset_rstw(restart_interval);
                }
                JpegDecodeStatus::ScanCompleted => break,
            }
        }

        (visited, restarts)
    }

    #[test]
    fn interleaved_420_order() {
        let f = frame(32, 16, &[(2, 2), (1, 1), (1, 1)]);
        let (visited, restarts) = walk(&f, &scan(&[0, 1, 2]), 0);

        assert_eq!(
            visited,
            [
                (0, 0),
                (0, 1),
                (0, 4),
                (0, 5),
                (1, 0),
                (2, 0),
                (0, 2),
                (0, 3),
                (0, 6),
                (0, 7),
                (1, 1),
                (2, 1)
            ]
        );
        assert!(restarts.is_empty());
    }

    #[test]
    fn non_interleaved_skips_padding() {
        // 24x8 with 2x1 luma: 2 MCUs so the luma grid is 4 blocks wide, only 3 have data
        let f = frame(24, 8, &[(2, 1), (1, 1)]);

        let (visited, _) = walk(&f, &scan(&[0]), 0);
        assert_eq!(visited, [(0, 0), (0, 1), (0, 2)]);

        let (visited, _) = walk(&f, &scan(&[1]), 0);
        assert_eq!(visited, [(1, 0), (1, 1)]);
    }

    #[test]
    fn restart_intervals() {
        let f = frame(40, 8, &[(1, 1)]);
        let (visited, restarts) = walk(&f, &scan(&[0]), 2);

        assert_eq!(visited.len(), 5);

        // no restart after the last MCU
        assert_eq!(restarts, [2, 4]);
    }
}
