/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::collections::HashMap;
use std::time::Duration;

#[cfg(any(target_os = "windows", target_os = "linux"))]
use cpu_time::ThreadTime;

/// platform independent threadtime measurement
pub struct CpuTimeMeasure {
    #[cfg(any(target_os = "windows", target_os = "linux"))]
    start: ThreadTime,
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    start: std::time::SystemTime,
}

impl CpuTimeMeasure {
    /// starts measuring the cpu time used by the current thread
    pub fn new() -> Self {
        Self {
            #[cfg(any(target_os = "windows", target_os = "linux"))]
            start: ThreadTime::now(),
            #[cfg(not(any(target_os = "windows", target_os = "linux")))]
            start: std::time::SystemTime::now(),
        }
    }

    /// cpu time elapsed since this measurement was started
    pub fn elapsed(&self) -> Duration {
        #[cfg(any(target_os = "windows", target_os = "linux"))]
        {
            self.start.elapsed()
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            self.start.elapsed().unwrap_or_default()
        }
    }
}

/// The stages of the decode pipeline that we keep timing for
#[derive(Debug, PartialEq, Copy, Clone, Hash, Eq, PartialOrd, Ord)]
pub enum DecodeStage {
    /// splitting the file into segments and building tables
    Parse,
    /// Huffman decoding of all scans into coefficients
    Entropy,
    /// dequantization, IDCT, upsampling and color conversion
    Reconstruct,
}

#[derive(Default, Debug, Clone, Copy)]
struct StageStatistics {
    cpu_time: Duration,
    invocations: u32,
}

/// Timing information collected while decoding an image. Worker threads collect their
/// own metrics which are merged into the caller's once they are done.
#[derive(Default, Debug, Clone)]
pub struct Metrics {
    map: HashMap<DecodeStage, StageStatistics>,
}

impl Metrics {
    /// adds the cpu time spent in a stage
    pub fn record_cpu_time(&mut self, stage: DecodeStage, duration: Duration) {
        let e = self.map.entry(stage).or_default();
        e.cpu_time += duration;
        e.invocations += 1;
    }

    /// total cpu time spent in a stage across all threads
    pub fn get_cpu_time(&self, stage: DecodeStage) -> Duration {
        self.map.get(&stage).map(|s| s.cpu_time).unwrap_or_default()
    }

    /// number of times a stage was timed (for the reconstruct stage this is the number of bands)
    pub fn get_invocations(&self, stage: DecodeStage) -> u32 {
        self.map.get(&stage).map(|s| s.invocations).unwrap_or_default()
    }

    pub fn merge_from(&mut self, mut source_metrics: Metrics) {
        for (stage, stats) in source_metrics.map.drain() {
            let e = self.map.entry(stage).or_default();
            e.cpu_time += stats.cpu_time;
            e.invocations += stats.invocations;
        }
    }

    /// writes the collected timings to the log
    pub fn log_metrics(&self) {
        let mut stages: Vec<_> = self.map.iter().collect();
        stages.sort_by_key(|x| *x.0);

        for (stage, stats) in stages {
            log::info!(
                "{0:12} cpu={1}us invocations={2}",
                format!("{0:?}", stage),
                stats.cpu_time.as_micros(),
                stats.invocations
            );
        }
    }
}

#[test]
fn merge_adds_up() {
    let mut a = Metrics::default();
    a.record_cpu_time(DecodeStage::Reconstruct, Duration::from_millis(3));

    let mut b = Metrics::default();
    b.record_cpu_time(DecodeStage::Reconstruct, Duration::from_millis(4));
    b.record_cpu_time(DecodeStage::Parse, Duration::from_millis(1));

    a.merge_from(b);

    assert_eq!(
        a.get_cpu_time(DecodeStage::Reconstruct),
        Duration::from_millis(7)
    );
    assert_eq!(a.get_invocations(DecodeStage::Reconstruct), 2);
    assert_eq!(a.get_cpu_time(DecodeStage::Parse), Duration::from_millis(1));
    assert_eq!(a.get_invocations(DecodeStage::Entropy), 0);
}
