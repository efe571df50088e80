/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! A simple thread pool implementation that can be used to evaluate closures on separate threads.
//!
//! The pool will keep a number of idle threads equal to the number of CPUs available on the system,
//! and will reuse threads that are idle. If more tasks are submitted than there are threads, the pool
//! will spawn new threads to handle the extra tasks, so a decode never waits for an unrelated one
//! running on the same pool.
//!
//! No unsafe code is used.

use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread::{self, spawn};

use log::warn;

/// The interface the decoder uses to run work on other threads.
///
/// It has a simple fire-and-forget interface, results are sent back over channels by the
/// closures themselves. The closures have to be static, since we don't require the thread
/// to return within a specific lifetime.
pub trait JpegThreadPool {
    /// Returns the maximum parallelism supported by the thread pool.
    fn max_parallelism(&self) -> usize;

    /// Runs a closure on a thread from the thread pool.
    fn run(&self, f: Box<dyn FnOnce() + Send + 'static>);
}

/// Priority levels for threads in the thread pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JpegThreadPriority {
    /// Low priority thread
    Low,
    /// Normal priority thread, we don't touch the priority of these threads.
    #[default]
    Normal,
    /// High priority thread
    High,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool that spawns threads on demand and reuses them for executing closures.
/// There is no limit on the number of threads, but the number of idle threads is limited
/// to the number of CPUs available.
pub struct SimpleThreadPool {
    priority: JpegThreadPriority,
    idle_threads: LazyLock<Arc<Mutex<Vec<Sender<Job>>>>>,
}

impl Default for SimpleThreadPool {
    fn default() -> Self {
        SimpleThreadPool::new(JpegThreadPriority::Normal)
    }
}

impl SimpleThreadPool {
    /// Creates a new thread pool with the specified priority.
    pub const fn new(priority: JpegThreadPriority) -> Self {
        SimpleThreadPool {
            priority,
            idle_threads: LazyLock::new(|| Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Returns the number of idle threads in the thread pool.
    pub fn get_idle_threads(&self) -> usize {
        self.idle_threads.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Executes a closure on a thread from the thread pool. Does not block or return any result.
    fn execute(&self, f: Job) {
        let idle = self.idle_threads.lock().ok().and_then(|mut i| i.pop());

        // an idle thread may have exited since it registered, in which case we get the job back
        let f = match idle {
            Some(sender) => match sender.send(f) {
                Ok(()) => return,
                Err(e) => e.0,
            },
            None => f,
        };

        // channel for receiving future work on this thread
        let (tx_schedule, rx_schedule) = channel::<Job>();

        let priority = self.priority;
        let idle_threads = self.idle_threads.clone();

        spawn(move || {
            set_thread_priority(priority);

            f();

            loop {
                if let Ok(mut i) = idle_threads.lock() {
                    // stick back into list of idle threads if there aren't more than
                    // the number of cpus already there.
                    if i.len() > *NUM_CPUS {
                        // just exits the thread
                        break;
                    }
                    i.push(tx_schedule.clone());
                } else {
                    break;
                }

                if let Ok(f) = rx_schedule.recv() {
                    f();
                } else {
                    // channel broken, exit thread
                    break;
                }
            }
        });
    }
}

#[cfg(any(target_os = "windows", target_os = "linux"))]
fn set_thread_priority(priority: JpegThreadPriority) {
    let p = match priority {
        JpegThreadPriority::Low => thread_priority::ThreadPriority::Min,
        JpegThreadPriority::Normal => return,
        JpegThreadPriority::High => thread_priority::ThreadPriority::Max,
    };

    if let Err(e) = thread_priority::set_current_thread_priority(p) {
        warn!("unable to set thread priority {0:?}: {1:?}", priority, e);
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn set_thread_priority(priority: JpegThreadPriority) {
    if priority != JpegThreadPriority::Normal {
        warn!("thread priority {0:?} is not supported on this platform", priority);
    }
}

/// A default instance of the `SimpleThreadPool` that is used when the caller doesn't supply a pool.
pub static DEFAULT_THREAD_POOL: SimpleThreadPool =
    SimpleThreadPool::new(JpegThreadPriority::Normal);

impl JpegThreadPool for SimpleThreadPool {
    fn max_parallelism(&self) -> usize {
        *NUM_CPUS
    }

    fn run(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        self.execute(f);
    }
}

static NUM_CPUS: LazyLock<usize> =
    LazyLock::new(|| thread::available_parallelism().map_or(1, |n| n.get()));

/// Thread pool that doesn't create any threads, closures are run right away on the
/// calling thread.
#[derive(Default)]
pub struct SingleThreadPool {}

impl JpegThreadPool for SingleThreadPool {
    fn max_parallelism(&self) -> usize {
        1
    }

    fn run(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        f();
    }
}

#[cfg(feature = "use_rayon")]
impl JpegThreadPool for rayon_core::ThreadPool {
    fn max_parallelism(&self) -> usize {
        self.current_num_threads()
    }

    fn run(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        self.spawn(f);
    }
}
