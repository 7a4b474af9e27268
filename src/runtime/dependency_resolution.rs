/*
 * Copyright 2019-2022 Clemens Lutz, German Research Center for Artificial Intelligence
 * Author: Clemens Lutz <clemens.lutz@dfki.de>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Inter-kernel dependency resolution.
//!
//! When a `master` launch wrote a buffer that a `slave` launch reads, the
//! elements written on one device but read on another must move before the
//! slave is submitted. The resolver intersects the master's write summary
//! with the slave's read summary per shared buffer and plans the minimal
//! device-to-device transfers.

use super::alias_handle::AliasHandle;
use super::argument_access::ArgAccess;
use super::cuda::{self, CudaResult};
use super::kernel_launch::{LaunchCache, LaunchId};
use super::memory_copy::{MemCpy, MemSubCopy};
use crate::error::Result;
use std::fmt;
use std::time::Instant;

#[derive(Debug)]
pub struct DepResolution {
    master: LaunchId,
    slave: LaunchId,
    memcpys: Vec<MemCpy>,
    executions: usize,
    time: f64,
}

impl DepResolution {
    /// Synthesizes the transfer plans for one (master, slave) pair.
    ///
    /// For every slave read pointer held by a master argument whose type is
    /// modified, the interval intersection of the master's writes and the
    /// slave's reads across distinct devices becomes one device-to-device
    /// plan.
    pub fn build(master: LaunchId, slave: LaunchId, cache: &mut LaunchCache) -> Result<Self> {
        let slave_reads: Vec<(usize, super::cuda::CUdeviceptr)> = cache
            .get(slave)
            .args()
            .iter()
            .enumerate()
            .filter(|(_, arg)| arg.ty().ptr_level() == 1 && arg.ty().is_read())
            .filter_map(|(nr, arg)| arg.as_dev_ptr().ok().map(|ptr| (nr, ptr)))
            .collect();

        let mut memcpys = Vec::new();
        for (slave_nr, ptr) in slave_reads {
            let master_nr = match cache.get(master).arg_id(ptr) {
                Some(nr) => nr,
                None => continue,
            };
            if !cache.get(master).arg(master_nr).ty().is_modified() {
                continue;
            }
            let master_acc = cache.write_arg_access(master, master_nr)?;
            let slave_acc = cache.read_arg_access(slave, slave_nr)?;
            let el_size = cache.get(slave).arg(slave_nr).ty().el_size()?;
            let pattern = mem_cpy_intersections(&master_acc, &slave_acc, el_size);
            memcpys.push(MemCpy::dtod(ptr, pattern, false));
        }

        Ok(Self {
            master,
            slave,
            memcpys,
            executions: 0,
            time: 0.0,
        })
    }

    /// Launch identity makes pointer comparison of the cached launch objects
    /// valid, so the resolver cache is keyed on the two handles.
    pub fn is_resolution_of(&self, master: LaunchId, slave: LaunchId) -> bool {
        self.master == master && self.slave == slave
    }

    pub fn master(&self) -> LaunchId {
        self.master
    }

    pub fn slave(&self) -> LaunchId {
        self.slave
    }

    /// True if no bytes have to move for this dependency.
    pub fn is_empty(&self) -> bool {
        self.memcpys.iter().all(|cpy| cpy.is_empty())
    }

    pub fn mem_cpys(&self) -> &[MemCpy] {
        &self.memcpys
    }

    pub fn executions(&self) -> usize {
        self.executions
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Total bytes one execution transfers between devices.
    pub fn bytes(&self) -> usize {
        self.memcpys.iter().map(|cpy| cpy.bytes()).sum()
    }

    /// Waits for the master's writes to become visible, runs all transfer
    /// plans and barriers again before the slave may be submitted.
    pub fn exec(&mut self, alias: &AliasHandle) -> Result<()> {
        let start = Instant::now();
        let mut res = CudaResult::new();

        res.absorb(sync_all(alias)?);
        for cpy in &mut self.memcpys {
            if let Err(e) = cpy.exec(alias) {
                self.executions += 1;
                self.time += start.elapsed().as_secs_f64();
                return Err(e);
            }
        }
        res.absorb(sync_all(alias)?);

        self.executions += 1;
        self.time += start.elapsed().as_secs_f64();
        res.into_result()
    }
}

fn sync_all(alias: &AliasHandle) -> Result<super::cuda::CUresult> {
    let mut res = CudaResult::new();
    for &ctx in alias.contexts()? {
        res.absorb(cuda::ctx_push_current(ctx));
        res.absorb(cuda::ctx_synchronize());
        res.absorb(cuda::ctx_pop_current());
    }
    Ok(res.raw())
}

/// Cross-device interval intersections as byte-addressed sub-copies. Source
/// and destination offsets are equal: the buffer layout is identical on
/// every device.
fn mem_cpy_intersections(
    master: &ArgAccess,
    slave: &ArgAccess,
    el_size: usize,
) -> Vec<MemSubCopy> {
    let mut res = Vec::new();
    for (&slave_gpu, slave_ranges) in slave.map() {
        for (&master_gpu, master_ranges) in master.map() {
            if master_gpu == slave_gpu {
                continue;
            }
            for &s_range in slave_ranges {
                for &m_range in master_ranges {
                    if let Some((from, to)) = ArgAccess::intersect_intervals(s_range, m_range) {
                        let offset = from as usize * el_size;
                        res.push(MemSubCopy {
                            src: master_gpu as i32,
                            dst: slave_gpu as i32,
                            from: offset,
                            to: offset,
                            size: (to - from) as usize * el_size,
                        });
                    }
                }
            }
        }
    }
    res
}

impl fmt::Display for DepResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DepResObj has the memsubcpys:")?;
        for cpy in &self.memcpys {
            for sc in cpy.pattern() {
                writeln!(f, "\t{}", sc)?;
            }
        }
        Ok(())
    }
}
