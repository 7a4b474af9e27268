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

//! Planned multi-segment memory transfers.
//!
//! A plan is an ordered list of sub-copies executed asynchronously on the
//! per-device default streams, with one context synchronization per device
//! at the end when the plan is synchronous. Three flavours exist: host to
//! device, device to host and device to device; a broadcast is a
//! host-to-device plan covering the full buffer on every device.

use super::alias_handle::AliasHandle;
use super::cuda::{self, CUdeviceptr, CUstream, CudaResult};
use crate::error::{ErrorKind, Result};
use std::fmt;
use std::os::raw::c_void;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyKind {
    HtoD,
    DtoH,
    DtoD,
}

/// One contiguous transfer segment. Device index -1 stands for the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemSubCopy {
    pub src: i32,
    pub dst: i32,
    pub from: usize,
    pub to: usize,
    pub size: usize,
}

impl fmt::Display for MemSubCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(src: {}, dst: {}, from: {}, to: {}, size: {} Byte)",
            self.src, self.dst, self.from, self.to, self.size
        )
    }
}

/// A planned transfer between the host and the device replicas of one
/// buffer.
///
/// Host addresses are stored as integers; the plan only turns them back into
/// pointers at the driver call.
#[derive(Clone, Debug)]
pub struct MemCpy {
    kind: CopyKind,
    /// Primary device pointer of the destination (DtoD, HtoD).
    dst_dev: CUdeviceptr,
    /// Primary device pointer of the source (DtoD, DtoH).
    src_dev: CUdeviceptr,
    /// Host destination address (DtoH).
    dst_host: usize,
    /// Host source address (HtoD).
    src_host: usize,
    pattern: Vec<MemSubCopy>,
    sync: bool,
    broadcast: bool,
    executions: usize,
    time: f64,
}

impl MemCpy {
    /// Broadcast plan copying the full host buffer to every device replica.
    pub fn broadcast_htod(
        dst: CUdeviceptr,
        src_host: usize,
        size: usize,
        num_devices: usize,
    ) -> Self {
        let pattern = (0..num_devices)
            .map(|gpu| MemSubCopy {
                src: -1,
                dst: gpu as i32,
                from: 0,
                to: 0,
                size,
            })
            .collect();
        Self {
            kind: CopyKind::HtoD,
            dst_dev: dst,
            src_dev: 0,
            dst_host: 0,
            src_host,
            pattern,
            sync: true,
            broadcast: true,
            executions: 0,
            time: 0.0,
        }
    }

    /// Broadcast plan copying the full buffer from device `master` to every
    /// other device.
    pub fn broadcast_dtod(
        dstsrc: CUdeviceptr,
        size: usize,
        num_devices: usize,
        master: usize,
    ) -> Self {
        let pattern = (0..num_devices)
            .filter(|&gpu| gpu != master)
            .map(|gpu| MemSubCopy {
                src: master as i32,
                dst: gpu as i32,
                from: 0,
                to: 0,
                size,
            })
            .collect();
        Self {
            kind: CopyKind::DtoD,
            dst_dev: dstsrc,
            src_dev: dstsrc,
            dst_host: 0,
            src_host: 0,
            pattern,
            sync: true,
            broadcast: true,
            executions: 0,
            time: 0.0,
        }
    }

    /// Single-segment plan copying the full buffer from device 0 to the
    /// host. Used for buffers that were broadcast and never written by a
    /// kernel.
    pub fn trivial_dtoh(dst_host: usize, src: CUdeviceptr, size: usize) -> Self {
        Self::dtoh(
            dst_host,
            src,
            vec![MemSubCopy {
                src: 0,
                dst: -1,
                from: 0,
                to: 0,
                size,
            }],
        )
    }

    /// Device-to-host plan with an explicit sub-copy pattern.
    pub fn dtoh(dst_host: usize, src: CUdeviceptr, pattern: Vec<MemSubCopy>) -> Self {
        Self {
            kind: CopyKind::DtoH,
            dst_dev: 0,
            src_dev: src,
            dst_host,
            src_host: 0,
            pattern,
            sync: true,
            broadcast: false,
            executions: 0,
            time: 0.0,
        }
    }

    /// Device-to-device plan between the replicas of one buffer.
    pub fn dtod(dstsrc: CUdeviceptr, pattern: Vec<MemSubCopy>, sync: bool) -> Self {
        Self {
            kind: CopyKind::DtoD,
            dst_dev: dstsrc,
            src_dev: dstsrc,
            dst_host: 0,
            src_host: 0,
            pattern,
            sync,
            broadcast: false,
            executions: 0,
            time: 0.0,
        }
    }

    pub fn kind(&self) -> CopyKind {
        self.kind
    }

    pub fn pattern(&self) -> &[MemSubCopy] {
        &self.pattern
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Total bytes moved by one execution of the plan.
    pub fn bytes(&self) -> usize {
        self.pattern.iter().map(|sc| sc.size).sum()
    }

    pub fn executions(&self) -> usize {
        self.executions
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Retargets a cached device-to-host plan at a new host buffer.
    pub fn set_dst_host(&mut self, dst_host: usize) {
        debug_assert_eq!(self.kind, CopyKind::DtoH);
        self.dst_host = dst_host;
    }

    /// Executes all sub-copies asynchronously and issues the terminal
    /// synchronization for synchronous plans.
    pub fn exec(&mut self, alias: &AliasHandle) -> Result<()> {
        let num_dev = alias.num_devices()?;
        let ctxs = alias.contexts()?;
        if ctxs.len() != num_dev {
            return Err(ErrorKind::InvalidState(format!(
                "{} device contexts for {} devices",
                ctxs.len(),
                num_dev
            ))
            .into());
        }

        let start = Instant::now();
        let mut res = CudaResult::new();
        for sc in &self.pattern {
            self.check_sub_copy(sc)?;
            match self.kind {
                CopyKind::HtoD => {
                    let dst_ptrs = alias.pointers(self.dst_dev);
                    res.absorb(cuda::ctx_push_current(ctxs[sc.dst as usize]));
                    res.absorb(cuda::memcpy_htod_async(
                        dst_ptrs[sc.dst as usize] + sc.to as CUdeviceptr,
                        (self.src_host + sc.from) as *const c_void,
                        sc.size,
                        CUstream::default(),
                    ));
                    res.absorb(cuda::ctx_pop_current());
                }
                CopyKind::DtoH => {
                    let src_ptrs = alias.pointers(self.src_dev);
                    res.absorb(cuda::ctx_push_current(ctxs[sc.src as usize]));
                    res.absorb(cuda::memcpy_dtoh_async(
                        (self.dst_host + sc.to) as *mut c_void,
                        src_ptrs[sc.src as usize] + sc.from as CUdeviceptr,
                        sc.size,
                        CUstream::default(),
                    ));
                    res.absorb(cuda::ctx_pop_current());
                }
                CopyKind::DtoD => {
                    let ptrs = alias.pointers(self.dst_dev);
                    res.absorb(cuda::ctx_push_current(ctxs[sc.dst as usize]));
                    res.absorb(cuda::memcpy_dtod_async(
                        ptrs[sc.dst as usize] + sc.to as CUdeviceptr,
                        ptrs[sc.src as usize] + sc.from as CUdeviceptr,
                        sc.size,
                        CUstream::default(),
                    ));
                    res.absorb(cuda::ctx_pop_current());
                }
            }
            if !res.is_success() {
                break;
            }
        }

        if self.sync {
            for &ctx in ctxs {
                if !res.is_success() {
                    break;
                }
                res.absorb(cuda::ctx_push_current(ctx));
                res.absorb(cuda::ctx_synchronize());
                res.absorb(cuda::ctx_pop_current());
            }
        }

        self.executions += 1;
        self.time += start.elapsed().as_secs_f64();
        res.into_result()
    }

    fn check_sub_copy(&self, sc: &MemSubCopy) -> Result<()> {
        let consistent = match self.kind {
            CopyKind::HtoD => sc.src == -1 && sc.dst >= 0,
            CopyKind::DtoH => sc.src >= 0 && sc.dst == -1,
            CopyKind::DtoD => sc.src >= 0 && sc.dst >= 0 && sc.src != sc.dst,
        };
        if !consistent {
            return Err(ErrorKind::InvalidArgument(format!(
                "memcpy marked as {:?}, but the sub copy {} is not consistent \
                 with that",
                self.kind, sc
            ))
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for MemCpy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ {:?} subcopies({}) bytes({}) sync({}) execs({}) }}",
            self.kind,
            self.pattern.len(),
            self.bytes(),
            self.sync,
            self.executions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn htod_broadcast_covers_every_device() {
        let cpy = MemCpy::broadcast_htod(0x1000, 0, 4096, 3);
        assert!(cpy.is_broadcast());
        assert_eq!(cpy.pattern().len(), 3);
        for (gpu, sc) in cpy.pattern().iter().enumerate() {
            assert_eq!(sc.src, -1);
            assert_eq!(sc.dst, gpu as i32);
            assert_eq!(sc.from, 0);
            assert_eq!(sc.to, 0);
            assert_eq!(sc.size, 4096);
        }
        assert_eq!(cpy.bytes(), 3 * 4096);
    }

    #[test]
    fn dtod_broadcast_skips_the_master() {
        let cpy = MemCpy::broadcast_dtod(0x1000, 256, 4, 2);
        assert_eq!(cpy.pattern().len(), 3);
        assert!(cpy.pattern().iter().all(|sc| sc.src == 2 && sc.dst != 2));
    }

    #[test]
    fn trivial_dtoh_reads_device_zero() {
        let cpy = MemCpy::trivial_dtoh(0, 0x1000, 128);
        assert_eq!(cpy.kind(), CopyKind::DtoH);
        assert_eq!(
            cpy.pattern(),
            &[MemSubCopy {
                src: 0,
                dst: -1,
                from: 0,
                to: 0,
                size: 128
            }]
        );
    }

    #[test]
    fn inconsistent_sub_copies_are_rejected() {
        use super::super::alias_handle::AliasHandle;
        use super::super::cuda::CUcontext;

        let mut alias = AliasHandle::new();
        alias.register_devices(vec![0, 1]);
        alias.register_contexts(vec![CUcontext(1 as *mut _), CUcontext(2 as *mut _)]);
        alias.register_pointers(vec![0x1000, 0x2000]);

        // A DtoD plan whose sub copy claims to come from the host.
        let mut cpy = MemCpy::dtod(
            0x1000,
            vec![MemSubCopy {
                src: -1,
                dst: 0,
                from: 0,
                to: 0,
                size: 8,
            }],
            false,
        );
        assert!(cpy.exec(&alias).is_err());

        let mut cpy = MemCpy::dtod(
            0x1000,
            vec![MemSubCopy {
                src: 0,
                dst: 0,
                from: 0,
                to: 0,
                size: 8,
            }],
            false,
        );
        assert!(cpy.exec(&alias).is_err());
    }

    #[test]
    #[cfg(not(feature = "cuda"))]
    fn exec_counts_executions_even_when_the_driver_fails() {
        use super::super::alias_handle::AliasHandle;
        use super::super::cuda::CUcontext;

        let mut alias = AliasHandle::new();
        alias.register_devices(vec![0, 1]);
        alias.register_contexts(vec![CUcontext(1 as *mut _), CUcontext(2 as *mut _)]);
        alias.register_pointers(vec![0x1000, 0x2000]);

        let mut cpy = MemCpy::broadcast_htod(0x1000, 0x10, 64, 2);
        assert!(cpy.exec(&alias).is_err());
        assert_eq!(cpy.executions(), 1);
    }
}
