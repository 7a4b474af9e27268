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

//! Kernel launch objects and the process-wide launch cache.
//!
//! A launch is identified by its function handle, grid, block, shared memory
//! size and the bit values of all arguments; the cache holds exactly one
//! object per equivalence class, so repeated launches of an iterative solver
//! reuse the partitions, access summaries and transfer plans computed on
//! first sight. The cache owns the launch objects; everything else refers to
//! them through `LaunchId` handles.

use super::access_function::Direction;
use super::alias_handle::AliasHandle;
use super::argument::KernelArg;
use super::argument_access::{merge_intervals, ArgAccess, Interval};
use super::cuda::{self, CUfunction, CUdeviceptr, CUstream, CudaResult};
use super::kernel_info::KernelInfo;
use super::memory_copy::{MemCpy, MemSubCopy};
use super::partition::{create_partitions, Partition};
use crate::error::{ErrorKind, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::os::raw::c_void;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Handle into the launch cache arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaunchId(pub usize);

/// Cache key over the launch identity.
///
/// Equality covers the function handle, grid, block, shared memory and the
/// bit values of all arguments; the hash is derived from grid, block and
/// function handle only.
#[derive(Debug, PartialEq, Eq)]
struct LaunchKey {
    func: CUfunction,
    grid: [u32; 3],
    block: [u32; 3],
    sh_mem: usize,
    arg_bits: Vec<Vec<u8>>,
}

impl Hash for LaunchKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.grid.hash(state);
        self.block.hash(state);
        (self.func.0 as usize).hash(state);
    }
}

#[derive(Debug)]
pub struct KernelLaunch {
    func: CUfunction,
    grid: [u32; 3],
    block: [u32; 3],
    sh_mem: usize,
    info: Arc<KernelInfo>,
    args: Vec<KernelArg>,
    parts: Vec<Partition>,
    num_devices: usize,

    deps_resolved: bool,
    executions: usize,
    time: f64,
    arg_access_time: f64,
    linearization_time: f64,
    num_arg_access_calls: u32,
    num_arg_access_calcs: u32,

    read_accs: Vec<Option<Arc<ArgAccess>>>,
    write_accs: Vec<Option<Arc<ArgAccess>>>,
    dtoh_plans: BTreeMap<usize, MemCpy>,
}

impl KernelLaunch {
    pub fn grid(&self) -> [u32; 3] {
        self.grid
    }

    pub fn block(&self) -> [u32; 3] {
        self.block
    }

    pub fn sh_mem(&self) -> usize {
        self.sh_mem
    }

    pub fn func(&self) -> CUfunction {
        self.func
    }

    pub fn info(&self) -> &Arc<KernelInfo> {
        &self.info
    }

    pub fn args(&self) -> &[KernelArg] {
        &self.args
    }

    pub fn arg(&self, nr: usize) -> &KernelArg {
        &self.args[nr]
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.parts
    }

    pub fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Index of the buffer argument holding the pointer value, if any.
    pub fn arg_id(&self, ptr: CUdeviceptr) -> Option<usize> {
        self.args.iter().position(|arg| arg.matches_ptr(ptr))
    }

    pub fn is_arg(&self, ptr: CUdeviceptr) -> bool {
        self.arg_id(ptr).is_some()
    }

    /// Device pointers written by this launch.
    pub fn writes(&self) -> Vec<CUdeviceptr> {
        self.ptr_args(|arg| arg.ty().is_modified())
    }

    /// Device pointers read by this launch.
    pub fn reads(&self) -> Vec<CUdeviceptr> {
        self.ptr_args(|arg| arg.ty().is_read())
    }

    /// All device pointer arguments.
    pub fn ptrs(&self) -> Vec<CUdeviceptr> {
        self.ptr_args(|_| true)
    }

    fn ptr_args(&self, pred: impl Fn(&KernelArg) -> bool) -> Vec<CUdeviceptr> {
        self.args
            .iter()
            .filter(|arg| arg.ty().ptr_level() == 1 && pred(arg))
            .filter_map(|arg| arg.as_dev_ptr().ok())
            .collect()
    }

    /// The device that executes the given global thread id.
    pub fn gpu_at(&self, tid: [u64; 3]) -> Result<usize> {
        self.parts
            .iter()
            .find(|p| p.contains(tid))
            .map(|p| p.device())
            .ok_or_else(|| {
                ErrorKind::InvalidArgument(
                    "could not find the thread id in this kernel launch".to_string(),
                )
                .into()
            })
    }

    /// Only the function, grid, block and non-pointer argument values affect
    /// the argument access: equal launches up to buffer addresses share
    /// their access summaries.
    pub fn has_equal_arg_access(&self, other: &KernelLaunch) -> bool {
        if self.grid != other.grid || self.block != other.block || self.func != other.func {
            return false;
        }
        self.args
            .iter()
            .zip(other.args.iter())
            .all(|(a, b)| a.ty().ptr_level() == 1 || a.bits_equal(b))
    }

    /// Marks the dependencies of this launch as resolved. `exec` consumes
    /// the mark.
    pub fn mark_deps_resolved(&mut self) {
        self.deps_resolved = true;
    }

    pub fn deps_resolved(&self) -> bool {
        self.deps_resolved
    }

    pub fn executions(&self) -> usize {
        self.executions
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn arg_access_time(&self) -> f64 {
        self.arg_access_time
    }

    pub fn linearization_time(&self) -> f64 {
        self.linearization_time
    }

    pub fn num_arg_access_calls(&self) -> u32 {
        self.num_arg_access_calls
    }

    pub fn num_arg_access_calcs(&self) -> u32 {
        self.num_arg_access_calcs
    }

    fn accs(&self, dir: Direction) -> &Vec<Option<Arc<ArgAccess>>> {
        match dir {
            Direction::Read => &self.read_accs,
            Direction::Write => &self.write_accs,
        }
    }

    fn accs_mut(&mut self, dir: Direction) -> &mut Vec<Option<Arc<ArgAccess>>> {
        match dir {
            Direction::Read => &mut self.read_accs,
            Direction::Write => &mut self.write_accs,
        }
    }

    /// Validates every partition against the driver's device limits.
    pub fn check_device_limits(&self, alias: &AliasHandle) -> Result<()> {
        for &dev in alias.devices()? {
            let grid_max = cuda::grid_limits(dev)?;
            let block_max = cuda::block_limits(dev)?;
            let max_threads = cuda::threads_per_block_limit(dev)?;
            let max_sh_mem = cuda::shared_mem_per_block_limit(dev)?;
            for part in &self.parts {
                let grid = part.grid();
                let block = part.block();
                if grid[0] > grid_max[0] || grid[1] > grid_max[1] || grid[2] > grid_max[2] {
                    return Err(ErrorKind::DeviceLimit(
                        "the partition grid size exceeds the device limit".to_string(),
                    )
                    .into());
                }
                if block[0] > block_max[0] || block[1] > block_max[1] || block[2] > block_max[2] {
                    return Err(ErrorKind::DeviceLimit(
                        "the partition block size exceeds the device limit".to_string(),
                    )
                    .into());
                }
                if block[0] as u64 * block[1] as u64 * block[2] as u64 > max_threads as u64 {
                    return Err(ErrorKind::DeviceLimit(
                        "the threads per block exceed the device limit".to_string(),
                    )
                    .into());
                }
                if self.sh_mem > max_sh_mem {
                    return Err(ErrorKind::DeviceLimit(
                        "not enough shared memory per block on the device".to_string(),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Submits one driver launch per partition.
    ///
    /// The argument vector of each partition substitutes every buffer
    /// pointer by the alias pointer of the partition's device and appends
    /// the six launch-wide parameters of the transformed kernel:
    /// `offset_{x,y,z}` of the partition and the original, un-partitioned
    /// `global_size_{x,y,z}` in threads.
    ///
    /// Dependency resolution must have been marked beforehand; a successful
    /// submission consumes the mark.
    pub fn exec(&mut self, alias: &AliasHandle) -> Result<()> {
        if !self.deps_resolved {
            return Err(ErrorKind::InvalidState(
                "dependencies for the kernel launch are not resolved".to_string(),
            )
            .into());
        }
        let start = Instant::now();
        let ctxs = alias.contexts()?;
        let funcs = alias.functions(self.func);

        let global = [
            self.grid[0] as u64 * self.block[0] as u64,
            self.grid[1] as u64 * self.block[1] as u64,
            self.grid[2] as u64 * self.block[2] as u64,
        ];

        let mut res = CudaResult::new();
        for part in &self.parts {
            let dev = part.device();

            // The driver wants non-const pointers to the argument values, so
            // each partition launches from its own copy of the values with
            // the buffer pointers rewritten to the device's aliases.
            let mut value_store: Vec<Vec<u8>> = Vec::with_capacity(self.args.len());
            for arg in &self.args {
                if arg.ty().ptr_level() == 1 {
                    let alias_ptr = alias.pointers(arg.as_dev_ptr()?)[dev];
                    value_store.push(alias_ptr.to_le_bytes().to_vec());
                } else {
                    value_store.push(arg.bytes().to_vec());
                }
            }
            let mut offset = part.offset();
            let mut global_size = global;

            let mut params: Vec<*mut c_void> = Vec::with_capacity(self.args.len() + 6);
            for pack in value_store.iter_mut() {
                params.push(pack.as_mut_ptr() as *mut c_void);
            }
            params.push(&mut offset[0] as *mut u64 as *mut c_void);
            params.push(&mut offset[1] as *mut u64 as *mut c_void);
            params.push(&mut offset[2] as *mut u64 as *mut c_void);
            params.push(&mut global_size[0] as *mut u64 as *mut c_void);
            params.push(&mut global_size[1] as *mut u64 as *mut c_void);
            params.push(&mut global_size[2] as *mut u64 as *mut c_void);

            res.absorb(cuda::ctx_push_current(ctxs[dev]));
            res.absorb(cuda::launch_kernel(
                funcs[dev],
                part.grid(),
                part.block(),
                self.sh_mem as u32,
                CUstream::default(),
                params.as_mut_ptr(),
            ));
            res.absorb(cuda::ctx_pop_current());
        }

        self.executions += 1;
        self.deps_resolved = false;
        self.time += start.elapsed().as_secs_f64();
        res.into_result()
    }
}

impl fmt::Display for KernelLaunch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ Name({}) Grid({}, {}, {}) Block({}, {}, {}) shMem({}) numPartition({}) execs({}) }}",
            self.info.name(),
            self.grid[0],
            self.grid[1],
            self.grid[2],
            self.block[0],
            self.block[1],
            self.block[2],
            self.sh_mem,
            self.parts.len(),
            self.executions
        )
    }
}

/// Owner of all launch objects, at most one per equivalence class.
#[derive(Debug, Default)]
pub struct LaunchCache {
    launches: Vec<KernelLaunch>,
    index: HashMap<LaunchKey, LaunchId>,
}

impl LaunchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.launches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.launches.is_empty()
    }

    pub fn get(&self, id: LaunchId) -> &KernelLaunch {
        &self.launches[id.0]
    }

    pub fn get_mut(&mut self, id: LaunchId) -> &mut KernelLaunch {
        &mut self.launches[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &KernelLaunch> {
        self.launches.iter()
    }

    /// Finds the launch with this identity or inserts a new one. Partitions
    /// are only computed on insertion.
    ///
    /// # Safety
    ///
    /// `raw_args` must hold one valid pointer per argument of the kernel,
    /// each pointing to at least the argument's size in readable bytes.
    pub unsafe fn get_or_insert(
        &mut self,
        func: CUfunction,
        grid: [u32; 3],
        block: [u32; 3],
        sh_mem: usize,
        raw_args: &[*mut c_void],
        info: Arc<KernelInfo>,
        num_devices: usize,
    ) -> Result<(LaunchId, bool)> {
        let args = KernelArg::create_args(info.arg_types(), raw_args, grid, block)?;
        let key = LaunchKey {
            func,
            grid,
            block,
            sh_mem,
            arg_bits: args.iter().map(|a| a.bytes().to_vec()).collect(),
        };
        if let Some(&id) = self.index.get(&key) {
            return Ok((id, false));
        }

        let parts = create_partitions(grid, block, num_devices, info.partitioning())?;
        let num_args = args.len();
        let launch = KernelLaunch {
            func,
            grid,
            block,
            sh_mem,
            info,
            args,
            parts,
            num_devices,
            deps_resolved: false,
            executions: 0,
            time: 0.0,
            arg_access_time: 0.0,
            linearization_time: 0.0,
            num_arg_access_calls: 0,
            num_arg_access_calcs: 0,
            read_accs: vec![None; num_args],
            write_accs: vec![None; num_args],
            dtoh_plans: BTreeMap::new(),
        };
        let id = LaunchId(self.launches.len());
        self.launches.push(launch);
        self.index.insert(key, id);
        Ok((id, true))
    }

    pub fn read_arg_access(&mut self, id: LaunchId, arg_nr: usize) -> Result<Arc<ArgAccess>> {
        self.arg_access(id, arg_nr, Direction::Read)
    }

    pub fn write_arg_access(&mut self, id: LaunchId, arg_nr: usize) -> Result<Arc<ArgAccess>> {
        self.arg_access(id, arg_nr, Direction::Write)
    }

    /// The per-device interval summary for one buffer argument, from the
    /// launch's own cache, from an equivalent launch's cache, or freshly
    /// computed.
    fn arg_access(&mut self, id: LaunchId, arg_nr: usize, dir: Direction) -> Result<Arc<ArgAccess>> {
        let start = Instant::now();
        {
            let launch = self.get_mut(id);
            launch.num_arg_access_calls += 1;
            if launch.args[arg_nr].ty().ptr_level() != 1 {
                return Err(ErrorKind::InvalidArgument(
                    "cannot calculate the argument access of a non-pointer \
                     kernel argument"
                        .to_string(),
                )
                .into());
            }
            if let Some(acc) = &launch.accs(dir)[arg_nr] {
                let acc = acc.clone();
                launch.arg_access_time += start.elapsed().as_secs_f64();
                return Ok(acc);
            }
        }

        // Pointer values do not influence the access pattern, so an
        // equivalent launch may already hold the summary.
        let reused = {
            let launch = &self.launches[id.0];
            self.launches
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != id.0)
                .filter(|&(_, other)| launch.has_equal_arg_access(other))
                .find_map(|(_, other)| other.accs(dir)[arg_nr].clone())
        };
        if let Some(acc) = reused {
            let launch = self.get_mut(id);
            launch.accs_mut(dir)[arg_nr] = Some(acc.clone());
            launch.arg_access_time += start.elapsed().as_secs_f64();
            return Ok(acc);
        }

        let lin_start = Instant::now();
        let acc = Arc::new(compute_arg_access(&self.launches[id.0], arg_nr, dir)?);
        let lin_time = lin_start.elapsed().as_secs_f64();

        let launch = self.get_mut(id);
        launch.num_arg_access_calcs += 1;
        launch.linearization_time += lin_time;
        launch.accs_mut(dir)[arg_nr] = Some(acc.clone());
        launch.arg_access_time += start.elapsed().as_secs_f64();
        Ok(acc)
    }

    /// A device-to-host plan delivering the elements this launch wrote on
    /// `ptr` to the host buffer. Plans are cached per argument and retarget
    /// the host address on every call.
    pub fn written_data(&mut self, id: LaunchId, ptr: CUdeviceptr, host: usize) -> Result<&mut MemCpy> {
        let arg_nr = self.get(id).arg_id(ptr).ok_or_else(|| {
            ErrorKind::InvalidArgument(
                "could not find the device pointer among the kernel arguments".to_string(),
            )
        })?;

        if !self.get(id).dtoh_plans.contains_key(&arg_nr) {
            let acc = self.write_arg_access(id, arg_nr)?;
            let el_size = self.get(id).args[arg_nr].ty().el_size()?;
            let mut pattern = Vec::new();
            for (&gpu, intervals) in acc.map() {
                for &(from, to) in intervals {
                    let offset = from as usize * el_size;
                    pattern.push(MemSubCopy {
                        src: gpu as i32,
                        dst: -1,
                        from: offset,
                        to: offset,
                        size: (to - from) as usize * el_size,
                    });
                }
            }
            let cpy = MemCpy::dtoh(host, ptr, pattern);
            self.get_mut(id).dtoh_plans.insert(arg_nr, cpy);
        }

        let cpy = self.get_mut(id).dtoh_plans.get_mut(&arg_nr).unwrap();
        cpy.set_dst_host(host);
        Ok(cpy)
    }
}

/// Computes the per-device interval summary of one buffer argument.
///
/// The work fans out to one worker thread per device: every worker clones
/// the instantiated relation, boxes it to each of the device's partitions,
/// linearises the ranges and merges them into disjoint intervals. Workers
/// join before the function returns.
fn compute_arg_access(launch: &KernelLaunch, arg_nr: usize, dir: Direction) -> Result<ArgAccess> {
    let num_dims = launch.args[arg_nr].ty().num_dims();
    if num_dims > 2 {
        return Err(ErrorKind::InvalidArgument(
            "arrays with more than two dimensions are not supported".to_string(),
        )
        .into());
    }

    let mut result: BTreeMap<usize, Vec<Interval>> =
        (0..launch.num_devices).map(|gpu| (gpu, Vec::new())).collect();

    let umap = match launch.info.acc_func(arg_nr).instantiate(
        dir,
        &launch.args,
        launch.grid,
        launch.block,
    )? {
        Some(umap) => umap,
        None => return Ok(ArgAccess::new(result)),
    };

    let row_size = launch.args[arg_nr].dim_sizes().first().copied().unwrap_or(0) as u64;
    let parts = &launch.parts;

    let per_device: Vec<Result<Vec<Interval>>> = thread::scope(|s| {
        let handles: Vec<_> = (0..launch.num_devices)
            .map(|gpu| {
                let umap = &umap;
                s.spawn(move || -> Result<Vec<Interval>> {
                    let mut intervals = Vec::new();
                    for part in parts.iter().filter(|p| p.device() == gpu) {
                        for bmap in umap.maps() {
                            let mut bounded = bmap.clone();
                            bounded.bound_inputs(part.offset(), part.size())?;
                            intervals.extend(bounded.out_intervals(row_size)?);
                        }
                    }
                    Ok(merge_intervals(intervals))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(ErrorKind::InvalidState(
                        "an argument access worker thread panicked".to_string(),
                    )
                    .into())
                })
            })
            .collect()
    });

    for (gpu, intervals) in per_device.into_iter().enumerate() {
        result.insert(gpu, intervals?);
    }
    Ok(ArgAccess::new(result))
}
