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

//! Interposed driver entry points.
//!
//! The host-code transform renames the application's driver calls to the
//! `wrap*` functions below; their signatures mirror the driver exactly. The
//! wrappers persuade the application it runs on a single device, fan every
//! allocation and launch out over all physical devices, and resolve
//! inter-kernel dependencies before each launch.
//!
//! All mutable runtime state lives in one `Runtime` value: the alias handle,
//! the virtual buffer, the launch cache, the resolver cache, the descriptor
//! list and the statistics. The application host code is single-threaded;
//! the mutex is a soundness fence, not a concurrency scheme.

#![allow(non_snake_case)]

use crate::config;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::alias_handle::AliasHandle;
use crate::runtime::cuda::{
    self, CUcontext, CUdevice, CUdeviceptr, CUfunction, CUmodule, CUresult, CUstream, CudaResult,
};
use crate::runtime::dependency_resolution::DepResolution;
use crate::runtime::kernel_info::KernelInfo;
use crate::runtime::kernel_launch::{LaunchCache, LaunchId};
use crate::runtime::memory_copy::MemCpy;
use crate::runtime::statistics::Statistics;
use crate::runtime::virtual_buffer::VirtualBuffer;
use log::{debug, error, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Environment variable naming the kernel analysis database file.
const ANALYSIS_DB_VAR: &str = "MEKONG_ANALYSIS_DB";

struct Runtime {
    alias: AliasHandle,
    buffer: VirtualBuffer,
    launches: LaunchCache,
    resolutions: Vec<DepResolution>,
    kernels: Vec<std::sync::Arc<KernelInfo>>,
    stats: Statistics,
}

impl Runtime {
    fn new() -> Self {
        init_logging();
        let kernels = match load_database() {
            Ok(kernels) => kernels,
            Err(e) => {
                error!("[MEKONG] could not load the kernel analysis database: {}", e);
                Vec::new()
            }
        };
        Self {
            alias: AliasHandle::new(),
            buffer: VirtualBuffer::new(),
            launches: LaunchCache::new(),
            resolutions: Vec::new(),
            kernels,
            stats: Statistics::new(),
        }
    }
}

fn load_database() -> Result<Vec<std::sync::Arc<KernelInfo>>> {
    let path = std::env::var(ANALYSIS_DB_VAR).map_err(|_| {
        ErrorKind::InvalidDatabase(format!("{} is not set", ANALYSIS_DB_VAR))
    })?;
    let text = std::fs::read_to_string(&path)?;
    KernelInfo::create_infos(&text)
}

static RUNTIME: Lazy<Mutex<Runtime>> = Lazy::new(|| Mutex::new(Runtime::new()));

fn runtime() -> MutexGuard<'static, Runtime> {
    RUNTIME.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs a wrapper body and translates the outcome into a raw driver result:
/// driver errors verbatim, fatal runtime conditions as a generic failure
/// after logging.
fn with_runtime<F>(f: F) -> CUresult
where
    F: FnOnce(&mut Runtime) -> Result<CudaResult>,
{
    let mut rt = runtime();
    match f(&mut rt) {
        Ok(res) => res.raw(),
        Err(e) => {
            error!("[MEKONG] {}", e);
            e.to_cuda_result()
        }
    }
}

/// Keeps collecting driver errors first-error-wins, but aborts on fatal
/// runtime conditions.
fn absorb(res: &mut CudaResult, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) => match e.kind() {
            ErrorKind::Cuda(raw) => {
                res.absorb(*raw);
                Ok(())
            }
            _ => Err(e),
        },
    }
}

struct RuntimeLogger {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Log for RuntimeLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{}", record.args());
        }
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
    }
}

fn init_logging() {
    if !config::LOG_ON {
        return;
    }
    let sink: Box<dyn Write + Send> = match config::LOG_FILE {
        Some(path) if !path.is_empty() => match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(_) => Box::new(io::stdout()),
        },
        _ => Box::new(io::stdout()),
    };
    if log::set_boxed_logger(Box::new(RuntimeLogger {
        sink: Mutex::new(sink),
    }))
    .is_ok()
    {
        log::set_max_level(log::LevelFilter::Debug);
    }
}

/// Substitution for `cuInit`.
#[no_mangle]
pub extern "C" fn wrapInit(flags: c_uint) -> CUresult {
    with_runtime(|_| {
        debug!("[MEKONG] [+] FUNC wrapInit()");
        let mut res = CudaResult::new();
        res.absorb(cuda::init(flags));
        debug!("[MEKONG] [-] FUNC wrapInit()");
        Ok(res)
    })
}

/// Persuades the caller that the system has exactly one device, while
/// recording the real count.
#[no_mangle]
pub unsafe extern "C" fn wrapDeviceGetCount(num: *mut c_int) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapDeviceGetCount()");
        let mut res = CudaResult::new();
        let mut count: c_int = -1;
        res.absorb(cuda::device_get_count(&mut count));
        if !res.is_success() {
            return Ok(res);
        }
        if count < 1 {
            return Err(ErrorKind::InvalidState(
                "cannot detect any device in the system".to_string(),
            )
            .into());
        }
        debug!("[MEKONG] recognized {} devices in the system", count);
        if config::COLLECT_STATISTICS {
            rt.stats.set_num_dev(count as usize);
        }
        unsafe { *num = 1 };
        debug!("[MEKONG] [-] FUNC wrapDeviceGetCount()");
        Ok(res)
    })
}

/// Registers every physical device and returns device 0 to the caller.
#[no_mangle]
pub unsafe extern "C" fn wrapDeviceGet(dev: *mut CUdevice, _ordinal: c_int) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapDeviceGet()");
        let mut res = CudaResult::new();
        let mut count: c_int = -1;
        res.absorb(cuda::device_get_count(&mut count));
        if !res.is_success() {
            return Ok(res);
        }
        if count < 1 {
            return Err(ErrorKind::InvalidState(
                "cannot detect any device in the system".to_string(),
            )
            .into());
        }

        let mut devs = Vec::with_capacity(count as usize);
        for ordinal in 0..count {
            let mut device: CUdevice = 0;
            res.absorb(cuda::device_get(&mut device, ordinal));
            devs.push(device);
        }
        debug!("[MEKONG] registered {} device handles", devs.len());

        unsafe { *dev = devs[0] };
        if config::COLLECT_STATISTICS {
            rt.stats.set_num_dev(devs.len());
        }
        rt.alias.register_devices(devs);
        debug!("[MEKONG] [-] FUNC wrapDeviceGet()");
        Ok(res)
    })
}

/// Component-wise minimum compute capability over all real devices.
#[no_mangle]
pub unsafe extern "C" fn wrapDeviceComputeCapability(
    major: *mut c_int,
    minor: *mut c_int,
    _dev: CUdevice,
) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapDeviceComputeCapability()");
        let mut res = CudaResult::new();
        let mut min_major = c_int::max_value();
        let mut min_minor = c_int::max_value();
        for &device in rt.alias.devices()? {
            let mut cur_major = 0;
            let mut cur_minor = 0;
            res.absorb(cuda::device_compute_capability(
                &mut cur_major,
                &mut cur_minor,
                device,
            ));
            // Component-wise: the majors and minors are folded independently,
            // so mixed fleets report a capability no device undercuts in
            // either component.
            min_major = min_major.min(cur_major);
            min_minor = min_minor.min(cur_minor);
        }
        unsafe {
            *major = min_major;
            *minor = min_minor;
        }
        debug!(
            "[MEKONG] minimum compute capability sm_{}{}",
            min_major, min_minor
        );
        debug!("[MEKONG] [-] FUNC wrapDeviceComputeCapability()");
        Ok(res)
    })
}

/// Creates one context per registered device and returns context 0.
#[no_mangle]
pub unsafe extern "C" fn wrapCtxCreate(
    pctx: *mut CUcontext,
    flags: c_uint,
    _dev: CUdevice,
) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapCtxCreate()");
        let devs = rt.alias.devices()?.to_vec();
        let mut res = CudaResult::new();
        let mut ctxs = Vec::with_capacity(devs.len());
        for device in devs {
            let mut ctx = CUcontext::null();
            res.absorb(cuda::ctx_create(&mut ctx, flags, device));
            ctxs.push(ctx);
        }
        debug!("[MEKONG] created {} contexts", ctxs.len());
        unsafe { *pctx = ctxs[0] };
        rt.alias.register_contexts(ctxs);
        debug!("[MEKONG] [-] FUNC wrapCtxCreate()");
        Ok(res)
    })
}

/// Loads the module once per context.
#[no_mangle]
pub unsafe extern "C" fn wrapModuleLoad(module: *mut CUmodule, fname: *const c_char) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapModuleLoad()");
        let name = unsafe { CStr::from_ptr(fname) };
        let ctxs = rt.alias.contexts()?.to_vec();
        let mut res = CudaResult::new();
        let mut mods = Vec::with_capacity(ctxs.len());
        for ctx in ctxs {
            let mut m = CUmodule::null();
            res.absorb(cuda::ctx_push_current(ctx));
            res.absorb(cuda::module_load(&mut m, name));
            res.absorb(cuda::ctx_pop_current());
            mods.push(m);
        }
        debug!(
            "[MEKONG] loaded {} modules from file {}",
            mods.len(),
            name.to_string_lossy()
        );
        unsafe { *module = mods[0] };
        rt.alias.register_modules(mods);
        debug!("[MEKONG] [-] FUNC wrapModuleLoad()");
        Ok(res)
    })
}

/// Fetches the transformed `_super` variant of the function from every
/// module and records the original kernel name.
#[no_mangle]
pub unsafe extern "C" fn wrapModuleGetFunction(
    func: *mut CUfunction,
    module: CUmodule,
    fname: *const c_char,
) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapModuleGetFunction()");
        let base = unsafe { CStr::from_ptr(fname) }
            .to_string_lossy()
            .into_owned();
        let super_name = CString::new(format!("{}_super", base)).map_err(|_| {
            Error::from(ErrorKind::InvalidArgument(
                "kernel name contains a nul byte".to_string(),
            ))
        })?;

        let ctxs = rt.alias.contexts()?.to_vec();
        let mods = rt.alias.modules(module).to_vec();
        let mut res = CudaResult::new();
        let mut funcs = Vec::with_capacity(ctxs.len());
        for (gpu, ctx) in ctxs.into_iter().enumerate() {
            let mut f = CUfunction::null();
            res.absorb(cuda::ctx_push_current(ctx));
            res.absorb(cuda::module_get_function(&mut f, mods[gpu], &super_name));
            res.absorb(cuda::ctx_pop_current());
            funcs.push(f);
        }
        debug!(
            "[MEKONG] loaded {} functions with name {}",
            funcs.len(),
            base
        );

        unsafe { *func = funcs[0] };
        let primary = funcs[0];
        rt.alias.register_functions(funcs);
        rt.alias.set_function_name(primary, base);
        debug!("[MEKONG] [-] FUNC wrapModuleGetFunction()");
        Ok(res)
    })
}

/// Allocates `size` bytes on every device and links the replicas under the
/// pointer returned to the caller.
#[no_mangle]
pub unsafe extern "C" fn wrapMemAlloc(ptr: *mut CUdeviceptr, size: usize) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapMemAlloc()");
        let ctxs = rt.alias.contexts()?.to_vec();
        let mut res = CudaResult::new();
        let mut devptrs = Vec::with_capacity(ctxs.len());
        for ctx in ctxs {
            let mut p: CUdeviceptr = 0;
            res.absorb(cuda::ctx_push_current(ctx));
            res.absorb(cuda::mem_alloc(&mut p, size));
            res.absorb(cuda::ctx_pop_current());
            devptrs.push(p);
        }
        debug!(
            "[MEKONG] allocated {} MB/device on {} devices",
            size as f64 / 1e6,
            devptrs.len()
        );
        unsafe { *ptr = devptrs[0] };
        rt.alias.register_pointers(devptrs);
        debug!("[MEKONG] [-] FUNC wrapMemAlloc()");
        Ok(res)
    })
}

/// Broadcasts the host data to every replica of the destination buffer.
#[no_mangle]
pub unsafe extern "C" fn wrapMemcpyHtoD(
    dst: CUdeviceptr,
    src: *const c_void,
    size: usize,
) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapMemcpyHtoD()");
        let num_dev = rt.alias.num_devices()?;
        let mut cpy = MemCpy::broadcast_htod(dst, src as usize, size, num_dev);

        let start = Instant::now();
        let outcome = cpy.exec(&rt.alias);
        if config::COLLECT_STATISTICS {
            rt.stats.add_htod(cpy.bytes(), start.elapsed().as_secs_f64());
        }

        // A broadcast invalidates any previous kernel writes; the virtual
        // buffer must know about it so a later device-to-host copy without
        // an intervening launch still finds the data.
        rt.buffer.set_broadcast(dst);

        let mut res = CudaResult::new();
        absorb(&mut res, outcome)?;
        debug!("[MEKONG] [-] FUNC wrapMemcpyHtoD()");
        Ok(res)
    })
}

/// The central orchestration: find the descriptor, cache the launch, check
/// limits, resolve dependencies, submit the partitions and record the
/// writes.
#[no_mangle]
pub unsafe extern "C" fn wrapLaunchKernel(
    f: CUfunction,
    gridDimX: c_uint,
    gridDimY: c_uint,
    gridDimZ: c_uint,
    blockDimX: c_uint,
    blockDimY: c_uint,
    blockDimZ: c_uint,
    sharedMemBytes: c_uint,
    _hStream: CUstream,
    kernelParams: *mut *mut c_void,
    _extra: *mut *mut c_void,
) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapLaunchKernel()");
        let creation_start = Instant::now();

        let name = rt
            .alias
            .function_name(f)
            .ok_or_else(|| {
                ErrorKind::InvalidState(
                    "no kernel name is recorded for the launched function".to_string(),
                )
            })?
            .to_string();
        let info = rt
            .kernels
            .iter()
            .find(|k| k.name() == name)
            .cloned()
            .ok_or_else(|| {
                ErrorKind::InvalidDatabase(format!(
                    "could not find a kernel analysis for '{}'",
                    name
                ))
            })?;

        let num_dev = rt.alias.num_devices()?;
        let raw_args = unsafe { std::slice::from_raw_parts(kernelParams, info.num_args()) };
        let (id, inserted) = unsafe {
            rt.launches.get_or_insert(
                f,
                [gridDimX, gridDimY, gridDimZ],
                [blockDimX, blockDimY, blockDimZ],
                sharedMemBytes as usize,
                raw_args,
                info,
                num_dev,
            )?
        };
        if inserted {
            debug!(
                "[MEKONG] inserted a new launch into the cache (size = {})",
                rt.launches.len()
            );
        } else {
            debug!(
                "[MEKONG] launch already exists; taking the old one (size = {})",
                rt.launches.len()
            );
        }
        debug!("[MEKONG] configuration {}", rt.launches.get(id));
        if config::LOG_ON {
            for part in rt.launches.get(id).partitions() {
                debug!("[MEKONG]   {}", part);
            }
        }

        if config::CHECK_DEVICE_LIMITS {
            debug!("[MEKONG] checking device limits");
            rt.launches.get(id).check_device_limits(&rt.alias)?;
        }
        if config::COLLECT_STATISTICS {
            rt.stats
                .add_launch_creation_time(creation_start.elapsed().as_secs_f64());
        }

        // Masters are the last writers of every buffer this launch reads.
        let dep_start = Instant::now();
        let mut masters: Vec<LaunchId> = Vec::new();
        for ptr in rt.launches.get(id).reads() {
            if let Some(writer) = rt.buffer.writer(ptr) {
                if !masters.contains(&writer) {
                    masters.push(writer);
                }
            }
        }
        debug!("[MEKONG] found {} dependencies for this launch", masters.len());

        let mut to_exec = Vec::with_capacity(masters.len());
        for master in masters {
            let pos = match rt
                .resolutions
                .iter()
                .position(|r| r.is_resolution_of(master, id))
            {
                Some(pos) => pos,
                None => {
                    let resolution = DepResolution::build(master, id, &mut rt.launches)?;
                    rt.resolutions.push(resolution);
                    rt.resolutions.len() - 1
                }
            };
            to_exec.push(pos);
        }
        if config::COLLECT_STATISTICS {
            rt.stats
                .add_dep_res_creation_time(dep_start.elapsed().as_secs_f64());
        }

        let mut res = CudaResult::new();
        {
            let Runtime {
                resolutions, alias, ..
            } = &mut *rt;
            for &pos in &to_exec {
                absorb(&mut res, resolutions[pos].exec(alias))?;
            }
        }
        if !to_exec.is_empty() {
            debug!("[MEKONG] dependencies resolved");
        }

        rt.launches.get_mut(id).mark_deps_resolved();
        {
            let Runtime { launches, alias, .. } = &mut *rt;
            absorb(&mut res, launches.get_mut(id).exec(alias))?;
        }

        // The submitted launch is now the last writer of its output buffers.
        for ptr in rt.launches.get(id).writes() {
            rt.buffer.set_written(ptr, id);
        }

        debug!("[MEKONG] [-] FUNC wrapLaunchKernel()");
        Ok(res)
    })
}

/// Synchronizes with every registered context.
#[no_mangle]
pub extern "C" fn wrapCtxSynchronize() -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapCtxSynchronize()");
        let mut res = CudaResult::new();
        for &ctx in rt.alias.contexts()? {
            res.absorb(cuda::ctx_push_current(ctx));
            res.absorb(cuda::ctx_synchronize());
            res.absorb(cuda::ctx_pop_current());
        }
        debug!("[MEKONG] [-] FUNC wrapCtxSynchronize()");
        Ok(res)
    })
}

/// Collects the written elements from the devices that hold them, or falls
/// back to a plain copy from device 0 for broadcast-only buffers.
#[no_mangle]
pub unsafe extern "C" fn wrapMemcpyDtoH(
    dst: *mut c_void,
    src: CUdeviceptr,
    size: usize,
) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapMemcpyDtoH()");
        let mut res = CudaResult::new();

        if let Some(writer) = rt.buffer.writer(src) {
            let Runtime {
                launches,
                alias,
                stats,
                ..
            } = &mut *rt;
            let cpy = launches.written_data(writer, src, dst as usize)?;
            if config::LOG_ON {
                debug!("[MEKONG] going to exec memcpy {}", cpy);
                if cpy.is_empty() {
                    debug!("[MEKONG] WARNING: no memcpys executed");
                }
            }
            let start = Instant::now();
            let outcome = cpy.exec(alias);
            if config::COLLECT_STATISTICS {
                stats.add_dtoh(cpy.bytes(), start.elapsed().as_secs_f64());
            }
            absorb(&mut res, outcome)?;
        } else if rt.buffer.is_broadcast(src) {
            // The broadcast placed identical data on every device, so
            // device 0 serves the host copy alone.
            let mut cpy = MemCpy::trivial_dtoh(dst as usize, src, size);
            let start = Instant::now();
            let outcome = cpy.exec(&rt.alias);
            if config::COLLECT_STATISTICS {
                rt.stats.add_dtoh(cpy.bytes(), start.elapsed().as_secs_f64());
            }
            absorb(&mut res, outcome)?;
            debug!("[MEKONG] copied untouched broadcast data back to host memory");
        } else {
            return Err(ErrorKind::InvalidArgument(
                "copying from a device pointer that was neither broadcast \
                 nor written by a kernel is not supported"
                    .to_string(),
            )
            .into());
        }

        debug!("[MEKONG] [-] FUNC wrapMemcpyDtoH()");
        Ok(res)
    })
}

/// Frees every replica of the buffer and clears its bookkeeping.
#[no_mangle]
pub extern "C" fn wrapMemFree(ptr: CUdeviceptr) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapMemFree()");
        let ctxs = rt.alias.contexts()?.to_vec();
        let devptrs = rt.alias.pointers(ptr).to_vec();
        let mut res = CudaResult::new();
        for (gpu, devptr) in devptrs.into_iter().enumerate() {
            res.absorb(cuda::ctx_push_current(ctxs[gpu]));
            res.absorb(cuda::mem_free(devptr));
            res.absorb(cuda::ctx_pop_current());
        }
        rt.alias.erase_pointer(ptr);
        rt.buffer.free(ptr);
        debug!("[MEKONG] [-] FUNC wrapMemFree()");
        Ok(res)
    })
}

/// Destroys all contexts linked to the primary context.
#[no_mangle]
pub extern "C" fn wrapCtxDestroy(ctx: CUcontext) -> CUresult {
    with_runtime(|rt| {
        debug!("[MEKONG] [+] FUNC wrapCtxDestroy()");
        let ctxs = rt.alias.contexts()?.to_vec();
        let mut res = CudaResult::new();
        for context in ctxs {
            res.absorb(cuda::ctx_destroy(context));
        }
        rt.alias.erase_context(ctx);
        debug!("[MEKONG] [-] FUNC wrapCtxDestroy()");
        Ok(res)
    })
}

/// Debug aid: reads one buffer replica from a chosen device.
#[no_mangle]
pub unsafe extern "C" fn MEKONG_getDataFromDevice(
    dst: *mut c_void,
    src: CUdeviceptr,
    size: usize,
    dev: c_int,
) -> CUresult {
    with_runtime(|rt| {
        let mut res = CudaResult::new();
        let devptr = rt.alias.pointers(src)[dev as usize];
        res.absorb(cuda::memcpy_dtoh(dst, devptr, size));
        Ok(res)
    })
}

/// Prints the program report. The host transform inserts a call in front of
/// every return in `main`.
#[no_mangle]
pub extern "C" fn MEKONG_report() {
    if !config::MAKE_REPORT {
        return;
    }
    let rt = runtime();

    let num_dev = match rt.alias.num_devices() {
        Ok(n) => n,
        Err(_) => {
            println!("[MEKONG] Program Report: no device was registered");
            return;
        }
    };

    println!();
    println!("[MEKONG] Program Report:");
    println!();
    println!("# Alias Handle Information");
    println!();
    println!("  - number of devices = {}", num_dev);
    println!(
        "  - number of application kernel functions = {}",
        rt.alias.num_functions()
    );

    if !config::COLLECT_STATISTICS {
        return;
    }

    let stats = &rt.stats;
    println!();
    println!("# Memory Copy Information:");
    println!("This excludes all memory copy operations caused by inter kernel dependencies.");
    println!();
    println!("  - total num memcpy executions = {}", stats.total().execs);
    println!("  - num HtoD memcpy executions = {}", stats.htod().execs);
    println!("  - num DtoH memcpy executions = {}", stats.dtoh().execs);
    println!("  - total memcpy time = {:.6} s", stats.total().time);
    println!("  - HtoD memcpy time = {:.6} s", stats.htod().time);
    println!("  - DtoH memcpy time = {:.6} s", stats.dtoh().time);
    println!(
        "  - total memcpy size = {:.6} MB",
        stats.total().bytes as f64 / 1e6
    );
    println!(
        "  - HtoD memcpy size = {:.6} MB",
        stats.htod().bytes as f64 / 1e6
    );
    println!(
        "  - DtoH memcpy size = {:.6} MB",
        stats.dtoh().bytes as f64 / 1e6
    );
    println!("  - total Bandwidth = {:.6} GB/s", stats.total().bandwidth());
    println!("  - HtoD Bandwidth = {:.6} GB/s", stats.htod().bandwidth());
    println!("  - DtoH Bandwidth = {:.6} GB/s", stats.dtoh().bandwidth());

    let dep_execs: usize = rt.resolutions.iter().map(|r| r.executions()).sum();
    let dep_time: f64 = rt.resolutions.iter().map(|r| r.time()).sum();
    let dep_bytes: usize = rt
        .resolutions
        .iter()
        .map(|r| r.bytes() * r.executions())
        .sum();
    println!();
    println!("# Dependency Resolution Information:");
    println!();
    println!("  - num dep resolution executions = {}", dep_execs);
    println!("  - num dep res objects = {}", rt.resolutions.len());
    println!(
        "  - total dep res creation time = {:.6} s",
        stats.dep_res_creation_time()
    );
    println!("  - total dep res time = {:.6} s", dep_time);
    println!(
        "  - total dep res memcpy size = {:.6} MB",
        dep_bytes as f64 / 1e6
    );

    let launch_execs: usize = rt.launches.iter().map(|l| l.executions()).sum();
    let acc_time: f64 = rt.launches.iter().map(|l| l.arg_access_time()).sum();
    let lin_time: f64 = rt.launches.iter().map(|l| l.linearization_time()).sum();
    let acc_calls: u32 = rt.launches.iter().map(|l| l.num_arg_access_calls()).sum();
    let acc_calcs: u32 = rt.launches.iter().map(|l| l.num_arg_access_calcs()).sum();
    println!();
    println!("# Kernel Launch Information");
    println!();
    println!("  - num launch executions = {}", launch_execs);
    println!("  - num launch objects = {}", rt.launches.len());
    println!(
        "  - kernel launch object creation time = {:.6} s",
        stats.launch_creation_time()
    );
    for kernel in &rt.kernels {
        println!("  - kernel name = {}", kernel.name());
        println!("    partitioning = {}", kernel.partitioning());
    }
    println!("  - arg access time = {:.6} s", acc_time);
    println!("  - linearization time = {:.6} s", lin_time);
    println!("  - num arg access calls = {}", acc_calls);
    println!("  - num arg access calcs = {}", acc_calcs);
    println!();
    println!("[MEKONG] Report End");
}
