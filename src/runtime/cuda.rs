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

//! Thin typed shim over the CUDA driver API.
//!
//! This module is the only place that touches the real driver. The runtime
//! interposes on handles owned by the application, so the shim operates on
//! raw driver handles instead of owning wrapper types.
//!
//! With the `cuda` feature the shim links against `libcuda`; without it a
//! loader stub with identical signatures reports
//! `CUDA_ERROR_NOT_INITIALIZED`, which keeps the crate buildable and
//! testable on machines without a GPU.

use crate::error::{ErrorKind, Result};
use std::ffi::CStr;
use std::os::raw::{c_int, c_uint, c_void};

pub type CUdevice = c_int;
pub type CUdeviceptr = u64;

macro_rules! opaque_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[repr(transparent)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub *mut c_void);

        impl $name {
            pub fn null() -> Self {
                Self(std::ptr::null_mut())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::null()
            }
        }

        // Driver handles are plain addresses; the runtime never dereferences
        // them and mutates its bookkeeping from a single host thread only.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}
    };
}

opaque_handle!(CUcontext);
opaque_handle!(CUmodule);
opaque_handle!(CUfunction);
opaque_handle!(CUstream);

/// Raw driver result code.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CUresult(pub c_uint);

impl CUresult {
    pub const CUDA_SUCCESS: CUresult = CUresult(0);
    pub const CUDA_ERROR_INVALID_VALUE: CUresult = CUresult(1);
    pub const CUDA_ERROR_NOT_INITIALIZED: CUresult = CUresult(3);
    pub const CUDA_ERROR_UNKNOWN: CUresult = CUresult(999);

    pub fn is_success(self) -> bool {
        self == Self::CUDA_SUCCESS
    }
}

impl Default for CUresult {
    fn default() -> Self {
        Self::CUDA_SUCCESS
    }
}

/// First-error-wins accumulator over driver results.
///
/// Success is the identity; the first non-success code absorbed is kept and
/// later codes are ignored. Execution chains use this to keep issuing
/// context pops after a failed call, exactly like the driver result
/// composition of the interposed API.
#[derive(Clone, Copy, Debug, Default)]
pub struct CudaResult {
    raw: CUresult,
}

impl CudaResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, res: CUresult) {
        if self.raw.is_success() && !res.is_success() {
            self.raw = res;
        }
    }

    pub fn is_success(&self) -> bool {
        self.raw.is_success()
    }

    pub fn raw(&self) -> CUresult {
        self.raw
    }

    pub fn into_result(self) -> Result<()> {
        if self.raw.is_success() {
            Ok(())
        } else {
            Err(ErrorKind::Cuda(self.raw).into())
        }
    }
}

mod attrib {
    use std::os::raw::c_int;

    pub const MAX_THREADS_PER_BLOCK: c_int = 1;
    pub const MAX_BLOCK_DIM_X: c_int = 2;
    pub const MAX_BLOCK_DIM_Y: c_int = 3;
    pub const MAX_BLOCK_DIM_Z: c_int = 4;
    pub const MAX_GRID_DIM_X: c_int = 5;
    pub const MAX_GRID_DIM_Y: c_int = 6;
    pub const MAX_GRID_DIM_Z: c_int = 7;
    pub const MAX_SHARED_MEMORY_PER_BLOCK: c_int = 8;
}

#[cfg(feature = "cuda")]
mod ffi {
    use super::{CUcontext, CUdevice, CUdeviceptr, CUfunction, CUmodule, CUresult, CUstream};
    use std::os::raw::{c_char, c_int, c_uint, c_void};

    #[link(name = "cuda")]
    extern "C" {
        pub fn cuInit(flags: c_uint) -> CUresult;
        pub fn cuDeviceGetCount(count: *mut c_int) -> CUresult;
        pub fn cuDeviceGet(device: *mut CUdevice, ordinal: c_int) -> CUresult;
        pub fn cuDeviceComputeCapability(
            major: *mut c_int,
            minor: *mut c_int,
            dev: CUdevice,
        ) -> CUresult;
        pub fn cuDeviceGetAttribute(pi: *mut c_int, attrib: c_int, dev: CUdevice) -> CUresult;
        pub fn cuCtxCreate_v2(pctx: *mut CUcontext, flags: c_uint, dev: CUdevice) -> CUresult;
        pub fn cuCtxDestroy_v2(ctx: CUcontext) -> CUresult;
        pub fn cuCtxPushCurrent_v2(ctx: CUcontext) -> CUresult;
        pub fn cuCtxPopCurrent_v2(pctx: *mut CUcontext) -> CUresult;
        pub fn cuCtxSynchronize() -> CUresult;
        pub fn cuModuleLoad(module: *mut CUmodule, fname: *const c_char) -> CUresult;
        pub fn cuModuleGetFunction(
            hfunc: *mut CUfunction,
            hmod: CUmodule,
            name: *const c_char,
        ) -> CUresult;
        pub fn cuMemAlloc_v2(dptr: *mut CUdeviceptr, bytesize: usize) -> CUresult;
        pub fn cuMemFree_v2(dptr: CUdeviceptr) -> CUresult;
        pub fn cuMemcpyHtoD_v2(dst: CUdeviceptr, src: *const c_void, n: usize) -> CUresult;
        pub fn cuMemcpyDtoH_v2(dst: *mut c_void, src: CUdeviceptr, n: usize) -> CUresult;
        pub fn cuMemcpyHtoDAsync_v2(
            dst: CUdeviceptr,
            src: *const c_void,
            n: usize,
            stream: CUstream,
        ) -> CUresult;
        pub fn cuMemcpyDtoHAsync_v2(
            dst: *mut c_void,
            src: CUdeviceptr,
            n: usize,
            stream: CUstream,
        ) -> CUresult;
        pub fn cuMemcpyDtoDAsync_v2(
            dst: CUdeviceptr,
            src: CUdeviceptr,
            n: usize,
            stream: CUstream,
        ) -> CUresult;
        pub fn cuLaunchKernel(
            f: CUfunction,
            grid_x: c_uint,
            grid_y: c_uint,
            grid_z: c_uint,
            block_x: c_uint,
            block_y: c_uint,
            block_z: c_uint,
            shared_mem_bytes: c_uint,
            stream: CUstream,
            kernel_params: *mut *mut c_void,
            extra: *mut *mut c_void,
        ) -> CUresult;
    }
}

/// Loader stub: reports that no driver is present. Out parameters are left
/// untouched, so callers must initialize them.
#[cfg(not(feature = "cuda"))]
#[allow(non_snake_case, unused_variables)]
mod ffi {
    use super::{CUcontext, CUdevice, CUdeviceptr, CUfunction, CUmodule, CUresult, CUstream};
    use std::os::raw::{c_char, c_int, c_uint, c_void};

    const STUB: CUresult = CUresult::CUDA_ERROR_NOT_INITIALIZED;

    pub unsafe fn cuInit(flags: c_uint) -> CUresult {
        STUB
    }
    pub unsafe fn cuDeviceGetCount(count: *mut c_int) -> CUresult {
        STUB
    }
    pub unsafe fn cuDeviceGet(device: *mut CUdevice, ordinal: c_int) -> CUresult {
        STUB
    }
    pub unsafe fn cuDeviceComputeCapability(
        major: *mut c_int,
        minor: *mut c_int,
        dev: CUdevice,
    ) -> CUresult {
        STUB
    }
    pub unsafe fn cuDeviceGetAttribute(pi: *mut c_int, attrib: c_int, dev: CUdevice) -> CUresult {
        STUB
    }
    pub unsafe fn cuCtxCreate_v2(pctx: *mut CUcontext, flags: c_uint, dev: CUdevice) -> CUresult {
        STUB
    }
    pub unsafe fn cuCtxDestroy_v2(ctx: CUcontext) -> CUresult {
        STUB
    }
    pub unsafe fn cuCtxPushCurrent_v2(ctx: CUcontext) -> CUresult {
        STUB
    }
    pub unsafe fn cuCtxPopCurrent_v2(pctx: *mut CUcontext) -> CUresult {
        STUB
    }
    pub unsafe fn cuCtxSynchronize() -> CUresult {
        STUB
    }
    pub unsafe fn cuModuleLoad(module: *mut CUmodule, fname: *const c_char) -> CUresult {
        STUB
    }
    pub unsafe fn cuModuleGetFunction(
        hfunc: *mut CUfunction,
        hmod: CUmodule,
        name: *const c_char,
    ) -> CUresult {
        STUB
    }
    pub unsafe fn cuMemAlloc_v2(dptr: *mut CUdeviceptr, bytesize: usize) -> CUresult {
        STUB
    }
    pub unsafe fn cuMemFree_v2(dptr: CUdeviceptr) -> CUresult {
        STUB
    }
    pub unsafe fn cuMemcpyHtoD_v2(dst: CUdeviceptr, src: *const c_void, n: usize) -> CUresult {
        STUB
    }
    pub unsafe fn cuMemcpyDtoH_v2(dst: *mut c_void, src: CUdeviceptr, n: usize) -> CUresult {
        STUB
    }
    pub unsafe fn cuMemcpyHtoDAsync_v2(
        dst: CUdeviceptr,
        src: *const c_void,
        n: usize,
        stream: CUstream,
    ) -> CUresult {
        STUB
    }
    pub unsafe fn cuMemcpyDtoHAsync_v2(
        dst: *mut c_void,
        src: CUdeviceptr,
        n: usize,
        stream: CUstream,
    ) -> CUresult {
        STUB
    }
    pub unsafe fn cuMemcpyDtoDAsync_v2(
        dst: CUdeviceptr,
        src: CUdeviceptr,
        n: usize,
        stream: CUstream,
    ) -> CUresult {
        STUB
    }
    pub unsafe fn cuLaunchKernel(
        f: CUfunction,
        grid_x: c_uint,
        grid_y: c_uint,
        grid_z: c_uint,
        block_x: c_uint,
        block_y: c_uint,
        block_z: c_uint,
        shared_mem_bytes: c_uint,
        stream: CUstream,
        kernel_params: *mut *mut c_void,
        extra: *mut *mut c_void,
    ) -> CUresult {
        STUB
    }
}

pub fn init(flags: u32) -> CUresult {
    unsafe { ffi::cuInit(flags) }
}

pub fn device_get_count(count: &mut i32) -> CUresult {
    unsafe { ffi::cuDeviceGetCount(count) }
}

pub fn device_get(device: &mut CUdevice, ordinal: i32) -> CUresult {
    unsafe { ffi::cuDeviceGet(device, ordinal) }
}

pub fn device_compute_capability(major: &mut i32, minor: &mut i32, dev: CUdevice) -> CUresult {
    unsafe { ffi::cuDeviceComputeCapability(major, minor, dev) }
}

pub fn ctx_create(ctx: &mut CUcontext, flags: u32, dev: CUdevice) -> CUresult {
    unsafe { ffi::cuCtxCreate_v2(ctx, flags, dev) }
}

pub fn ctx_push_current(ctx: CUcontext) -> CUresult {
    unsafe { ffi::cuCtxPushCurrent_v2(ctx) }
}

pub fn ctx_pop_current() -> CUresult {
    let mut popped = CUcontext::null();
    unsafe { ffi::cuCtxPopCurrent_v2(&mut popped) }
}

pub fn ctx_synchronize() -> CUresult {
    unsafe { ffi::cuCtxSynchronize() }
}

pub fn ctx_destroy(ctx: CUcontext) -> CUresult {
    unsafe { ffi::cuCtxDestroy_v2(ctx) }
}

pub fn module_load(module: &mut CUmodule, fname: &CStr) -> CUresult {
    unsafe { ffi::cuModuleLoad(module, fname.as_ptr()) }
}

pub fn module_get_function(func: &mut CUfunction, module: CUmodule, name: &CStr) -> CUresult {
    unsafe { ffi::cuModuleGetFunction(func, module, name.as_ptr()) }
}

pub fn mem_alloc(dptr: &mut CUdeviceptr, size: usize) -> CUresult {
    unsafe { ffi::cuMemAlloc_v2(dptr, size) }
}

pub fn mem_free(dptr: CUdeviceptr) -> CUresult {
    unsafe { ffi::cuMemFree_v2(dptr) }
}

pub fn memcpy_htod(dst: CUdeviceptr, src: *const c_void, n: usize) -> CUresult {
    unsafe { ffi::cuMemcpyHtoD_v2(dst, src, n) }
}

pub fn memcpy_dtoh(dst: *mut c_void, src: CUdeviceptr, n: usize) -> CUresult {
    unsafe { ffi::cuMemcpyDtoH_v2(dst, src, n) }
}

pub fn memcpy_htod_async(dst: CUdeviceptr, src: *const c_void, n: usize, stream: CUstream) -> CUresult {
    unsafe { ffi::cuMemcpyHtoDAsync_v2(dst, src, n, stream) }
}

pub fn memcpy_dtoh_async(dst: *mut c_void, src: CUdeviceptr, n: usize, stream: CUstream) -> CUresult {
    unsafe { ffi::cuMemcpyDtoHAsync_v2(dst, src, n, stream) }
}

pub fn memcpy_dtod_async(dst: CUdeviceptr, src: CUdeviceptr, n: usize, stream: CUstream) -> CUresult {
    unsafe { ffi::cuMemcpyDtoDAsync_v2(dst, src, n, stream) }
}

pub fn launch_kernel(
    f: CUfunction,
    grid: [u32; 3],
    block: [u32; 3],
    shared_mem_bytes: u32,
    stream: CUstream,
    kernel_params: *mut *mut c_void,
) -> CUresult {
    unsafe {
        ffi::cuLaunchKernel(
            f,
            grid[0],
            grid[1],
            grid[2],
            block[0],
            block[1],
            block[2],
            shared_mem_bytes,
            stream,
            kernel_params,
            std::ptr::null_mut(),
        )
    }
}

fn device_attribute(attr: c_int, dev: CUdevice) -> Result<i32> {
    let mut value = 0;
    let res = unsafe { ffi::cuDeviceGetAttribute(&mut value, attr, dev) };
    if res.is_success() {
        Ok(value)
    } else {
        Err(ErrorKind::DeviceLimit(
            "error while querying device limits; the limit check can be \
             turned off"
                .to_string(),
        )
        .into())
    }
}

pub fn grid_limits(dev: CUdevice) -> Result<[u32; 3]> {
    Ok([
        device_attribute(attrib::MAX_GRID_DIM_X, dev)? as u32,
        device_attribute(attrib::MAX_GRID_DIM_Y, dev)? as u32,
        device_attribute(attrib::MAX_GRID_DIM_Z, dev)? as u32,
    ])
}

pub fn block_limits(dev: CUdevice) -> Result<[u32; 3]> {
    Ok([
        device_attribute(attrib::MAX_BLOCK_DIM_X, dev)? as u32,
        device_attribute(attrib::MAX_BLOCK_DIM_Y, dev)? as u32,
        device_attribute(attrib::MAX_BLOCK_DIM_Z, dev)? as u32,
    ])
}

pub fn threads_per_block_limit(dev: CUdevice) -> Result<u32> {
    Ok(device_attribute(attrib::MAX_THREADS_PER_BLOCK, dev)? as u32)
}

pub fn shared_mem_per_block_limit(dev: CUdevice) -> Result<usize> {
    Ok(device_attribute(attrib::MAX_SHARED_MEMORY_PER_BLOCK, dev)? as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_result_keeps_the_first_error() {
        let mut res = CudaResult::new();
        assert!(res.is_success());
        res.absorb(CUresult::CUDA_SUCCESS);
        assert!(res.is_success());
        res.absorb(CUresult::CUDA_ERROR_INVALID_VALUE);
        res.absorb(CUresult::CUDA_ERROR_UNKNOWN);
        assert_eq!(res.raw(), CUresult::CUDA_ERROR_INVALID_VALUE);
        assert!(res.into_result().is_err());
    }

    #[test]
    fn success_is_the_identity() {
        let mut res = CudaResult::new();
        res.absorb(CUresult::CUDA_SUCCESS);
        assert!(res.into_result().is_ok());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn stub_driver_reports_not_initialized() {
        assert_eq!(init(0), CUresult::CUDA_ERROR_NOT_INITIALIZED);
        let mut count = -1;
        assert_eq!(
            device_get_count(&mut count),
            CUresult::CUDA_ERROR_NOT_INITIALIZED
        );
        assert_eq!(count, -1);
    }
}
