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

//! Kernel argument value carriers.
//!
//! An argument holds an exact bit copy of the value that was passed to the
//! launch, together with its type. Typed accessors reinterpret the bits;
//! equality is bitwise, and device pointers compare as integers.

use super::cuda::CUdeviceptr;
use super::kernel_info::ArgType;
use crate::error::{ErrorKind, Result};
use std::convert::TryInto;
use std::os::raw::c_void;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct KernelArg {
    ty: Arc<ArgType>,
    bytes: Vec<u8>,
    dim_sizes: Vec<usize>,
}

impl KernelArg {
    /// Builds an argument from a bit copy of its value.
    ///
    /// `dim_sizes` holds the resolved non-leading dimension sizes of a
    /// multi-dimensional array argument, one entry per dimension beyond the
    /// first.
    pub fn from_bytes(ty: Arc<ArgType>, bytes: &[u8], dim_sizes: Vec<usize>) -> Result<Self> {
        if bytes.len() != ty.size() {
            return Err(ErrorKind::InvalidArgument(format!(
                "argument value has {} bytes, but its type '{}' has {}",
                bytes.len(),
                ty.name(),
                ty.size()
            ))
            .into());
        }
        let expected = (ty.num_dims() as usize).saturating_sub(1);
        if dim_sizes.len() != expected {
            return Err(ErrorKind::InvalidArgument(format!(
                "got {} dimension sizes for a type with {} array dimensions; \
                 expected {}",
                dim_sizes.len(),
                ty.num_dims(),
                expected
            ))
            .into());
        }
        Ok(Self {
            ty,
            bytes: bytes.to_vec(),
            dim_sizes,
        })
    }

    /// Creates the argument vector of one launch from the raw driver
    /// argument array.
    ///
    /// Dimension size patterns of multi-dimensional array arguments are
    /// resolved against the scalar arguments of the same launch and the
    /// launch sizes.
    ///
    /// # Safety
    ///
    /// `raw_args` must hold one valid pointer per argument type, each
    /// pointing to at least `size()` readable bytes.
    pub unsafe fn create_args(
        types: &[Arc<ArgType>],
        raw_args: &[*mut c_void],
        grid: [u32; 3],
        block: [u32; 3],
    ) -> Result<Vec<KernelArg>> {
        let mut packs: Vec<Vec<u8>> = Vec::with_capacity(types.len());
        for (ty, &raw) in types.iter().zip(raw_args.iter()) {
            packs.push(std::slice::from_raw_parts(raw as *const u8, ty.size()).to_vec());
        }

        let scalar_value = |arg_nr: usize| -> Result<usize> {
            let ty = types.get(arg_nr).ok_or_else(|| {
                ErrorKind::InvalidDatabase(format!(
                    "dimension size pattern references argument {}, but the \
                     kernel has only {} arguments",
                    arg_nr,
                    types.len()
                ))
            })?;
            if !ty.is_int() || ty.ptr_level() != 0 {
                return Err(ErrorKind::InvalidDatabase(format!(
                    "cannot deduce an array size from the non-integral \
                     argument type '{}'",
                    ty.name()
                ))
                .into());
            }
            Ok(int_from_bytes(&packs[arg_nr])? as usize)
        };

        let mut all_dim_sizes: Vec<Vec<usize>> = vec![Vec::new(); types.len()];
        for (arg_nr, ty) in types.iter().enumerate() {
            if ty.ptr_level() != 1 || ty.num_dims() <= 1 {
                continue;
            }
            let mut dim_sizes = Vec::with_capacity(ty.dim_size_patterns().len());
            for pattern in ty.dim_size_patterns() {
                let size = match pattern.as_str() {
                    "" => {
                        return Err(ErrorKind::InvalidDatabase(
                            "cannot deduce an array size from an empty pattern".to_string(),
                        )
                        .into())
                    }
                    "size_x" => grid[0] as usize * block[0] as usize,
                    "size_y" => grid[1] as usize * block[1] as usize,
                    "size_z" => grid[2] as usize * block[2] as usize,
                    p if p.starts_with("arg") => {
                        let nr = p[3..].parse::<usize>().map_err(|_| {
                            ErrorKind::InvalidDatabase(format!(
                                "cannot deduce an array size from pattern '{}'",
                                p
                            ))
                        })?;
                        scalar_value(nr)?
                    }
                    p => {
                        return Err(ErrorKind::InvalidDatabase(format!(
                            "cannot deduce an array size from pattern '{}'",
                            p
                        ))
                        .into())
                    }
                };
                dim_sizes.push(size);
            }
            all_dim_sizes[arg_nr] = dim_sizes;
        }

        types
            .iter()
            .zip(packs.iter())
            .zip(all_dim_sizes.into_iter())
            .map(|((ty, pack), dim_sizes)| KernelArg::from_bytes(ty.clone(), pack, dim_sizes))
            .collect()
    }

    pub fn ty(&self) -> &Arc<ArgType> {
        &self.ty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dim_sizes(&self) -> &[usize] {
        &self.dim_sizes
    }

    /// Size of one non-leading array dimension.
    ///
    /// For an access `arr[x + N * y]` the analysis represents the array as
    /// `arr[y, x]` with an unlimited first dimension; axis 0 then returns
    /// `N`, the size of the second dimension.
    pub fn dim_size(&self, axis: usize) -> Result<usize> {
        self.dim_sizes.get(axis).copied().ok_or_else(|| {
            ErrorKind::InvalidArgument(format!(
                "argument has no array dimension size for axis {}",
                axis
            ))
            .into()
        })
    }

    /// The value reinterpreted as a signed integer.
    pub fn as_i64(&self) -> Result<i64> {
        int_from_bytes(&self.bytes)
    }

    pub fn as_f32(&self) -> Result<f32> {
        let bytes: [u8; 4] = self.bytes.as_slice().try_into().map_err(|_| {
            ErrorKind::InvalidArgument(format!(
                "argument of size {} cannot be read as a float",
                self.bytes.len()
            ))
        })?;
        Ok(f32::from_le_bytes(bytes))
    }

    pub fn as_f64(&self) -> Result<f64> {
        let bytes: [u8; 8] = self.bytes.as_slice().try_into().map_err(|_| {
            ErrorKind::InvalidArgument(format!(
                "argument of size {} cannot be read as a double",
                self.bytes.len()
            ))
        })?;
        Ok(f64::from_le_bytes(bytes))
    }

    /// The value reinterpreted as a device pointer.
    pub fn as_dev_ptr(&self) -> Result<CUdeviceptr> {
        let bytes: [u8; 8] = self.bytes.as_slice().try_into().map_err(|_| {
            ErrorKind::InvalidArgument(format!(
                "argument of type '{}' with size {} cannot be converted to a \
                 device pointer of size {}",
                self.ty.name(),
                self.bytes.len(),
                std::mem::size_of::<CUdeviceptr>()
            ))
        })?;
        Ok(CUdeviceptr::from_le_bytes(bytes))
    }

    /// True if this is a buffer argument holding the given pointer value.
    pub fn matches_ptr(&self, ptr: CUdeviceptr) -> bool {
        self.ty.ptr_level() == 1 && self.as_dev_ptr().map(|p| p == ptr).unwrap_or(false)
    }

    /// Bitwise value equality, ignoring the types.
    pub fn bits_equal(&self, other: &KernelArg) -> bool {
        self.bytes == other.bytes
    }
}

/// Two arguments are equal if their pointer levels and binary values are
/// equal.
impl PartialEq for KernelArg {
    fn eq(&self, other: &Self) -> bool {
        self.ty.ptr_level() == other.ty.ptr_level() && self.bytes == other.bytes
    }
}

impl Eq for KernelArg {}

fn int_from_bytes(bytes: &[u8]) -> Result<i64> {
    match bytes.len() {
        1 => Ok(i8::from_le_bytes(bytes.try_into().unwrap()) as i64),
        2 => Ok(i16::from_le_bytes(bytes.try_into().unwrap()) as i64),
        4 => Ok(i32::from_le_bytes(bytes.try_into().unwrap()) as i64),
        8 => Ok(i64::from_le_bytes(bytes.try_into().unwrap())),
        n => Err(ErrorKind::InvalidArgument(format!(
            "cannot read an integer of {} bytes",
            n
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::super::kernel_info::KernelInfo;
    use super::*;

    #[test]
    fn arguments_compare_by_bits_and_pointer_level() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let types = info.arg_types();

        let n: i32 = 100;
        let d_ptr0: CUdeviceptr = 0;
        let d_ptr1: CUdeviceptr = 1;

        let arg0 =
            KernelArg::from_bytes(types[0].clone(), &d_ptr0.to_le_bytes(), vec![100]).unwrap();
        let arg00 =
            KernelArg::from_bytes(types[0].clone(), &d_ptr0.to_le_bytes(), vec![100]).unwrap();
        let arg1 =
            KernelArg::from_bytes(types[1].clone(), &d_ptr1.to_le_bytes(), vec![100]).unwrap();
        let arg2 = KernelArg::from_bytes(types[2].clone(), &n.to_le_bytes(), vec![]).unwrap();

        assert_eq!(arg0, arg00);
        assert_ne!(arg0, arg1);
        assert_ne!(arg0, arg2);

        assert!(arg0.matches_ptr(d_ptr0));
        assert!(!arg0.matches_ptr(d_ptr1));
        assert!(!arg2.matches_ptr(100));

        assert_eq!(arg0.as_dev_ptr().unwrap(), d_ptr0);
        assert_eq!(arg1.as_dev_ptr().unwrap(), d_ptr1);
        assert_eq!(arg2.as_i64().unwrap(), 100);
    }

    #[test]
    fn dim_sizes_resolve_from_scalar_arguments() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let n: i32 = 16;
        let d_ptr0: CUdeviceptr = 0xdead;
        let d_ptr1: CUdeviceptr = 0xbeef;
        let mut raw0 = d_ptr0;
        let mut raw1 = d_ptr1;
        let mut raw2 = n;
        let raw_args: Vec<*mut std::os::raw::c_void> = vec![
            &mut raw0 as *mut _ as *mut _,
            &mut raw1 as *mut _ as *mut _,
            &mut raw2 as *mut _ as *mut _,
        ];

        let args = unsafe {
            KernelArg::create_args(info.arg_types(), &raw_args, [8, 8, 1], [2, 2, 1]).unwrap()
        };
        assert_eq!(args.len(), 3);
        // "dim sizes": ["arg2"] resolves to the scalar N.
        assert_eq!(args[0].dim_sizes(), &[16]);
        assert_eq!(args[0].dim_size(0).unwrap(), 16);
        assert!(args[0].dim_size(1).is_err());
        assert_eq!(args[0].as_dev_ptr().unwrap(), d_ptr0);
        assert_eq!(args[2].as_i64().unwrap(), 16);
    }

    #[test]
    fn mismatched_dim_size_count_is_rejected() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let d_ptr: CUdeviceptr = 1;
        assert!(
            KernelArg::from_bytes(info.arg_types()[0].clone(), &d_ptr.to_le_bytes(), vec![])
                .is_err()
        );
    }

    #[test]
    fn float_and_double_views() {
        let info = &KernelInfo::create_infos(fixtures::NBODY_DB).unwrap()[0];
        // Argument 6 of updatePositions is the float time step.
        let dt: f32 = 0.25;
        let arg = KernelArg::from_bytes(info.arg_types()[6].clone(), &dt.to_le_bytes(), vec![])
            .unwrap();
        assert_eq!(arg.as_f32().unwrap(), 0.25);
        assert!(arg.as_f64().is_err());
    }
}
