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

//! Kernel descriptors built from the static analysis database.
//!
//! The analysis emits one JSON record per kernel: argument types, the
//! partitioning scheme and a pair of symbolic access relations per argument.
//! Descriptors are immutable and live for the whole process.

use super::access_function::AccessFunction;
use super::partition::Partitioning;
use crate::error::{ErrorKind, Result};
use serde_derive::Deserialize;
use std::fmt;
use std::mem;
use std::sync::Arc;

/// Fundamental type of a kernel argument as reported by the analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FundType {
    Int,
    Float,
    Double,
    None,
}

/// Immutable type description of one kernel argument.
#[derive(Debug)]
pub struct ArgType {
    name: String,
    ptr_level: u32,
    fund_type: FundType,
    size: usize,
    el_size: usize,
    is_modified: bool,
    is_read: bool,
    num_dims: u32,
    dim_size_patterns: Vec<String>,
}

impl ArgType {
    /// True for doubles, floats, integer types and pointers to them.
    pub fn is_fund_type(&self) -> bool {
        self.fund_type != FundType::None
    }

    pub fn is_int(&self) -> bool {
        self.fund_type == FundType::Int
    }

    pub fn is_float(&self) -> bool {
        self.fund_type == FundType::Float
    }

    pub fn is_double(&self) -> bool {
        self.fund_type == FundType::Double
    }

    pub fn fund_type(&self) -> FundType {
        self.fund_type
    }

    /// `int*` has pointer level one, `int` level zero. Levels of two or more
    /// are rejected at database load.
    pub fn ptr_level(&self) -> u32 {
        self.ptr_level
    }

    /// Size of the argument value in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the pointed-to element in bytes.
    pub fn el_size(&self) -> Result<usize> {
        if self.ptr_level < 1 {
            return Err(ErrorKind::InvalidArgument(format!(
                "argument type '{}' is not a pointer type",
                self.name
            ))
            .into());
        }
        Ok(self.el_size)
    }

    /// True if a buffer of this argument is written by the kernel. Derived
    /// from a non-empty write relation; scalars are never modified.
    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    pub fn is_const(&self) -> bool {
        !self.is_modified
    }

    /// True if a buffer of this argument is read by the kernel.
    pub fn is_read(&self) -> bool {
        self.is_read
    }

    /// Number of array dimensions; zero for scalars.
    pub fn num_dims(&self) -> u32 {
        self.num_dims
    }

    /// Patterns describing each non-leading dimension size, as references to
    /// other arguments (`"arg2"`) or to launch sizes (`"size_x"`).
    pub fn dim_size_patterns(&self) -> &[String] {
        &self.dim_size_patterns
    }

    /// LLVM IR type name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Immutable per-kernel record: name, ordered argument types, partitioning
/// and one access function per argument.
#[derive(Debug)]
pub struct KernelInfo {
    name: String,
    arg_types: Vec<Arc<ArgType>>,
    partitioning: Partitioning,
    acc_funcs: Vec<Arc<AccessFunction>>,
}

impl KernelInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_args(&self) -> usize {
        self.arg_types.len()
    }

    pub fn arg_types(&self) -> &[Arc<ArgType>] {
        &self.arg_types
    }

    pub fn arg_type(&self, arg_nr: usize) -> &Arc<ArgType> {
        &self.arg_types[arg_nr]
    }

    pub fn partitioning(&self) -> Partitioning {
        self.partitioning
    }

    pub fn acc_func(&self, arg_nr: usize) -> &Arc<AccessFunction> {
        &self.acc_funcs[arg_nr]
    }

    /// Parses the analysis database and creates all descriptors.
    pub fn create_infos(db: &str) -> Result<Vec<Arc<KernelInfo>>> {
        let parsed: Database = serde_json::from_str(db)
            .map_err(|e| ErrorKind::InvalidDatabase(format!("cannot parse database: {}", e)))?;

        if parsed.kernels.is_empty() {
            return Err(
                ErrorKind::InvalidDatabase("the database contains no kernel analysis".to_string())
                    .into(),
            );
        }

        let mut infos = Vec::with_capacity(parsed.kernels.len());
        for kernel in &parsed.kernels {
            if kernel.partitioning.is_empty() || kernel.partitioning == "None" {
                return Err(ErrorKind::InvalidDatabase(format!(
                    "no partitioning recorded for kernel '{}'",
                    kernel.name
                ))
                .into());
            }
            let partitioning = Partitioning::from_str(&kernel.partitioning)?;

            let mut arg_types = Vec::with_capacity(kernel.arguments.len());
            let mut acc_funcs = Vec::with_capacity(kernel.arguments.len());
            for (arg_nr, arg) in kernel.arguments.iter().enumerate() {
                let acc = AccessFunction::new(
                    arg_nr,
                    &arg.isl_read_map,
                    &arg.isl_read_params,
                    &arg.isl_write_map,
                    &arg.isl_write_params,
                )?;

                if arg.pointer_level > 1 {
                    return Err(ErrorKind::InvalidDatabase(format!(
                        "argument {} of kernel '{}' has pointer level {}; \
                         only buffers of scalars are supported",
                        arg_nr, kernel.name, arg.pointer_level
                    ))
                    .into());
                }
                if arg.num_dimensions > 2 {
                    return Err(ErrorKind::InvalidDatabase(format!(
                        "argument {} of kernel '{}' has {} array dimensions; \
                         more than two are not supported",
                        arg_nr, kernel.name, arg.num_dimensions
                    ))
                    .into());
                }

                // The analysis reports sizes in bits. A pointer type reports
                // size zero and defaults to the platform pointer width.
                let mut size = (arg.size / 8) as usize;
                if size == 0 && arg.pointer_level == 1 {
                    size = mem::size_of::<super::cuda::CUdeviceptr>();
                }

                let fund_type = match arg.fundamental_type.as_str() {
                    "i" => FundType::Int,
                    "f" => FundType::Float,
                    "d" => FundType::Double,
                    _ => FundType::None,
                };

                arg_types.push(Arc::new(ArgType {
                    name: arg.type_name.clone(),
                    ptr_level: arg.pointer_level,
                    fund_type,
                    size,
                    el_size: (arg.element_size / 8) as usize,
                    is_modified: acc.has_write(),
                    is_read: acc.has_read(),
                    num_dims: arg.num_dimensions,
                    dim_size_patterns: arg.dim_sizes.clone(),
                }));
                acc_funcs.push(Arc::new(acc));
            }

            infos.push(Arc::new(KernelInfo {
                name: kernel.name.clone(),
                arg_types,
                partitioning,
                acc_funcs,
            }));
        }
        Ok(infos)
    }
}

impl fmt::Display for KernelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(name: {}; args: ", self.name)?;
        for ty in &self.arg_types {
            write!(f, "{}, ", ty)?;
        }
        write!(f, "; partitioning: {})", self.partitioning)
    }
}

#[derive(Debug, Deserialize)]
struct Database {
    kernels: Vec<KernelRecord>,
}

#[derive(Debug, Deserialize)]
struct KernelRecord {
    name: String,
    partitioning: String,
    arguments: Vec<ArgRecord>,
}

#[derive(Debug, Deserialize)]
struct ArgRecord {
    #[serde(rename = "pointer level")]
    pointer_level: u32,
    #[serde(rename = "fundamental type")]
    fundamental_type: String,
    /// Size in bits.
    size: u32,
    #[serde(rename = "element size", default)]
    element_size: u32,
    #[serde(rename = "num dimensions", default)]
    num_dimensions: u32,
    #[serde(rename = "dim sizes", default)]
    dim_sizes: Vec<String>,
    #[serde(rename = "isl read map", default)]
    isl_read_map: String,
    #[serde(rename = "isl read params", default)]
    isl_read_params: Vec<String>,
    #[serde(rename = "isl write map", default)]
    isl_write_map: String,
    #[serde(rename = "isl write params", default)]
    isl_write_params: Vec<String>,
    #[serde(rename = "type name", default)]
    type_name: String,
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    #[test]
    fn parses_the_stencil_database() {
        let infos = KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap();
        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.name(), "stencil5p_2D");
        assert_eq!(info.partitioning(), Partitioning::Y);
        assert_eq!(info.num_args(), 3);

        let input = info.arg_type(0);
        assert_eq!(input.ptr_level(), 1);
        // Pointer sizes default to the platform pointer width.
        assert_eq!(input.size(), 8);
        assert_eq!(input.el_size().unwrap(), 4);
        assert_eq!(input.num_dims(), 2);
        assert!(input.is_read());
        assert!(!input.is_modified());

        let output = info.arg_type(1);
        assert!(!output.is_read());
        assert!(output.is_modified());

        let n = info.arg_type(2);
        assert_eq!(n.ptr_level(), 0);
        assert_eq!(n.size(), 4);
        assert!(n.is_int());
        assert!(!n.is_read());
        assert!(!n.is_modified());
    }

    #[test]
    fn parses_the_nbody_database() {
        let infos = KernelInfo::create_infos(fixtures::NBODY_DB).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name(), "updatePositions");
        assert_eq!(infos[1].name(), "updateSpeed");
        assert_eq!(infos[0].partitioning(), Partitioning::X);

        // updateSpeed reads the positions but writes only the velocities.
        let speed = &infos[1];
        assert!(speed.arg_type(1).is_read());
        assert!(!speed.arg_type(1).is_modified());
        assert!(speed.arg_type(4).is_modified());
    }

    #[test]
    fn an_empty_database_is_rejected() {
        assert!(KernelInfo::create_infos("{ \"kernels\": [] }").is_err());
        assert!(KernelInfo::create_infos("not json").is_err());
    }
}
