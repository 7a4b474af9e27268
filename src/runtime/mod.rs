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

//! Runtime components.
//!
//! Leaves first: the driver shim, the partitioner and the argument model
//! feed the launch cache, which the dependency resolver and the wrapper
//! entry points build on.

pub mod access_function;
pub mod alias_handle;
pub mod argument;
pub mod argument_access;
pub mod cuda;
pub mod dependency_resolution;
pub mod kernel_info;
pub mod kernel_launch;
pub mod memory_copy;
pub mod partition;
pub mod statistics;
pub mod virtual_buffer;

#[cfg(test)]
pub(crate) mod fixtures;
