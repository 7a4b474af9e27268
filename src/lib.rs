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

//! A transparent multi-GPU execution runtime.
//!
//! The application is written against the single-GPU CUDA driver API; a
//! host-code transform renames its driver calls to the entry points in
//! [`wrapping`]. The runtime backs every user-visible handle with one handle
//! per physical device, splits each kernel launch into per-device grid
//! partitions, and uses the polyhedral access relations of the static kernel
//! analysis to move exactly the array elements a partition needs.
//!
//! The interesting machinery lives in three places: [`polyhedral`]
//! instantiates and linearises the symbolic access relations,
//! [`runtime::kernel_launch`] caches launches and their per-device access
//! summaries, and [`runtime::dependency_resolution`] turns the intersection
//! of two summaries into a minimal inter-device transfer plan.

pub mod config;
pub mod error;
pub mod polyhedral;
pub mod runtime;
pub mod wrapping;
