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

//! Compile-time runtime configuration.
//!
//! The host-code transform links the application against one fixed build of
//! the runtime, so all options are resolved at compile time: booleans map to
//! Cargo features and the log file path is baked in through an environment
//! variable at build time.

/// Emit verbose per-call diagnostic text.
pub const LOG_ON: bool = cfg!(feature = "verbose-log");

/// If set and non-empty, buffer the log to this file instead of stdout.
pub const LOG_FILE: Option<&str> = option_env!("MEKONG_LOG_FILE");

/// Maintain the counters used by `MEKONG_report`.
pub const COLLECT_STATISTICS: bool = cfg!(feature = "statistics");

/// Emit the report at end of program. The host transform inserts a
/// `MEKONG_report` call in front of every return in `main`.
pub const MAKE_REPORT: bool = cfg!(feature = "report");

/// Validate partitions against the driver's device limits before launching.
pub const CHECK_DEVICE_LIMITS: bool = cfg!(feature = "check-device-limits");
