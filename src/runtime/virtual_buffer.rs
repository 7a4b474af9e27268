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

//! Last-writer bookkeeping per device buffer.
//!
//! A buffer's most recent writer is either a kernel launch or a
//! host-to-device broadcast. Inter-kernel dependencies are discovered by
//! asking this object which launch last wrote a buffer the next launch
//! reads.

use super::cuda::CUdeviceptr;
use super::kernel_launch::LaunchId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct VirtualBuffer {
    writers: HashMap<CUdeviceptr, LaunchId>,
    broadcasts: HashSet<CUdeviceptr>,
}

impl VirtualBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The launch that last wrote `ptr`, if any kernel wrote it at all.
    pub fn writer(&self, ptr: CUdeviceptr) -> Option<LaunchId> {
        self.writers.get(&ptr).copied()
    }

    pub fn is_written(&self, ptr: CUdeviceptr) -> bool {
        self.writers.contains_key(&ptr)
    }

    pub fn is_broadcast(&self, ptr: CUdeviceptr) -> bool {
        self.broadcasts.contains(&ptr)
    }

    /// Records a kernel write; a kernel write invalidates the broadcast
    /// state.
    pub fn set_written(&mut self, ptr: CUdeviceptr, launch: LaunchId) {
        self.broadcasts.remove(&ptr);
        self.writers.insert(ptr, launch);
    }

    /// Records a host broadcast; the broadcast invalidates any previous
    /// kernel write.
    pub fn set_broadcast(&mut self, ptr: CUdeviceptr) {
        self.writers.remove(&ptr);
        self.broadcasts.insert(ptr);
    }

    /// Clears all state for a freed buffer.
    pub fn free(&mut self, ptr: CUdeviceptr) {
        self.writers.remove(&ptr);
        self.broadcasts.remove(&ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_clears_the_writer() {
        let mut buf = VirtualBuffer::new();
        buf.set_written(100, LaunchId(0));
        assert!(buf.is_written(100));

        buf.set_broadcast(100);
        assert!(buf.is_broadcast(100));
        assert!(!buf.is_written(100));
        assert!(buf.writer(100).is_none());
    }

    #[test]
    fn kernel_write_clears_the_broadcast() {
        let mut buf = VirtualBuffer::new();
        buf.set_broadcast(100);
        buf.set_written(100, LaunchId(3));
        assert!(!buf.is_broadcast(100));
        assert_eq!(buf.writer(100), Some(LaunchId(3)));
    }

    #[test]
    fn free_clears_both_states() {
        let mut buf = VirtualBuffer::new();
        buf.set_broadcast(1);
        buf.set_written(2, LaunchId(1));
        buf.free(1);
        buf.free(2);
        assert!(!buf.is_broadcast(1));
        assert!(!buf.is_written(2));
    }
}
