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

//! Directory of multi-device aliases.
//!
//! The user program sees one device, one context, one module, one function
//! and one buffer per allocation; the runtime backs each of those primary
//! handles with one concrete handle per physical device. This object is the
//! sole authority for that translation. Index `i` of any alias list refers
//! to the same physical device across all maps.

use super::cuda::{CUcontext, CUdevice, CUdeviceptr, CUfunction, CUmodule};
use crate::error::{ErrorKind, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AliasHandle {
    devices: HashMap<CUdevice, Vec<CUdevice>>,
    contexts: HashMap<CUcontext, Vec<CUcontext>>,
    modules: HashMap<CUmodule, Vec<CUmodule>>,
    functions: HashMap<CUfunction, Vec<CUfunction>>,
    pointers: HashMap<CUdeviceptr, Vec<CUdeviceptr>>,
    names: HashMap<CUfunction, String>,
}

impl AliasHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physical devices behind every primary handle.
    pub fn num_devices(&self) -> Result<usize> {
        let devs = self
            .devices
            .values()
            .next()
            .ok_or_else(|| ErrorKind::InvalidState("no devices registered".to_string()))?;
        Ok(devs.len())
    }

    /// The registered device list.
    pub fn devices(&self) -> Result<&[CUdevice]> {
        if self.devices.len() != 1 {
            return Err(ErrorKind::InvalidState(format!(
                "device registration is ambiguous ({} primaries); was the \
                 device queried more than once?",
                self.devices.len()
            ))
            .into());
        }
        Ok(self.devices.values().next().unwrap())
    }

    /// The per-device context list. Exactly one context registration exists
    /// under the single host context assumption.
    pub fn contexts(&self) -> Result<&[CUcontext]> {
        if self.contexts.len() != 1 {
            return Err(ErrorKind::InvalidState(format!(
                "context mapping is ambiguous ({} primaries); was more than \
                 one context created in the host code?",
                self.contexts.len()
            ))
            .into());
        }
        Ok(self.contexts.values().next().unwrap())
    }

    pub fn register_devices(&mut self, list: Vec<CUdevice>) {
        debug_assert!(!list.is_empty());
        self.devices.insert(list[0], list);
    }

    pub fn register_contexts(&mut self, list: Vec<CUcontext>) {
        debug_assert!(!list.is_empty());
        self.contexts.insert(list[0], list);
    }

    pub fn register_modules(&mut self, list: Vec<CUmodule>) {
        debug_assert!(!list.is_empty());
        self.modules.insert(list[0], list);
    }

    pub fn register_functions(&mut self, list: Vec<CUfunction>) {
        debug_assert!(!list.is_empty());
        self.functions.insert(list[0], list);
    }

    pub fn register_pointers(&mut self, list: Vec<CUdeviceptr>) {
        debug_assert!(!list.is_empty());
        self.pointers.insert(list[0], list);
    }

    /// Aliases of a module. Panics if the module was never registered.
    pub fn modules(&self, primary: CUmodule) -> &[CUmodule] {
        &self.modules[&primary]
    }

    /// Aliases of a kernel function. Panics if the function was never
    /// registered.
    pub fn functions(&self, primary: CUfunction) -> &[CUfunction] {
        &self.functions[&primary]
    }

    /// Aliases of a device pointer. Panics if the pointer was never
    /// registered.
    pub fn pointers(&self, primary: CUdeviceptr) -> &[CUdeviceptr] {
        &self.pointers[&primary]
    }

    pub fn has_pointer(&self, primary: CUdeviceptr) -> bool {
        self.pointers.contains_key(&primary)
    }

    /// Original kernel name recorded when the function was fetched from the
    /// module; pairs a launch with its analysis descriptor.
    pub fn function_name(&self, func: CUfunction) -> Option<&str> {
        self.names.get(&func).map(|s| s.as_str())
    }

    pub fn set_function_name(&mut self, func: CUfunction, name: String) {
        self.names.insert(func, name);
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn num_pointers(&self) -> usize {
        self.pointers.len()
    }

    pub fn erase_pointer(&mut self, primary: CUdeviceptr) {
        self.pointers.remove(&primary);
    }

    pub fn erase_context(&mut self, primary: CUcontext) {
        self.contexts.remove(&primary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_resolves_aliases() {
        let mut alias = AliasHandle::new();
        alias.register_devices(vec![0, 1, 2]);
        assert_eq!(alias.num_devices().unwrap(), 3);
        assert_eq!(alias.devices().unwrap(), &[0, 1, 2]);

        alias.register_pointers(vec![100, 200, 300]);
        assert_eq!(alias.pointers(100), &[100, 200, 300]);
        assert!(alias.has_pointer(100));
        assert!(!alias.has_pointer(200));
    }

    #[test]
    fn first_entry_is_the_primary() {
        let mut alias = AliasHandle::new();
        alias.register_pointers(vec![7, 8]);
        assert_eq!(alias.pointers(7)[0], 7);
    }

    #[test]
    fn erase_removes_the_pointer_entry() {
        let mut alias = AliasHandle::new();
        alias.register_pointers(vec![100, 200]);
        alias.erase_pointer(100);
        assert!(!alias.has_pointer(100));
    }

    #[test]
    fn ambiguous_context_registration_fails() {
        let mut alias = AliasHandle::new();
        assert!(alias.contexts().is_err());

        alias.register_contexts(vec![CUcontext(1 as *mut _), CUcontext(2 as *mut _)]);
        assert!(alias.contexts().is_ok());

        alias.register_contexts(vec![CUcontext(3 as *mut _), CUcontext(4 as *mut _)]);
        assert!(alias.contexts().is_err());
    }

    #[test]
    fn missing_devices_is_an_error() {
        let alias = AliasHandle::new();
        assert!(alias.num_devices().is_err());
    }

    #[test]
    fn function_names_link_launches_to_descriptors() {
        let mut alias = AliasHandle::new();
        let func = CUfunction(42 as *mut _);
        alias.register_functions(vec![func, CUfunction(43 as *mut _)]);
        alias.set_function_name(func, "stencil5p_2D".to_string());
        assert_eq!(alias.function_name(func), Some("stencil5p_2D"));
    }
}
