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

//! Counters behind the end-of-program report.
//!
//! User-visible memory copies are recorded here per execution event; launch
//! and dependency-resolution figures are aggregated from the cached objects
//! at report time.

/// Execution count, bytes moved and wall time of one copy direction.
#[derive(Clone, Copy, Debug, Default)]
pub struct CopyStat {
    pub execs: usize,
    pub bytes: usize,
    pub time: f64,
}

impl CopyStat {
    pub fn add(&mut self, bytes: usize, time: f64) {
        self.execs += 1;
        self.bytes += bytes;
        self.time += time;
    }

    /// Effective bandwidth in GB/s.
    pub fn bandwidth(&self) -> f64 {
        if self.time > 0.0 {
            self.bytes as f64 / self.time / 1e9
        } else {
            0.0
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Statistics {
    num_dev: usize,
    htod: CopyStat,
    dtoh: CopyStat,
    launch_creation_time: f64,
    dep_res_creation_time: f64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_num_dev(&mut self, num_dev: usize) {
        self.num_dev = num_dev;
    }

    pub fn num_dev(&self) -> usize {
        self.num_dev
    }

    pub fn add_htod(&mut self, bytes: usize, time: f64) {
        self.htod.add(bytes, time);
    }

    pub fn add_dtoh(&mut self, bytes: usize, time: f64) {
        self.dtoh.add(bytes, time);
    }

    pub fn htod(&self) -> CopyStat {
        self.htod
    }

    pub fn dtoh(&self) -> CopyStat {
        self.dtoh
    }

    /// Combined statistics over both user-visible copy directions.
    pub fn total(&self) -> CopyStat {
        CopyStat {
            execs: self.htod.execs + self.dtoh.execs,
            bytes: self.htod.bytes + self.dtoh.bytes,
            time: self.htod.time + self.dtoh.time,
        }
    }

    pub fn add_launch_creation_time(&mut self, time: f64) {
        self.launch_creation_time += time;
    }

    pub fn launch_creation_time(&self) -> f64 {
        self.launch_creation_time
    }

    pub fn add_dep_res_creation_time(&mut self, time: f64) {
        self.dep_res_creation_time += time;
    }

    pub fn dep_res_creation_time(&self) -> f64 {
        self.dep_res_creation_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_events_accumulate() {
        let mut stats = Statistics::new();
        stats.set_num_dev(4);
        stats.add_htod(1000, 0.5);
        stats.add_htod(1000, 0.5);
        stats.add_dtoh(500, 0.25);

        assert_eq!(stats.num_dev(), 4);
        assert_eq!(stats.htod().execs, 2);
        assert_eq!(stats.htod().bytes, 2000);
        assert_eq!(stats.total().execs, 3);
        assert_eq!(stats.total().bytes, 2500);
    }

    #[test]
    fn bandwidth_handles_zero_time() {
        let stat = CopyStat::default();
        assert_eq!(stat.bandwidth(), 0.0);

        let mut stat = CopyStat::default();
        stat.add(2_000_000_000, 1.0);
        assert!((stat.bandwidth() - 2.0).abs() < 1e-9);
    }
}
