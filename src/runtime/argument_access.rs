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

//! Per-device access summaries.
//!
//! An `ArgAccess` maps every device index to the ordered list of half-open
//! linear element intervals the device's partitions touch on one buffer, for
//! one launch and one direction. Intervals are sorted, pairwise disjoint and
//! never adjacent; dependency resolution intersects two of these summaries
//! to plan the minimal inter-device transfers.

use std::collections::BTreeMap;
use std::fmt;

pub type Interval = (u64, u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgAccess {
    gpu_to_ranges: BTreeMap<usize, Vec<Interval>>,
}

impl ArgAccess {
    pub fn new(gpu_to_ranges: BTreeMap<usize, Vec<Interval>>) -> Self {
        Self { gpu_to_ranges }
    }

    /// Number of devices with an entry (devices with no accesses still carry
    /// an empty entry).
    pub fn num_devices(&self) -> usize {
        self.gpu_to_ranges.len()
    }

    pub fn map(&self) -> &BTreeMap<usize, Vec<Interval>> {
        &self.gpu_to_ranges
    }

    /// The intervals of one device; empty if the device accesses nothing.
    pub fn intervals(&self, gpu: usize) -> &[Interval] {
        self.gpu_to_ranges
            .get(&gpu)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Intersection of two intervals; `None` if they do not overlap.
    pub fn intersect_intervals(a: Interval, b: Interval) -> Option<Interval> {
        let from = a.0.max(b.0);
        let to = a.1.min(b.1);
        if from < to {
            Some((from, to))
        } else {
            None
        }
    }

    /// Pairwise interval intersections keyed by (this device, other device).
    pub fn intersect(&self, other: &ArgAccess) -> BTreeMap<(usize, usize), Vec<Interval>> {
        let mut res = BTreeMap::new();
        for (&gpu_a, ranges_a) in &self.gpu_to_ranges {
            for (&gpu_b, ranges_b) in &other.gpu_to_ranges {
                for &a in ranges_a {
                    for &b in ranges_b {
                        if let Some(isect) = Self::intersect_intervals(a, b) {
                            res.entry((gpu_a, gpu_b)).or_insert_with(Vec::new).push(isect);
                        }
                    }
                }
            }
        }
        res
    }
}

impl fmt::Display for ArgAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Size: {}, Accs: ", self.num_devices())?;
        let mut first_gpu = true;
        for (gpu, ranges) in &self.gpu_to_ranges {
            if !first_gpu {
                write!(f, " ")?;
            }
            first_gpu = false;
            write!(f, "GPU{}{{", gpu)?;
            for (i, (from, to)) in ranges.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "[{}, {})", from, to)?;
            }
            write!(f, "}}")?;
        }
        write!(f, ")")
    }
}

/// Sorts intervals and merges every overlapping or adjacent pair, so that
/// each contiguous accessed region becomes exactly one interval.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_unstable();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match merged.last_mut() {
            Some(last) if iv.0 <= last.1 => {
                last.1 = last.1.max(iv.1);
            }
            _ => merged.push(iv),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_intersection() {
        assert_eq!(ArgAccess::intersect_intervals((0, 10), (5, 20)), Some((5, 10)));
        assert_eq!(ArgAccess::intersect_intervals((5, 20), (0, 10)), Some((5, 10)));
        assert_eq!(ArgAccess::intersect_intervals((0, 5), (5, 10)), None);
        assert_eq!(ArgAccess::intersect_intervals((0, 5), (7, 10)), None);
    }

    #[test]
    fn merge_joins_overlapping_and_adjacent_intervals() {
        let merged = merge_intervals(vec![(16, 24), (8, 16), (10, 16), (33, 39), (1, 7)]);
        assert_eq!(merged, vec![(1, 7), (8, 24), (33, 39)]);
        // No two merged intervals touch.
        for w in merged.windows(2) {
            assert!(w[0].1 < w[1].0);
        }
    }

    #[test]
    fn cross_device_intersections() {
        let mut a = BTreeMap::new();
        a.insert(0, vec![(9, 31)]);
        a.insert(1, vec![(33, 55)]);
        let mut b = BTreeMap::new();
        b.insert(0, vec![(1, 39)]);
        b.insert(1, vec![(25, 63)]);
        let a = ArgAccess::new(a);
        let b = ArgAccess::new(b);

        let isect = a.intersect(&b);
        assert_eq!(isect[&(0, 1)], vec![(25, 31)]);
        assert_eq!(isect[&(1, 0)], vec![(33, 39)]);
    }
}
