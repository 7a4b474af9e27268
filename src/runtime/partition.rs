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

//! Grid partitioning across devices.
//!
//! A partition is a rectangular sub-region of the thread grid assigned to
//! one physical device. Splits never cross block boundaries: the grid is
//! divided in whole blocks and offsets are reported in threads.

use crate::error::{ErrorKind, Result};
use itertools::iproduct;
use std::fmt;

/// Which grid axes are split across devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partitioning {
    X,
    Y,
    Z,
    XY,
    XZ,
    YZ,
}

impl Partitioning {
    /// Parses the partitioning field of the analysis database, e.g. `"y"` or
    /// `"xy"`. Axis order within the string does not matter.
    pub fn from_str(s: &str) -> Result<Self> {
        let mut axes: Vec<char> = s.chars().collect();
        axes.sort_unstable();
        match axes.as_slice() {
            ['x'] => Ok(Partitioning::X),
            ['y'] => Ok(Partitioning::Y),
            ['z'] => Ok(Partitioning::Z),
            ['x', 'y'] => Ok(Partitioning::XY),
            ['x', 'z'] => Ok(Partitioning::XZ),
            ['y', 'z'] => Ok(Partitioning::YZ),
            ['x', 'y', 'z'] => Err(ErrorKind::InvalidDatabase(
                "splitting along more than two axes is not supported".to_string(),
            )
            .into()),
            _ => Err(ErrorKind::InvalidDatabase(format!(
                "unknown partitioning '{}'",
                s
            ))
            .into()),
        }
    }

    /// The split axes as grid-dimension indices (x = 0, y = 1, z = 2).
    pub fn axes(&self) -> &'static [usize] {
        match self {
            Partitioning::X => &[0],
            Partitioning::Y => &[1],
            Partitioning::Z => &[2],
            Partitioning::XY => &[0, 1],
            Partitioning::XZ => &[0, 2],
            Partitioning::YZ => &[1, 2],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Partitioning::X => "x",
            Partitioning::Y => "y",
            Partitioning::Z => "z",
            Partitioning::XY => "xy",
            Partitioning::XZ => "xz",
            Partitioning::YZ => "yz",
        }
    }
}

impl fmt::Display for Partitioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rectangular grid region and the device that executes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    grid: [u32; 3],
    block: [u32; 3],
    offset: [u64; 3],
    device: usize,
}

impl Partition {
    pub fn new(grid: [u32; 3], block: [u32; 3], offset: [u64; 3], device: usize) -> Self {
        Self {
            grid,
            block,
            offset,
            device,
        }
    }

    /// Grid size in blocks.
    pub fn grid(&self) -> [u32; 3] {
        self.grid
    }

    /// Block size in threads; always equals the original launch block.
    pub fn block(&self) -> [u32; 3] {
        self.block
    }

    /// Origin of the partition in threads.
    pub fn offset(&self) -> [u64; 3] {
        self.offset
    }

    /// Size of the partition in threads.
    pub fn size(&self) -> [u64; 3] {
        [
            self.grid[0] as u64 * self.block[0] as u64,
            self.grid[1] as u64 * self.block[1] as u64,
            self.grid[2] as u64 * self.block[2] as u64,
        ]
    }

    pub fn device(&self) -> usize {
        self.device
    }

    /// True if the global thread id lies inside this partition.
    pub fn contains(&self, tid: [u64; 3]) -> bool {
        let size = self.size();
        (0..3).all(|axis| {
            tid[axis] >= self.offset[axis] && tid[axis] < self.offset[axis] + size[axis]
        })
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ Grid({}, {}, {}) Block({}, {}, {}) Offset({}, {}, {}) Dev({}) }}",
            self.grid[0],
            self.grid[1],
            self.grid[2],
            self.block[0],
            self.block[1],
            self.block[2],
            self.offset[0],
            self.offset[1],
            self.offset[2],
            self.device
        )
    }
}

/// Splits `rows` grid rows into `stripes` contiguous stripes, distributing
/// the remainder to the low stripe indices. Returns the row count per
/// stripe.
fn stripe_rows(rows: u32, stripes: usize) -> Vec<u32> {
    let base = rows / stripes as u32;
    let rest = (rows % stripes as u32) as usize;
    (0..stripes)
        .map(|i| if i < rest { base + 1 } else { base })
        .collect()
}

/// Row counts to thread offsets along one axis.
fn stripe_offsets(rows: &[u32], block: u32) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(rows.len());
    let mut count = 0u64;
    for &r in rows {
        offsets.push(count * block as u64);
        count += r as u64;
    }
    offsets
}

/// Produces the ordered sub-launch list for one (grid, block, partitioning,
/// device count) tuple. The partitions cover the entire grid and are tagged
/// with ascending device indices.
pub fn create_partitions(
    grid: [u32; 3],
    block: [u32; 3],
    num_devices: usize,
    partitioning: Partitioning,
) -> Result<Vec<Partition>> {
    let axes = partitioning.axes();

    if axes.len() == 1 {
        let axis = axes[0];
        if (grid[axis] as usize) < num_devices {
            return Err(ErrorKind::InvalidArgument(format!(
                "cannot split along the {} axis: the grid size {} of that \
                 axis is smaller than the number of devices {}",
                partitioning, grid[axis], num_devices
            ))
            .into());
        }

        let rows = stripe_rows(grid[axis], num_devices);
        let offsets = stripe_offsets(&rows, block[axis]);
        let parts = rows
            .iter()
            .zip(offsets.iter())
            .enumerate()
            .map(|(dev, (&r, &off))| {
                let mut part_grid = grid;
                part_grid[axis] = r;
                let mut part_off = [0u64; 3];
                part_off[axis] = off;
                Partition::new(part_grid, block, part_off, dev)
            })
            .collect();
        return Ok(parts);
    }

    // Two-axis split. The smaller grid axis takes the smaller stripe factor;
    // the factorization maximises the small factor subject to
    // f_small <= f_large and f_small <= small grid size.
    let (small_axis, large_axis) = if grid[axes[0]] <= grid[axes[1]] {
        (axes[0], axes[1])
    } else {
        (axes[1], axes[0])
    };
    let small_size = grid[small_axis];

    if small_size < 2 {
        return Err(ErrorKind::InvalidArgument(format!(
            "cannot split along the {} axes: the smaller axis has a grid \
             size of {}, which cannot be split two-dimensionally",
            partitioning, small_size
        ))
        .into());
    }

    let mut factors = None;
    for f_small in (1..=num_devices).rev() {
        if num_devices % f_small != 0 {
            continue;
        }
        let f_large = num_devices / f_small;
        if f_small > f_large || f_small as u32 > small_size {
            continue;
        }
        factors = Some((f_small, f_large));
        break;
    }
    let (f_small, f_large) = factors.ok_or_else(|| {
        ErrorKind::InvalidArgument(format!(
            "cannot split the ({}, {}, {}) grid along the {} axes over {} \
             devices: no usable stripe factorization exists",
            grid[0], grid[1], grid[2], partitioning, num_devices
        ))
    })?;

    if (grid[large_axis] as usize) < f_large {
        return Err(ErrorKind::InvalidArgument(format!(
            "cannot split the ({}, {}, {}) grid along the {} axes over {} \
             devices: axis size {} is smaller than its stripe count {}",
            grid[0], grid[1], grid[2], partitioning, num_devices, grid[large_axis], f_large
        ))
        .into());
    }

    let small_rows = stripe_rows(grid[small_axis], f_small);
    let small_offsets = stripe_offsets(&small_rows, block[small_axis]);
    let large_rows = stripe_rows(grid[large_axis], f_large);
    let large_offsets = stripe_offsets(&large_rows, block[large_axis]);

    // Cross product of the two stripe sets, device indices row-major.
    let smalls = small_rows.iter().zip(small_offsets.iter()).enumerate();
    let larges = large_rows.iter().zip(large_offsets.iter()).enumerate();
    let parts = iproduct!(smalls, larges)
        .map(|((i, (&sr, &so)), (j, (&lr, &lo)))| {
            let mut part_grid = grid;
            part_grid[small_axis] = sr;
            part_grid[large_axis] = lr;
            let mut part_off = [0u64; 3];
            part_off[small_axis] = so;
            part_off[large_axis] = lo;
            Partition::new(part_grid, block, part_off, i * f_large + j)
        })
        .collect();
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_volume(parts: &[Partition]) -> u64 {
        parts
            .iter()
            .map(|p| p.grid()[0] as u64 * p.grid()[1] as u64 * p.grid()[2] as u64)
            .sum()
    }

    #[test]
    fn one_axis_split_covers_the_grid() {
        let parts = create_partitions([100, 100, 1], [10, 10, 1], 7, Partitioning::X).unwrap();
        assert_eq!(parts.len(), 7);
        assert_eq!(grid_volume(&parts), 100 * 100);
        // 100 = 7 * 14 + 2: two devices take one extra row.
        let rows: Vec<u32> = parts.iter().map(|p| p.grid()[0]).collect();
        assert_eq!(rows, vec![15, 15, 14, 14, 14, 14, 14]);
        for p in &parts {
            assert_eq!(p.block(), [10, 10, 1]);
        }
        // Offsets accumulate in threads.
        assert_eq!(parts[0].offset(), [0, 0, 0]);
        assert_eq!(parts[1].offset(), [150, 0, 0]);
        assert_eq!(parts[2].offset(), [300, 0, 0]);
    }

    #[test]
    fn one_axis_split_with_three_devices() {
        // 1D stencil scenario: X split of a (4, 4, 1) grid with (6, 6, 1)
        // blocks over three devices.
        let parts = create_partitions([4, 4, 1], [6, 6, 1], 3, Partitioning::X).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].grid(), [2, 4, 1]);
        assert_eq!(parts[1].grid(), [1, 4, 1]);
        assert_eq!(parts[2].grid(), [1, 4, 1]);
        assert_eq!(parts[0].offset(), [0, 0, 0]);
        assert_eq!(parts[1].offset(), [12, 0, 0]);
        assert_eq!(parts[2].offset(), [18, 0, 0]);
    }

    #[test]
    fn one_axis_split_needs_one_block_per_device() {
        assert!(create_partitions([3, 1, 1], [32, 1, 1], 4, Partitioning::X).is_err());
    }

    #[test]
    fn y_split_offsets_are_in_threads() {
        let parts = create_partitions([2, 2, 1], [4, 4, 1], 2, Partitioning::Y).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].grid(), [2, 1, 1]);
        assert_eq!(parts[0].offset(), [0, 0, 0]);
        assert_eq!(parts[1].grid(), [2, 1, 1]);
        assert_eq!(parts[1].offset(), [0, 4, 0]);
    }

    #[test]
    fn two_axis_split_factorizes_row_major() {
        let parts = create_partitions([8, 8, 1], [2, 2, 1], 16, Partitioning::XY).unwrap();
        assert_eq!(parts.len(), 16);
        assert_eq!(grid_volume(&parts), 64);
        // 16 devices on a square grid: 4 x 4 stripes of 2 blocks each.
        for p in &parts {
            assert_eq!(p.grid(), [2, 2, 1]);
        }
        assert_eq!(parts[0].device(), 0);
        assert_eq!(parts[15].device(), 15);
        assert_eq!(parts[15].offset(), [12, 12, 0]);
    }

    #[test]
    fn two_axis_split_puts_the_small_factor_on_the_small_axis() {
        let parts = create_partitions([2, 6, 1], [1, 1, 1], 6, Partitioning::XY).unwrap();
        assert_eq!(parts.len(), 6);
        // Factors (2, 3): x in 2 stripes, y in 3 stripes.
        assert_eq!(grid_volume(&parts), 12);
        let xs: Vec<u32> = parts.iter().map(|p| p.grid()[0]).collect();
        let ys: Vec<u32> = parts.iter().map(|p| p.grid()[1]).collect();
        assert!(xs.iter().all(|&x| x == 1));
        assert!(ys.iter().all(|&y| y == 2));
    }

    #[test]
    fn two_axis_split_with_two_devices_degenerates_to_one_axis() {
        let parts = create_partitions([4, 4, 1], [1, 1, 1], 2, Partitioning::XY).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(grid_volume(&parts), 16);
    }

    #[test]
    fn two_axis_split_requires_a_splittable_small_axis() {
        assert!(create_partitions([1, 64, 1], [1, 1, 1], 4, Partitioning::XY).is_err());
    }

    #[test]
    fn three_axis_partitioning_is_rejected() {
        assert!(Partitioning::from_str("xyz").is_err());
    }

    #[test]
    fn partitioning_parse_is_order_insensitive() {
        assert_eq!(Partitioning::from_str("yx").unwrap(), Partitioning::XY);
        assert_eq!(Partitioning::from_str("y").unwrap(), Partitioning::Y);
    }

    #[test]
    fn single_device_keeps_the_grid_whole() {
        let parts = create_partitions([8, 8, 1], [4, 4, 1], 1, Partitioning::Y).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].grid(), [8, 8, 1]);
        assert_eq!(parts[0].offset(), [0, 0, 0]);
    }

    #[test]
    fn contains_matches_the_thread_box() {
        let p = Partition::new([2, 1, 1], [4, 4, 1], [0, 4, 0], 1);
        assert!(p.contains([0, 4, 0]));
        assert!(p.contains([7, 7, 0]));
        assert!(!p.contains([0, 3, 0]));
        assert!(!p.contains([8, 4, 0]));
    }
}
