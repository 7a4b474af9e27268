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

//! Integer polyhedra for kernel access relations.
//!
//! The static kernel analysis emits access relations as ISL map text. This
//! module parses that text into unions of basic maps and provides the
//! Presburger primitives the runtime needs: parameter instantiation, boxing
//! the input space to a partition, and extraction of the accessed index
//! intervals per output row.
//!
//! A basic map is a conjunction of affine equalities and inequalities over
//! the columns `[constant, parameters.., inputs.., outputs..]`. An inequality
//! row `c` encodes `c[0] + sum(c[i] * x[i]) >= 0`, an equality row the same
//! with `= 0`. Bounds of a single dimension are computed by substituting
//! equalities and eliminating the remaining variables with Fourier-Motzkin,
//! tightening to integers after every step. The access relations produced by
//! the analysis have unit coefficients on the bounded dimensions, so the
//! integer tightening is exact for them.

mod parse;

use crate::error::{ErrorKind, Result};
use std::convert::TryFrom;

/// Union of basic maps sharing one parameter list.
///
/// All maps in a union target the same array, but their input tuples may
/// differ in name and arity (loop dimensions of different statements).
#[derive(Clone, Debug)]
pub struct UnionMap {
    pub(crate) param_names: Vec<String>,
    pub(crate) maps: Vec<BasicMap>,
}

impl UnionMap {
    /// Parses ISL map text, e.g.
    /// `[N] -> { Stmt[i0, i1, i2] -> Ref[i1, 1 + i0] : 0 <= i0 < N }`.
    pub fn from_str(text: &str) -> Result<Self> {
        parse::union_map(text)
    }

    pub fn num_params(&self) -> usize {
        self.param_names.len()
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn maps(&self) -> &[BasicMap] {
        &self.maps
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Substitutes concrete parameter values and drops the parameter columns.
    pub fn fix_params(&self, vals: &[i64]) -> Result<UnionMap> {
        if vals.len() != self.param_names.len() {
            return Err(ErrorKind::InvalidArgument(format!(
                "expected {} parameter values, got {}",
                self.param_names.len(),
                vals.len()
            ))
            .into());
        }
        let maps = self
            .maps
            .iter()
            .map(|m| m.fix_params(vals))
            .collect::<Result<Vec<_>>>()?;
        Ok(UnionMap {
            param_names: Vec::new(),
            maps,
        })
    }
}

/// One conjunction of affine constraints relating an input tuple to an
/// output tuple.
#[derive(Clone, Debug)]
pub struct BasicMap {
    pub(crate) in_name: String,
    pub(crate) out_name: String,
    pub(crate) n_params: usize,
    pub(crate) n_in: usize,
    pub(crate) n_out: usize,
    pub(crate) eqs: Vec<Vec<i64>>,
    pub(crate) ineqs: Vec<Vec<i64>>,
}

enum Norm {
    Row(Vec<i64>),
    /// The row holds for every point; drop it.
    True,
    /// The row holds for no point; the whole map is empty.
    False,
}

impl BasicMap {
    pub fn num_inputs(&self) -> usize {
        self.n_in
    }

    pub fn num_outputs(&self) -> usize {
        self.n_out
    }

    pub fn in_name(&self) -> &str {
        &self.in_name
    }

    pub fn out_name(&self) -> &str {
        &self.out_name
    }

    fn ncols(&self) -> usize {
        1 + self.n_params + self.n_in + self.n_out
    }

    fn col_in(&self, dim: usize) -> usize {
        1 + self.n_params + dim
    }

    fn col_out(&self, dim: usize) -> usize {
        1 + self.n_params + self.n_in + dim
    }

    fn fix_params(&self, vals: &[i64]) -> Result<BasicMap> {
        let strip = |row: &Vec<i64>| -> Result<Vec<i64>> {
            let mut c0 = row[0] as i128;
            for (i, &v) in vals.iter().enumerate() {
                c0 += row[1 + i] as i128 * v as i128;
            }
            let c0 = i64::try_from(c0)
                .map_err(|_| ErrorKind::Overflow("constant term overflow".to_string()))?;
            let mut out = Vec::with_capacity(1 + self.n_in + self.n_out);
            out.push(c0);
            out.extend_from_slice(&row[1 + self.n_params..]);
            Ok(out)
        };
        Ok(BasicMap {
            in_name: self.in_name.clone(),
            out_name: self.out_name.clone(),
            n_params: 0,
            n_in: self.n_in,
            n_out: self.n_out,
            eqs: self.eqs.iter().map(&strip).collect::<Result<Vec<_>>>()?,
            ineqs: self.ineqs.iter().map(&strip).collect::<Result<Vec<_>>>()?,
        })
    }

    /// Boxes the first three input dimensions to the rectangular thread
    /// region `[offset, offset + size)`. Input dimensions beyond the third
    /// are loop dimensions and stay unconstrained.
    pub fn bound_inputs(&mut self, offset: [u64; 3], size: [u64; 3]) -> Result<()> {
        for axis in 0..self.n_in.min(3) {
            let lo = offset[axis];
            let hi = offset[axis] + size[axis] - 1;
            if hi > i32::max_value() as u64 {
                return Err(ErrorKind::Overflow(
                    "partition bound exceeds the 32-bit range the polyhedral \
                     backend can represent"
                        .to_string(),
                )
                .into());
            }
            let col = self.col_in(axis);
            let mut lower = vec![0i64; self.ncols()];
            lower[0] = -(lo as i64);
            lower[col] = 1;
            self.ineqs.push(lower);
            let mut upper = vec![0i64; self.ncols()];
            upper[0] = hi as i64;
            upper[col] = -1;
            self.ineqs.push(upper);
        }
        Ok(())
    }

    /// Pins the first three input dimensions to one thread id.
    pub fn fix_inputs(&mut self, tid: [u64; 3]) -> Result<()> {
        for axis in 0..self.n_in.min(3) {
            if tid[axis] > i32::max_value() as u64 {
                return Err(ErrorKind::Overflow(
                    "thread id exceeds the 32-bit range the polyhedral backend \
                     can represent"
                        .to_string(),
                )
                .into());
            }
            let col = self.col_in(axis);
            let mut eq = vec![0i64; self.ncols()];
            eq[0] = -(tid[axis] as i64);
            eq[col] = 1;
            self.eqs.push(eq);
        }
        Ok(())
    }

    fn fix_out(&self, dim: usize, val: i64) -> BasicMap {
        let mut fixed = self.clone();
        let mut eq = vec![0i64; self.ncols()];
        eq[0] = -val;
        eq[self.col_out(dim)] = 1;
        fixed.eqs.push(eq);
        fixed
    }

    /// Inclusive integer bounds of one output dimension over the whole map,
    /// or `None` if the map is empty.
    pub fn out_bounds(&self, dim: usize) -> Result<Option<(i64, i64)>> {
        self.bounds_of(self.col_out(dim))
    }

    /// Linearises the output set into half-open index intervals.
    ///
    /// A 1-D output yields one interval `[min, max + 1)`. For a 2-D output
    /// the first dimension is the row (Polly lists the slowest-varying
    /// dimension first); every row `y` yields
    /// `[min_x + y * row_size, max_x + 1 + y * row_size)`.
    pub fn out_intervals(&self, row_size: u64) -> Result<Vec<(u64, u64)>> {
        let as_index = |v: i64| -> Result<u64> {
            u64::try_from(v).map_err(|_| {
                ErrorKind::InvalidState("access relation produced a negative array index".to_string())
                    .into()
            })
        };

        let mut res = Vec::new();
        match self.n_out {
            1 => {
                if let Some((lo, hi)) = self.out_bounds(0)? {
                    res.push((as_index(lo)?, as_index(hi)? + 1));
                }
            }
            2 => {
                if let Some((ylo, yhi)) = self.out_bounds(0)? {
                    as_index(ylo)?;
                    for y in ylo..=yhi {
                        let fixed = self.fix_out(0, y);
                        if let Some((xlo, xhi)) = fixed.out_bounds(1)? {
                            let base = as_index(y)? * row_size;
                            res.push((base + as_index(xlo)?, base + as_index(xhi)? + 1));
                        }
                    }
                }
            }
            n => {
                return Err(ErrorKind::InvalidArgument(format!(
                    "arrays with {} dimensions are not supported",
                    n
                ))
                .into());
            }
        }
        Ok(res)
    }

    /// Computes the bounds of column `target` by eliminating every other
    /// variable. `None` means the map is empty.
    fn bounds_of(&self, target: usize) -> Result<Option<(i64, i64)>> {
        let mut eqs = Vec::with_capacity(self.eqs.len());
        for row in &self.eqs {
            match normalize(row.clone(), true)? {
                Norm::Row(r) => eqs.push(r),
                Norm::True => {}
                Norm::False => return Ok(None),
            }
        }
        let mut ineqs = Vec::with_capacity(self.ineqs.len());
        for row in &self.ineqs {
            match normalize(row.clone(), false)? {
                Norm::Row(r) => ineqs.push(r),
                Norm::True => {}
                Norm::False => return Ok(None),
            }
        }

        for col in 1..self.ncols() {
            if col == target {
                continue;
            }
            if !eliminate(&mut eqs, &mut ineqs, col)? {
                return Ok(None);
            }
        }

        let mut lo: Option<i64> = None;
        let mut hi: Option<i64> = None;
        for row in &eqs {
            let (c0, c1) = (row[0], row[target]);
            if c1 == 0 {
                if c0 != 0 {
                    return Ok(None);
                }
                continue;
            }
            if (-c0) % c1 != 0 {
                return Ok(None);
            }
            let v = -c0 / c1;
            lo = Some(lo.map_or(v, |l| l.max(v)));
            hi = Some(hi.map_or(v, |h| h.min(v)));
        }
        for row in &ineqs {
            let (c0, c1) = (row[0], row[target]);
            if c1 == 0 {
                if c0 < 0 {
                    return Ok(None);
                }
            } else if c1 > 0 {
                let v = ceil_div(-c0, c1);
                lo = Some(lo.map_or(v, |l| l.max(v)));
            } else {
                let v = floor_div(c0, -c1);
                hi = Some(hi.map_or(v, |h| h.min(v)));
            }
        }
        match (lo, hi) {
            (Some(l), Some(h)) if l <= h => Ok(Some((l, h))),
            (Some(_), Some(_)) => Ok(None),
            _ => Err(ErrorKind::InvalidState(
                "unbounded dimension in an access set".to_string(),
            )
            .into()),
        }
    }
}

/// Removes variable `col` from the system. Returns `false` if the system
/// became infeasible.
fn eliminate(eqs: &mut Vec<Vec<i64>>, ineqs: &mut Vec<Vec<i64>>, col: usize) -> Result<bool> {
    // Substitute along an equality when one carries the variable.
    if let Some(i) = eqs.iter().position(|r| r[col] != 0) {
        let pivot = eqs.remove(i);
        let a = pivot[col];
        let scale = a.abs() as i128;
        let sign: i128 = if a > 0 { 1 } else { -1 };

        let subst = |row: &Vec<i64>| -> Result<Option<Vec<i64>>> {
            if row[col] == 0 {
                return Ok(Some(row.clone()));
            }
            let r = combine(row, scale, &pivot, -(sign * row[col] as i128))?;
            debug_assert_eq!(r[col], 0);
            Ok(Some(r))
        };

        let mut new_eqs = Vec::with_capacity(eqs.len());
        for row in eqs.iter() {
            if let Some(r) = subst(row)? {
                match normalize(r, true)? {
                    Norm::Row(r) => new_eqs.push(r),
                    Norm::True => {}
                    Norm::False => return Ok(false),
                }
            }
        }
        let mut new_ineqs = Vec::with_capacity(ineqs.len());
        for row in ineqs.iter() {
            if let Some(r) = subst(row)? {
                match normalize(r, false)? {
                    Norm::Row(r) => new_ineqs.push(r),
                    Norm::True => {}
                    Norm::False => return Ok(false),
                }
            }
        }
        *eqs = new_eqs;
        *ineqs = new_ineqs;
        return Ok(true);
    }

    // Fourier-Motzkin on the inequalities.
    let mut kept = Vec::new();
    let mut lowers = Vec::new();
    let mut uppers = Vec::new();
    for row in ineqs.drain(..) {
        if row[col] == 0 {
            kept.push(row);
        } else if row[col] > 0 {
            lowers.push(row);
        } else {
            uppers.push(row);
        }
    }
    for l in &lowers {
        for u in &uppers {
            let row = combine(l, (-u[col]) as i128, u, l[col] as i128)?;
            debug_assert_eq!(row[col], 0);
            match normalize(row, false)? {
                Norm::Row(r) => kept.push(r),
                Norm::True => {}
                Norm::False => return Ok(false),
            }
        }
    }
    *ineqs = kept;
    Ok(true)
}

/// `lc * lhs + rc * rhs` with overflow checking.
fn combine(lhs: &[i64], lc: i128, rhs: &[i64], rc: i128) -> Result<Vec<i64>> {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(&l, &r)| {
            let v = lc * l as i128 + rc * r as i128;
            i64::try_from(v)
                .map_err(|_| ErrorKind::Overflow("constraint coefficient overflow".to_string()).into())
        })
        .collect()
}

/// Divides the row by the gcd of its variable coefficients, tightening the
/// constant to the integer hull for inequalities.
fn normalize(mut row: Vec<i64>, is_eq: bool) -> Result<Norm> {
    let g = row[1..].iter().fold(0i64, |acc, &c| gcd(acc, c));
    if g == 0 {
        if is_eq {
            return Ok(if row[0] != 0 { Norm::False } else { Norm::True });
        }
        return Ok(if row[0] < 0 { Norm::False } else { Norm::True });
    }
    if g > 1 {
        if is_eq {
            if row[0] % g != 0 {
                return Ok(Norm::False);
            }
            row[0] /= g;
        } else {
            row[0] = floor_div(row[0], g);
        }
        for c in row[1..].iter_mut() {
            *c /= g;
        }
    }
    Ok(Norm::Row(row))
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn floor_div(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    let q = a / b;
    if a % b != 0 && a < 0 {
        q - 1
    } else {
        q
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -floor_div(-a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_identity_map() {
        let umap =
            UnionMap::from_str("[N] -> { Stmt[i0, i1, i2] -> Ref[i0] : 0 <= i0 < N }").unwrap();
        assert_eq!(umap.num_params(), 1);
        assert_eq!(umap.maps().len(), 1);
        let map = &umap.maps()[0];
        assert_eq!(map.num_inputs(), 3);
        assert_eq!(map.num_outputs(), 1);
        assert_eq!(map.out_name(), "Ref");
    }

    #[test]
    fn bounds_after_param_fix() {
        let umap =
            UnionMap::from_str("[N] -> { Stmt[i0, i1, i2] -> Ref[1 + i0] : 0 <= i0 < N }").unwrap();
        let fixed = umap.fix_params(&[10]).unwrap();
        let map = &fixed.maps()[0];
        assert_eq!(map.out_bounds(0).unwrap(), Some((1, 10)));
    }

    #[test]
    fn bound_inputs_restricts_range() {
        let umap =
            UnionMap::from_str("[N] -> { Stmt[i0, i1, i2] -> Ref[i0] : 0 <= i0 < N }").unwrap();
        let fixed = umap.fix_params(&[100]).unwrap();
        let mut map = fixed.maps()[0].clone();
        map.bound_inputs([10, 0, 0], [5, 1, 1]).unwrap();
        assert_eq!(map.out_bounds(0).unwrap(), Some((10, 14)));
        assert_eq!(map.out_intervals(0).unwrap(), vec![(10, 15)]);
    }

    #[test]
    fn empty_intersection_has_no_bounds() {
        let umap = UnionMap::from_str("{ Stmt[i0, i1, i2] -> Ref[i0] : 0 <= i0 < 4 }").unwrap();
        let mut map = umap.maps()[0].clone();
        map.bound_inputs([8, 0, 0], [4, 1, 1]).unwrap();
        assert_eq!(map.out_bounds(0).unwrap(), None);
        assert!(map.out_intervals(0).unwrap().is_empty());
    }

    #[test]
    fn two_dimensional_rows_are_linearised() {
        // A 3 x 4 rectangle of elements starting at row 2, column 1 on an
        // array with 16 columns.
        let umap = UnionMap::from_str(
            "{ Stmt[i0, i1, i2] -> Ref[i1, i0] : 1 <= i0 <= 4 and 2 <= i1 <= 4 }",
        )
        .unwrap();
        let map = &umap.maps()[0];
        assert_eq!(
            map.out_intervals(16).unwrap(),
            vec![(33, 37), (49, 53), (65, 69)]
        );
    }

    #[test]
    fn union_members_parse_separately() {
        let umap = UnionMap::from_str(
            "[N] -> { S[i0, i1, i2] -> R[i0] : 0 <= i0 < N; \
             T[i0, i1, i2, i3] -> R[i3] : 0 <= i3 < N }",
        )
        .unwrap();
        assert_eq!(umap.maps().len(), 2);
        assert_eq!(umap.maps()[0].num_inputs(), 3);
        assert_eq!(umap.maps()[1].num_inputs(), 4);
    }

    #[test]
    fn equality_substitution_is_exact() {
        let umap = UnionMap::from_str("{ S[i0, i1, i2] -> R[2 * i0] : 0 <= i0 <= 3 }").unwrap();
        let map = &umap.maps()[0];
        assert_eq!(map.out_bounds(0).unwrap(), Some((0, 6)));
    }

    #[test]
    fn fix_inputs_pins_the_thread() {
        let umap = UnionMap::from_str(
            "{ S[i0, i1, i2] -> R[i1, i0] : 0 <= i0 <= 7 and 0 <= i1 <= 7 }",
        )
        .unwrap();
        let mut map = umap.maps()[0].clone();
        map.fix_inputs([3, 5, 0]).unwrap();
        assert_eq!(map.out_intervals(8).unwrap(), vec![(43, 44)]);
    }

    #[test]
    fn rejects_disjunctions() {
        assert!(UnionMap::from_str("{ S[i0] -> R[i0] : i0 = 0 or i0 = 2 }").is_err());
    }

    #[test]
    fn negative_chain_constraints() {
        let umap =
            UnionMap::from_str("[N] -> { S[i0, i1, i2] -> R[i0] : 0 < i0 <= -2 + N }").unwrap();
        let fixed = umap.fix_params(&[8]).unwrap();
        assert_eq!(fixed.maps()[0].out_bounds(0).unwrap(), Some((1, 6)));
    }
}
