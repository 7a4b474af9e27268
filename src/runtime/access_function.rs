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

//! Symbolic access relations of one kernel argument.
//!
//! The analysis only knows the access behaviour up to the launch parameters:
//! the relations carry named parameters like `size_x` or `arg2` whose values
//! become known when the kernel is launched. An access function pairs the
//! read and write relation of one argument with the ordered parameter
//! descriptor expressions, and instantiates them against concrete launch
//! arguments. Map text is parsed once at database load; the hot path never
//! touches strings.

use super::argument::KernelArg;
use crate::error::{ErrorKind, Result};
use crate::polyhedral::UnionMap;
use std::collections::BTreeSet;

/// Access direction selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug)]
struct Relation {
    map: UnionMap,
    /// Parameter descriptor expressions, one per map parameter, in map
    /// parameter order.
    params: Vec<String>,
}

/// Read and write relation of one kernel argument.
#[derive(Debug)]
pub struct AccessFunction {
    arg_nr: usize,
    read: Option<Relation>,
    write: Option<Relation>,
}

impl AccessFunction {
    pub fn new(
        arg_nr: usize,
        read_map: &str,
        read_params: &[String],
        write_map: &str,
        write_params: &[String],
    ) -> Result<Self> {
        Ok(Self {
            arg_nr,
            read: Relation::parse(read_map, read_params)?,
            write: Relation::parse(write_map, write_params)?,
        })
    }

    /// The argument number this access function belongs to.
    pub fn arg_nr(&self) -> usize {
        self.arg_nr
    }

    pub fn has_read(&self) -> bool {
        self.read.is_some()
    }

    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }

    pub fn has(&self, dir: Direction) -> bool {
        self.relation(dir).is_some()
    }

    fn relation(&self, dir: Direction) -> Option<&Relation> {
        match dir {
            Direction::Read => self.read.as_ref(),
            Direction::Write => self.write.as_ref(),
        }
    }

    /// Resolves one parameter descriptor against concrete launch state.
    ///
    /// `arg<k>` tokens take the scalar value of kernel argument `k`, cast by
    /// its fundamental type; `size_{x,y,z}` take the launch size
    /// `grid * block` of the axis. Fails for references to non-scalar
    /// arguments and for values outside the 32-bit range of the polyhedral
    /// backend.
    pub fn resolve_param(
        &self,
        dir: Direction,
        param_id: usize,
        args: &[KernelArg],
        grid: [u32; 3],
        block: [u32; 3],
    ) -> Result<i64> {
        let rel = self.relation(dir).ok_or_else(|| {
            ErrorKind::InvalidArgument(format!(
                "argument {} has no {:?} access relation",
                self.arg_nr, dir
            ))
        })?;
        let expr = rel.params.get(param_id).ok_or_else(|| {
            ErrorKind::InvalidArgument(format!(
                "parameter id {} exceeds the {} given parameter descriptions",
                param_id,
                rel.params.len()
            ))
        })?;

        let value = eval_expr(expr, &|name| lookup_ident(name, args, grid, block))?;
        if value > i32::max_value() as i64 || value < i32::min_value() as i64 {
            return Err(ErrorKind::Overflow(format!(
                "parameter '{}' = {} cannot be handled by the polyhedral \
                 backend; choose smaller kernel arguments",
                expr, value
            ))
            .into());
        }
        Ok(value)
    }

    /// Instantiates the symbolic relation: resolves every parameter, fixes
    /// it in the map and projects the parameter dimensions away. `None` for
    /// an absent relation.
    pub fn instantiate(
        &self,
        dir: Direction,
        args: &[KernelArg],
        grid: [u32; 3],
        block: [u32; 3],
    ) -> Result<Option<UnionMap>> {
        let rel = match self.relation(dir) {
            Some(rel) => rel,
            None => return Ok(None),
        };
        let vals = (0..rel.map.num_params())
            .map(|i| self.resolve_param(dir, i, args, grid, block))
            .collect::<Result<Vec<i64>>>()?;
        Ok(Some(rel.map.fix_params(&vals)?))
    }

    /// Linear indices accessed by one thread. Exercised by the test suite;
    /// the launch path works on whole partitions instead.
    pub fn evaluate_at(
        &self,
        dir: Direction,
        tid: [u64; 3],
        args: &[KernelArg],
        grid: [u32; 3],
        block: [u32; 3],
    ) -> Result<Vec<u64>> {
        let umap = match self.instantiate(dir, args, grid, block)? {
            Some(umap) => umap,
            None => return Ok(Vec::new()),
        };
        let row_size = args[self.arg_nr].dim_sizes().first().copied().unwrap_or(0) as u64;

        let mut indices = BTreeSet::new();
        for map in umap.maps() {
            let mut fixed = map.clone();
            fixed.fix_inputs(tid)?;
            for (from, to) in fixed.out_intervals(row_size)? {
                indices.extend(from..to);
            }
        }
        Ok(indices.into_iter().collect())
    }
}

impl Relation {
    fn parse(map_text: &str, params: &[String]) -> Result<Option<Self>> {
        if map_text.is_empty() || map_text == "null" || map_text == "None" {
            return Ok(None);
        }
        let map = UnionMap::from_str(map_text)?;
        if map.is_empty() {
            return Ok(None);
        }
        if params.len() < map.num_params() {
            return Err(ErrorKind::InvalidDatabase(format!(
                "access relation has {} parameters but only {} descriptors",
                map.num_params(),
                params.len()
            ))
            .into());
        }
        Ok(Some(Self {
            map,
            params: params.to_vec(),
        }))
    }
}

fn lookup_ident(name: &str, args: &[KernelArg], grid: [u32; 3], block: [u32; 3]) -> Result<i64> {
    match name {
        "size_x" => Ok(grid[0] as i64 * block[0] as i64),
        "size_y" => Ok(grid[1] as i64 * block[1] as i64),
        "size_z" => Ok(grid[2] as i64 * block[2] as i64),
        n if n.starts_with("arg") => {
            let nr = n[3..].parse::<usize>().map_err(|_| {
                ErrorKind::ParseError(format!("unknown parameter token '{}'", n))
            })?;
            let arg = args.get(nr).ok_or_else(|| {
                ErrorKind::InvalidArgument(format!(
                    "parameter references argument {}, but the launch has \
                     only {} arguments",
                    nr,
                    args.len()
                ))
            })?;
            if !arg.ty().is_fund_type() || arg.ty().ptr_level() != 0 {
                return Err(ErrorKind::InvalidArgument(format!(
                    "parameter references argument {} of type '{}', which is \
                     not a scalar fundamental type",
                    nr,
                    arg.ty().name()
                ))
                .into());
            }
            if arg.ty().is_float() {
                Ok(arg.as_f32()? as i64)
            } else if arg.ty().is_double() {
                Ok(arg.as_f64()? as i64)
            } else {
                arg.as_i64()
            }
        }
        n => Err(ErrorKind::ParseError(format!(
            "unknown parameter token '{}'; maybe a new keyword was introduced",
            n
        ))
        .into()),
    }
}

/// Evaluates a parameter descriptor expression.
///
/// `*` and `/` share one precedence level, `+` and `-` share the other;
/// operators of equal precedence evaluate left to right.
fn eval_expr(text: &str, lookup: &dyn Fn(&str) -> Result<i64>) -> Result<i64> {
    let mut parser = ExprParser {
        bytes: text.as_bytes(),
        pos: 0,
        lookup,
    };
    let value = parser.expr()?;
    parser.skip_spaces();
    if parser.pos != parser.bytes.len() {
        return Err(ErrorKind::ParseError(format!(
            "trailing input in parameter expression '{}'",
            text
        ))
        .into());
    }
    Ok(value)
}

struct ExprParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Result<i64>,
}

impl<'a> ExprParser<'a> {
    fn skip_spaces(&mut self) {
        while self.pos < self.bytes.len() && (self.bytes[self.pos] as char).is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_spaces();
        self.bytes.get(self.pos).map(|&b| b as char)
    }

    fn expr(&mut self) -> Result<i64> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Some('-') => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<i64> {
        let mut acc = self.factor()?;
        loop {
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    acc *= self.factor()?;
                }
                Some('/') => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0 {
                        return Err(ErrorKind::ParseError(
                            "division by zero in parameter expression".to_string(),
                        )
                        .into());
                    }
                    acc /= rhs;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn factor(&mut self) -> Result<i64> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let v = self.expr()?;
                if self.peek() != Some(')') {
                    return Err(ErrorKind::ParseError(
                        "missing closing bracket in parameter expression".to_string(),
                    )
                    .into());
                }
                self.pos += 1;
                Ok(v)
            }
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self.pos < self.bytes.len()
                    && (self.bytes[self.pos] as char).is_ascii_digit()
                {
                    self.pos += 1;
                }
                let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
                text.parse::<i64>().map_err(|_| {
                    ErrorKind::ParseError(format!("integer '{}' overflows", text)).into()
                })
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let start = self.pos;
                while self.pos < self.bytes.len() {
                    let c = self.bytes[self.pos] as char;
                    if c.is_ascii_alphanumeric() || c == '_' {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                let name = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
                (self.lookup)(name)
            }
            _ => Err(ErrorKind::ParseError(
                "could not parse the access relation parameter".to_string(),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::cuda::CUdeviceptr;
    use super::super::fixtures;
    use super::super::kernel_info::KernelInfo;
    use super::*;

    fn stencil_args(n: i32) -> Vec<KernelArg> {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let types = info.arg_types();
        let d_in: CUdeviceptr = 0;
        let d_out: CUdeviceptr = 1;
        vec![
            KernelArg::from_bytes(types[0].clone(), &d_in.to_le_bytes(), vec![n as usize])
                .unwrap(),
            KernelArg::from_bytes(types[1].clone(), &d_out.to_le_bytes(), vec![n as usize])
                .unwrap(),
            KernelArg::from_bytes(types[2].clone(), &n.to_le_bytes(), vec![]).unwrap(),
        ]
    }

    #[test]
    fn resolves_argument_backed_parameters() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let af = info.acc_func(0);
        let args = stencil_args(16);
        // Parameter order is [size_x, size_y, size_z, N].
        assert_eq!(
            af.resolve_param(Direction::Read, 3, &args, [8, 8, 1], [2, 2, 1])
                .unwrap(),
            16
        );
        assert_eq!(
            af.resolve_param(Direction::Read, 0, &args, [8, 8, 1], [2, 2, 1])
                .unwrap(),
            16
        );
    }

    #[test]
    fn rejects_parameters_outside_the_backend_range() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let af = info.acc_func(0);
        let args = stencil_args(16);
        // size_x = 70000^2 exceeds the signed 32-bit range.
        assert!(af
            .resolve_param(Direction::Read, 0, &args, [70000, 1, 1], [70000, 1, 1])
            .is_err());
    }

    #[test]
    fn evaluate_at_reproduces_the_stencil_pattern() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let af = info.acc_func(0);
        let args = stencil_args(16);

        let reads = af
            .evaluate_at(Direction::Read, [2, 2, 0], &args, [8, 8, 1], [2, 2, 1])
            .unwrap();
        // Five-point stencil at (x, y) = (2, 2) on a 16-wide array: the
        // element itself, above, below, left and right.
        assert_eq!(reads, vec![18, 33, 34, 35, 50]);

        let writes = af
            .evaluate_at(Direction::Write, [2, 2, 0], &args, [8, 8, 1], [2, 2, 1])
            .unwrap();
        assert!(writes.is_empty());

        let af_out = info.acc_func(1);
        let writes = af_out
            .evaluate_at(Direction::Write, [2, 2, 0], &args, [8, 8, 1], [2, 2, 1])
            .unwrap();
        assert_eq!(writes, vec![34]);
    }

    #[test]
    fn border_threads_access_nothing() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let af = info.acc_func(0);
        let args = stencil_args(16);
        let reads = af
            .evaluate_at(Direction::Read, [0, 0, 0], &args, [8, 8, 1], [2, 2, 1])
            .unwrap();
        assert!(reads.is_empty());
    }

    #[test]
    fn expression_evaluator_has_flat_precedence() {
        let lookup = |_: &str| -> Result<i64> { Ok(7) };
        assert_eq!(eval_expr("3 * 4 / 5 * 2", &lookup).unwrap(), 4);
        assert_eq!(eval_expr("1 + 2 * 3", &lookup).unwrap(), 7);
        assert_eq!(eval_expr("(1 + 2) * 3", &lookup).unwrap(), 9);
        assert_eq!(eval_expr("arg9 + 10", &lookup).unwrap(), 17);
        assert!(eval_expr("3 /", &lookup).is_err());
        assert!(eval_expr("4 / 0", &lookup).is_err());
    }

    #[test]
    fn non_scalar_parameter_references_fail() {
        let info = &KernelInfo::create_infos(fixtures::STENCIL5P_DB).unwrap()[0];
        let args = stencil_args(16);
        // A fabricated access function whose parameter references the
        // pointer argument 0.
        let af = AccessFunction::new(
            0,
            "[N] -> { S[i0, i1, i2] -> R[i0] : 0 <= i0 < N }",
            &["arg0".to_string()],
            "",
            &[],
        )
        .unwrap();
        assert!(af
            .resolve_param(Direction::Read, 0, &args, [8, 8, 1], [2, 2, 1])
            .is_err());
    }
}
