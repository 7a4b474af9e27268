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

//! Parser for the ISL map text emitted by the kernel analysis.
//!
//! Supported syntax:
//!
//! ```text
//! [size_x, N] -> { Stmt[i0, i1, i2] -> MemRef[i1, 1 + i0] :
//!                  0 < i0 <= -2 + N and 0 <= i1 < size_x ; ... }
//! ```
//!
//! Conditions are conjunctions of comparison chains over affine expressions.
//! `or`, `exists`, `floord` and `mod` do not occur in the analysis output and
//! are rejected.

use super::{BasicMap, UnionMap};
use crate::error::{ErrorKind, Result};

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Int(i64),
    Ident(String),
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Semi,
    Colon,
    Arrow,
    Le,
    Lt,
    Ge,
    Gt,
    Equal,
    Plus,
    Minus,
    Star,
}

fn parse_err(msg: impl Into<String>) -> crate::error::Error {
    ErrorKind::ParseError(msg.into()).into()
}

fn tokenize(text: &str) -> Result<Vec<Tok>> {
    let mut toks = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '[' => {
                toks.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                toks.push(Tok::RBracket);
                i += 1;
            }
            '{' => {
                toks.push(Tok::LBrace);
                i += 1;
            }
            '}' => {
                toks.push(Tok::RBrace);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            ';' => {
                toks.push(Tok::Semi);
                i += 1;
            }
            ':' => {
                toks.push(Tok::Colon);
                i += 1;
            }
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '-' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'>' {
                    toks.push(Tok::Arrow);
                    i += 2;
                } else {
                    toks.push(Tok::Minus);
                    i += 1;
                }
            }
            '<' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    toks.push(Tok::Le);
                    i += 2;
                } else {
                    toks.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    toks.push(Tok::Ge);
                    i += 2;
                } else {
                    toks.push(Tok::Gt);
                    i += 1;
                }
            }
            '=' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    i += 2;
                } else {
                    i += 1;
                }
                toks.push(Tok::Equal);
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let v = text[start..i]
                    .parse::<i64>()
                    .map_err(|_| parse_err(format!("integer literal '{}' overflows", &text[start..i])))?;
                toks.push(Tok::Int(v));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Ident(text[start..i].to_string()));
            }
            _ => return Err(parse_err(format!("unexpected character '{}' in map text", c))),
        }
    }
    Ok(toks)
}

/// Affine expression over the parameter and input variables.
#[derive(Clone, Debug)]
struct LinExpr {
    c: i64,
    coeffs: Vec<i64>,
}

impl LinExpr {
    fn constant(nvars: usize, c: i64) -> Self {
        Self {
            c,
            coeffs: vec![0; nvars],
        }
    }

    fn var(nvars: usize, idx: usize) -> Self {
        let mut coeffs = vec![0; nvars];
        coeffs[idx] = 1;
        Self { c: 0, coeffs }
    }

    fn add(mut self, other: &LinExpr) -> Self {
        self.c += other.c;
        for (a, b) in self.coeffs.iter_mut().zip(other.coeffs.iter()) {
            *a += b;
        }
        self
    }

    fn sub(mut self, other: &LinExpr) -> Self {
        self.c -= other.c;
        for (a, b) in self.coeffs.iter_mut().zip(other.coeffs.iter()) {
            *a -= b;
        }
        self
    }

    fn scale(mut self, s: i64) -> Self {
        self.c *= s;
        for a in self.coeffs.iter_mut() {
            *a *= s;
        }
        self
    }

    fn as_constant(&self) -> Option<i64> {
        if self.coeffs.iter().all(|&c| c == 0) {
            Some(self.c)
        } else {
            None
        }
    }
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Result<Tok> {
        let tok = self
            .toks
            .get(self.pos)
            .cloned()
            .ok_or_else(|| parse_err("unexpected end of map text"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(parse_err(format!(
                "expected {:?}, found {:?}",
                tok,
                self.peek()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.next()? {
            Tok::Ident(name) => Ok(name),
            tok => Err(parse_err(format!("expected identifier, found {:?}", tok))),
        }
    }

    fn eat_ident_opt(&mut self) -> Option<String> {
        if let Some(Tok::Ident(_)) = self.peek() {
            if let Ok(Tok::Ident(name)) = self.next() {
                return Some(name);
            }
        }
        None
    }

    fn basic_map(&mut self, params: &[String]) -> Result<BasicMap> {
        let in_name = self.eat_ident_opt().unwrap_or_default();
        let in_dims = self.ident_tuple()?;
        self.expect(&Tok::Arrow)?;
        let out_name = self.eat_ident_opt().unwrap_or_default();

        // Parameters first, then input dims; matches the row layout.
        let mut scope: Vec<String> = params.to_vec();
        scope.extend(in_dims.iter().cloned());

        self.expect(&Tok::LBracket)?;
        let mut out_exprs = Vec::new();
        if !self.eat(&Tok::RBracket) {
            loop {
                out_exprs.push(self.expr(&scope)?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(&Tok::RBracket)?;
        }

        let n_params = params.len();
        let n_in = in_dims.len();
        let n_out = out_exprs.len();
        let ncols = 1 + n_params + n_in + n_out;

        let widen = |e: &LinExpr| -> Vec<i64> {
            let mut row = Vec::with_capacity(ncols);
            row.push(e.c);
            row.extend_from_slice(&e.coeffs);
            row.extend(std::iter::repeat(0).take(n_out));
            row
        };

        let mut eqs = Vec::new();
        let mut ineqs = Vec::new();

        // out_k = expr  <=>  expr - out_k = 0
        for (k, e) in out_exprs.iter().enumerate() {
            let mut row = widen(e);
            row[1 + n_params + n_in + k] = -1;
            eqs.push(row);
        }

        if self.eat(&Tok::Colon) {
            loop {
                self.chain(&scope, &widen, &mut eqs, &mut ineqs)?;
                let keyword = match self.peek() {
                    Some(Tok::Ident(name)) => name.clone(),
                    _ => break,
                };
                match keyword.as_str() {
                    "and" => {
                        self.pos += 1;
                    }
                    "or" | "exists" => {
                        return Err(parse_err(format!(
                            "'{}' conditions are not supported",
                            keyword
                        )));
                    }
                    _ => break,
                }
            }
        }

        Ok(BasicMap {
            in_name,
            out_name,
            n_params,
            n_in,
            n_out,
            eqs,
            ineqs,
        })
    }

    fn ident_tuple(&mut self) -> Result<Vec<String>> {
        self.expect(&Tok::LBracket)?;
        let mut dims = Vec::new();
        if !self.eat(&Tok::RBracket) {
            loop {
                dims.push(self.expect_ident()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(&Tok::RBracket)?;
        }
        Ok(dims)
    }

    /// Parses one comparison chain like `0 < i0 <= -2 + N` and emits a
    /// constraint row per adjacent pair.
    fn chain(
        &mut self,
        scope: &[String],
        widen: &dyn Fn(&LinExpr) -> Vec<i64>,
        eqs: &mut Vec<Vec<i64>>,
        ineqs: &mut Vec<Vec<i64>>,
    ) -> Result<()> {
        let mut lhs = self.expr(scope)?;
        let mut got_op = false;
        loop {
            let op = match self.peek() {
                Some(Tok::Le) | Some(Tok::Lt) | Some(Tok::Ge) | Some(Tok::Gt)
                | Some(Tok::Equal) => self.next()?,
                _ => break,
            };
            got_op = true;
            let rhs = self.expr(scope)?;
            match op {
                // a <= b  <=>  b - a >= 0
                Tok::Le => ineqs.push(widen(&rhs.clone().sub(&lhs))),
                // a < b  <=>  b - a - 1 >= 0
                Tok::Lt => {
                    let mut row = widen(&rhs.clone().sub(&lhs));
                    row[0] -= 1;
                    ineqs.push(row);
                }
                Tok::Ge => ineqs.push(widen(&lhs.clone().sub(&rhs))),
                Tok::Gt => {
                    let mut row = widen(&lhs.clone().sub(&rhs));
                    row[0] -= 1;
                    ineqs.push(row);
                }
                Tok::Equal => eqs.push(widen(&lhs.clone().sub(&rhs))),
                _ => unreachable!(),
            }
            lhs = rhs;
        }
        if !got_op {
            return Err(parse_err("expected a comparison in the condition"));
        }
        Ok(())
    }

    fn expr(&mut self, scope: &[String]) -> Result<LinExpr> {
        let mut acc = self.term(scope)?;
        loop {
            if self.eat(&Tok::Plus) {
                let t = self.term(scope)?;
                acc = acc.add(&t);
            } else if self.eat(&Tok::Minus) {
                let t = self.term(scope)?;
                acc = acc.sub(&t);
            } else {
                break;
            }
        }
        Ok(acc)
    }

    fn term(&mut self, scope: &[String]) -> Result<LinExpr> {
        let mut acc = self.factor(scope)?;
        while self.eat(&Tok::Star) {
            let rhs = self.factor(scope)?;
            acc = match (acc.as_constant(), rhs.as_constant()) {
                (Some(c), _) => rhs.scale(c),
                (_, Some(c)) => acc.scale(c),
                _ => {
                    return Err(parse_err(
                        "non-affine product of two variables in map text",
                    ))
                }
            };
        }
        Ok(acc)
    }

    fn factor(&mut self, scope: &[String]) -> Result<LinExpr> {
        match self.next()? {
            Tok::Int(v) => {
                // ISL prints coefficients by juxtaposition, e.g. `2i0`.
                if let Some(Tok::Ident(_)) = self.peek() {
                    let var = self.factor(scope)?;
                    Ok(var.scale(v))
                } else {
                    Ok(LinExpr::constant(scope.len(), v))
                }
            }
            Tok::Ident(name) => {
                let idx = scope.iter().position(|s| *s == name).ok_or_else(|| {
                    parse_err(format!("unknown identifier '{}' in map text", name))
                })?;
                Ok(LinExpr::var(scope.len(), idx))
            }
            Tok::Minus => Ok(self.factor(scope)?.scale(-1)),
            Tok::LParen => {
                let e = self.expr(scope)?;
                self.expect(&Tok::RParen)?;
                Ok(e)
            }
            tok => Err(parse_err(format!(
                "unexpected token {:?} in map expression",
                tok
            ))),
        }
    }
}

pub(super) fn union_map(text: &str) -> Result<UnionMap> {
    let toks = tokenize(text)?;
    let mut p = Parser { toks, pos: 0 };

    let mut param_names = Vec::new();
    if p.peek() == Some(&Tok::LBracket) {
        param_names = p.ident_tuple()?;
        p.expect(&Tok::Arrow)?;
    }

    p.expect(&Tok::LBrace)?;
    let mut maps = Vec::new();
    if !p.eat(&Tok::RBrace) {
        loop {
            maps.push(p.basic_map(&param_names)?);
            if !p.eat(&Tok::Semi) {
                break;
            }
        }
        p.expect(&Tok::RBrace)?;
    }
    if p.pos != p.toks.len() {
        return Err(parse_err("trailing tokens after map text"));
    }

    Ok(UnionMap { param_names, maps })
}
