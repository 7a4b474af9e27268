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

use crate::runtime::cuda::CUresult;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal runtime condition.
///
/// Driver errors are carried verbatim; everything else is a condition raised
/// by the runtime itself. The wrapping layer translates errors into a raw
/// `CUresult` where the interposed API requires one.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug)]
pub enum ErrorKind {
    /// A driver call failed; the raw code is propagated unchanged.
    Cuda(CUresult),
    /// A caller violated a runtime contract.
    InvalidArgument(String),
    /// The kernel analysis database is missing or malformed.
    InvalidDatabase(String),
    /// A map or parameter expression could not be parsed.
    ParseError(String),
    /// A value exceeds the range the polyhedral backend can represent.
    Overflow(String),
    /// A partition exceeds a device limit.
    DeviceLimit(String),
    /// A runtime invariant does not hold.
    InvalidState(String),
    Io(io::Error),
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The raw driver result the wrapping layer reports for this error.
    pub fn to_cuda_result(&self) -> CUresult {
        match self.kind {
            ErrorKind::Cuda(res) => res,
            _ => CUresult::CUDA_ERROR_UNKNOWN,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Cuda(res) => write!(f, "CUDA driver error {}", res.0),
            ErrorKind::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ErrorKind::InvalidDatabase(msg) => write!(f, "Invalid kernel database: {}", msg),
            ErrorKind::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ErrorKind::Overflow(msg) => write!(f, "Overflow: {}", msg),
            ErrorKind::DeviceLimit(msg) => write!(f, "Device limit exceeded: {}", msg),
            ErrorKind::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            ErrorKind::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

impl From<CUresult> for Error {
    fn from(res: CUresult) -> Self {
        Self {
            kind: ErrorKind::Cuda(res),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self {
            kind: ErrorKind::Io(e),
        }
    }
}
