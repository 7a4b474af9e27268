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

//! Analysis databases used across the test suite.
//!
//! `STENCIL5P_DB` describes a two-dimensional 5-point stencil on an `N x N`
//! float array, split along the y axis. `NBODY_DB` describes the two kernels
//! of an n-body integrator on one-dimensional float arrays, split along x.

pub const STENCIL5P_DB: &str = r#"
{
 "kernels" :
 [
  {
   "arguments" :
   [
    {
     "dim sizes" : [ "arg2" ],
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_if_then[i0, i1, i2] -> MemRef_in[i1, 1 + i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 < i0 <= -2 + N and i0 < size_x and 0 < i1 <= -2 + N and i1 < size_y and 0 <= i2 < size_z; Stmt_if_then[i0, i1, i2] -> MemRef_in[1 + i1, i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 < i0 <= -2 + N and i0 < size_x and 0 < i1 <= -2 + N and i1 < size_y and 0 <= i2 < size_z; Stmt_if_then[i0, i1, i2] -> MemRef_in[i1, i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 < i0 <= -2 + N and i0 < size_x and 0 < i1 <= -2 + N and i1 < size_y and 0 <= i2 < size_z; Stmt_if_then[i0, i1, i2] -> MemRef_in[-1 + i1, i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 < i0 <= -2 + N and i0 < size_x and 0 < i1 <= -2 + N and i1 < size_y and 0 <= i2 < size_z; Stmt_if_then[i0, i1, i2] -> MemRef_in[i1, -1 + i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 < i0 <= -2 + N and i0 < size_x and 0 < i1 <= -2 + N and i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg2" ],
     "name" : "in",
     "num dimensions" : 2,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "dim sizes" : [ "arg2" ],
     "element size" : 32,
     "fundamental type" : "f",
     "isl write map" : "[size_x, size_y, size_z, N] -> { Stmt_if_then[i0, i1, i2] -> MemRef_out[i1, i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 < i0 <= -2 + N and i0 < size_x and 0 < i1 <= -2 + N and i1 < size_y and 0 <= i2 < size_z }",
     "isl write params" : [ "size_x", "size_y", "size_z", "arg2" ],
     "name" : "out",
     "num dimensions" : 2,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 0,
     "fundamental type" : "i",
     "name" : "N",
     "pointer level" : 0,
     "size" : 32,
     "type name" : "i32"
    }
   ],
   "name" : "stencil5p_2D",
   "partitioning" : "y"
  }
 ]
}
"#;

pub const NBODY_DB: &str = r#"
{
 "kernels" :
 [
  {
   "arguments" :
   [
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_pos_x[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z" ],
     "isl write map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_pos_x[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl write params" : [ "size_x", "size_y", "size_z" ],
     "name" : "pos_x",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_pos_y[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z" ],
     "isl write map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_pos_y[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl write params" : [ "size_x", "size_y", "size_z" ],
     "name" : "pos_y",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_pos_z[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z" ],
     "isl write map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_pos_z[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl write params" : [ "size_x", "size_y", "size_z" ],
     "name" : "pos_z",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_vel_x[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z" ],
     "name" : "vel_x",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_vel_y[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z" ],
     "name" : "vel_y",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z] -> { Stmt_entry[i0, i1, i2] -> MemRef_vel_z[i0] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z" ],
     "name" : "vel_z",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 0,
     "fundamental type" : "f",
     "name" : "dt",
     "pointer level" : 0,
     "size" : 32,
     "type name" : "float"
    },
    {
     "element size" : 0,
     "fundamental type" : "i",
     "name" : "N",
     "pointer level" : 0,
     "size" : 32,
     "type name" : "i32"
    }
   ],
   "name" : "updatePositions",
   "partitioning" : "x"
  },
  {
   "arguments" :
   [
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_cond_end[i0, i1, i2, i3] -> MemRef_masses[i3] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z and 0 <= i3 < N }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "name" : "masses",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_for_body_lr_ph[i0, i1, i2] -> MemRef_pos_x[i0] : N > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z; Stmt_for_body__TO__cond_end[i0, i1, i2, i3] -> MemRef_pos_x[i3] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z and 0 <= i3 < N }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "name" : "pos_x",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_for_body__TO__cond_end[i0, i1, i2, i3] -> MemRef_pos_y[i3] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z and 0 <= i3 < N; Stmt_for_body_lr_ph[i0, i1, i2] -> MemRef_pos_y[i0] : N > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "name" : "pos_y",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_for_body__TO__cond_end[i0, i1, i2, i3] -> MemRef_pos_z[i3] : 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z and 0 <= i3 < N; Stmt_for_body_lr_ph[i0, i1, i2] -> MemRef_pos_z[i0] : N > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "name" : "pos_z",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_for_end[i0, i1, i2] -> MemRef_vel_x[i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "isl write map" : "[size_x, size_y, size_z, N] -> { Stmt_for_end[i0, i1, i2] -> MemRef_vel_x[i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl write params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "name" : "vel_x",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_for_end[i0, i1, i2] -> MemRef_vel_y[i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "isl write map" : "[size_x, size_y, size_z, N] -> { Stmt_for_end[i0, i1, i2] -> MemRef_vel_y[i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl write params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "name" : "vel_y",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 32,
     "fundamental type" : "f",
     "isl read map" : "[size_x, size_y, size_z, N] -> { Stmt_for_end[i0, i1, i2] -> MemRef_vel_z[i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl read params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "isl write map" : "[size_x, size_y, size_z, N] -> { Stmt_for_end[i0, i1, i2] -> MemRef_vel_z[i0] : size_x > 0 and size_y > 0 and size_z > 0 and 0 <= i0 < size_x and 0 <= i1 < size_y and 0 <= i2 < size_z }",
     "isl write params" : [ "size_x", "size_y", "size_z", "arg9" ],
     "name" : "vel_z",
     "num dimensions" : 1,
     "pointer level" : 1,
     "size" : 0,
     "type name" : "float addrspace(1)*"
    },
    {
     "element size" : 0,
     "fundamental type" : "f",
     "name" : "dt",
     "pointer level" : 0,
     "size" : 32,
     "type name" : "float"
    },
    {
     "element size" : 0,
     "fundamental type" : "f",
     "name" : "epsilon",
     "pointer level" : 0,
     "size" : 32,
     "type name" : "float"
    },
    {
     "element size" : 0,
     "fundamental type" : "i",
     "name" : "N",
     "pointer level" : 0,
     "size" : 32,
     "type name" : "i32"
    }
   ],
   "name" : "updateSpeed",
   "partitioning" : "x"
  }
 ]
}
"#;
