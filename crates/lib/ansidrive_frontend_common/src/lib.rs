/*
    AnsiDrive

    Copyright 2024-2025 AnsiDrive contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    frontend_common::lib.rs

    Facilities shared by AnsiDrive front ends.
*/

//! The Frontend Common library provides facilities common to all AnsiDrive front ends.
//!
//! - ImageManager: Discovers hard disk images in the image directory and assigns them to
//!     device ids by file name.
//! - TimestepManager: Supplies the elapsed time passed to each bus poll, either as a fixed
//!     step or measured from the wall clock.
//! - device_builder: Resolves device profiles from configuration and builds devices with
//!     their images attached.

pub mod device_builder;
pub mod image_manager;
pub mod timestep_manager;

pub use device_builder::{build_devices, resolve_disk_type};
pub use image_manager::{ImageManager, ImageManagerError};
pub use timestep_manager::TimestepManager;
