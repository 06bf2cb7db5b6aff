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

    device_types::disk_type.rs

    Geometry profiles for emulated ANSI interface drives.
*/

use lazy_static::lazy_static;
use std::fmt::{Display, Formatter};

/// Default sector size, in bytes, as formatted by the DN300 controller.
pub const DEFAULT_SECTOR_SIZE: u32 = 1056;
pub const DEFAULT_RPM: u16 = 3600;

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum_macros::EnumString,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum AnsiDiskPreset {
    #[default]
    #[strum(serialize = "PRIAM_7050")]
    Priam7050,
    #[strum(serialize = "PRIAM_3450")]
    Priam3450,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnsiDiskType {
    pub model_id: u16,
    pub cylinders: u16,
    pub heads: u8,
    pub sectors: u16,
    pub sector_size: u32,
    pub rpm: u16,
    pub landing_zone: u16,
    pub desc: String,
}

lazy_static! {
    static ref ANSI_DISK_TYPES: [AnsiDiskType; 2] = [
        AnsiDiskType {
            model_id: 0x105,
            cylinders: 1049,
            heads: 5,
            sectors: 12,
            sector_size: DEFAULT_SECTOR_SIZE,
            rpm: DEFAULT_RPM,
            landing_zone: 1048,
            desc: "PRIAM 7050 (66MB)".to_string(),
        },
        AnsiDiskType {
            model_id: 0x104,
            cylinders: 525,
            heads: 5,
            sectors: 12,
            sector_size: DEFAULT_SECTOR_SIZE,
            rpm: DEFAULT_RPM,
            landing_zone: 524,
            desc: "PRIAM 3450 (33MB)".to_string(),
        },
    ];
}

impl From<AnsiDiskPreset> for AnsiDiskType {
    fn from(preset: AnsiDiskPreset) -> Self {
        match preset {
            AnsiDiskPreset::Priam7050 => ANSI_DISK_TYPES[0].clone(),
            AnsiDiskPreset::Priam3450 => ANSI_DISK_TYPES[1].clone(),
        }
    }
}

impl Default for AnsiDiskType {
    fn default() -> Self {
        AnsiDiskPreset::default().into()
    }
}

impl AnsiDiskType {
    pub fn bytes_per_track(&self) -> u32 {
        self.sectors as u32 * self.sector_size
    }

    pub fn total_sectors(&self) -> u64 {
        self.cylinders as u64 * self.heads as u64 * self.sectors as u64
    }

    /// Size in bytes of a flat image holding every sector of the drive.
    pub fn image_size(&self) -> u64 {
        self.total_sectors() * self.sector_size as u64
    }

    pub fn is_valid(&self) -> bool {
        self.cylinders > 0 && self.heads > 0 && self.sectors > 0 && self.sector_size > 0
    }

    /// Logical sector number of a cylinder, head, sector address. Sectors are 0-based.
    pub fn chs_to_lba(&self, c: u16, h: u8, s: u16) -> Option<u64> {
        if c >= self.cylinders || h >= self.heads || s >= self.sectors {
            return None;
        }
        Some((c as u64 * self.heads as u64 + h as u64) * self.sectors as u64 + s as u64)
    }
}

impl Display for AnsiDiskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let size_in_mb = self.image_size() as f64 / 1024.0 / 1024.0;
        write!(
            f,
            "{} c:{} h:{} s:{} ss:{} ({:.1}MB)",
            self.desc, self.cylinders, self.heads, self.sectors, self.sector_size, size_in_mb
        )
    }
}
