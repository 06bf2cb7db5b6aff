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

    devices::ansi::attributes.rs

    The device attribute table, read and written by the host with the
    REPORT_ATTRIBUTE and LOAD_ATTRIBUTE commands. The table is derived from the
    drive's geometry the first time it is touched.
*/

use crate::device_types::disk_type::AnsiDiskType;

pub const ATTRIBUTE_TABLE_LEN: usize = 0x48;

pub const ATTR_USER_ID: usize = 0x00;
pub const ATTR_MODEL_ID_HIGH: usize = 0x01;
pub const ATTR_MODEL_ID_LOW: usize = 0x02;
pub const ATTR_REVISION_ID: usize = 0x03;
pub const ATTR_DEVICE_TYPE_ID: usize = 0x0D;
pub const ATTR_TABLE_MODIFICATION: usize = 0x0E;
pub const ATTR_TABLE_ID: usize = 0x0F;
pub const ATTR_BYTES_PER_TRACK: usize = 0x10; // 3 bytes, msb first
pub const ATTR_BYTES_PER_SECTOR: usize = 0x13; // 3 bytes, msb first
pub const ATTR_SECTORS_PER_TRACK: usize = 0x16; // 3 bytes, msb first
pub const ATTR_SECTORING_METHOD: usize = 0x19;
pub const ATTR_CYLINDERS_HIGH: usize = 0x20;
pub const ATTR_CYLINDERS_LOW: usize = 0x21;
pub const ATTR_HEADS: usize = 0x22;
pub const ATTR_ENCODING_0: usize = 0x30;
pub const ATTR_ENCODING_1: usize = 0x40;

pub const DEVICE_TYPE_NON_REMOVABLE_DISK: u8 = 0x01;

/// Bit of ATTR_TABLE_MODIFICATION cleared once a track has been reformatted
/// to match a loaded sector format.
pub const TABLE_MOD_FORMAT_PENDING: u8 = 0b0100_0000;

#[derive(Clone, Debug)]
pub struct AttributeTable {
    bytes: [u8; ATTRIBUTE_TABLE_LEN],
    initialized: bool,
    init_count: u32,
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self {
            bytes: [0; ATTRIBUTE_TABLE_LEN],
            initialized: false,
            init_count: 0,
        }
    }
}

fn put_u24(dst: &mut [u8], value: u32) {
    dst[0] = (value >> 16) as u8;
    dst[1] = (value >> 8) as u8;
    dst[2] = value as u8;
}

impl AttributeTable {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of times the table has been derived from a geometry profile.
    pub fn init_count(&self) -> u32 {
        self.init_count
    }

    /// Forget the current contents. The next access re-derives the table.
    pub fn invalidate(&mut self) {
        self.initialized = false;
    }

    pub fn ensure_initialized(&mut self, disk: &AnsiDiskType) {
        if self.initialized {
            return;
        }
        self.bytes = [0; ATTRIBUTE_TABLE_LEN];

        let [model_hi, model_lo] = disk.model_id.to_be_bytes();
        self.bytes[ATTR_USER_ID] = 0;
        self.bytes[ATTR_MODEL_ID_HIGH] = model_hi;
        self.bytes[ATTR_MODEL_ID_LOW] = model_lo;
        self.bytes[ATTR_REVISION_ID] = 0;
        self.bytes[ATTR_DEVICE_TYPE_ID] = DEVICE_TYPE_NON_REMOVABLE_DISK;

        self.write_sector_format(disk.sectors as u32, disk.sector_size);
        self.bytes[ATTR_SECTORING_METHOD] = 0;

        let [cyl_hi, cyl_lo] = disk.cylinders.to_be_bytes();
        self.bytes[ATTR_CYLINDERS_HIGH] = cyl_hi;
        self.bytes[ATTR_CYLINDERS_LOW] = cyl_lo;
        self.bytes[ATTR_HEADS] = disk.heads;

        self.initialized = true;
        self.init_count += 1;
        log::debug!("AttributeTable: initialized from profile {}", disk);
    }

    fn write_sector_format(&mut self, sectors_per_track: u32, bytes_per_sector: u32) {
        put_u24(
            &mut self.bytes[ATTR_BYTES_PER_TRACK..ATTR_BYTES_PER_TRACK + 3],
            sectors_per_track.saturating_mul(bytes_per_sector),
        );
        put_u24(
            &mut self.bytes[ATTR_BYTES_PER_SECTOR..ATTR_BYTES_PER_SECTOR + 3],
            bytes_per_sector,
        );
        put_u24(
            &mut self.bytes[ATTR_SECTORS_PER_TRACK..ATTR_SECTORS_PER_TRACK + 3],
            sectors_per_track,
        );
    }

    /// Read attribute `index`, initializing the table first if needed.
    /// Returns None for an index past the end of the table.
    pub fn read(&mut self, disk: &AnsiDiskType, index: u8) -> Option<u8> {
        self.ensure_initialized(disk);
        self.bytes.get(index as usize).copied()
    }

    /// Write attribute `index`, initializing the table first if needed.
    /// Returns false for an index past the end of the table.
    pub fn write(&mut self, disk: &AnsiDiskType, index: u8, value: u8) -> bool {
        self.ensure_initialized(disk);
        match self.bytes.get_mut(index as usize) {
            Some(b) => {
                *b = value;
                true
            }
            None => false,
        }
    }

    /// Commit a new sector format after a track reformat.
    pub fn apply_format(&mut self, disk: &AnsiDiskType, sectors_per_track: u32, bytes_per_sector: u32) {
        self.ensure_initialized(disk);
        self.write_sector_format(sectors_per_track, bytes_per_sector);
        self.bytes[ATTR_TABLE_MODIFICATION] &= !TABLE_MOD_FORMAT_PENDING;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}
