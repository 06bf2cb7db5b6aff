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

    devices::ansi::data_phase.rs

    Hook for the sector data path. The bus state machine calls into a
    DataPhase while the host holds the read or write gate.

    Serializing sector data onto the NRZ data lines is not implemented.
    ImageDataPhase stages the addressed track to and from the backing image
    so the storage half of a transfer can be exercised.
*/

use crate::{device_types::disk_type::AnsiDiskType, image::ImageBackingStore};

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum DataPhaseKind {
    Read,
    Write,
}

/// Positioning state of the device when a data phase event occurs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DataPhaseContext {
    pub device_id: u8,
    pub cylinder: u16,
    pub head: u8,
    pub write_enabled: bool,
    /// Time since the gate was asserted.
    pub gate_us: f64,
}

pub trait DataPhase {
    /// The host asserted a gate.
    fn begin(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext);
    /// The gate is still held. Called once per poll cycle.
    fn continue_phase(&mut self, _kind: DataPhaseKind, _ctx: &DataPhaseContext) {}
    /// The host released the gate.
    fn end(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext);
}

/// Moves no data.
#[derive(Default)]
pub struct NullDataPhase {
    warned: bool,
}

impl DataPhase for NullDataPhase {
    fn begin(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext) {
        if !self.warned {
            log::warn!(
                "Device {}: {} gate asserted, but sector streaming is not implemented",
                ctx.device_id,
                kind
            );
            self.warned = true;
        }
    }

    fn end(&mut self, _kind: DataPhaseKind, _ctx: &DataPhaseContext) {}
}

/// Stages whole tracks between an image and a track buffer.
pub struct ImageDataPhase {
    store: ImageBackingStore,
    disk: AnsiDiskType,
    track: Vec<u8>,
    track_lba: Option<u64>,
}

impl ImageDataPhase {
    pub fn new(store: ImageBackingStore, disk: AnsiDiskType) -> Self {
        let track = vec![0; disk.bytes_per_track() as usize];
        Self {
            store,
            disk,
            track,
            track_lba: None,
        }
    }

    pub fn track(&self) -> &[u8] {
        &self.track
    }

    pub fn track_mut(&mut self) -> &mut [u8] {
        &mut self.track
    }

    pub fn store(&self) -> &ImageBackingStore {
        &self.store
    }

    fn lba_of(&self, ctx: &DataPhaseContext) -> Option<u64> {
        self.disk.chs_to_lba(ctx.cylinder, ctx.head, 0)
    }
}

impl DataPhase for ImageDataPhase {
    fn begin(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext) {
        self.track_lba = self.lba_of(ctx);
        let Some(lba) = self.track_lba
        else {
            log::warn!(
                "Device {}: {} on unaddressable track c:{} h:{}",
                ctx.device_id,
                kind,
                ctx.cylinder,
                ctx.head
            );
            return;
        };

        match kind {
            DataPhaseKind::Read => {
                if let Err(e) = self.store.read_sectors(lba, &mut self.track) {
                    log::error!("Device {}: error reading track at lba {}: {}", ctx.device_id, lba, e);
                    self.track.fill(0);
                }
            }
            DataPhaseKind::Write => {
                self.track.fill(0);
            }
        }
    }

    fn end(&mut self, kind: DataPhaseKind, ctx: &DataPhaseContext) {
        if kind != DataPhaseKind::Write {
            return;
        }
        let Some(lba) = self.track_lba.take()
        else {
            return;
        };
        if let Err(e) = self.store.write_sectors(lba, &self.track) {
            log::error!("Device {}: error writing track at lba {}: {}", ctx.device_id, lba, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn small_disk() -> AnsiDiskType {
        AnsiDiskType {
            cylinders: 4,
            heads: 2,
            sectors: 2,
            sector_size: 16,
            ..Default::default()
        }
    }

    fn ctx(cylinder: u16, head: u8) -> DataPhaseContext {
        DataPhaseContext {
            device_id: 0,
            cylinder,
            head,
            write_enabled: true,
            gate_us: 0.0,
        }
    }

    #[test]
    fn test_track_write_then_read() {
        let mut path: PathBuf = std::env::temp_dir();
        path.push(format!("ansidrive_dataphase_{}.img", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let disk = small_disk();
        let store = ImageBackingStore::create(&path, disk.total_sectors(), 16).unwrap();
        let mut phase = ImageDataPhase::new(store, disk);

        phase.begin(DataPhaseKind::Write, &ctx(1, 1));
        phase.track_mut().fill(0x77);
        phase.end(DataPhaseKind::Write, &ctx(1, 1));

        phase.begin(DataPhaseKind::Read, &ctx(0, 0));
        assert!(phase.track().iter().all(|b| *b == 0));

        phase.begin(DataPhaseKind::Read, &ctx(1, 1));
        assert_eq!(phase.track().len(), 32);
        assert!(phase.track().iter().all(|b| *b == 0x77));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_closed_store_reads_zeros() {
        let mut phase = ImageDataPhase::new(ImageBackingStore::closed(16), small_disk());
        phase.track_mut().fill(1);
        phase.begin(DataPhaseKind::Read, &ctx(0, 0));
        assert!(phase.track().iter().all(|b| *b == 0));
    }
}
