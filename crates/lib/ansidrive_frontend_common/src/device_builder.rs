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

    frontend_common::device_builder.rs

    Resolve each device's disk profile from its preset and configuration
    overrides, open its image, and build the device.
*/

use std::{collections::BTreeSet, path::Path};

use crate::image_manager::ImageManager;
use ansidrive_config::{ConfigFileParams, DeviceConfigEntry};
use ansidrive_core::{
    devices::ansi::{
        data_phase::{ImageDataPhase, NullDataPhase},
        AnsiDevice,
    },
    device_types::disk_type::{AnsiDiskPreset, AnsiDiskType},
    image::{ImageBackingStore, ImageSource},
};
use anyhow::Context;

/// Start from the preset profile and apply any geometry given in the device entry.
/// An override that leaves the geometry unusable is discarded in favor of the preset.
pub fn resolve_disk_type(entry: Option<&DeviceConfigEntry>) -> AnsiDiskType {
    let Some(entry) = entry
    else {
        return AnsiDiskType::from(AnsiDiskPreset::default());
    };

    let preset = AnsiDiskType::from(entry.preset());
    let mut disk = preset.clone();

    if let Some(bps) = entry.bytes_per_sector {
        disk.sector_size = bps;
    }
    if let Some(spt) = entry.sectors_per_track {
        disk.sectors = spt;
    }
    if let Some(heads) = entry.heads_per_cylinder {
        disk.heads = heads;
    }
    if let Some(cylinders) = entry.cylinders {
        disk.cylinders = cylinders;
        disk.landing_zone = cylinders.saturating_sub(1);
    }

    if !disk.is_valid() {
        log::warn!(
            "Device {}: invalid geometry c:{} h:{} s:{} bps:{}, using preset {}",
            entry.id,
            disk.cylinders,
            disk.heads,
            disk.sectors,
            disk.sector_size,
            entry.preset()
        );
        return preset;
    }
    disk
}

/// Determine where a device's image comes from. An explicit image in the device entry wins
/// over a scanned HD<n> image. Relative file names are looked up in the image directory.
fn image_source(
    id: u8,
    entry: Option<&DeviceConfigEntry>,
    image_dir: &Path,
    images: &mut ImageManager,
) -> anyhow::Result<Option<ImageSource>> {
    let configured = entry.and_then(|e| e.image.as_deref());

    let mut source = match configured {
        Some(name) => {
            let source: ImageSource = name.parse()?;
            match source {
                ImageSource::File(path) if path.is_relative() && !path.exists() => {
                    Some(ImageSource::File(image_dir.join(path)))
                }
                other => Some(other),
            }
        }
        None => match images.load_image(id) {
            Ok(path) => Some(ImageSource::File(path)),
            Err(_) => None,
        },
    };

    // A sector window given as separate keys applies to a plain file.
    if let (Some(ImageSource::File(path)), Some(entry)) = (&source, entry) {
        if let (Some(start_sector), Some(end_sector)) = (entry.sector_begin, entry.sector_end) {
            if end_sector <= start_sector {
                anyhow::bail!(
                    "Device {}: sector window end {} must follow start {}",
                    id,
                    end_sector,
                    start_sector
                );
            }
            source = Some(ImageSource::Raw {
                path: path.clone(),
                start_sector,
                end_sector,
            });
        }
    }
    Ok(source)
}

/// Build a single device. Without an image the device still answers on the bus but its
/// data phases move no data.
pub fn build_device(id: u8, disk: AnsiDiskType, source: Option<&ImageSource>) -> anyhow::Result<AnsiDevice> {
    let device = AnsiDevice::new(id, disk.clone())?;

    let Some(source) = source
    else {
        log::info!("Device {}: {} with no image attached", id, disk);
        return Ok(device.with_data_phase(Box::new(NullDataPhase::default())));
    };

    let store = ImageBackingStore::open(source, disk.sector_size as usize)
        .with_context(|| format!("Device {}: failed to open image {}", id, source.path().display()))?;

    if store.sector_count() != disk.total_sectors() {
        log::warn!(
            "Device {}: image {} has {} sectors, the drive geometry has {}",
            id,
            source.path().display(),
            store.sector_count(),
            disk.total_sectors()
        );
    }

    log::info!("Device {}: {} using image {}", id, disk, source.path().display());
    Ok(device.with_data_phase(Box::new(ImageDataPhase::new(store, disk))))
}

/// Build a device for every configured device entry and every scanned image.
/// Devices are returned in id order.
pub fn build_devices(config: &ConfigFileParams, images: &mut ImageManager) -> anyhow::Result<Vec<AnsiDevice>> {
    let image_dir = config.emulator.image_dir.as_path();

    let mut ids: BTreeSet<u8> = config.device.iter().map(|d| d.id).collect();
    ids.extend(images.ids());

    log::info!(
        "System preset: {:?}, quirks: {:02X}",
        config.emulator.system_preset(),
        config.emulator.quirks
    );

    let mut devices = Vec::new();
    for id in ids {
        let entry = config.device_config(id);
        let disk = resolve_disk_type(entry);

        if let Some(entry) = entry {
            if entry.prefetch_bytes > 0 {
                log::info!("Device {}: prefetch enabled ({} bytes)", id, entry.prefetch_bytes);
            }
            else {
                log::info!("Device {}: prefetch disabled", id);
            }
        }

        let source = image_source(id, entry, image_dir, images)?;
        devices.push(build_device(id, disk, source.as_ref())?);
    }

    if devices.is_empty() {
        log::warn!("No devices configured and no images found in {}", image_dir.display());
    }
    Ok(devices)
}
