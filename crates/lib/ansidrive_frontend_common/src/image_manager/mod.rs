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

    frontend_common::image_manager::mod.rs

    Discover hard disk images in the image directory and map them to device
    ids by file name. A file named HD<n>.<ext> is the image for device n.

    Like the Vhd manager this is mostly about paths. Devices open the image
    files themselves through ImageBackingStore.
*/

use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
};

use ansidrive_core::devices::ansi::MAX_DEVICES;

pub const DEFAULT_EXTENSIONS: [&str; 5] = ["img", "hda", "hdd", "ima", "raw"];

#[derive(Debug, PartialEq)]
pub enum ImageManagerError {
    DirNotFound,
    DirReadError,
    InvalidDevice,
    DeviceAlreadyLoaded,
    ImageNotFound,
}
impl std::error::Error for ImageManagerError {}
impl Display for ImageManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self {
            ImageManagerError::DirNotFound => write!(f, "The image directory was not found."),
            ImageManagerError::DirReadError => {
                write!(f, "Error reading the image directory.")
            }
            ImageManagerError::InvalidDevice => write!(f, "Specified device id out of range."),
            ImageManagerError::DeviceAlreadyLoaded => {
                write!(f, "Specified device already has an image loaded!")
            }
            ImageManagerError::ImageNotFound => write!(f, "No image found for the specified device."),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageFile {
    pub id:   u8,
    pub name: OsString,
    pub path: PathBuf,
    pub size: u64,
}

pub struct ImageManager {
    image_vec: Vec<ImageFile>,
    image_map: BTreeMap<u8, usize>,
    devices_loaded: BTreeSet<u8>,
    extensions: Vec<OsString>,
}

impl Default for ImageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageManager {
    pub fn new() -> Self {
        Self {
            image_vec: Vec::new(),
            image_map: BTreeMap::new(),
            devices_loaded: BTreeSet::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(OsString::from).collect(),
        }
    }

    pub fn set_extensions(&mut self, extensions: Option<Vec<String>>) {
        if let Some(extensions) = extensions {
            self.extensions = extensions
                .iter()
                .map(|ext| OsString::from(ext.to_lowercase()))
                .collect();
        }
    }

    /// Return the device id encoded in an image file name, or None if the name is not an image
    /// name. The id may be out of range; the caller decides what to do with it.
    pub fn image_id_from_name(&self, name: &str) -> Option<u8> {
        let bytes = name.as_bytes();
        if bytes.len() < 2 || !bytes[..2].eq_ignore_ascii_case(b"HD") {
            return None;
        }

        if let Some(ext) = Path::new(name).extension() {
            let ext = OsString::from(ext.to_string_lossy().to_lowercase());
            if !self.extensions.contains(&ext) {
                return None;
            }
        }

        match bytes.get(2) {
            Some(c) if c.is_ascii_digit() => Some(c - b'0'),
            _ => Some(0),
        }
    }

    /// Rebuild the image list from the files in `dir`. Returns the number of images found.
    pub fn scan_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, ImageManagerError> {
        let dir = dir.as_ref();

        // Loaded devices keep their images across a rescan.
        let loaded = &self.devices_loaded;
        self.image_vec.retain(|image| loaded.contains(&image.id));
        self.image_map.clear();
        for (idx, image) in self.image_vec.iter().enumerate() {
            self.image_map.insert(image.id, idx);
        }

        if !dir.is_dir() {
            log::warn!("Image directory {} not found", dir.display());
            return Err(ImageManagerError::DirNotFound);
        }

        let read_dir = std::fs::read_dir(dir).map_err(|e| {
            log::error!("Error reading image directory {}: {}", dir.display(), e);
            ImageManagerError::DirReadError
        })?;

        let mut entries: Vec<_> = read_dir.filter_map(|entry| entry.ok()).collect();
        entries.sort_by_key(|entry| entry.file_name());

        let mut found = 0;
        for entry in entries {
            // Follow symlinks to images stored elsewhere.
            let Ok(metadata) = std::fs::metadata(entry.path())
            else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some(id) = self.image_id_from_name(&name.to_string_lossy())
            else {
                continue;
            };

            if id as usize >= MAX_DEVICES {
                log::warn!("Skipping image {:?}: device id {} out of range", name, id);
                continue;
            }
            if self.image_map.contains_key(&id) {
                log::warn!("Skipping image {:?}: device {} already has an image", name, id);
                continue;
            }

            log::info!("Found image {:?} for device {} ({} bytes)", name, id, metadata.len());
            self.image_map.insert(id, self.image_vec.len());
            self.image_vec.push(ImageFile {
                id,
                name,
                path: entry.path(),
                size: metadata.len(),
            });
            found += 1;
        }

        Ok(found)
    }

    pub fn images(&self) -> &[ImageFile] {
        &self.image_vec
    }

    pub fn image_for(&self, id: u8) -> Option<&ImageFile> {
        self.image_map.get(&id).and_then(|idx| self.image_vec.get(*idx))
    }

    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.image_map.keys().copied()
    }

    pub fn is_device_loaded(&self, id: u8) -> bool {
        self.devices_loaded.contains(&id)
    }

    /// Associate the image for device `id` with that device and return its path.
    pub fn load_image(&mut self, id: u8) -> Result<PathBuf, ImageManagerError> {
        if id as usize >= MAX_DEVICES {
            return Err(ImageManagerError::InvalidDevice);
        }
        if self.is_device_loaded(id) {
            log::error!("Device {} already has an image loaded", id);
            return Err(ImageManagerError::DeviceAlreadyLoaded);
        }
        let path = self
            .image_for(id)
            .map(|image| image.path.clone())
            .ok_or(ImageManagerError::ImageNotFound)?;

        log::debug!("Associating image {} to device {}", path.display(), id);
        self.devices_loaded.insert(id);
        Ok(path)
    }

    pub fn release_image(&mut self, id: u8) {
        if self.devices_loaded.remove(&id) {
            log::debug!("Releasing image from device {}", id);
        }
    }
}
