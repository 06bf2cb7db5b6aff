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

    image.rs

    Flat, sector addressed disk images backing an emulated drive.

    An image is either a whole file, or a window of sectors within a larger
    file or raw device, named with the syntax RAW:<start>:<end>:<path>.
    The end sector is exclusive.
*/

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context, Result};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("The image is not open.")]
    NotOpen,
    #[error("The image is read-only.")]
    ReadOnly,
    #[error("Sector {lba} is out of bounds (image has {count} sectors).")]
    OutOfBounds { lba: u64, count: u64 },
    #[error("Invalid raw image specification: {0}")]
    InvalidRawSpec(String),
    #[error("Buffer length {got} is not a multiple of the sector size {sector_size}.")]
    BadBufferLength { got: usize, sector_size: usize },
    #[error("Creation of image failed as the file already exists (Will not overwrite).")]
    FileExists,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Raw {
        path: PathBuf,
        start_sector: u64,
        end_sector: u64,
    },
}

impl ImageSource {
    pub fn path(&self) -> &Path {
        match self {
            ImageSource::File(path) => path,
            ImageSource::Raw { path, .. } => path,
        }
    }
}

impl FromStr for ImageSource {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, ImageError> {
        let Some(rest) = s.strip_prefix("RAW:").or_else(|| s.strip_prefix("raw:"))
        else {
            return Ok(ImageSource::File(PathBuf::from(s)));
        };

        let mut parts = rest.splitn(3, ':');
        let (Some(start), Some(end), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ImageError::InvalidRawSpec(s.to_string()));
        };
        let start_sector = start
            .trim()
            .parse::<u64>()
            .map_err(|_| ImageError::InvalidRawSpec(s.to_string()))?;
        let end_sector = end
            .trim()
            .parse::<u64>()
            .map_err(|_| ImageError::InvalidRawSpec(s.to_string()))?;
        if end_sector <= start_sector || path.is_empty() {
            return Err(ImageError::InvalidRawSpec(s.to_string()));
        }

        Ok(ImageSource::Raw {
            path: PathBuf::from(path),
            start_sector,
            end_sector,
        })
    }
}

pub struct ImageBackingStore {
    file: Option<File>,
    path: PathBuf,
    writable: bool,
    sector_size: usize,
    /// Byte offset of the first sector of the image within the file.
    window_start: u64,
    window_sectors: u64,
    /// Byte position relative to window_start.
    position: u64,
}

impl ImageBackingStore {
    /// A store with nothing behind it. Every I/O operation fails with [ImageError::NotOpen].
    pub fn closed(sector_size: usize) -> Self {
        Self {
            file: None,
            path: PathBuf::new(),
            writable: false,
            sector_size,
            window_start: 0,
            window_sectors: 0,
            position: 0,
        }
    }

    /// Open an image read/write, falling back to read-only if the file cannot be written.
    pub fn open(source: &ImageSource, sector_size: usize) -> Result<Self> {
        if sector_size == 0 {
            bail!(ImageError::BadBufferLength { got: 0, sector_size });
        }
        let path = source.path().to_path_buf();

        let (file, writable) = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => (file, true),
            Err(e) => {
                log::warn!("Opening image {} read-only: {}", path.display(), e);
                let file =
                    File::open(&path).with_context(|| format!("Failed to open image file {}", path.display()))?;
                (file, false)
            }
        };

        let file_len = file
            .metadata()
            .with_context(|| format!("Failed to read metadata of image {}", path.display()))?
            .len();
        let file_sectors = file_len / sector_size as u64;

        let (window_start, window_sectors) = match source {
            ImageSource::File(_) => (0, file_sectors),
            ImageSource::Raw {
                start_sector,
                end_sector,
                ..
            } => {
                // Raw devices may report a length of zero, so only check plain files.
                if file_len > 0 && *end_sector > file_sectors {
                    bail!(ImageError::OutOfBounds {
                        lba: *end_sector,
                        count: file_sectors,
                    });
                }
                (start_sector * sector_size as u64, end_sector - start_sector)
            }
        };

        if file_len % sector_size as u64 != 0 {
            log::warn!(
                "Image {} length {} is not a multiple of the sector size {}",
                path.display(),
                file_len,
                sector_size
            );
        }

        log::debug!(
            "Opened image {} ({} sectors, {})",
            path.display(),
            window_sectors,
            if writable { "read/write" } else { "read-only" }
        );

        Ok(Self {
            file: Some(file),
            path,
            writable,
            sector_size,
            window_start,
            window_sectors,
            position: 0,
        })
    }

    /// Create a zero-filled image of `sectors` sectors. Existing files are never overwritten.
    pub fn create(path: impl AsRef<Path>, sectors: u64, sector_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!(ImageError::FileExists);
        }
        let file = File::create(path).with_context(|| format!("Failed to create image {}", path.display()))?;
        file.set_len(sectors * sector_size as u64)
            .context("Failed to size new image")?;
        drop(file);
        Self::open(&ImageSource::File(path.to_path_buf()), sector_size)
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.is_open() && self.writable
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn sector_count(&self) -> u64 {
        self.window_sectors
    }

    /// Size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.window_sectors * self.sector_size as u64
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if self.file.is_none() {
            bail!(ImageError::NotOpen);
        }
        if pos > self.size() {
            bail!(ImageError::OutOfBounds {
                lba: pos / self.sector_size as u64,
                count: self.window_sectors,
            });
        }
        self.position = pos;
        Ok(())
    }

    /// Read from the current position. Reads are clamped to the end of the image.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = (self.size() - self.position).min(buf.len() as u64) as usize;
        let offset = self.window_start + self.position;
        let Some(file) = self.file.as_mut()
        else {
            bail!(ImageError::NotOpen);
        };
        file.seek(SeekFrom::Start(offset)).context("Error seeking image")?;
        file.read_exact(&mut buf[..len]).context("Error reading image")?;
        self.position += len as u64;
        Ok(len)
    }

    /// Write at the current position. Writes are clamped to the end of the image.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            bail!(if self.file.is_none() { ImageError::NotOpen } else { ImageError::ReadOnly });
        }
        let len = (self.size() - self.position).min(buf.len() as u64) as usize;
        let offset = self.window_start + self.position;
        let Some(file) = self.file.as_mut()
        else {
            bail!(ImageError::NotOpen);
        };
        file.seek(SeekFrom::Start(offset)).context("Error seeking image")?;
        file.write_all(&buf[..len]).context("Error writing image")?;
        self.position += len as u64;
        Ok(len)
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush().context("Error flushing image"),
            None => bail!(ImageError::NotOpen),
        }
    }

    fn check_span(&self, lba: u64, len: usize) -> Result<()> {
        if len == 0 || len % self.sector_size != 0 {
            bail!(ImageError::BadBufferLength {
                got: len,
                sector_size: self.sector_size,
            });
        }
        let count = (len / self.sector_size) as u64;
        if lba + count > self.window_sectors {
            bail!(ImageError::OutOfBounds {
                lba: lba + count - 1,
                count: self.window_sectors,
            });
        }
        Ok(())
    }

    /// Read one or more whole sectors starting at `lba`.
    pub fn read_sectors(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        if self.file.is_none() {
            bail!(ImageError::NotOpen);
        }
        self.check_span(lba, buf.len())?;
        self.seek(lba * self.sector_size as u64)?;
        self.read(buf)?;
        Ok(())
    }

    /// Write one or more whole sectors starting at `lba`.
    pub fn write_sectors(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        if self.file.is_none() {
            bail!(ImageError::NotOpen);
        }
        self.check_span(lba, buf.len())?;
        self.seek(lba * self.sector_size as u64)?;
        self.write(buf)?;
        Ok(())
    }
}
