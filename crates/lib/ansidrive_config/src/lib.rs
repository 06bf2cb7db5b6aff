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
*/

//! The `ansidrive_config` crate parses AnsiDrive's main configuration file, and overlays
//! command line arguments on top of the configuration file settings.
//! Command line arguments always take priority over the configuration file.
//!
//! Features:
//! - `use_bpaf`: Enable BPAF support for command line argument parsing.

#[cfg(feature = "use_bpaf")]
mod bpaf_config;
#[cfg(not(feature = "use_bpaf"))]
mod default_args;
pub mod mount;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use ansidrive_core::device_types::disk_type::AnsiDiskPreset;

#[cfg(feature = "use_bpaf")]
pub use bpaf_config::{cli_args, CmdLineArgs};
#[cfg(not(feature = "use_bpaf"))]
pub use default_args::CmdLineArgs;
pub use mount::MountSpec;

use cfg_if::cfg_if;
use serde_derive::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "ansidrive.toml";
pub const DEFAULT_IMAGE_DIR: &str = "images";

const fn _default_true() -> bool {
    true
}

fn _default_image_dir() -> PathBuf {
    PathBuf::from(DEFAULT_IMAGE_DIR)
}

/// The host system the emulated drives are attached to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
#[strum(ascii_case_insensitive)]
pub enum SystemPreset {
    #[default]
    #[strum(serialize = "")]
    Generic,
    #[strum(serialize = "DN300")]
    ApolloDn300,
}

impl SystemPreset {
    /// Resolve a preset name. Unknown names fall back to the default preset.
    pub fn from_name(name: &str) -> Self {
        SystemPreset::from_str(name.trim()).unwrap_or_else(|_| {
            log::warn!("Unknown system preset name {:?}, using default settings", name);
            SystemPreset::Generic
        })
    }
}

/// Resolve a device preset name. An empty or unknown name selects the default drive.
pub fn device_preset_from_name(name: &str) -> AnsiDiskPreset {
    let name = name.trim();
    if name.is_empty() {
        return AnsiDiskPreset::default();
    }
    AnsiDiskPreset::from_str(name).unwrap_or_else(|_| {
        log::warn!("Unknown device preset name {:?}, using default settings", name);
        AnsiDiskPreset::default()
    })
}

#[derive(Debug, Deserialize)]
pub struct Emulator {
    #[serde(default = "_default_image_dir")]
    pub image_dir: PathBuf,
    #[serde(default)]
    pub system_preset: String,
    #[serde(default)]
    pub quirks: u8,
    /// Fixed poll timestep. When absent, wall clock time between polls is used.
    pub timestep_us: Option<f64>,
    pub script: Option<PathBuf>,
    pub report_file: Option<PathBuf>,
    #[serde(default)]
    pub trace_pins: bool,
    #[serde(default = "_default_true")]
    pub scan_images: bool,
    /// Cycles a scripted host waits on a single handshake before giving up.
    pub handshake_timeout: Option<u64>,
}

impl Default for Emulator {
    fn default() -> Self {
        Self {
            image_dir: _default_image_dir(),
            system_preset: String::new(),
            quirks: 0,
            timestep_us: None,
            script: None,
            report_file: None,
            trace_pins: false,
            scan_images: true,
            handshake_timeout: None,
        }
    }
}

impl Emulator {
    pub fn system_preset(&self) -> SystemPreset {
        SystemPreset::from_name(&self.system_preset)
    }
}

/// Per-device settings. Any geometry value given here overrides the preset.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeviceConfigEntry {
    pub id: u8,
    #[serde(default)]
    pub preset: String,
    pub bytes_per_sector: Option<u32>,
    pub sectors_per_track: Option<u16>,
    pub heads_per_cylinder: Option<u8>,
    pub cylinders: Option<u16>,
    #[serde(default)]
    pub prefetch_bytes: u32,
    /// Image file name, or RAW:<start>:<end>:<path> for a sector window.
    pub image: Option<String>,
    /// First and last (exclusive) sector of the image within its file.
    pub sector_begin: Option<u64>,
    pub sector_end: Option<u64>,
}

impl DeviceConfigEntry {
    pub fn preset(&self) -> AnsiDiskPreset {
        device_preset_from_name(&self.preset)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFileParams {
    #[serde(default)]
    pub emulator: Emulator,
    #[serde(default)]
    pub device: Vec<DeviceConfigEntry>,
}

impl ConfigFileParams {
    pub fn overlay(&mut self, shell_args: CmdLineArgs) {
        if let Some(image_dir) = shell_args.image_dir {
            self.emulator.image_dir = image_dir;
        }
        if let Some(script) = shell_args.script {
            self.emulator.script = Some(script);
        }
        if let Some(report_file) = shell_args.report_file {
            self.emulator.report_file = Some(report_file);
        }
        if let Some(timestep_us) = shell_args.timestep_us {
            self.emulator.timestep_us = Some(timestep_us);
        }
        if let Some(system_preset) = shell_args.system_preset {
            self.emulator.system_preset = system_preset;
        }

        self.emulator.trace_pins |= shell_args.trace_pins;
        self.emulator.scan_images &= !shell_args.no_image_scan;

        for mount in shell_args.mounts {
            match self.device.iter_mut().find(|d| d.id == mount.id) {
                Some(entry) => entry.image = Some(mount.image),
                None => self.device.push(DeviceConfigEntry {
                    id: mount.id,
                    image: Some(mount.image),
                    ..Default::default()
                }),
            }
        }
    }

    pub fn device_config(&self, id: u8) -> Option<&DeviceConfigEntry> {
        self.device.iter().find(|d| d.id == id)
    }
}

pub fn read_config(toml_string: impl AsRef<str>, shell_args: CmdLineArgs) -> Result<ConfigFileParams, anyhow::Error> {
    let mut toml_args: ConfigFileParams = toml::from_str(toml_string.as_ref())?;

    // Command line arguments override config file arguments
    toml_args.overlay(shell_args);

    for entry in &toml_args.device {
        if entry.id as usize >= ansidrive_core::devices::ansi::MAX_DEVICES {
            anyhow::bail!("Device id {} in configuration is out of range (0-7)", entry.id);
        }
    }

    log::debug!(
        "Configuration: system preset {:?}, quirks {:02X}, {} device entries",
        toml_args.emulator.system_preset(),
        toml_args.emulator.quirks,
        toml_args.device.len()
    );
    Ok(toml_args)
}

fn shell_args() -> CmdLineArgs {
    cfg_if! {
        if #[cfg(feature = "use_bpaf")] {
            log::debug!("Reading command line arguments...");
            cli_args().run()
        } else {
            log::debug!("Argument reading disabled...");
            CmdLineArgs::default()
        }
    }
}

/// Read the TOML configuration from a file path, parse and overlay command line arguments.
/// A missing default configuration file is not an error; built-in defaults are used instead.
pub fn read_config_file<P>(default_path: P) -> Result<ConfigFileParams, anyhow::Error>
where
    P: AsRef<Path>,
{
    let shell_args = shell_args();

    // Allow configuration file path to be overridden by command line argument 'config_file'
    let toml_string = if let Some(configfile_path) = shell_args.config_file.as_ref() {
        std::fs::read_to_string(configfile_path)?
    }
    else if default_path.as_ref().exists() {
        std::fs::read_to_string(default_path)?
    }
    else {
        log::info!(
            "No configuration file at {}, using defaults",
            default_path.as_ref().display()
        );
        String::new()
    };

    read_config(toml_string, shell_args)
}

/// Read the TOML configuration from a string, parse and overlay command line arguments.
pub fn read_config_string(toml_string: impl AsRef<str>) -> Result<ConfigFileParams, anyhow::Error> {
    read_config(toml_string, shell_args())
}
