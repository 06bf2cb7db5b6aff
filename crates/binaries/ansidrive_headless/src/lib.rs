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

//! AnsiDrive headless front-end main library component.
//!
//! Builds the configured devices, attaches them to a simulated interface port and plays a
//! host script against them. Every response byte is printed, and a JSON report of the session
//! is written at the end.

#![forbid(unsafe_code)]

pub mod script;
pub mod sim_bus;

use std::path::Path;

use ansidrive_config::{ConfigFileParams, DEFAULT_CONFIG_FILE};
use ansidrive_core::devices::ansi::AnsiBus;
use ansidrive_frontend_common::{
    device_builder::build_devices,
    image_manager::{ImageManager, ImageManagerError},
    timestep_manager::TimestepManager,
};
use anyhow::Context;
use serde_derive::Serialize;
use web_time::Instant;

use crate::{
    script::{HeadlessError, HostScript, ScriptedHost, StepRecord, DEFAULT_STEP_TIMEOUT},
    sim_bus::SimulatedBus,
};

#[derive(Clone, Debug, Serialize)]
pub struct DeviceReport {
    pub id: u8,
    pub disk: String,
    pub state: String,
    pub general_status: u8,
    pub sense_byte_1: u8,
    pub sense_byte_2: u8,
    pub cylinder: u16,
    pub head: u8,
    pub spindle_running: bool,
    pub attention: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub cycles: u64,
    pub emulated_us: f64,
    pub wall_ms: f64,
    pub steps: Vec<StepRecord>,
    pub devices: Vec<DeviceReport>,
}

impl SessionReport {
    fn new(host: &ScriptedHost, steps: Vec<StepRecord>, started: Instant) -> Self {
        let devices = host
            .bus()
            .devices()
            .iter()
            .map(|d| DeviceReport {
                id: d.id(),
                disk: d.disk_type().to_string(),
                state: d.state().to_string(),
                general_status: d.general_status(),
                sense_byte_1: d.sense_byte_1(),
                sense_byte_2: d.sense_byte_2(),
                cylinder: d.current_cylinder(),
                head: d.selected_head(),
                spindle_running: d.spindle_running(),
                attention: d.attention(),
            })
            .collect();

        Self {
            cycles: host.bus().cycles(),
            emulated_us: host.timestep().elapsed_us(),
            wall_ms: started.elapsed().as_secs_f64() * 1000.0,
            steps,
            devices,
        }
    }
}

/// Build the devices named by the configuration and run the host script against them.
pub fn run_session(config: &ConfigFileParams) -> anyhow::Result<SessionReport> {
    let mut images = ImageManager::new();
    if config.emulator.scan_images {
        match images.scan_dir(&config.emulator.image_dir) {
            Ok(count) => log::info!("Found {} image(s) in {}", count, config.emulator.image_dir.display()),
            Err(ImageManagerError::DirNotFound) => {}
            Err(e) => return Err(e).context("Image scan failed"),
        }
    }

    let devices = build_devices(config, &mut images)?;
    if devices.is_empty() {
        anyhow::bail!(HeadlessError::NoDevices);
    }
    let ids: Vec<u8> = devices.iter().map(|d| d.id()).collect();

    let mut bus = AnsiBus::new(SimulatedBus::new(config.emulator.trace_pins));
    for device in devices {
        bus.add_device(device)?;
    }

    let script = match &config.emulator.script {
        Some(path) => HostScript::load(path)?,
        None => {
            log::info!("No host script given, surveying device status");
            HostScript::status_survey(&ids)
        }
    };

    let timestep = TimestepManager::new(config.emulator.timestep_us);
    let timeout = config.emulator.handshake_timeout.unwrap_or(DEFAULT_STEP_TIMEOUT);
    let mut host = ScriptedHost::new(bus, timestep, timeout);

    let started = Instant::now();
    let mut steps = Vec::with_capacity(script.step.len());
    for (index, step) in script.step.iter().enumerate() {
        let record = host.run_step(index, step)?;
        if let Some(response) = record.response {
            println!("{:>4}: {:<20} {:02X}", record.index, record.op, response);
        }
        steps.push(record);
    }

    Ok(SessionReport::new(&host, steps, started))
}

fn write_report(report: &SessionReport, path: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
            log::info!("Wrote session report to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub fn run() {
    env_logger::init();

    let config = match ansidrive_config::read_config_file(DEFAULT_CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => match e.downcast_ref::<std::io::Error>() {
            Some(e) => {
                eprintln!("IO error reading configuration file:\n{}", e);
                std::process::exit(1);
            }
            None => {
                eprintln!(
                    "Failed to parse configuration file. There may be a typo or otherwise invalid toml:\n{}",
                    e
                );
                std::process::exit(1);
            }
        },
    };

    let report = match run_session(&config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Session failed: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = write_report(&report, config.emulator.report_file.as_deref()) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
