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

    ansidrive_headless::script.rs

    A host controller played from a script. Each step performs one host
    operation, one poll cycle at a time, against every device on the bus.

    A script is a TOML file with a list of steps:

        [[step]]
        op = "enable"

        [[step]]
        op = "select"
        mask = 0x01

        [[step]]
        op = "command"
        cmd = 0x0F
*/

use std::{fmt::Display, path::Path};

use ansidrive_core::devices::ansi::{command::command_is_param_out, AnsiBus, AnsiDevState};
use ansidrive_frontend_common::timestep_manager::TimestepManager;
use anyhow::Context;
use serde_derive::{Deserialize, Serialize};

use crate::sim_bus::SimulatedBus;

pub const DEFAULT_STEP_TIMEOUT: u64 = 100_000;

const REPORT_GENERAL_STATUS: u8 = 0x0F;
const REPORT_SENSE_BYTE_1: u8 = 0x0E;
const REPORT_SENSE_BYTE_2: u8 = 0x0D;
const CLEAR_ATTENTION: u8 = 0x02;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HeadlessError {
    #[error("Step {step} ({op}) timed out after {cycles} cycles")]
    Timeout { step: usize, op: String, cycles: u64 },
    #[error("No devices to run: configure a [[device]] or place HD<n> images in the image directory.")]
    NoDevices,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostStep {
    /// Assert port enable.
    Enable,
    /// Release port enable. Every device returns to its initial state.
    Disable,
    /// Select the devices in `mask` and wait for the acknowledge handshake.
    Select { mask: u8 },
    /// Strobe an empty selection mask so the selected device lets go.
    Deselect,
    /// Issue a command. Parameter-out commands send `param`; the others return a parameter.
    Command {
        cmd: u8,
        #[serde(default)]
        param: u8,
    },
    /// Wait until a device raises attention.
    WaitAttention,
    /// Strobe with the bus turned around and read the radial status byte.
    PollStatus,
    /// Hold the read gate for a number of cycles.
    ReadGate { cycles: u64 },
    /// Hold the write gate for a number of cycles.
    WriteGate { cycles: u64 },
    /// Run cycles with no host activity.
    Idle { cycles: u64 },
    /// Set the faults the interface reports as still present.
    SetFaults { faults: u8 },
}

impl Display for HostStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostStep::Enable => write!(f, "enable"),
            HostStep::Disable => write!(f, "disable"),
            HostStep::Select { mask } => write!(f, "select {:02X}", mask),
            HostStep::Deselect => write!(f, "deselect"),
            HostStep::Command { cmd, param } => {
                if command_is_param_out(*cmd) {
                    write!(f, "command {:02X} {:02X}", cmd, param)
                }
                else {
                    write!(f, "command {:02X}", cmd)
                }
            }
            HostStep::WaitAttention => write!(f, "wait_attention"),
            HostStep::PollStatus => write!(f, "poll_status"),
            HostStep::ReadGate { cycles } => write!(f, "read_gate {}", cycles),
            HostStep::WriteGate { cycles } => write!(f, "write_gate {}", cycles),
            HostStep::Idle { cycles } => write!(f, "idle {}", cycles),
            HostStep::SetFaults { faults } => write!(f, "set_faults {:02X}", faults),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct HostScript {
    #[serde(default)]
    pub step: Vec<HostStep>,
}

impl HostScript {
    pub fn from_toml(toml_string: &str) -> anyhow::Result<Self> {
        let script = toml::from_str(toml_string)?;
        Ok(script)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let toml_string =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_toml(&toml_string).with_context(|| format!("Failed to parse script {}", path.display()))
    }

    /// Bring up the port and read the status of each device in turn.
    pub fn status_survey(ids: &[u8]) -> Self {
        let mut step = vec![HostStep::Enable];
        for id in ids {
            step.push(HostStep::Select { mask: 1 << id });
            for cmd in [REPORT_GENERAL_STATUS, REPORT_SENSE_BYTE_1, REPORT_SENSE_BYTE_2] {
                step.push(HostStep::Command { cmd, param: 0 });
            }
            step.push(HostStep::Command {
                cmd: CLEAR_ATTENTION,
                param: 0,
            });
            step.push(HostStep::Deselect);
        }
        Self { step }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub op: String,
    pub response: Option<u8>,
    pub cycles: u64,
}

pub struct ScriptedHost {
    bus: AnsiBus<SimulatedBus>,
    timestep: TimestepManager,
    timeout: u64,
    step_cycles: u64,
}

impl ScriptedHost {
    pub fn new(bus: AnsiBus<SimulatedBus>, timestep: TimestepManager, timeout: u64) -> Self {
        Self {
            bus,
            timestep,
            timeout: timeout.max(1),
            step_cycles: 0,
        }
    }

    pub fn bus(&self) -> &AnsiBus<SimulatedBus> {
        &self.bus
    }

    pub fn timestep(&self) -> &TimestepManager {
        &self.timestep
    }

    fn io(&mut self) -> &mut SimulatedBus {
        self.bus.signals_mut()
    }

    fn cycle(&mut self) {
        let elapsed_us = self.timestep.next_step();
        self.bus.poll(elapsed_us);
        self.step_cycles += 1;
    }

    fn cycle_until(&mut self, cond: impl Fn(&SimulatedBus) -> bool) -> Result<(), u64> {
        for _ in 0..self.timeout {
            self.cycle();
            if cond(self.bus.signals()) {
                return Ok(());
            }
        }
        Err(self.step_cycles)
    }

    fn select(&mut self, mask: u8) -> Result<(), u64> {
        self.io().host_write(mask);
        self.io().set_strobe(true);
        self.cycle_until(|io| io.ack)?;
        self.io().set_strobe(false);
        self.cycle_until(|io| !io.ack)
    }

    /// Strobe a mask no device answers to. Selected devices drop back to connected.
    fn deselect(&mut self) {
        self.io().host_write(0);
        self.io().set_strobe(true);
        self.cycle();
        self.io().set_strobe(false);
        self.cycle();
    }

    fn send(&mut self, value: u8, command: bool) -> Result<(), u64> {
        self.io().host_write(value);
        if command {
            self.io().set_command_request(true);
        }
        else {
            self.io().set_parameter_request(true);
        }
        self.cycle_until(|io| io.ack)?;
        self.io().set_command_request(false);
        self.io().set_parameter_request(false);
        self.cycle_until(|io| !io.ack)
    }

    fn receive(&mut self) -> Result<u8, u64> {
        self.io().host_release();
        self.io().set_parameter_request(true);
        self.cycle_until(|io| io.ack)?;
        let value = self.bus.signals().bus_out;
        self.io().set_parameter_request(false);
        self.cycle_until(|io| !io.ack)?;
        Ok(value)
    }

    fn poll_status(&mut self) -> u8 {
        self.io().host_release();
        self.io().set_strobe(true);
        self.cycle();
        let value = self.bus.signals().bus_out;
        self.io().set_strobe(false);
        self.cycle();
        value
    }

    fn hold_gate(&mut self, write: bool, cycles: u64) {
        if write {
            self.io().set_write_gate(true);
        }
        else {
            self.io().set_read_gate(true);
        }
        for _ in 0..cycles {
            self.cycle();
        }
        self.io().set_read_gate(false);
        self.io().set_write_gate(false);
        self.cycle();
    }

    fn idle(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.cycle();
        }
    }

    /// Wait for time-dependent commands to finish, so the next step does not begin
    /// while a device is still busy.
    fn settle(&mut self) -> Result<(), u64> {
        let busy = |bus: &AnsiBus<SimulatedBus>| {
            bus.signals().busy
                || bus
                    .devices()
                    .iter()
                    .any(|d| d.state() == AnsiDevState::AwaitingTimeDependentCommand)
        };
        let mut waited = 0;
        while busy(&self.bus) {
            if waited >= self.timeout {
                return Err(self.step_cycles);
            }
            self.cycle();
            waited += 1;
        }
        Ok(())
    }

    fn perform(&mut self, step: &HostStep) -> Result<Option<u8>, u64> {
        match step {
            HostStep::Enable => {
                self.io().set_port_enable(true);
                self.cycle();
                Ok(None)
            }
            HostStep::Disable => {
                self.io().set_port_enable(false);
                self.cycle();
                Ok(None)
            }
            HostStep::Select { mask } => self.select(*mask).map(|_| None),
            HostStep::Deselect => {
                self.deselect();
                Ok(None)
            }
            HostStep::Command { cmd, param } => {
                self.send(*cmd, true)?;
                let response = if command_is_param_out(*cmd) {
                    self.send(*param, false)?;
                    None
                }
                else {
                    Some(self.receive()?)
                };
                self.settle()?;
                Ok(response)
            }
            HostStep::WaitAttention => self.cycle_until(|io| io.attention).map(|_| None),
            HostStep::PollStatus => Ok(Some(self.poll_status())),
            HostStep::ReadGate { cycles } => {
                self.hold_gate(false, *cycles);
                Ok(None)
            }
            HostStep::WriteGate { cycles } => {
                self.hold_gate(true, *cycles);
                Ok(None)
            }
            HostStep::Idle { cycles } => {
                self.idle(*cycles);
                Ok(None)
            }
            HostStep::SetFaults { faults } => {
                self.io().faults = *faults;
                Ok(None)
            }
        }
    }

    pub fn run_step(&mut self, index: usize, step: &HostStep) -> Result<StepRecord, HeadlessError> {
        self.step_cycles = 0;
        let op = step.to_string();
        log::debug!("Step {}: {}", index, op);

        match self.perform(step) {
            Ok(response) => Ok(StepRecord {
                index,
                op,
                response,
                cycles: self.step_cycles,
            }),
            Err(cycles) => Err(HeadlessError::Timeout { step: index, op, cycles }),
        }
    }

    pub fn run(&mut self, script: &HostScript) -> Result<Vec<StepRecord>, HeadlessError> {
        script
            .step
            .iter()
            .enumerate()
            .map(|(index, step)| self.run_step(index, step))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ansidrive_core::{
        device_types::disk_type::AnsiDiskType,
        devices::ansi::{AnsiDevice, GS_NORMAL_COMPLETE},
    };

    fn host(ids: &[u8]) -> ScriptedHost {
        let mut bus = AnsiBus::new(SimulatedBus::new(false));
        for id in ids {
            bus.add_device(AnsiDevice::new(*id, AnsiDiskType::default()).unwrap())
                .unwrap();
        }
        ScriptedHost::new(bus, TimestepManager::new(Some(100.0)), 1000)
    }

    fn responses(records: &[StepRecord]) -> Vec<u8> {
        records.iter().filter_map(|r| r.response).collect()
    }

    #[test]
    fn test_parse_script() {
        let script = HostScript::from_toml(
            r#"
[[step]]
op = "enable"

[[step]]
op = "select"
mask = 0x04

[[step]]
op = "command"
cmd = 0x43
param = 0x10

[[step]]
op = "read_gate"
cycles = 3
"#,
        )
        .unwrap();
        assert_eq!(
            script.step,
            vec![
                HostStep::Enable,
                HostStep::Select { mask: 4 },
                HostStep::Command { cmd: 0x43, param: 0x10 },
                HostStep::ReadGate { cycles: 3 },
            ]
        );
        assert!(HostScript::from_toml("[[step]]\nop = \"jump\"\n").is_err());
    }

    #[test]
    fn test_sample_seek_script() {
        let script = HostScript::from_toml(include_str!("../../../../install/scripts/seek.toml")).unwrap();
        let mut host = host(&[0]);
        let records = host.run(&script).unwrap();
        let r = responses(&records);
        assert_eq!(&r[2..4], &[0x01, 0x2C]);
        assert_eq!(r[1] & GS_NORMAL_COMPLETE, GS_NORMAL_COMPLETE);
        assert_eq!(host.bus().device(0).unwrap().current_cylinder(), 300);
    }

    #[test]
    fn test_status_survey() {
        let mut host = host(&[1, 3]);
        let records = host.run(&HostScript::status_survey(&[1, 3])).unwrap();
        assert_eq!(responses(&records), vec![0; 8]);
        assert_eq!(host.bus().device(1).unwrap().state(), AnsiDevState::Connected);
        assert_eq!(host.bus().device(3).unwrap().state(), AnsiDevState::Connected);
    }

    #[test]
    fn test_wait_attention() {
        let mut host = host(&[1]);
        let script = HostScript {
            step: vec![
                HostStep::Enable,
                HostStep::Select { mask: 0x02 },
                HostStep::Command { cmd: 0x11, param: 0 },
                HostStep::WaitAttention,
                HostStep::Command { cmd: 0x02, param: 0 },
                HostStep::Idle { cycles: 2 },
            ],
        };
        let records = host.run(&script).unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[3].cycles, 1);
        assert!(!host.bus().signals().attention);
        assert!(!host.bus().device(1).unwrap().attention());
    }

    #[test]
    fn test_seek_session() {
        let mut host = host(&[0, 2]);
        let script = HostScript {
            step: vec![
                HostStep::Enable,
                HostStep::Select { mask: 0x04 },
                HostStep::Command { cmd: 0x42, param: 0x01 },
                HostStep::Command { cmd: 0x43, param: 0x02 },
                HostStep::Command { cmd: 0x03, param: 0 },
                HostStep::Command { cmd: 0x29, param: 0 },
                HostStep::Command { cmd: 0x2A, param: 0 },
                HostStep::Command { cmd: 0x0F, param: 0 },
                HostStep::PollStatus,
            ],
        };
        let records = host.run(&script).unwrap();
        let r = responses(&records);
        assert_eq!(r[1], 0x01);
        assert_eq!(r[2], 0x02);
        assert_eq!(r[3] & GS_NORMAL_COMPLETE, GS_NORMAL_COMPLETE);
        assert_eq!(r[4], 0x04);
        assert_eq!(host.bus().device(2).unwrap().current_cylinder(), 0x0102);
        assert_eq!(host.bus().device(0).unwrap().current_cylinder(), 0);
        // The seek step waited out the 5ms seek at 100us per cycle.
        assert!(records[4].cycles >= 50);
    }

    #[test]
    fn test_timeout_without_device() {
        let mut host = host(&[0]);
        let err = host
            .run(&HostScript {
                step: vec![HostStep::Enable, HostStep::Select { mask: 0x80 }],
            })
            .unwrap_err();
        assert_eq!(
            err,
            HeadlessError::Timeout {
                step: 1,
                op: "select 80".to_string(),
                cycles: 1000,
            }
        );
    }
}
