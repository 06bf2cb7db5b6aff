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

    devices::ansi::command.rs

    Command set of the ANSI disk interface, and the command executor.

    Bit 6 of a command code selects its type. When set, the host follows the
    command with a parameter byte (param out). When clear, the device answers
    with a parameter byte (param in).
*/

use std::fmt::{Display, Formatter};

use super::{
    attributes::ATTRIBUTE_TABLE_LEN,
    timed::{Completion, COMMAND_TIME_US, SEEK_TIME_US, SPIN_TIME_US},
    AnsiDevice,
    Registers,
    GS_BUSY_EXECUTING,
    GS_CONTROL_BUS_ERROR,
    GS_ILLEGAL_COMMAND,
    GS_ILLEGAL_PARAMETER,
    GS_NORMAL_COMPLETE,
    GS_NOT_READY,
    SB1_CLEARABLE_FAULTS,
    SB1_COMMAND_REJECT,
    SB2_CLEAR_ATTENTION_MASK,
    SB2_DEVICE_ATTR_TABLE_MODIFIED,
    SB2_INITIAL_STATE,
    SB2_READY_TRANSITION,
};

pub const COMMAND_TYPE_PARAM_OUT: u8 = 0b0100_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::EnumIter)]
#[repr(u8)]
pub enum AnsiCommand {
    ReportIllegalCommand = 0x00,
    ClearFault = 0x01,
    ClearAttention = 0x02,
    Seek = 0x03,
    Rezero = 0x04,
    ReportSenseByte2 = 0x0D,
    ReportSenseByte1 = 0x0E,
    ReportGeneralStatus = 0x0F,
    ReportAttribute = 0x10,
    SetAttention = 0x11,
    SelectiveReset = 0x14,
    SeekToLandingZone = 0x15,
    ReformatTrack = 0x16,
    ReportCylAddrHigh = 0x29,
    ReportCylAddrLow = 0x2A,
    ReportReadPermitHigh = 0x2B,
    ReportReadPermitLow = 0x2C,
    ReportWritePermitHigh = 0x2D,
    ReportWritePermitLow = 0x2E,
    ReportTestByte = 0x2F,
    AttentionControl = 0x40,
    WriteControl = 0x41,
    LoadCylAddrHigh = 0x42,
    LoadCylAddrLow = 0x43,
    SelectHead = 0x44,
    LoadAttributeNumber = 0x50,
    LoadAttribute = 0x51,
    ReadControl = 0x53,
    OffsetControl = 0x54,
    SpinControl = 0x55,
    LoadSectPerTrackHigh = 0x56,
    LoadSectPerTrackMedium = 0x57,
    LoadSectPerTrackLow = 0x58,
    LoadBytesPerSectHigh = 0x59,
    LoadBytesPerSectMedium = 0x5A,
    LoadBytesPerSectLow = 0x5B,
    LoadReadPermitHigh = 0x6B,
    LoadReadPermitLow = 0x6C,
    LoadWritePermitHigh = 0x6D,
    LoadWritePermitLow = 0x6E,
    LoadTestByte = 0x6F,
}

impl TryFrom<u8> for AnsiCommand {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        use AnsiCommand::*;
        Ok(match value {
            0x00 => ReportIllegalCommand,
            0x01 => ClearFault,
            0x02 => ClearAttention,
            0x03 => Seek,
            0x04 => Rezero,
            0x0D => ReportSenseByte2,
            0x0E => ReportSenseByte1,
            0x0F => ReportGeneralStatus,
            0x10 => ReportAttribute,
            0x11 => SetAttention,
            0x14 => SelectiveReset,
            0x15 => SeekToLandingZone,
            0x16 => ReformatTrack,
            0x29 => ReportCylAddrHigh,
            0x2A => ReportCylAddrLow,
            0x2B => ReportReadPermitHigh,
            0x2C => ReportReadPermitLow,
            0x2D => ReportWritePermitHigh,
            0x2E => ReportWritePermitLow,
            0x2F => ReportTestByte,
            0x40 => AttentionControl,
            0x41 => WriteControl,
            0x42 => LoadCylAddrHigh,
            0x43 => LoadCylAddrLow,
            0x44 => SelectHead,
            0x50 => LoadAttributeNumber,
            0x51 => LoadAttribute,
            0x53 => ReadControl,
            0x54 => OffsetControl,
            0x55 => SpinControl,
            0x56 => LoadSectPerTrackHigh,
            0x57 => LoadSectPerTrackMedium,
            0x58 => LoadSectPerTrackLow,
            0x59 => LoadBytesPerSectHigh,
            0x5A => LoadBytesPerSectMedium,
            0x5B => LoadBytesPerSectLow,
            0x6B => LoadReadPermitHigh,
            0x6C => LoadReadPermitLow,
            0x6D => LoadWritePermitHigh,
            0x6E => LoadWritePermitLow,
            0x6F => LoadTestByte,
            _ => return Err(value),
        })
    }
}

impl Display for AnsiCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:02X})", self, *self as u8)
    }
}

/// True if the host supplies a parameter byte after the command.
#[inline]
pub fn command_is_param_out(cmd: u8) -> bool {
    cmd & COMMAND_TYPE_PARAM_OUT != 0
}

/// True if the device answers the command with a parameter byte.
#[inline]
pub fn command_is_param_in(cmd: u8) -> bool {
    !command_is_param_out(cmd)
}

/// True if the command completes after a modeled delay.
pub fn command_is_time_dependent(cmd: u8) -> bool {
    matches!(
        AnsiCommand::try_from(cmd),
        Ok(AnsiCommand::Seek
            | AnsiCommand::Rezero
            | AnsiCommand::SetAttention
            | AnsiCommand::SelectiveReset
            | AnsiCommand::SeekToLandingZone
            | AnsiCommand::ReformatTrack
            | AnsiCommand::SpinControl)
    )
}

fn u24(bytes: [u8; 3]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}

impl AnsiDevice {
    /// Execute a command with its parameter byte and return the response byte.
    ///
    /// `persistent_faults` holds the sense byte 1 faults still physically present,
    /// which CLEAR_FAULT will not reset. For param out commands the response byte
    /// is left unchanged.
    pub fn execute_command(&mut self, cmd: u8, param_out: u8, persistent_faults: u8) -> u8 {
        self.regs.cmd = cmd;
        self.regs.param_out = param_out;

        let command = match AnsiCommand::try_from(cmd) {
            Err(_) => {
                log::warn!("Device {}: illegal command {:02X}", self.id(), cmd);
                self.set_general_status(GS_ILLEGAL_COMMAND);
                self.regs.param_in = self.general_status();
                return self.regs.param_in;
            }
            Ok(command) => command,
        };

        if command_is_param_out(cmd) {
            log::debug!("Device {}: {} param: {:02X}", self.id(), command, param_out);
        }
        else {
            log::debug!("Device {}: {}", self.id(), command);
        }

        if let Some(response) = self.dispatch(command, param_out, persistent_faults) {
            self.regs.param_in = response;
        }
        self.regs.param_in
    }

    fn dispatch(&mut self, command: AnsiCommand, param: u8, persistent_faults: u8) -> Option<u8> {
        use AnsiCommand::*;
        match command {
            ReportIllegalCommand => {
                self.set_general_status(GS_ILLEGAL_COMMAND);
                Some(self.general_status())
            }
            ClearFault => {
                if self.clear_faults(persistent_faults) {
                    self.clear_attention();
                }
                Some(self.general_status())
            }
            ClearAttention => {
                self.clear_sb2(SB2_CLEAR_ATTENTION_MASK);
                self.clear_general_status(GS_NORMAL_COMPLETE);
                self.clear_attention();
                Some(self.general_status())
            }
            Seek => {
                let target = self.load_cylinder();
                if !self.spindle_running() {
                    self.set_sb1(SB1_COMMAND_REJECT);
                    self.start_timed(0.0, Completion::Reject)
                }
                else if target >= self.disk_type().cylinders {
                    log::warn!(
                        "Device {}: seek to cylinder {} out of range ({} cylinders)",
                        self.id(),
                        target,
                        self.disk_type().cylinders
                    );
                    self.illegal_parameter();
                    self.start_timed(0.0, Completion::Reject)
                }
                else {
                    let completion = Completion::Seek {
                        cylinder_high: self.regs.load_cylinder_high,
                        cylinder_low: self.regs.load_cylinder_low,
                    };
                    self.start_timed(SEEK_TIME_US, completion)
                }
            }
            Rezero => {
                if !self.spindle_running() {
                    self.set_sb1(SB1_COMMAND_REJECT);
                    self.start_timed(0.0, Completion::Reject)
                }
                else {
                    self.start_timed(SEEK_TIME_US, Completion::Rezero)
                }
            }
            SetAttention => self.start_timed(COMMAND_TIME_US, Completion::SetAttention),
            SelectiveReset => self.start_timed(COMMAND_TIME_US, Completion::SelectiveReset),
            SeekToLandingZone => self.start_timed(SEEK_TIME_US, Completion::SeekLandingZone),
            ReformatTrack => {
                let sectors = u24(self.regs.sector_pulses);
                let bytes_per_sector = u24(self.regs.bytes_per_sector);
                let capacity = self.disk_type().bytes_per_track() as u64;
                if sectors == 0
                    || bytes_per_sector == 0
                    || sectors > u16::MAX as u32
                    || sectors as u64 * bytes_per_sector as u64 > capacity
                {
                    log::warn!(
                        "Device {}: reformat to {} sectors of {} bytes rejected",
                        self.id(),
                        sectors,
                        bytes_per_sector
                    );
                    self.illegal_parameter();
                    self.start_timed(0.0, Completion::Reject)
                }
                else {
                    let completion = Completion::ReformatTrack {
                        sector_pulses: self.regs.sector_pulses,
                        bytes_per_sector: self.regs.bytes_per_sector,
                    };
                    self.start_timed(COMMAND_TIME_US, completion)
                }
            }
            ReportSenseByte2 => Some(self.sense_byte_2()),
            ReportSenseByte1 => Some(self.sense_byte_1()),
            ReportGeneralStatus => Some(self.general_status()),
            ReportAttribute => {
                let number = self.regs.attribute_number;
                match self.attributes.read(&self.disk_type, number) {
                    Some(value) => Some(value),
                    None => {
                        self.illegal_parameter();
                        Some(self.general_status())
                    }
                }
            }
            ReportCylAddrHigh => Some(self.regs.current_cylinder_high),
            ReportCylAddrLow => Some(self.regs.current_cylinder_low),
            ReportReadPermitHigh => Some(self.regs.read_permit_high),
            ReportReadPermitLow => Some(self.regs.read_permit_low),
            ReportWritePermitHigh => Some(self.regs.write_permit_high),
            ReportWritePermitLow => Some(self.regs.write_permit_low),
            ReportTestByte => Some(self.regs.test_byte),
            AttentionControl => {
                self.regs.attention_enabled = param & 0x80 == 0;
                None
            }
            WriteControl => {
                self.regs.write_enabled = param & 0x80 != 0;
                None
            }
            LoadCylAddrHigh => {
                self.regs.load_cylinder_high = param;
                None
            }
            LoadCylAddrLow => {
                self.regs.load_cylinder_low = param;
                None
            }
            SelectHead => {
                if param >= self.disk_type().heads {
                    log::warn!("Device {}: head {} out of range", self.id(), param);
                    self.illegal_parameter();
                }
                else {
                    self.regs.selected_head = param;
                }
                None
            }
            LoadAttributeNumber => {
                if param as usize >= ATTRIBUTE_TABLE_LEN {
                    log::warn!("Device {}: attribute number {:02X} out of range", self.id(), param);
                    self.illegal_parameter();
                }
                else {
                    self.regs.attribute_number = param;
                }
                None
            }
            LoadAttribute => {
                let number = self.regs.attribute_number;
                if !self.attributes.write(&self.disk_type, number, param) {
                    self.illegal_parameter();
                }
                None
            }
            ReadControl => {
                self.regs.read_control = param;
                None
            }
            OffsetControl => {
                self.regs.offset_control = param;
                None
            }
            SpinControl => {
                let up = param & 0x80 != 0;
                self.start_timed(SPIN_TIME_US, Completion::Spin { up });
                None
            }
            LoadSectPerTrackHigh => {
                self.regs.sector_pulses[0] = param;
                None
            }
            LoadSectPerTrackMedium => {
                self.regs.sector_pulses[1] = param;
                None
            }
            LoadSectPerTrackLow => {
                self.regs.sector_pulses[2] = param;
                None
            }
            LoadBytesPerSectHigh => {
                self.regs.bytes_per_sector[0] = param;
                None
            }
            LoadBytesPerSectMedium => {
                self.regs.bytes_per_sector[1] = param;
                None
            }
            LoadBytesPerSectLow => {
                self.regs.bytes_per_sector[2] = param;
                None
            }
            LoadReadPermitHigh => {
                self.regs.read_permit_high = param;
                None
            }
            LoadReadPermitLow => {
                self.regs.read_permit_low = param;
                None
            }
            LoadWritePermitHigh => {
                self.regs.write_permit_high = param;
                None
            }
            LoadWritePermitLow => {
                self.regs.write_permit_low = param;
                None
            }
            LoadTestByte => {
                self.regs.test_byte = param;
                None
            }
        }
    }

    /// Register a time-dependent command. Busy is reported until it completes.
    fn start_timed(&mut self, duration_us: f64, completion: Completion) -> Option<u8> {
        self.clear_general_status(GS_NORMAL_COMPLETE);
        self.set_general_status(GS_BUSY_EXECUTING);
        self.timed.start(duration_us, Some(completion));
        Some(self.general_status())
    }

    /// Clear the GS error bits and the clearable sense byte 1 faults, then re-assert
    /// the faults still present. Returns true if no fault persists.
    fn clear_faults(&mut self, persistent_faults: u8) -> bool {
        self.clear_general_status(GS_CONTROL_BUS_ERROR | GS_ILLEGAL_COMMAND | GS_ILLEGAL_PARAMETER);
        let persistent = persistent_faults & SB1_CLEARABLE_FAULTS;
        self.clear_sb1(SB1_CLEARABLE_FAULTS & !persistent);
        if persistent != 0 {
            log::debug!("Device {}: faults {:02X} still present", self.id(), persistent);
            self.set_sb1(persistent);
            return false;
        }
        true
    }

    /// Apply the effect of an expired time-dependent command.
    pub(crate) fn complete_timed(&mut self, completion: Option<Completion>, persistent_faults: u8) {
        self.clear_general_status(GS_BUSY_EXECUTING);
        let Some(completion) = completion
        else {
            return;
        };
        log::debug!("Device {}: {} complete", self.id(), completion);

        match completion {
            Completion::Seek {
                cylinder_high,
                cylinder_low,
            } => {
                self.set_current_cylinder(u16::from_be_bytes([cylinder_high, cylinder_low]));
            }
            Completion::Rezero => {
                self.set_current_cylinder(0);
            }
            Completion::SetAttention => {
                self.raise_attention();
            }
            Completion::SelectiveReset => {
                let Registers {
                    cmd,
                    param_out,
                    param_in,
                    current_cylinder_high,
                    current_cylinder_low,
                    ..
                } = self.regs;
                self.regs = Registers {
                    cmd,
                    param_out,
                    param_in,
                    current_cylinder_high,
                    current_cylinder_low,
                    ..Default::default()
                };
                self.clear_sb2(SB2_CLEAR_ATTENTION_MASK);
                if self.clear_faults(persistent_faults) {
                    self.clear_attention();
                }
                self.set_sb2(SB2_INITIAL_STATE);
            }
            Completion::SeekLandingZone => {
                let lz = self.disk_type().landing_zone;
                self.set_current_cylinder(lz);
            }
            Completion::ReformatTrack {
                sector_pulses,
                bytes_per_sector,
            } => {
                let disk = self.disk_type().clone();
                self.attributes
                    .apply_format(&disk, u24(sector_pulses), u24(bytes_per_sector));
                self.set_sb2(SB2_DEVICE_ATTR_TABLE_MODIFIED);
            }
            Completion::Spin { up } => {
                self.set_spindle_running(up);
                if up {
                    self.clear_general_status(GS_NOT_READY);
                }
                else {
                    self.set_general_status(GS_NOT_READY);
                    let lz = self.disk_type().landing_zone;
                    self.set_current_cylinder(lz);
                }
                self.set_sb2(SB2_READY_TRANSITION);
            }
            Completion::Reject => return,
        }
        self.set_general_status(GS_NORMAL_COMPLETE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device_types::disk_type::AnsiDiskType,
        devices::ansi::{
            timed::TimedPoll,
            GS_SENSE_BYTE_1,
            GS_SENSE_BYTE_2,
            SB1_POWER_FAULT,
            SB1_SEEK_ERROR,
            SB2_DEV_RESERVED_TO_ALT_PORT,
            SB2_FORCED_RELEASE,
            SB2_VENDOR_ATTNS,
        },
    };
    use strum::IntoEnumIterator;

    fn device() -> AnsiDevice {
        AnsiDevice::new(0, AnsiDiskType::default()).unwrap()
    }

    /// Run the scheduler of `dev` to expiry and dispatch the completion.
    fn finish(dev: &mut AnsiDevice) {
        loop {
            dev.timed.advance(1000.0);
            if let TimedPoll::Complete(c) = dev.timed.poll() {
                dev.complete_timed(c, 0);
                break;
            }
        }
    }

    #[test]
    fn test_command_codes_round_trip() {
        for command in AnsiCommand::iter() {
            assert_eq!(AnsiCommand::try_from(command as u8), Ok(command));
        }
        assert_eq!(AnsiCommand::try_from(0xAA), Err(0xAA));
    }

    #[test]
    fn test_classification_is_stable() {
        for cmd in 0..=255u8 {
            assert_eq!(command_is_param_out(cmd), command_is_param_out(cmd));
            assert_eq!(command_is_param_out(cmd), !command_is_param_in(cmd));
            assert_eq!(command_is_time_dependent(cmd), command_is_time_dependent(cmd));
        }
        assert!(command_is_param_out(0x40));
        assert!(command_is_param_out(0x6F));
        assert!(command_is_param_in(0x0F));
        assert!(command_is_param_in(0x2F));

        let timed: Vec<u8> = (0..=255u8).filter(|c| command_is_time_dependent(*c)).collect();
        assert_eq!(timed, vec![0x03, 0x04, 0x11, 0x14, 0x15, 0x16, 0x55]);
    }

    #[test]
    fn test_report_general_status_does_not_mutate() {
        let mut dev = device();
        assert_eq!(dev.execute_command(0x0F, 0, 0), 0x00);
        assert_eq!(dev.general_status(), 0);
        assert_eq!(dev.sense_byte_1(), 0);
        assert!(!dev.attention());
    }

    #[test]
    fn test_unknown_command_is_illegal() {
        let mut dev = device();
        let response = dev.execute_command(0xAA, 0, 0);
        assert_eq!(response & GS_ILLEGAL_COMMAND, GS_ILLEGAL_COMMAND);

        let mut dev = device();
        assert_eq!(dev.execute_command(0x00, 0, 0), GS_ILLEGAL_COMMAND);
    }

    #[test]
    fn test_seek_commits_after_completion() {
        let mut dev = device();
        dev.execute_command(0x42, 0x01, 0);
        dev.execute_command(0x43, 0x2C, 0);
        let response = dev.execute_command(0x03, 0, 0);
        assert_eq!(response & GS_BUSY_EXECUTING, GS_BUSY_EXECUTING);
        assert_eq!(dev.current_cylinder(), 0);

        finish(&mut dev);
        assert_eq!(dev.current_cylinder(), 0x012C);
        assert_eq!(dev.general_status() & GS_BUSY_EXECUTING, 0);
        assert_eq!(dev.general_status() & GS_NORMAL_COMPLETE, GS_NORMAL_COMPLETE);
        assert_eq!(dev.execute_command(0x29, 0, 0), 0x01);
        assert_eq!(dev.execute_command(0x2A, 0, 0), 0x2C);
    }

    #[test]
    fn test_seek_out_of_range() {
        let mut dev = device();
        // 1049 cylinders; 0x0419 is one past the last
        dev.execute_command(0x42, 0x04, 0);
        dev.execute_command(0x43, 0x19, 0);
        let response = dev.execute_command(0x03, 0, 0);
        assert_eq!(response & GS_ILLEGAL_PARAMETER, GS_ILLEGAL_PARAMETER);
        assert!(dev.attention());

        finish(&mut dev);
        assert_eq!(dev.current_cylinder(), 0);
        assert_eq!(dev.general_status() & GS_BUSY_EXECUTING, 0);
        assert_eq!(dev.general_status() & GS_NORMAL_COMPLETE, 0);
    }

    #[test]
    fn test_rezero_and_landing_zone() {
        let mut dev = device();
        dev.execute_command(0x15, 0, 0);
        finish(&mut dev);
        assert_eq!(dev.current_cylinder(), dev.disk_type().landing_zone);

        dev.execute_command(0x04, 0, 0);
        finish(&mut dev);
        assert_eq!(dev.current_cylinder(), 0);
    }

    #[test]
    fn test_select_head_range() {
        let mut dev = device();
        dev.execute_command(0x44, 4, 0);
        assert_eq!(dev.selected_head(), 4);
        assert_eq!(dev.general_status(), 0);

        dev.execute_command(0x44, 5, 0);
        assert_eq!(dev.selected_head(), 4);
        assert_eq!(dev.general_status() & GS_ILLEGAL_PARAMETER, GS_ILLEGAL_PARAMETER);
        assert!(dev.attention());
    }

    #[test]
    fn test_attribute_commands() {
        let mut dev = device();
        dev.execute_command(0x50, 0x22, 0);
        assert_eq!(dev.execute_command(0x10, 0, 0), 5);
        assert_eq!(dev.attributes().init_count(), 1);

        dev.execute_command(0x50, 0x31, 0);
        dev.execute_command(0x51, 0x99, 0);
        assert_eq!(dev.execute_command(0x10, 0, 0), 0x99);
        assert_eq!(dev.attributes().init_count(), 1);

        dev.execute_command(0x50, 0x48, 0);
        assert_eq!(dev.attribute_number(), 0x31);
        assert_eq!(dev.general_status() & GS_ILLEGAL_PARAMETER, GS_ILLEGAL_PARAMETER);
    }

    #[test]
    fn test_mode_toggles() {
        let mut dev = device();
        dev.execute_command(0x40, 0x80, 0);
        assert!(!dev.attention_enabled());
        dev.execute_command(0x40, 0x00, 0);
        assert!(dev.attention_enabled());

        dev.execute_command(0x41, 0x80, 0);
        assert!(dev.write_enabled());
        dev.execute_command(0x41, 0x7F, 0);
        assert!(!dev.write_enabled());
    }

    #[test]
    fn test_register_round_trips() {
        let mut dev = device();
        dev.execute_command(0x6F, 0x3C, 0);
        assert_eq!(dev.execute_command(0x2F, 0, 0), 0x3C);
        dev.execute_command(0x6B, 0x11, 0);
        dev.execute_command(0x6C, 0x22, 0);
        dev.execute_command(0x6D, 0x33, 0);
        dev.execute_command(0x6E, 0x44, 0);
        assert_eq!(dev.execute_command(0x2B, 0, 0), 0x11);
        assert_eq!(dev.execute_command(0x2C, 0, 0), 0x22);
        assert_eq!(dev.execute_command(0x2D, 0, 0), 0x33);
        assert_eq!(dev.execute_command(0x2E, 0, 0), 0x44);
    }

    #[test]
    fn test_clear_fault_respects_persistent_faults() {
        let mut dev = device();
        dev.set_sb1(SB1_SEEK_ERROR | SB1_POWER_FAULT);
        dev.set_general_status(GS_ILLEGAL_PARAMETER);

        let response = dev.execute_command(0x01, 0, SB1_POWER_FAULT);
        assert_eq!(dev.sense_byte_1(), SB1_POWER_FAULT);
        assert_eq!(response & GS_ILLEGAL_PARAMETER, 0);
        assert_eq!(response & GS_SENSE_BYTE_1, GS_SENSE_BYTE_1);
        assert!(dev.attention());

        let response = dev.execute_command(0x01, 0, 0);
        assert_eq!(dev.sense_byte_1(), 0);
        assert_eq!(response & GS_SENSE_BYTE_1, 0);
        assert!(!dev.attention());
    }

    #[test]
    fn test_clear_attention() {
        let mut dev = device();
        dev.set_sb2(SB2_INITIAL_STATE | SB2_DEV_RESERVED_TO_ALT_PORT | SB2_FORCED_RELEASE | SB2_VENDOR_ATTNS);
        assert!(dev.attention());
        let response = dev.execute_command(0x02, 0, 0);
        assert!(!dev.attention());
        assert_eq!(
            dev.sense_byte_2(),
            SB2_DEV_RESERVED_TO_ALT_PORT | SB2_FORCED_RELEASE | SB2_VENDOR_ATTNS
        );
        assert_eq!(response & GS_SENSE_BYTE_2, GS_SENSE_BYTE_2);
    }

    #[test]
    fn test_set_attention_is_deferred() {
        let mut dev = device();
        dev.execute_command(0x11, 0, 0);
        assert!(!dev.attention());
        finish(&mut dev);
        assert!(dev.attention());
    }

    #[test]
    fn test_selective_reset() {
        let mut dev = device();
        dev.execute_command(0x44, 2, 0);
        dev.execute_command(0x40, 0x80, 0);
        dev.execute_command(0x42, 0x00, 0);
        dev.execute_command(0x43, 0x10, 0);
        dev.execute_command(0x03, 0, 0);
        finish(&mut dev);

        dev.set_sb1(SB1_SEEK_ERROR | SB1_COMMAND_REJECT);
        dev.execute_command(0x14, 0, 0);
        finish(&mut dev);
        assert_eq!(dev.sense_byte_1(), 0);
        assert_eq!(dev.general_status() & GS_SENSE_BYTE_1, 0);
        assert_eq!(dev.selected_head(), 0);
        assert!(dev.attention_enabled());
        assert_eq!(dev.current_cylinder(), 0x10);
        assert_eq!(dev.sense_byte_2() & SB2_INITIAL_STATE, SB2_INITIAL_STATE);
        assert!(dev.attention());
    }

    #[test]
    fn test_selective_reset_keeps_persistent_faults() {
        let mut dev = device();
        dev.set_sb1(SB1_SEEK_ERROR | SB1_COMMAND_REJECT);
        dev.execute_command(0x14, 0, 0);
        loop {
            dev.timed.advance(1000.0);
            if let TimedPoll::Complete(c) = dev.timed.poll() {
                dev.complete_timed(c, SB1_SEEK_ERROR);
                break;
            }
        }
        assert_eq!(dev.sense_byte_1(), SB1_SEEK_ERROR);
        assert_eq!(dev.sense_byte_2() & SB2_INITIAL_STATE, SB2_INITIAL_STATE);
    }

    #[test]
    fn test_report_illegal_command() {
        let mut dev = device();
        let response = dev.execute_command(0x00, 0, 0);
        assert_eq!(response & GS_ILLEGAL_COMMAND, GS_ILLEGAL_COMMAND);
        assert_eq!(dev.cmd(), 0x00);
    }

    #[test]
    fn test_reformat_track() {
        let mut dev = device();
        // 24 sectors of 512 bytes fit in a 12 * 1056 byte track
        dev.execute_command(0x58, 24, 0);
        dev.execute_command(0x5A, 0x02, 0);
        dev.execute_command(0x5B, 0x00, 0);
        let response = dev.execute_command(0x16, 0, 0);
        assert_eq!(response & GS_BUSY_EXECUTING, GS_BUSY_EXECUTING);
        finish(&mut dev);

        dev.execute_command(0x50, 0x18, 0);
        assert_eq!(dev.execute_command(0x10, 0, 0), 24);
        dev.execute_command(0x50, 0x14, 0);
        assert_eq!(dev.execute_command(0x10, 0, 0), 0x02);
        assert_eq!(dev.sense_byte_2() & SB2_DEVICE_ATTR_TABLE_MODIFIED, SB2_DEVICE_ATTR_TABLE_MODIFIED);
    }

    #[test]
    fn test_reformat_rejects_oversized_track() {
        let mut dev = device();
        dev.execute_command(0x58, 13, 0);
        dev.execute_command(0x5A, 0x04, 0);
        dev.execute_command(0x5B, 0x20, 0);
        let response = dev.execute_command(0x16, 0, 0);
        assert_eq!(response & GS_ILLEGAL_PARAMETER, GS_ILLEGAL_PARAMETER);
        finish(&mut dev);
        dev.execute_command(0x50, 0x18, 0);
        assert_eq!(dev.execute_command(0x10, 0, 0), 12);
    }

    #[test]
    fn test_spin_control() {
        let mut dev = device();
        dev.execute_command(0x55, 0x00, 0);
        assert_eq!(dev.general_status() & GS_BUSY_EXECUTING, GS_BUSY_EXECUTING);
        finish(&mut dev);
        assert!(!dev.spindle_running());
        assert_eq!(dev.general_status() & GS_NOT_READY, GS_NOT_READY);

        let response = dev.execute_command(0x03, 0, 0);
        assert_eq!(response & GS_BUSY_EXECUTING, GS_BUSY_EXECUTING);
        assert_eq!(dev.sense_byte_1() & SB1_COMMAND_REJECT, SB1_COMMAND_REJECT);
        finish(&mut dev);

        dev.execute_command(0x55, 0x80, 0);
        finish(&mut dev);
        assert!(dev.spindle_running());
        assert_eq!(dev.general_status() & GS_NOT_READY, 0);
        assert_eq!(dev.sense_byte_2() & SB2_READY_TRANSITION, SB2_READY_TRANSITION);
    }
}
