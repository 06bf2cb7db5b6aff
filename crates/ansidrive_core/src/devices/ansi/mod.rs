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

    devices::ansi::mod.rs

    Device side of the ANSI X3.101 disk interface.

    An AnsiDevice impersonates a single drive on the interface. It is driven
    by repeatedly calling poll(), which samples the interface lines through an
    AnsiSignals implementation and advances the bus state machine.
*/

pub mod attributes;
pub mod bus;
pub mod command;
pub mod data_phase;
pub mod pins;
pub mod timed;

use crate::device_types::disk_type::AnsiDiskType;

use attributes::AttributeTable;
use data_phase::{DataPhase, DataPhaseKind, NullDataPhase};
use pins::AnsiPins;
use timed::TimedCommand;

pub use bus::AnsiBus;
pub use pins::{AnsiSignals, ControlBusDirection, Level, OutputLine};

pub const MAX_DEVICES: usize = 8;

// General status byte
pub const GS_NOT_READY: u8 = 0b0000_0001;
pub const GS_CONTROL_BUS_ERROR: u8 = 0b0000_0010;
pub const GS_ILLEGAL_COMMAND: u8 = 0b0000_0100;
pub const GS_ILLEGAL_PARAMETER: u8 = 0b0000_1000;
pub const GS_SENSE_BYTE_1: u8 = 0b0001_0000;
pub const GS_SENSE_BYTE_2: u8 = 0b0010_0000;
pub const GS_BUSY_EXECUTING: u8 = 0b0100_0000;
pub const GS_NORMAL_COMPLETE: u8 = 0b1000_0000;

// Sense byte 1
pub const SB1_SEEK_ERROR: u8 = 0b0000_0001;
pub const SB1_RW_FAULT: u8 = 0b0000_0010;
pub const SB1_POWER_FAULT: u8 = 0b0000_0100;
pub const SB1_RW_PERMIT_VIOLATION: u8 = 0b0000_1000;
pub const SB1_SPEED_ERROR: u8 = 0b0001_0000;
pub const SB1_COMMAND_REJECT: u8 = 0b0010_0000;
pub const SB1_OTHER_ERRORS: u8 = 0b0100_0000;
pub const SB1_VENDOR_ERRORS: u8 = 0b1000_0000;

/// Sense byte 1 bits that CLEAR_FAULT may reset.
pub const SB1_CLEARABLE_FAULTS: u8 = SB1_SEEK_ERROR
    | SB1_RW_FAULT
    | SB1_POWER_FAULT
    | SB1_RW_PERMIT_VIOLATION
    | SB1_SPEED_ERROR
    | SB1_COMMAND_REJECT;

// Sense byte 2
pub const SB2_INITIAL_STATE: u8 = 0b0000_0001;
pub const SB2_READY_TRANSITION: u8 = 0b0000_0010;
pub const SB2_DEV_RESERVED_TO_THIS_POINT: u8 = 0b0000_0100;
pub const SB2_FORCED_RELEASE: u8 = 0b0000_1000;
pub const SB2_DEV_RESERVED_TO_ALT_PORT: u8 = 0b0001_0000;
pub const SB2_DEVICE_ATTR_TABLE_MODIFIED: u8 = 0b0010_0000;
pub const SB2_POSITIONED_WITHIN_WRITE_PROTECTED_AREA: u8 = 0b0100_0000;
pub const SB2_VENDOR_ATTNS: u8 = 0b1000_0000;

/// Sense byte 2 bits that raise the attention condition when they become set.
pub const SB2_ATTENTION_BITS: u8 =
    SB2_INITIAL_STATE | SB2_READY_TRANSITION | SB2_FORCED_RELEASE | SB2_DEVICE_ATTR_TABLE_MODIFIED | SB2_VENDOR_ATTNS;

/// Sense byte 2 bits reset by CLEAR_ATTENTION. Forced release and vendor attentions are left alone.
pub const SB2_CLEAR_ATTENTION_MASK: u8 = SB2_INITIAL_STATE | SB2_READY_TRANSITION | SB2_DEVICE_ATTR_TABLE_MODIFIED;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AnsiError {
    #[error("Device id {0} is out of range (0-7).")]
    InvalidDeviceId(u8),
    #[error("Device id {0} is already present on the bus.")]
    DuplicateDeviceId(u8),
    #[error("Disk profile is invalid: {0}")]
    InvalidDiskType(String),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum_macros::Display)]
pub enum AnsiDevState {
    #[default]
    Disconnected,
    Connected,
    Selected,
    ReadCommand,
    AwaitingParamOut,
    ExecuteCommand,
    AwaitingParamIn,
    AwaitingTimeDependentCommand,
    Reading,
    Writing,
}

impl AnsiDevState {
    /// States inside a command handshake or time-dependent execution, where a
    /// read or write gate is a protocol violation.
    pub fn in_command(&self) -> bool {
        matches!(
            self,
            AnsiDevState::ReadCommand
                | AnsiDevState::AwaitingParamOut
                | AnsiDevState::ExecuteCommand
                | AnsiDevState::AwaitingParamIn
                | AnsiDevState::AwaitingTimeDependentCommand
        )
    }
}

/// Parameters that SELECTIVE_RESET and disconnection return to their initial values.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Registers {
    pub(crate) cmd: u8,
    pub(crate) param_out: u8,
    pub(crate) param_in: u8,
    pub(crate) attention_enabled: bool,
    pub(crate) write_enabled: bool,
    pub(crate) selected_head: u8,
    pub(crate) current_cylinder_high: u8,
    pub(crate) current_cylinder_low: u8,
    pub(crate) load_cylinder_high: u8,
    pub(crate) load_cylinder_low: u8,
    pub(crate) read_permit_high: u8,
    pub(crate) read_permit_low: u8,
    pub(crate) write_permit_high: u8,
    pub(crate) write_permit_low: u8,
    pub(crate) read_control: u8,
    pub(crate) offset_control: u8,
    pub(crate) sector_pulses: [u8; 3],
    pub(crate) bytes_per_sector: [u8; 3],
    pub(crate) test_byte: u8,
    pub(crate) attribute_number: u8,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            cmd: 0,
            param_out: 0,
            param_in: 0,
            attention_enabled: true,
            write_enabled: false,
            selected_head: 0,
            current_cylinder_high: 0,
            current_cylinder_low: 0,
            load_cylinder_high: 0,
            load_cylinder_low: 0,
            read_permit_high: 0,
            read_permit_low: 0,
            write_permit_high: 0,
            write_permit_low: 0,
            read_control: 0,
            offset_control: 0,
            sector_pulses: [0; 3],
            bytes_per_sector: [0; 3],
            test_byte: 0,
            attribute_number: 0,
        }
    }
}

pub struct AnsiDevice {
    id: u8,
    disk_type: AnsiDiskType,
    state: AnsiDevState,
    previous_pins: AnsiPins,

    pub(crate) regs: Registers,
    general_status: u8,
    sense_byte_1: u8,
    sense_byte_2: u8,
    attention: bool,
    spindle_running: bool,

    pub(crate) attributes: AttributeTable,
    pub(crate) timed: TimedCommand,

    data_phase: Box<dyn DataPhase>,
    data_phase_kind: Option<DataPhaseKind>,
    gate_us: f64,

    // Levels this device currently drives on its output lines.
    ack_asserted: bool,
    busy_asserted: bool,
    attention_line: bool,
}

impl AnsiDevice {
    pub fn new(id: u8, disk_type: AnsiDiskType) -> Result<Self, AnsiError> {
        if id as usize >= MAX_DEVICES {
            return Err(AnsiError::InvalidDeviceId(id));
        }
        if !disk_type.is_valid() {
            return Err(AnsiError::InvalidDiskType(disk_type.to_string()));
        }
        Ok(Self {
            id,
            disk_type,
            state: AnsiDevState::Disconnected,
            previous_pins: AnsiPins::default(),
            regs: Registers::default(),
            general_status: 0,
            sense_byte_1: 0,
            sense_byte_2: 0,
            attention: false,
            spindle_running: true,
            attributes: AttributeTable::new(),
            timed: TimedCommand::new(),
            data_phase: Box::new(NullDataPhase::default()),
            data_phase_kind: None,
            gate_us: 0.0,
            ack_asserted: false,
            busy_asserted: false,
            attention_line: false,
        })
    }

    pub fn with_data_phase(mut self, data_phase: Box<dyn DataPhase>) -> Self {
        self.data_phase = data_phase;
        self
    }

    /// Return the device to its power-on state. The id, disk profile and data
    /// phase handler are kept. Output line latches are left alone so that the
    /// next cycle releases whatever lines are still driven.
    pub fn initial_state(&mut self) {
        self.regs = Registers::default();
        self.general_status = 0;
        self.sense_byte_1 = 0;
        self.sense_byte_2 = 0;
        self.attention = false;
        self.spindle_running = true;
        self.attributes.invalidate();
        self.timed.cancel();
        self.data_phase_kind = None;
        self.gate_us = 0.0;
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn disk_type(&self) -> &AnsiDiskType {
        &self.disk_type
    }

    pub fn state(&self) -> AnsiDevState {
        self.state
    }

    pub(crate) fn set_state(&mut self, new_state: AnsiDevState) {
        if new_state != self.state {
            log::debug!("Device {}: {} -> {}", self.id, self.state, new_state);
            self.state = new_state;
        }
    }

    pub fn general_status(&self) -> u8 {
        self.general_status
    }

    pub fn sense_byte_1(&self) -> u8 {
        self.sense_byte_1
    }

    pub fn sense_byte_2(&self) -> u8 {
        self.sense_byte_2
    }

    pub fn cmd(&self) -> u8 {
        self.regs.cmd
    }

    pub fn param_in(&self) -> u8 {
        self.regs.param_in
    }

    pub fn param_out(&self) -> u8 {
        self.regs.param_out
    }

    pub fn current_cylinder(&self) -> u16 {
        u16::from_be_bytes([self.regs.current_cylinder_high, self.regs.current_cylinder_low])
    }

    pub(crate) fn set_current_cylinder(&mut self, cylinder: u16) {
        [self.regs.current_cylinder_high, self.regs.current_cylinder_low] = cylinder.to_be_bytes();
    }

    pub fn load_cylinder(&self) -> u16 {
        u16::from_be_bytes([self.regs.load_cylinder_high, self.regs.load_cylinder_low])
    }

    pub fn selected_head(&self) -> u8 {
        self.regs.selected_head
    }

    pub fn attention(&self) -> bool {
        self.attention
    }

    pub fn attention_enabled(&self) -> bool {
        self.regs.attention_enabled
    }

    pub fn write_enabled(&self) -> bool {
        self.regs.write_enabled
    }

    pub fn spindle_running(&self) -> bool {
        self.spindle_running
    }

    pub(crate) fn set_spindle_running(&mut self, running: bool) {
        self.spindle_running = running;
    }

    pub fn test_byte(&self) -> u8 {
        self.regs.test_byte
    }

    pub fn attribute_number(&self) -> u8 {
        self.regs.attribute_number
    }

    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    pub fn ack_asserted(&self) -> bool {
        self.ack_asserted
    }

    pub fn busy_asserted(&self) -> bool {
        self.busy_asserted
    }

    /// Level currently driven onto the shared attention line.
    pub fn attention_line(&self) -> bool {
        self.attention_line
    }

    pub fn previous_pins(&self) -> &AnsiPins {
        &self.previous_pins
    }

    pub fn raise_attention(&mut self) {
        self.attention = true;
    }

    pub fn clear_attention(&mut self) {
        self.attention = false;
    }

    pub fn set_general_status(&mut self, bits: u8) {
        self.general_status |= bits;
    }

    pub fn clear_general_status(&mut self, bits: u8) {
        self.general_status &= !bits;
    }

    /// Set sense byte 1 bits. Any bit that was clear raises attention.
    pub fn set_sb1(&mut self, bits: u8) {
        let new_bits = bits & !self.sense_byte_1;
        self.sense_byte_1 |= bits;
        if new_bits != 0 {
            self.raise_attention();
        }
        self.sync_sense_summary();
    }

    pub fn clear_sb1(&mut self, bits: u8) {
        self.sense_byte_1 &= !bits;
        self.sync_sense_summary();
    }

    /// Set sense byte 2 bits. Only the bits in [SB2_ATTENTION_BITS] raise
    /// attention, and only on a 0 to 1 transition.
    pub fn set_sb2(&mut self, bits: u8) {
        let new_bits = bits & !self.sense_byte_2;
        self.sense_byte_2 |= bits;
        if new_bits & SB2_ATTENTION_BITS != 0 {
            self.raise_attention();
        }
        self.sync_sense_summary();
    }

    pub fn clear_sb2(&mut self, bits: u8) {
        self.sense_byte_2 &= !bits;
        self.sync_sense_summary();
    }

    fn sync_sense_summary(&mut self) {
        if self.sense_byte_1 != 0 {
            self.general_status |= GS_SENSE_BYTE_1;
        }
        else {
            self.general_status &= !GS_SENSE_BYTE_1;
        }
        if self.sense_byte_2 != 0 {
            self.general_status |= GS_SENSE_BYTE_2;
        }
        else {
            self.general_status &= !GS_SENSE_BYTE_2;
        }
    }

    /// Flag an out of range parameter.
    pub(crate) fn illegal_parameter(&mut self) {
        self.general_status |= GS_ILLEGAL_PARAMETER;
        self.raise_attention();
    }

    pub(crate) fn data_phase_context(&self) -> data_phase::DataPhaseContext {
        data_phase::DataPhaseContext {
            device_id: self.id,
            cylinder: self.current_cylinder(),
            head: self.regs.selected_head,
            write_enabled: self.regs.write_enabled,
            gate_us: self.gate_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> AnsiDevice {
        AnsiDevice::new(0, AnsiDiskType::default()).unwrap()
    }

    #[test]
    fn test_new_validates_id() {
        assert_eq!(
            AnsiDevice::new(8, AnsiDiskType::default()).err(),
            Some(AnsiError::InvalidDeviceId(8))
        );
        let bad = AnsiDiskType {
            heads: 0,
            ..Default::default()
        };
        assert!(matches!(AnsiDevice::new(1, bad).err(), Some(AnsiError::InvalidDiskType(_))));
    }

    #[test]
    fn test_power_on_defaults() {
        let dev = device();
        assert_eq!(dev.state(), AnsiDevState::Disconnected);
        assert!(dev.attention_enabled());
        assert!(!dev.write_enabled());
        assert_eq!(dev.general_status(), 0);
        assert!(!dev.attributes().is_initialized());
    }

    #[test]
    fn test_sb1_raises_attention_on_new_bits() {
        let mut dev = device();
        dev.set_sb1(SB1_SEEK_ERROR);
        assert!(dev.attention());
        assert_eq!(dev.general_status() & GS_SENSE_BYTE_1, GS_SENSE_BYTE_1);

        dev.clear_attention();
        dev.set_sb1(SB1_SEEK_ERROR);
        assert!(!dev.attention());

        dev.set_sb1(SB1_SEEK_ERROR | SB1_SPEED_ERROR);
        assert!(dev.attention());
    }

    #[test]
    fn test_clearing_last_bit_clears_summary() {
        let mut dev = device();
        dev.set_sb1(SB1_SEEK_ERROR | SB1_RW_FAULT);
        dev.clear_sb1(SB1_SEEK_ERROR);
        assert_eq!(dev.general_status() & GS_SENSE_BYTE_1, GS_SENSE_BYTE_1);
        dev.clear_sb1(SB1_RW_FAULT);
        assert_eq!(dev.general_status() & GS_SENSE_BYTE_1, 0);

        dev.set_sb2(SB2_READY_TRANSITION);
        assert_eq!(dev.general_status() & GS_SENSE_BYTE_2, GS_SENSE_BYTE_2);
        dev.clear_sb2(SB2_READY_TRANSITION);
        assert_eq!(dev.general_status() & GS_SENSE_BYTE_2, 0);
    }

    #[test]
    fn test_sb2_attention_class_only() {
        let mut dev = device();
        dev.set_sb2(SB2_DEV_RESERVED_TO_ALT_PORT);
        assert!(!dev.attention());
        assert_eq!(dev.sense_byte_2(), SB2_DEV_RESERVED_TO_ALT_PORT);

        dev.set_sb2(SB2_DEVICE_ATTR_TABLE_MODIFIED);
        assert!(dev.attention());
    }

    #[test]
    fn test_initial_state_resets() {
        let mut dev = device();
        dev.regs.selected_head = 3;
        dev.regs.attention_enabled = false;
        dev.set_sb1(SB1_POWER_FAULT);
        dev.attributes.ensure_initialized(&AnsiDiskType::default());

        dev.initial_state();
        assert_eq!(dev.selected_head(), 0);
        assert!(dev.attention_enabled());
        assert_eq!(dev.sense_byte_1(), 0);
        assert_eq!(dev.general_status(), 0);
        assert!(!dev.attention());
        assert!(!dev.attributes().is_initialized());
        assert_eq!(dev.id(), 0);
    }
}
